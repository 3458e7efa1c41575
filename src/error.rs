use std::fmt;
use thiserror::Error;

/// Which keyframe sequence of a channel an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    Position,
    Rotation,
    Scale,
}

impl TrackKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TrackKind::Position => "position",
            TrackKind::Rotation => "rotation",
            TrackKind::Scale => "scale",
        }
    }
}

impl fmt::Display for TrackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum AnimationError {
    #[error("unknown animation clip '{0}'")]
    UnknownClip(String),

    #[error("no animation clip is selected")]
    NoActiveClip,

    #[error("animation clip '{clip}' maps to an empty time window")]
    EmptyClipWindow { clip: String },

    #[error("total frame count must be a positive finite value, got {0}")]
    InvalidFrameCount(f32),

    #[error("fallback ticks per second must be a positive finite value, got {0}")]
    InvalidTickRate(f32),

    #[error("channel '{node}' has no {track} keys")]
    EmptyTrack { node: String, track: TrackKind },

    #[error("channel '{node}' has no {track} keys bracketing time {time}")]
    MissingKeyBracket { node: String, track: TrackKind, time: f32 },

    #[error("channel '{node}' {track} interpolation factor {factor} is outside [0, 1] at time {time}")]
    InterpolationOutOfRange { node: String, track: TrackKind, time: f32, factor: f32 },
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SkinningError {
    #[error("vertex {vertex} already has the maximum number of bone influences")]
    TooManyInfluences { vertex: usize },

    #[error("bone '{bone}' references vertex {vertex} but the mesh has {vertex_count} vertices")]
    VertexOutOfRange { bone: String, vertex: usize, vertex_count: usize },

    #[error("bone index {index} is not present in a palette of {palette_len} matrices")]
    UnknownBone { index: u32, palette_len: usize },
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SceneError {
    #[error("scene node no longer exists")]
    NodeNotFound,

    #[error("invalid position supplied for node '{node}'")]
    InvalidPosition { node: String },

    #[error("invalid orientation supplied for node '{node}'")]
    InvalidOrientation { node: String },

    #[error("invalid scale supplied for node '{node}'")]
    InvalidScale { node: String },

    #[error("node '{child}' is already a child of '{parent}'; remove it before adding it elsewhere")]
    AlreadyParented { child: String, parent: String },

    #[error("node '{parent}' already has a child named '{name}'")]
    DuplicateChildName { parent: String, name: String },

    #[error("node '{parent}' has no child named '{name}'")]
    ChildNotFound { parent: String, name: String },

    #[error("child index {index} is out of bounds for node '{parent}' with {len} children")]
    ChildIndexOutOfBounds { parent: String, index: usize, len: usize },

    #[error("node '{child}' is not a child of '{parent}'")]
    NotAChild { parent: String, child: String },

    #[error("adding '{child}' under '{parent}' would create a cycle")]
    WouldCycle { parent: String, child: String },
}
