use super::keyframe::KeyTrack;
use crate::error::{AnimationError, TrackKind};
use glam::{Mat4, Quat, Vec3};
use std::sync::Arc;

/// Keyframes driving one hierarchy node. The three tracks are timed
/// independently.
#[derive(Clone, Debug)]
pub struct NodeChannel {
    pub node_name: Arc<str>,
    pub positions: KeyTrack<Vec3>,
    pub rotations: KeyTrack<Quat>,
    pub scalings: KeyTrack<Vec3>,
}

impl NodeChannel {
    pub fn new(
        node_name: impl Into<Arc<str>>,
        positions: KeyTrack<Vec3>,
        rotations: KeyTrack<Quat>,
        scalings: KeyTrack<Vec3>,
    ) -> Self {
        Self { node_name: node_name.into(), positions, rotations, scalings }
    }

    /// `T * R * S` of the interpolated keys at `time` (in ticks).
    pub fn local_transform(&self, time: f32) -> Result<Mat4, AnimationError> {
        let node = self.node_name.as_ref();
        let scaling = self.scalings.sample(time, node, TrackKind::Scale)?;
        let rotation = self.rotations.sample(time, node, TrackKind::Rotation)?;
        let translation = self.positions.sample(time, node, TrackKind::Position)?;
        Ok(Mat4::from_scale_rotation_translation(scaling, rotation, translation))
    }

    pub fn last_key_time(&self) -> f32 {
        [self.positions.last_time(), self.rotations.last_time(), self.scalings.last_time()]
            .into_iter()
            .flatten()
            .fold(0.0, f32::max)
    }
}

/// The single master animation every clip is cut from.
#[derive(Clone, Debug)]
pub struct AnimationTimeline {
    pub name: Arc<str>,
    /// Zero when the source asset did not specify a rate.
    pub ticks_per_second: f32,
    /// Length of the whole timeline in ticks.
    pub duration: f32,
    pub channels: Vec<NodeChannel>,
}

impl AnimationTimeline {
    pub fn new(name: impl Into<Arc<str>>, ticks_per_second: f32, duration: f32) -> Self {
        Self { name: name.into(), ticks_per_second, duration, channels: Vec::new() }
    }

    pub fn with_channel(mut self, channel: NodeChannel) -> Self {
        self.channels.push(channel);
        self
    }

    pub fn push_channel(&mut self, channel: NodeChannel) {
        self.channels.push(channel);
    }

    /// Linear scan; node names are unique within one animation.
    pub fn find_channel(&self, node_name: &str) -> Option<&NodeChannel> {
        self.channels.iter().find(|channel| channel.node_name.as_ref() == node_name)
    }

    pub fn effective_ticks_per_second(&self, fallback: f32) -> f32 {
        if self.ticks_per_second != 0.0 {
            self.ticks_per_second
        } else {
            fallback
        }
    }
}
