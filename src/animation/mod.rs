//! Skeletal animation: keyframe tracks, the shared master timeline, named
//! clip windows cut from it, and the hierarchy walk producing bone palettes.

pub mod animator;
pub mod clip;
pub mod keyframe;
pub mod timeline;

pub use animator::{AnimatorSettings, SkeletalAnimator, DEFAULT_TICKS_PER_SECOND};
pub use clip::{AnimationController, ClipTable, ClipWindow};
pub use keyframe::{Interpolate, KeyTrack, Keyframe};
pub use timeline::{AnimationTimeline, NodeChannel};
