use crate::error::{AnimationError, TrackKind};
use glam::{Quat, Vec3};
use std::sync::Arc;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Keyframe<T> {
    pub time: f32,
    pub value: T,
}

impl<T> Keyframe<T> {
    pub fn new(time: f32, value: T) -> Self {
        Self { time, value }
    }
}

/// Values that can be blended between two bracketing keys.
pub trait Interpolate: Copy {
    fn interpolate(start: Self, end: Self, factor: f32) -> Self;
}

impl Interpolate for Vec3 {
    #[inline]
    fn interpolate(start: Self, end: Self, factor: f32) -> Self {
        start + (end - start) * factor
    }
}

impl Interpolate for Quat {
    /// Spherical interpolation, renormalised to keep drift out of the pose.
    #[inline]
    fn interpolate(start: Self, end: Self, factor: f32) -> Self {
        start.slerp(end, factor).normalize()
    }
}

/// Keys sorted by non-decreasing time. A single key is a constant.
#[derive(Clone, Debug)]
pub struct KeyTrack<T> {
    keys: Arc<[Keyframe<T>]>,
}

impl<T: Interpolate> KeyTrack<T> {
    pub fn new(keys: impl Into<Arc<[Keyframe<T>]>>) -> Self {
        Self { keys: keys.into() }
    }

    pub fn constant(value: T) -> Self {
        Self::new(vec![Keyframe::new(0.0, value)])
    }

    pub fn keys(&self) -> &[Keyframe<T>] {
        &self.keys
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn last_time(&self) -> Option<f32> {
        self.keys.last().map(|key| key.time)
    }

    /// First index `i` with `time < keys[i + 1].time`, scanning from the
    /// start of the track.
    pub fn find_bracket(&self, time: f32) -> Option<usize> {
        self.keys.windows(2).position(|pair| time < pair[1].time)
    }

    pub fn sample(&self, time: f32, node: &str, track: TrackKind) -> Result<T, AnimationError> {
        match self.keys.as_ref() {
            [] => Err(AnimationError::EmptyTrack { node: node.to_string(), track }),
            [only] => Ok(only.value),
            keys => {
                let index = self.find_bracket(time).ok_or_else(|| AnimationError::MissingKeyBracket {
                    node: node.to_string(),
                    track,
                    time,
                })?;
                let start = &keys[index];
                let end = &keys[index + 1];
                let factor = (time - start.time) / (end.time - start.time);
                if !(0.0..=1.0).contains(&factor) {
                    return Err(AnimationError::InterpolationOutOfRange {
                        node: node.to_string(),
                        track,
                        time,
                        factor,
                    });
                }
                Ok(T::interpolate(start.value, end.value, factor))
            }
        }
    }
}
