use super::clip::{AnimationController, ClipWindow};
use super::timeline::AnimationTimeline;
use crate::error::AnimationError;
use crate::skeleton::{HierarchyNode, Skeleton};
use glam::Mat4;

pub const DEFAULT_TICKS_PER_SECOND: f32 = 25.0;

/// Per-skeleton calibration of the clip-to-timeline mapping.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AnimatorSettings {
    /// Authored frame count of the whole master timeline. Clip frame
    /// indices are divided by this to land in the tick domain.
    pub total_frame_count: f32,
    /// Used when the timeline carries no ticks-per-second value.
    pub fallback_ticks_per_second: f32,
}

impl Default for AnimatorSettings {
    fn default() -> Self {
        Self { total_frame_count: 4308.0, fallback_ticks_per_second: DEFAULT_TICKS_PER_SECOND }
    }
}

/// Evaluates the master timeline over the bone hierarchy and keeps the
/// resulting bone palette.
pub struct SkeletalAnimator {
    skeleton: Skeleton,
    timeline: AnimationTimeline,
    settings: AnimatorSettings,
    palette: Vec<Mat4>,
    scratch: Vec<Mat4>,
}

impl SkeletalAnimator {
    pub fn new(
        skeleton: Skeleton,
        timeline: AnimationTimeline,
        settings: AnimatorSettings,
    ) -> Result<Self, AnimationError> {
        let frames = settings.total_frame_count;
        if !frames.is_finite() || frames <= 0.0 {
            return Err(AnimationError::InvalidFrameCount(frames));
        }
        let fallback = settings.fallback_ticks_per_second;
        if !fallback.is_finite() || fallback <= 0.0 {
            return Err(AnimationError::InvalidTickRate(fallback));
        }
        let palette = skeleton.final_transforms();
        Ok(Self { skeleton, timeline, settings, scratch: palette.clone(), palette })
    }

    pub fn skeleton(&self) -> &Skeleton {
        &self.skeleton
    }

    pub fn timeline(&self) -> &AnimationTimeline {
        &self.timeline
    }

    pub fn settings(&self) -> AnimatorSettings {
        self.settings
    }

    /// Palette of the last successful evaluation, ordered by bone index.
    pub fn palette(&self) -> &[Mat4] {
        &self.palette
    }

    pub fn ticks_per_second(&self) -> f32 {
        self.timeline.effective_ticks_per_second(self.settings.fallback_ticks_per_second)
    }

    /// Tick range of `window` inside the master timeline.
    pub fn clip_time_range(&self, window: ClipWindow) -> (f32, f32) {
        window.time_range(self.settings.total_frame_count, self.timeline.duration)
    }

    /// Length of one loop of `window`, in seconds.
    pub fn clip_period(&self, window: ClipWindow) -> f32 {
        let (start, end) = self.clip_time_range(window);
        (end - start) / self.ticks_per_second()
    }

    /// Position on the master timeline, in ticks, for `seconds` into a
    /// looping playback of `window`.
    pub fn animation_time(&self, clip: &str, window: ClipWindow, seconds: f32) -> Result<f32, AnimationError> {
        let (start, end) = self.clip_time_range(window);
        let span = end - start;
        if !span.is_finite() || span <= 0.0 {
            return Err(AnimationError::EmptyClipWindow { clip: clip.to_string() });
        }
        let ticks = seconds * self.ticks_per_second();
        let time = ticks.rem_euclid(span) + start;
        // Rounding can land exactly on `end`, which belongs to the next loop.
        Ok(if time >= end { start } else { time })
    }

    /// Evaluates the controller's active clip at `seconds` since clip start.
    pub fn bone_transform(
        &mut self,
        seconds: f32,
        controller: &AnimationController,
    ) -> Result<&[Mat4], AnimationError> {
        let (clip, window) = controller.active_window()?;
        self.sample_window(clip, window, seconds)
    }

    /// Evaluates the active clip at the controller's own clip clock.
    pub fn evaluate(&mut self, controller: &AnimationController) -> Result<&[Mat4], AnimationError> {
        self.bone_transform(controller.elapsed(), controller)
    }

    pub fn sample_window(
        &mut self,
        clip: &str,
        window: ClipWindow,
        seconds: f32,
    ) -> Result<&[Mat4], AnimationError> {
        let time = self.animation_time(clip, window, seconds)?;
        self.sample_at(time)
    }

    /// Walks the hierarchy at `time` (ticks on the master timeline). The
    /// published palette only changes when the whole walk succeeds.
    pub fn sample_at(&mut self, time: f32) -> Result<&[Mat4], AnimationError> {
        let mut scratch = std::mem::take(&mut self.scratch);
        scratch.clear();
        scratch.extend_from_slice(&self.palette);
        let walk = PoseWalk {
            timeline: &self.timeline,
            skeleton: &self.skeleton,
            global_inverse: self.skeleton.global_inverse_transform(),
            time,
        };
        let result = walk.visit(self.skeleton.root(), Mat4::IDENTITY, &mut scratch);
        if result.is_ok() {
            std::mem::swap(&mut self.palette, &mut scratch);
            self.skeleton.commit_final_transforms(&self.palette);
        }
        self.scratch = scratch;
        result.map(|()| self.palette.as_slice())
    }
}

struct PoseWalk<'a> {
    timeline: &'a AnimationTimeline,
    skeleton: &'a Skeleton,
    global_inverse: Mat4,
    time: f32,
}

impl PoseWalk<'_> {
    fn visit(&self, node: &HierarchyNode, parent: Mat4, palette: &mut [Mat4]) -> Result<(), AnimationError> {
        let local = match self.timeline.find_channel(&node.name) {
            Some(channel) => channel.local_transform(self.time)?,
            None => node.transform,
        };
        let global = parent * local;
        if let Some(index) = self.skeleton.bone_index(&node.name) {
            if let Some(bone) = self.skeleton.bone(index) {
                palette[index as usize] = self.global_inverse * global * bone.offset;
            }
        }
        for child in &node.children {
            self.visit(child, global, palette)?;
        }
        Ok(())
    }
}
