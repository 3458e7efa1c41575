use crate::error::AnimationError;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;

/// A named action: a run of frames inside the shared master timeline.
#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
pub struct ClipWindow {
    pub start_frame: f32,
    pub frame_count: f32,
}

impl ClipWindow {
    pub fn new(start_frame: f32, frame_count: f32) -> Self {
        Self { start_frame, frame_count }
    }

    pub fn end_frame(&self) -> f32 {
        self.start_frame + self.frame_count
    }

    /// Maps the frame window onto the timeline's tick domain.
    pub fn time_range(&self, total_frame_count: f32, duration: f32) -> (f32, f32) {
        let start = self.start_frame / total_frame_count * duration;
        let end = self.end_frame() / total_frame_count * duration;
        (start, end)
    }
}

#[derive(Clone, Debug, Default)]
pub struct ClipTable {
    clips: HashMap<Arc<str>, ClipWindow>,
}

impl ClipTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the previous window when `name` was already defined.
    pub fn insert(&mut self, name: &str, window: ClipWindow) -> Option<ClipWindow> {
        self.clips.insert(Arc::from(name), window)
    }

    pub fn get(&self, name: &str) -> Result<ClipWindow, AnimationError> {
        self.clips.get(name).copied().ok_or_else(|| AnimationError::UnknownClip(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.clips.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.clips.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clips.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.clips.keys().map(|name| name.as_ref()).collect();
        names.sort_unstable();
        names
    }
}

/// Owns the clip table, the active clip selection and the time spent in the
/// active clip. Input handling writes the selection; the animator reads it.
#[derive(Clone, Debug, Default)]
pub struct AnimationController {
    clips: ClipTable,
    active: Option<Arc<str>>,
    elapsed: f32,
}

impl AnimationController {
    pub fn new(clips: ClipTable) -> Self {
        Self { clips, active: None, elapsed: 0.0 }
    }

    pub fn define_clip(&mut self, name: &str, window: ClipWindow) {
        if self.clips.insert(name, window).is_some() {
            log::debug!("redefined animation clip '{name}'");
        }
    }

    pub fn clips(&self) -> &ClipTable {
        &self.clips
    }

    /// Selects `name` as the active clip. The clip clock restarts only when
    /// the selection actually changes; returns whether it did.
    pub fn select_clip(&mut self, name: &str) -> Result<bool, AnimationError> {
        self.clips.get(name)?;
        if self.active.as_deref() == Some(name) {
            return Ok(false);
        }
        log::info!("switching animation clip to '{name}'");
        self.active = Some(Arc::from(name));
        self.elapsed = 0.0;
        Ok(true)
    }

    pub fn clear_selection(&mut self) {
        self.active = None;
        self.elapsed = 0.0;
    }

    pub fn active_clip(&self) -> Option<&str> {
        self.active.as_deref()
    }

    pub fn active_window(&self) -> Result<(&str, ClipWindow), AnimationError> {
        let name = self.active.as_deref().ok_or(AnimationError::NoActiveClip)?;
        Ok((name, self.clips.get(name)?))
    }

    pub fn advance(&mut self, dt: f32) {
        if dt.is_finite() && dt > 0.0 {
            self.elapsed += dt;
        }
    }

    pub fn set_elapsed(&mut self, seconds: f32) {
        self.elapsed = seconds;
    }

    /// Seconds since the active clip was selected.
    pub fn elapsed(&self) -> f32 {
        self.elapsed
    }
}
