use crate::animation::{AnimationController, AnimatorSettings, ClipTable, ClipWindow, DEFAULT_TICKS_PER_SECOND};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
pub struct SkeletonConfig {
    #[serde(default = "SkeletonConfig::default_total_frame_count")]
    pub total_frame_count: f32,
    #[serde(default = "SkeletonConfig::default_fallback_ticks_per_second")]
    pub fallback_ticks_per_second: f32,
}

impl SkeletonConfig {
    const fn default_total_frame_count() -> f32 {
        4308.0
    }

    const fn default_fallback_ticks_per_second() -> f32 {
        DEFAULT_TICKS_PER_SECOND
    }
}

impl Default for SkeletonConfig {
    fn default() -> Self {
        Self {
            total_frame_count: Self::default_total_frame_count(),
            fallback_ticks_per_second: Self::default_fallback_ticks_per_second(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct RigConfig {
    #[serde(default)]
    pub skeleton: SkeletonConfig,
    #[serde(default)]
    pub clips: BTreeMap<String, ClipWindow>,
    #[serde(default)]
    pub initial_clip: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct RigConfigOverrides {
    pub clip: Option<String>,
    pub total_frame_count: Option<f32>,
}

impl RigConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes =
            fs::read(path).with_context(|| format!("Failed to read rig config {}", path.display()))?;
        let cfg = serde_json::from_slice(&bytes)
            .with_context(|| format!("Failed to parse rig config {}", path.display()))?;
        Ok(cfg)
    }

    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        match Self::load(path) {
            Ok(cfg) => cfg,
            Err(err) => {
                log::warn!("Rig config load error: {err:?}. Falling back to defaults.");
                Self::default()
            }
        }
    }

    pub fn apply_overrides(&mut self, overrides: &RigConfigOverrides) {
        if let Some(clip) = &overrides.clip {
            self.initial_clip = Some(clip.clone());
        }
        if let Some(frames) = overrides.total_frame_count {
            self.skeleton.total_frame_count = frames;
        }
    }

    pub fn animator_settings(&self) -> AnimatorSettings {
        AnimatorSettings {
            total_frame_count: self.skeleton.total_frame_count,
            fallback_ticks_per_second: self.skeleton.fallback_ticks_per_second,
        }
    }

    /// Builds the clip table and selects `initial_clip` when one is set.
    pub fn animation_controller(&self) -> Result<AnimationController> {
        let mut clips = ClipTable::new();
        for (name, window) in &self.clips {
            clips.insert(name, *window);
        }
        let mut controller = AnimationController::new(clips);
        if let Some(clip) = &self.initial_clip {
            controller.select_clip(clip).with_context(|| format!("Invalid initial clip '{clip}'"))?;
        }
        Ok(controller)
    }
}

impl RigConfigOverrides {
    pub fn is_empty(&self) -> bool {
        self.clip.is_none() && self.total_frame_count.is_none()
    }

    pub fn applied_fields(&self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if self.clip.is_some() {
            fields.push("clip");
        }
        if self.total_frame_count.is_some() {
            fields.push("total_frame_count");
        }
        fields
    }
}
