//! Frame pipeline settings
//!
//! Every tuning value the core uses is plain configuration: broad-phase cell
//! size, dirty padding, batch threshold, full-redraw interval, memory sampling
//! and leak thresholds. Persisted as JSON next to the game.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::consts::*;
use crate::error::{CoreError, Result};
use crate::sim::Region;

/// Frame pipeline settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    // === Broad phase ===
    /// Spatial hash cell size in world units (fixed for the lifetime of the index)
    pub cell_size: f32,

    // === Visibility ===
    /// Extra margin around the viewport before an entity counts as off-screen
    pub viewport_margin: f32,
    /// Distance outside the viewport at which non-player entities are despawned
    pub despawn_margin: f32,

    // === Batching ===
    /// Minimum sprites sharing an image before a batch draw is used
    pub batch_min: usize,

    // === Dirty rectangles ===
    /// Padding (pixels) added around each dirty rectangle to erase motion trails
    pub dirty_padding: i32,
    /// Coalesce overlapping dirty rectangles before compositing
    pub merge_dirty_regions: bool,
    /// Frames between forced full redraws (drift correction)
    pub full_redraw_interval: u64,
    /// Dirty area fraction of the frame above which a full redraw is cheaper
    pub full_redraw_area_ratio: f32,
    /// Dirty rectangles (before merging) above which the frame falls back to
    /// a full redraw without merging them
    pub max_dirty_regions: usize,

    // === Performance monitor ===
    /// Master switch for section timing and memory sampling
    pub monitoring: bool,
    /// Samples kept per section for rolling averages
    pub sample_capacity: usize,
    /// Sections slower than this (milliseconds) produce a warning
    pub slow_section_ms: f32,
    /// Seconds between periodic performance reports
    pub report_interval_secs: f32,
    /// Frames between memory samples
    pub memory_sample_interval: u64,
    /// Frames to wait before taking the memory baseline automatically
    pub memory_warmup_frames: u64,
    /// Growth above baseline (percent) considered suspicious
    pub leak_threshold_pct: f32,
    /// Consecutive suspicious samples before a leak warning is raised
    pub leak_sustained_samples: u32,

    // === HUD ===
    /// Draw the performance overlay
    pub show_overlay: bool,
    /// Screen rectangle reserved for the overlay panel
    pub overlay_rect: Region,
    /// Shade occupied broad-phase cells
    pub show_grid_debug: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            cell_size: DEFAULT_CELL_SIZE,

            viewport_margin: 16.0,
            despawn_margin: 128.0,

            batch_min: DEFAULT_BATCH_MIN,

            dirty_padding: DEFAULT_DIRTY_PADDING,
            merge_dirty_regions: true,
            full_redraw_interval: 300,
            full_redraw_area_ratio: 0.6,
            max_dirty_regions: 64,

            monitoring: true,
            sample_capacity: 60,
            slow_section_ms: 1000.0 / 30.0,
            report_interval_secs: 5.0,
            memory_sample_interval: 120,
            memory_warmup_frames: 60,
            leak_threshold_pct: 20.0,
            leak_sustained_samples: 10,

            show_overlay: false,
            overlay_rect: Region::new(5, 5, 200, 115),
            show_grid_debug: false,
        }
    }
}

impl Settings {
    /// Reject values that would corrupt the grid or stall the loop
    pub fn validate(&self) -> Result<()> {
        if !self.cell_size.is_finite() || self.cell_size <= 0.0 {
            return Err(CoreError::config(
                "cell_size",
                format!("must be a positive finite number, got {}", self.cell_size),
            ));
        }
        if !self.viewport_margin.is_finite() || self.viewport_margin < 0.0 {
            return Err(CoreError::config("viewport_margin", "must be >= 0"));
        }
        if !self.despawn_margin.is_finite() || self.despawn_margin < 0.0 {
            return Err(CoreError::config("despawn_margin", "must be >= 0"));
        }
        if self.batch_min == 0 {
            return Err(CoreError::config("batch_min", "must be at least 1"));
        }
        if self.dirty_padding < 0 {
            return Err(CoreError::config("dirty_padding", "must be >= 0"));
        }
        if self.full_redraw_interval == 0 {
            return Err(CoreError::config("full_redraw_interval", "must be at least 1 frame"));
        }
        if !(self.full_redraw_area_ratio > 0.0 && self.full_redraw_area_ratio <= 1.0) {
            return Err(CoreError::config("full_redraw_area_ratio", "must be in (0, 1]"));
        }
        if self.max_dirty_regions == 0 {
            return Err(CoreError::config("max_dirty_regions", "must be at least 1"));
        }
        if self.sample_capacity == 0 {
            return Err(CoreError::config("sample_capacity", "must be at least 1"));
        }
        if !self.slow_section_ms.is_finite()
            || self.slow_section_ms <= 0.0
            || self.slow_section_ms > MAX_SLOW_SECTION_MS
        {
            return Err(CoreError::config(
                "slow_section_ms",
                format!("must be in (0, {MAX_SLOW_SECTION_MS}], got {}", self.slow_section_ms),
            ));
        }
        if !self.report_interval_secs.is_finite()
            || self.report_interval_secs < 0.0
            || self.report_interval_secs > MAX_REPORT_INTERVAL_SECS
        {
            return Err(CoreError::config(
                "report_interval_secs",
                format!(
                    "must be in [0, {MAX_REPORT_INTERVAL_SECS}] (0 disables reports), got {}",
                    self.report_interval_secs
                ),
            ));
        }
        if self.memory_sample_interval == 0 {
            return Err(CoreError::config("memory_sample_interval", "must be at least 1 frame"));
        }
        if !self.leak_threshold_pct.is_finite() || self.leak_threshold_pct <= 0.0 {
            return Err(CoreError::config("leak_threshold_pct", "must be > 0"));
        }
        if self.leak_sustained_samples == 0 {
            return Err(CoreError::config("leak_sustained_samples", "must be at least 1"));
        }
        if self.overlay_rect.is_empty() {
            return Err(CoreError::config("overlay_rect", "must have a positive area"));
        }
        Ok(())
    }

    /// Load and validate settings from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path.as_ref())?;
        let settings: Settings = serde_json::from_str(&json)?;
        settings.validate()?;
        log::info!("Loaded settings from {}", path.as_ref().display());
        Ok(settings)
    }

    /// Load settings, falling back to defaults when the file is missing or bad
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        match Self::load(path.as_ref()) {
            Ok(settings) => settings,
            Err(e) => {
                log::info!("Using default settings ({e})");
                Self::default()
            }
        }
    }

    /// Save settings as pretty JSON
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path.as_ref(), json)?;
        log::info!("Settings saved to {}", path.as_ref().display());
        Ok(())
    }
}
