//! Space Shooter - frame-level performance core for a 2D arcade game
//!
//! Core modules:
//! - `sim`: Entity store, spatial-hash broad phase, collision, visibility, update step
//! - `renderer`: Sprite batching, dirty-rectangle compositing, draw lists, software canvas
//! - `perf`: Per-section timing, memory sampling and leak detection, sinks
//! - `frame_loop`: Semi-fixed timestep orchestrator tying the stages together
//! - `settings`: Tunables (cell size, padding, thresholds, intervals)

pub mod error;
pub mod frame_loop;
pub mod perf;
pub mod renderer;
pub mod settings;
pub mod sim;

pub use error::{CoreError, Result};
pub use frame_loop::{FrameInput, FrameLoop, FrameOutput, FrameStats, Gameplay};
pub use settings::Settings;

/// Game configuration constants
pub mod consts {
    /// Fixed simulation timestep (120 Hz for smooth physics)
    pub const SIM_DT: f32 = 1.0 / 120.0;
    /// Maximum substeps per frame to prevent spiral of death
    pub const MAX_SUBSTEPS: u32 = 8;
    /// Longest real frame interval fed into the accumulator (seconds)
    pub const MAX_FRAME_DT: f32 = 0.1;

    /// Default broad-phase cell size (world units)
    pub const DEFAULT_CELL_SIZE: f32 = 64.0;
    /// Default padding added around every dirty rectangle (pixels)
    pub const DEFAULT_DIRTY_PADDING: i32 = 4;
    /// Default minimum number of same-image sprites worth a batch draw
    pub const DEFAULT_BATCH_MIN: usize = 3;

    /// Upper bound for the slow-section warning threshold (milliseconds)
    pub const MAX_SLOW_SECTION_MS: f32 = 60_000.0;
    /// Upper bound for the periodic report interval (seconds)
    pub const MAX_REPORT_INTERVAL_SECS: f32 = 86_400.0;
}

/// Linear interpolation between two positions
#[inline]
pub fn lerp(a: glam::Vec2, b: glam::Vec2, t: f32) -> glam::Vec2 {
    a + (b - a) * t
}
