//! Render stage: batching, dirty rectangles and presentation
//!
//! The stage turns the visible entity set into a [`DrawList`]:
//! 1. Screen-space [`RenderItem`]s in stable paint order
//! 2. Dirty-rectangle diff against the previous frame ([`DirtyRectRenderer`])
//! 3. Per-region grouping into batches and single draws ([`BatchGrouper`])
//!
//! Backends replay the list through the [`Canvas`] trait.

pub mod batch;
pub mod canvas;
pub mod dirty;
pub mod draw;
pub mod grid;

use glam::Vec2;

pub use batch::{Batch, BatchGrouper, BatchStats, PlannedDraw, RenderItem};
pub use canvas::{Canvas, CanvasStats, SoftwareCanvas};
pub use dirty::{DirtyRectRenderer, DirtyStats, OverlayPanel, RedrawReason, RenderPhase};
pub use draw::{BatchInstance, DrawList, DrawOp, SpriteDraw};
pub use grid::{GridCell, GridOverlay};

use crate::sim::{Bounds, Region, Visual, VisualFlags};

/// Pixels a rectangle rotated about its center can touch
pub fn rotated_footprint(bounds: &Bounds, rotation: f32) -> Region {
    let (sin, cos) = rotation.sin_cos();
    let (sin, cos) = (sin.abs(), cos.abs());
    let half = bounds.size * 0.5;
    let extent = Vec2::new(half.x * cos + half.y * sin, half.x * sin + half.y * cos);
    Region::covering(&Bounds::from_center(bounds.center(), extent))
}

/// Pixels a sprite with this visual touches when drawn at `bounds`
pub fn footprint(bounds: &Bounds, visual: &Visual) -> Region {
    if visual.flags.contains(VisualFlags::ROTATED) && visual.rotation != 0.0 {
        rotated_footprint(bounds, visual.rotation)
    } else {
        Region::covering(bounds)
    }
}
