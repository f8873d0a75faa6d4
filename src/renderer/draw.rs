//! Draw operations handed to the presentation layer
//!
//! A [`DrawList`] is the complete output of one render stage: ordered
//! operations, each confined to a clip region, plus the regions to present.
//! Backends replay it in order; nothing in it refers back to the entity store.

use bytemuck::{Pod, Zeroable};
use glam::Vec2;
use serde::Serialize;

use super::canvas::Canvas;
use super::grid::GridCell;
use crate::sim::{Bounds, EntityId, ImageHandle, Region};

/// One sprite inside a batch draw (GPU instance layout)
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable, Serialize)]
pub struct BatchInstance {
    /// Top-left corner in screen space
    pub pos: [f32; 2],
    pub size: [f32; 2],
}

impl BatchInstance {
    pub fn from_bounds(bounds: &Bounds) -> Self {
        Self {
            pos: bounds.pos.to_array(),
            size: bounds.size.to_array(),
        }
    }

    pub fn bounds(&self) -> Bounds {
        Bounds {
            pos: Vec2::from_array(self.pos),
            size: Vec2::from_array(self.size),
        }
    }
}

/// A sprite drawn on its own, with its full per-instance transform
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpriteDraw {
    pub id: EntityId,
    pub image: ImageHandle,
    /// Unrotated rectangle in screen space
    pub bounds: Bounds,
    /// Radians about the rectangle center
    pub rotation: f32,
    /// 0-255
    pub alpha: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum DrawOp {
    /// Restore background pixels in `region`
    Clear { region: Region },
    /// Draw every instance with the same image
    Batch {
        image: ImageHandle,
        instances: Vec<BatchInstance>,
        clip: Region,
    },
    /// Draw one sprite
    Sprite { sprite: SpriteDraw, clip: Region },
    /// Broad-phase debug cells, above the sprites
    Grid { cells: Vec<GridCell>, clip: Region },
    /// Performance overlay panel (always last)
    Overlay {
        lines: Vec<String>,
        rect: Region,
        clip: Region,
    },
}

/// Ordered draw operations for one frame
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DrawList {
    ops: Vec<DrawOp>,
    present: Vec<Region>,
    full_redraw: bool,
}

impl DrawList {
    pub(crate) fn new(full_redraw: bool) -> Self {
        Self {
            ops: Vec::new(),
            present: Vec::new(),
            full_redraw,
        }
    }

    pub(crate) fn push(&mut self, op: DrawOp) {
        self.ops.push(op);
    }

    pub(crate) fn present_region(&mut self, region: Region) {
        self.present.push(region);
    }

    pub fn ops(&self) -> &[DrawOp] {
        &self.ops
    }

    /// Regions to flip to the screen (the whole frame on a full redraw)
    pub fn present_regions(&self) -> &[Region] {
        &self.present
    }

    pub fn is_full_redraw(&self) -> bool {
        self.full_redraw
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Batch and sprite draws (clears, grid and overlay excluded)
    pub fn draw_calls(&self) -> usize {
        self.ops
            .iter()
            .filter(|op| matches!(op, DrawOp::Batch { .. } | DrawOp::Sprite { .. }))
            .count()
    }

    /// Replay every operation onto a canvas, then present
    pub fn execute<C: Canvas + ?Sized>(&self, canvas: &mut C) {
        for op in &self.ops {
            match op {
                DrawOp::Clear { region } => canvas.clear(*region),
                DrawOp::Batch {
                    image,
                    instances,
                    clip,
                } => canvas.draw_batch(*image, instances, *clip),
                DrawOp::Sprite { sprite, clip } => canvas.draw_sprite(sprite, *clip),
                DrawOp::Grid { cells, clip } => canvas.draw_grid(cells, *clip),
                DrawOp::Overlay { lines, rect, clip } => canvas.draw_overlay(lines, *rect, *clip),
            }
        }
        canvas.present(&self.present);
    }
}
