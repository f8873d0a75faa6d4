//! Broad-phase debug view
//!
//! Shades every occupied spatial-hash cell, greener the more entities share
//! it. Drawn on the overlay layer, under the performance panel.

use serde::Serialize;

use crate::sim::{Bounds, Region, SpatialIndex};

/// Shade alpha for occupied cells
pub const GRID_ALPHA: u8 = 100;

/// One occupied cell in screen space
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GridCell {
    pub rect: Region,
    pub occupancy: u32,
}

impl GridCell {
    /// Green channel: 60 for a single entity, saturating at 255
    pub fn intensity(&self) -> u8 {
        (40 + 20 * self.occupancy.min(11)).min(255) as u8
    }

    pub fn color(&self) -> u32 {
        0xFF00_0000 | ((self.intensity() as u32) << 8)
    }
}

/// Occupied cells visible in the frame, sorted top-left first
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GridOverlay {
    pub cells: Vec<GridCell>,
}

impl GridOverlay {
    pub fn from_index(index: &SpatialIndex, viewport: &Bounds) -> Self {
        let frame = Region::covering(&Bounds::new(0.0, 0.0, viewport.size.x, viewport.size.y));
        let offset = -viewport.pos;
        let mut cells: Vec<GridCell> = index
            .occupied()
            .filter_map(|(key, count)| {
                let rect = Region::covering(&index.cell_bounds(key).translate(offset)).clamp_to(&frame);
                (!rect.is_empty()).then_some(GridCell {
                    rect,
                    occupancy: count as u32,
                })
            })
            .collect();
        cells.sort_unstable_by_key(|c| (c.rect.y, c.rect.x));
        Self { cells }
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Cells touching `region`
    pub fn within(&self, region: &Region) -> Vec<GridCell> {
        self.cells.iter().filter(|c| c.rect.intersects(region)).copied().collect()
    }
}
