//! Sprite batching
//!
//! Groups sprites that share a layer and an image into one draw call.
//! Sprites with a per-instance rotation or alpha can't share a draw and go
//! through the ordinary per-sprite path, as do runs with too few instances to
//! be worth a batch.
//!
//! Paint order inside a layer is (image, batchable first, id). It does not
//! depend on whether a run ends up batched, so a region redrawn with a
//! subset of the sprites paints exactly what a full redraw would.

use serde::Serialize;

use super::draw::{BatchInstance, SpriteDraw};
use crate::sim::{Bounds, EntityId, ImageHandle, Region, Visual, VisualFlags};

/// A sprite ready for drawing, in screen space
#[derive(Debug, Clone, PartialEq)]
pub struct RenderItem {
    pub id: EntityId,
    pub layer: u8,
    pub visual: Visual,
    /// Unrotated screen rectangle
    pub bounds: Bounds,
    /// Every pixel the sprite can touch (rotation included)
    pub footprint: Region,
}

impl RenderItem {
    /// Sort key giving the stable back-to-front order
    #[inline]
    pub fn paint_key(&self) -> (u8, ImageHandle, bool, EntityId) {
        (self.layer, self.visual.image, !self.visual.batchable(), self.id)
    }

    /// Per-sprite draw; rotation and alpha only apply when flagged
    pub fn sprite_draw(&self) -> SpriteDraw {
        let flags = self.visual.flags;
        SpriteDraw {
            id: self.id,
            image: self.visual.image,
            bounds: self.bounds,
            rotation: if flags.contains(VisualFlags::ROTATED) {
                self.visual.rotation
            } else {
                0.0
            },
            alpha: if flags.contains(VisualFlags::TRANSLUCENT) {
                self.visual.alpha
            } else {
                255
            },
        }
    }
}

/// Same-image sprites drawn together
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    pub image: ImageHandle,
    pub ids: Vec<EntityId>,
    pub instances: Vec<BatchInstance>,
}

/// One entry of a grouping result, in paint order
#[derive(Debug, Clone, PartialEq)]
pub enum PlannedDraw {
    Batch(Batch),
    Single(SpriteDraw),
}

/// Batched vs. unbatched draw counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchStats {
    /// Batch draw calls issued
    pub batches: u32,
    /// Sprites drawn through batches
    pub batched_sprites: u32,
    /// Sprites drawn individually
    pub individual_sprites: u32,
}

impl BatchStats {
    pub fn draw_calls(&self) -> u32 {
        self.batches + self.individual_sprites
    }

    pub fn add(&mut self, other: &BatchStats) {
        self.batches += other.batches;
        self.batched_sprites += other.batched_sprites;
        self.individual_sprites += other.individual_sprites;
    }
}

/// Partitions sprites into batches and individual draws
#[derive(Debug, Clone)]
pub struct BatchGrouper {
    min_batch: usize,
}

impl BatchGrouper {
    pub fn new(min_batch: usize) -> Self {
        Self {
            min_batch: min_batch.max(1),
        }
    }

    pub fn min_batch(&self) -> usize {
        self.min_batch
    }

    /// Group items already sorted by [`RenderItem::paint_key`]
    pub fn group(&self, items: &[&RenderItem]) -> (Vec<PlannedDraw>, BatchStats) {
        debug_assert!(
            items.windows(2).all(|w| w[0].paint_key() <= w[1].paint_key()),
            "render items must be in paint order"
        );

        let mut plan = Vec::new();
        let mut stats = BatchStats::default();
        let mut i = 0;

        while i < items.len() {
            let head = items[i];
            if !head.visual.batchable() {
                plan.push(PlannedDraw::Single(head.sprite_draw()));
                stats.individual_sprites += 1;
                i += 1;
                continue;
            }

            // Run of batchable sprites with the same layer and image
            let end = items[i..]
                .iter()
                .position(|it| {
                    it.layer != head.layer || it.visual.image != head.visual.image || !it.visual.batchable()
                })
                .map_or(items.len(), |p| i + p);
            let run = &items[i..end];

            if run.len() >= self.min_batch {
                plan.push(PlannedDraw::Batch(Batch {
                    image: head.visual.image,
                    ids: run.iter().map(|it| it.id).collect(),
                    instances: run.iter().map(|it| BatchInstance::from_bounds(&it.bounds)).collect(),
                }));
                stats.batches += 1;
                stats.batched_sprites += run.len() as u32;
            } else {
                plan.extend(run.iter().map(|it| PlannedDraw::Single(it.sprite_draw())));
                stats.individual_sprites += run.len() as u32;
            }
            i = end;
        }

        (plan, stats)
    }
}
