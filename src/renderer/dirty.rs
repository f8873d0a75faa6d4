//! Dirty-rectangle compositing
//!
//! Each frame walks a fixed cycle:
//! Idle -> Collecting -> Merging -> Compositing -> Flip -> Idle
//!
//! Collecting diffs the visible sprites against the cache of what was drawn
//! last frame. A sprite that moved or changed look dirties the union of its
//! old and new footprints, a new sprite only its new footprint, a vanished
//! sprite only its old one. Every rectangle is padded and clamped to the frame.
//!
//! Compositing re-creates each dirty region from scratch: background first,
//! then every sprite touching the region in paint order, then the overlay,
//! all clipped to the region. A region therefore ends up exactly as a full
//! redraw would leave it.
//!
//! Full redraws happen on the first frame, on request, after a resize, every
//! `full_redraw_interval` frames, and whenever the dirty list grows past the
//! point where redrawing everything is cheaper.

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use super::batch::{BatchGrouper, BatchStats, PlannedDraw, RenderItem};
use super::draw::{DrawList, DrawOp};
use super::footprint;
use super::grid::GridOverlay;
use crate::settings::Settings;
use crate::sim::{Bounds, EntityId, EntityStore, Region, Visual};

/// Where the renderer is in its per-frame cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderPhase {
    Idle,
    Collecting,
    Merging,
    Compositing,
    Flip,
}

/// Why a frame was redrawn in full
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RedrawReason {
    FirstFrame,
    Requested,
    Periodic,
    Saturated,
    Resized,
}

impl RedrawReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RedrawReason::FirstFrame => "first_frame",
            RedrawReason::Requested => "requested",
            RedrawReason::Periodic => "periodic",
            RedrawReason::Saturated => "saturated",
            RedrawReason::Resized => "resized",
        }
    }
}

/// Per-frame render statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct DirtyStats {
    /// Sprites considered this frame
    pub sprites: usize,
    /// Dirty rectangles collected before merging
    pub raw_regions: usize,
    /// Sweeps the merge step needed (0 when it was skipped)
    pub merge_passes: u32,
    /// Regions composited and presented
    pub regions: usize,
    /// Pixels covered by those regions
    pub dirty_area: u64,
    pub full_redraw: Option<RedrawReason>,
    /// Grouping of the sprites drawn this frame, each counted once. Draw ops
    /// are issued per region, so a sprite straddling two regions appears in
    /// two ops.
    pub batch: BatchStats,
}

/// Text panel drawn on top of everything else
#[derive(Debug, Clone, PartialEq)]
pub struct OverlayPanel {
    pub rect: Region,
    pub lines: Vec<String>,
}

/// What a sprite looked like when it was last drawn
#[derive(Debug, Clone, Copy, PartialEq)]
struct CachedSprite {
    bounds: Bounds,
    footprint: Region,
    visual: Visual,
}

/// Minimizes pixels redrawn per frame
#[derive(Debug)]
pub struct DirtyRectRenderer {
    grouper: BatchGrouper,
    padding: i32,
    merge: bool,
    full_redraw_interval: u64,
    area_ratio: f32,
    max_regions: usize,

    phase: RenderPhase,
    frame: Region,
    previous: HashMap<EntityId, CachedSprite>,
    previous_overlay: Option<Region>,
    grid: Option<GridOverlay>,
    previous_grid: Vec<Region>,
    pending: Option<RedrawReason>,
    frames_since_full: u64,
    dirty: Vec<Region>,
    stats: DirtyStats,
}

impl DirtyRectRenderer {
    pub fn new(settings: &Settings) -> Self {
        Self {
            grouper: BatchGrouper::new(settings.batch_min),
            padding: settings.dirty_padding.max(0),
            merge: settings.merge_dirty_regions,
            full_redraw_interval: settings.full_redraw_interval.max(1),
            area_ratio: settings.full_redraw_area_ratio,
            max_regions: settings.max_dirty_regions.max(1),
            phase: RenderPhase::Idle,
            frame: Region::default(),
            previous: HashMap::new(),
            previous_overlay: None,
            grid: None,
            previous_grid: Vec::new(),
            pending: Some(RedrawReason::FirstFrame),
            frames_since_full: 0,
            dirty: Vec::new(),
            stats: DirtyStats::default(),
        }
    }

    /// Redraw the whole frame next time (debug hotkey, lost surface)
    pub fn request_full_redraw(&mut self) {
        self.pending.get_or_insert(RedrawReason::Requested);
    }

    /// Broad-phase cells to shade on the next frames; `None` hides them
    pub fn set_grid_overlay(&mut self, grid: Option<GridOverlay>) {
        self.grid = grid;
    }

    pub fn grid_overlay(&self) -> Option<&GridOverlay> {
        self.grid.as_ref()
    }

    pub fn phase(&self) -> RenderPhase {
        self.phase
    }

    /// Statistics of the most recent frame
    pub fn stats(&self) -> DirtyStats {
        self.stats
    }

    /// Frame rectangle in screen pixels
    pub fn frame(&self) -> Region {
        self.frame
    }

    /// Build this frame's draw list
    ///
    /// `visible` are the ids to draw, `viewport` maps world to screen space
    /// (its size is the frame size) and `alpha` interpolates between the last
    /// two simulation substeps.
    pub fn render(
        &mut self,
        store: &EntityStore,
        visible: &[EntityId],
        viewport: &Bounds,
        alpha: f32,
        overlay: Option<&OverlayPanel>,
    ) -> DrawList {
        self.frames_since_full = self.frames_since_full.saturating_add(1);
        self.track_frame_size(viewport);

        let items = self.collect_items(store, visible, viewport, alpha);

        self.phase = RenderPhase::Collecting;
        let current = self.collect_dirty(&items, overlay);
        let raw_regions = self.dirty.len();

        self.phase = RenderPhase::Merging;
        let (reason, merge_passes) = self.merge_or_give_up();

        let regions = match reason {
            Some(_) if !self.frame.is_empty() => vec![self.frame],
            Some(_) => Vec::new(),
            None => std::mem::take(&mut self.dirty),
        };
        self.dirty.clear();

        self.phase = RenderPhase::Compositing;
        let mut list = DrawList::new(reason.is_some());
        for region in &regions {
            self.composite(&mut list, *region, &items, overlay);
        }
        let drawn: Vec<&RenderItem> = items
            .iter()
            .filter(|it| regions.iter().any(|r| it.footprint.intersects(r)))
            .collect();
        let (_, batch) = self.grouper.group(&drawn);

        self.phase = RenderPhase::Flip;
        for region in &regions {
            list.present_region(*region);
        }
        if let Some(reason) = reason {
            log::debug!("Full redraw ({})", reason.as_str());
            self.frames_since_full = 0;
        }
        self.previous = current;
        self.stats = DirtyStats {
            sprites: items.len(),
            raw_regions,
            merge_passes,
            regions: regions.len(),
            dirty_area: regions.iter().map(Region::area).sum(),
            full_redraw: reason,
            batch,
        };

        self.phase = RenderPhase::Idle;
        list
    }

    fn track_frame_size(&mut self, viewport: &Bounds) {
        let frame = Region::covering(&Bounds::new(0.0, 0.0, viewport.size.x, viewport.size.y));
        if frame != self.frame {
            if !self.frame.is_empty() {
                log::info!("Frame resized to {}x{}", frame.w, frame.h);
                self.pending.get_or_insert(RedrawReason::Resized);
            }
            self.frame = frame;
        }
    }

    /// Screen-space items in paint order
    fn collect_items(
        &self,
        store: &EntityStore,
        visible: &[EntityId],
        viewport: &Bounds,
        alpha: f32,
    ) -> Vec<RenderItem> {
        let offset = -viewport.pos;
        let mut items: Vec<RenderItem> = visible
            .iter()
            .filter_map(|&id| store.get(id))
            .filter(|e| e.alive)
            .map(|e| {
                let bounds = e.interpolated_bounds(alpha).translate(offset);
                RenderItem {
                    id: e.id,
                    layer: e.kind.layer(),
                    visual: e.visual,
                    bounds,
                    footprint: footprint(&bounds, &e.visual),
                }
            })
            .collect();
        items.sort_unstable_by_key(|it| it.paint_key());
        items
    }

    /// Fill `self.dirty` and return the cache for the next frame
    fn collect_dirty(
        &mut self,
        items: &[RenderItem],
        overlay: Option<&OverlayPanel>,
    ) -> HashMap<EntityId, CachedSprite> {
        let mut raw = Vec::new();
        let mut current = HashMap::with_capacity(items.len());

        for item in items {
            let cached = CachedSprite {
                bounds: item.bounds,
                footprint: item.footprint,
                visual: item.visual,
            };
            match self.previous.get(&item.id) {
                Some(prev) if *prev == cached => {}
                Some(prev) => raw.push(prev.footprint.union(&item.footprint).pad(self.padding)),
                None => raw.push(item.footprint.pad(self.padding)),
            }
            current.insert(item.id, cached);
        }
        for (id, prev) in &self.previous {
            if !current.contains_key(id) {
                raw.push(prev.footprint.pad(self.padding));
            }
        }

        let overlay_rect = overlay.map(|o| o.rect);
        if let Some(rect) = overlay_rect {
            raw.push(rect);
        }
        if let Some(prev) = self.previous_overlay {
            if overlay_rect != Some(prev) {
                raw.push(prev);
            }
        }
        self.previous_overlay = overlay_rect;

        // Grid cells are dirty while shown and once more after they empty
        let grid: HashSet<Region> = self
            .grid
            .iter()
            .flat_map(|g| g.cells.iter().map(|c| c.rect))
            .collect();
        raw.extend(grid.iter().copied());
        raw.extend(self.previous_grid.iter().filter(|r| !grid.contains(*r)).copied());
        self.previous_grid = grid.into_iter().collect();

        // Sprites inside the visibility margin legitimately poke past the frame
        let frame = self.frame;
        self.dirty.clear();
        self.dirty.extend(raw.iter().map(|r| r.clamp_to(&frame)).filter(|r| !r.is_empty()));
        debug_assert!(self.dirty.iter().all(|r| frame.contains(r)));

        current
    }

    /// Decide between a full redraw and the merged dirty list
    ///
    /// A list already past `max_dirty_regions` is never merged: the frame is
    /// redrawn in full anyway, and merging is the expensive part.
    fn merge_or_give_up(&mut self) -> (Option<RedrawReason>, u32) {
        if let Some(reason) = self.pending.take() {
            return (Some(reason), 0);
        }
        if self.frames_since_full >= self.full_redraw_interval {
            return (Some(RedrawReason::Periodic), 0);
        }
        if self.dirty.len() > self.max_regions {
            return (Some(RedrawReason::Saturated), 0);
        }

        let passes = if self.merge {
            merge_regions(&mut self.dirty)
        } else {
            0
        };
        self.dirty.sort_unstable_by_key(|r| (r.y, r.x, r.h, r.w));

        let area: u64 = self.dirty.iter().map(Region::area).sum();
        let limit = self.frame.area() as f64 * self.area_ratio as f64;
        if area as f64 > limit {
            return (Some(RedrawReason::Saturated), passes);
        }
        (None, passes)
    }

    /// Clear, redraw and overlay one region
    fn composite(
        &self,
        list: &mut DrawList,
        region: Region,
        items: &[RenderItem],
        overlay: Option<&OverlayPanel>,
    ) {
        list.push(DrawOp::Clear { region });

        let hits: Vec<&RenderItem> = items.iter().filter(|it| it.footprint.intersects(&region)).collect();
        let (plan, _) = self.grouper.group(&hits);
        for draw in plan {
            list.push(match draw {
                PlannedDraw::Batch(batch) => DrawOp::Batch {
                    image: batch.image,
                    instances: batch.instances,
                    clip: region,
                },
                PlannedDraw::Single(sprite) => DrawOp::Sprite { sprite, clip: region },
            });
        }

        if let Some(grid) = &self.grid {
            let cells = grid.within(&region);
            if !cells.is_empty() {
                list.push(DrawOp::Grid { cells, clip: region });
            }
        }

        if let Some(panel) = overlay {
            if panel.rect.intersects(&region) {
                list.push(DrawOp::Overlay {
                    lines: panel.lines.clone(),
                    rect: panel.rect,
                    clip: region,
                });
            }
        }
    }
}

/// Coalesce overlapping regions until none overlap; returns the sweeps made
///
/// Each sweep walks the regions by left edge, testing only against merged
/// regions that still reach past the sweep line. A union can grow leftwards
/// over regions the sweep already retired, so sweeps repeat until one merges
/// nothing. A clean sweep proves no two regions overlap.
fn merge_regions(regions: &mut Vec<Region>) -> u32 {
    let mut passes = 0;
    loop {
        passes += 1;
        regions.sort_unstable_by_key(|r| (r.x, r.y));

        let mut merged: Vec<Option<Region>> = Vec::with_capacity(regions.len());
        let mut active: Vec<usize> = Vec::new();
        let mut changed = false;
        for &region in regions.iter() {
            active.retain(|&k| merged[k].is_some_and(|m| m.right() > region.x));

            let mut current = region;
            let mut k = 0;
            while k < active.len() {
                let slot = active[k];
                match merged[slot] {
                    Some(m) if m.intersects(&current) => {
                        current = current.union(&m);
                        merged[slot] = None;
                        active.swap_remove(k);
                        changed = true;
                        // Grown; earlier candidates may overlap now
                        k = 0;
                    }
                    _ => k += 1,
                }
            }
            active.push(merged.len());
            merged.push(Some(current));
        }

        regions.clear();
        regions.extend(merged.into_iter().flatten());
        if !changed {
            return passes;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::canvas::SoftwareCanvas;
    use crate::renderer::grid::GridCell;
    use crate::sim::{EntityDesc, EntityKind, ImageHandle};
    use glam::Vec2;
    use proptest::prelude::*;
    use rand::{Rng, SeedableRng};
    use rand_pcg::Pcg32;

    const VIEWPORT: Bounds = Bounds {
        pos: Vec2::ZERO,
        size: Vec2::new(800.0, 600.0),
    };

    fn spawn_box(store: &mut EntityStore, x: f32, y: f32) -> EntityId {
        store
            .spawn(EntityDesc::new(
                EntityKind::Enemy,
                Vec2::new(x, y),
                Vec2::new(20.0, 20.0),
                Visual::opaque(ImageHandle(1)),
            ))
            .unwrap()
    }

    fn move_to(store: &mut EntityStore, id: EntityId, x: f32, y: f32) {
        let e = store.get_mut(id).unwrap();
        e.prev_pos = Vec2::new(x, y);
        e.pos = Vec2::new(x, y);
    }

    fn visible(store: &EntityStore) -> Vec<EntityId> {
        store.alive().map(|e| e.id).collect()
    }

    #[test]
    fn test_first_frame_is_full() {
        let mut store = EntityStore::new();
        spawn_box(&mut store, 100.0, 100.0);
        let mut renderer = DirtyRectRenderer::new(&Settings::default());
        let list = renderer.render(&store, &visible(&store), &VIEWPORT, 1.0, None);

        assert!(list.is_full_redraw());
        assert_eq!(list.present_regions(), &[Region::new(0, 0, 800, 600)]);
        assert_eq!(renderer.stats().full_redraw, Some(RedrawReason::FirstFrame));
        assert_eq!(renderer.phase(), RenderPhase::Idle);
    }

    #[test]
    fn test_move_is_covered_with_padding() {
        let mut store = EntityStore::new();
        let id = spawn_box(&mut store, 100.0, 100.0);
        let mut renderer = DirtyRectRenderer::new(&Settings::default());
        renderer.render(&store, &visible(&store), &VIEWPORT, 1.0, None);

        move_to(&mut store, id, 103.0, 100.0);
        let list = renderer.render(&store, &visible(&store), &VIEWPORT, 1.0, None);

        assert!(!list.is_full_redraw());
        assert_eq!(list.present_regions().len(), 1);
        let region = list.present_regions()[0];
        assert!(region.contains(&Region::new(96, 96, 31, 28)), "got {region:?}");
        assert!(region.x <= 96 && region.right() >= 127);
        assert!(region.y <= 96 && region.bottom() >= 124);
        assert!(matches!(list.ops()[0], DrawOp::Clear { .. }));
        assert_eq!(list.draw_calls(), 1);
    }

    #[test]
    fn test_unchanged_frame_has_no_dirty_regions() {
        let mut store = EntityStore::new();
        for i in 0..10 {
            spawn_box(&mut store, 30.0 * i as f32, 50.0);
        }
        let mut renderer = DirtyRectRenderer::new(&Settings::default());
        renderer.render(&store, &visible(&store), &VIEWPORT, 1.0, None);

        for _ in 0..2 {
            let list = renderer.render(&store, &visible(&store), &VIEWPORT, 1.0, None);
            assert!(list.is_empty());
            assert!(list.present_regions().is_empty());
            assert_eq!(renderer.stats().regions, 0);
        }
    }

    #[test]
    fn test_new_sprite_dirties_only_current_rect() {
        let mut store = EntityStore::new();
        let mut renderer = DirtyRectRenderer::new(&Settings::default());
        renderer.render(&store, &[], &VIEWPORT, 1.0, None);

        spawn_box(&mut store, 200.0, 200.0);
        let list = renderer.render(&store, &visible(&store), &VIEWPORT, 1.0, None);
        assert_eq!(list.present_regions(), &[Region::new(196, 196, 28, 28)]);
    }

    #[test]
    fn test_destroyed_sprite_dirties_only_previous_rect() {
        let mut store = EntityStore::new();
        let id = spawn_box(&mut store, 200.0, 200.0);
        let mut renderer = DirtyRectRenderer::new(&Settings::default());
        renderer.render(&store, &visible(&store), &VIEWPORT, 1.0, None);

        store.kill(id);
        store.sweep_dead();
        let list = renderer.render(&store, &visible(&store), &VIEWPORT, 1.0, None);
        assert_eq!(list.present_regions(), &[Region::new(196, 196, 28, 28)]);
        // Only the background restore, nothing left to draw there
        assert_eq!(list.ops().len(), 1);
    }

    #[test]
    fn test_periodic_and_requested_full_redraws() {
        let settings = Settings {
            full_redraw_interval: 3,
            ..Settings::default()
        };
        let store = EntityStore::new();
        let mut renderer = DirtyRectRenderer::new(&settings);

        let reasons: Vec<_> = (0..7)
            .map(|_| {
                renderer.render(&store, &[], &VIEWPORT, 1.0, None);
                renderer.stats().full_redraw
            })
            .collect();
        assert_eq!(
            reasons,
            vec![
                Some(RedrawReason::FirstFrame),
                None,
                None,
                Some(RedrawReason::Periodic),
                None,
                None,
                Some(RedrawReason::Periodic),
            ]
        );

        renderer.request_full_redraw();
        let list = renderer.render(&store, &[], &VIEWPORT, 1.0, None);
        assert!(list.is_full_redraw());
        assert_eq!(renderer.stats().full_redraw, Some(RedrawReason::Requested));
    }

    #[test]
    fn test_resize_forces_full_redraw() {
        let store = EntityStore::new();
        let mut renderer = DirtyRectRenderer::new(&Settings::default());
        renderer.render(&store, &[], &VIEWPORT, 1.0, None);
        let wide = Bounds::new(0.0, 0.0, 1024.0, 600.0);
        let list = renderer.render(&store, &[], &wide, 1.0, None);
        assert_eq!(renderer.stats().full_redraw, Some(RedrawReason::Resized));
        assert_eq!(list.present_regions(), &[Region::new(0, 0, 1024, 600)]);
    }

    #[test]
    fn test_saturated_dirty_list_falls_back() {
        let settings = Settings {
            max_dirty_regions: 4,
            ..Settings::default()
        };
        let mut store = EntityStore::new();
        let mut renderer = DirtyRectRenderer::new(&settings);
        renderer.render(&store, &[], &VIEWPORT, 1.0, None);

        // Ten far-apart sprites cannot merge into four regions
        for i in 0..10 {
            spawn_box(&mut store, 70.0 * i as f32, 300.0);
        }
        let list = renderer.render(&store, &visible(&store), &VIEWPORT, 1.0, None);
        assert!(list.is_full_redraw());
        assert_eq!(renderer.stats().full_redraw, Some(RedrawReason::Saturated));
    }

    #[test]
    fn test_thousands_of_dirty_rects_skip_the_merge() {
        let viewport = Bounds::new(0.0, 0.0, 1280.0, 960.0);
        let mut store = EntityStore::new();
        let mut ids = Vec::new();
        for row in 0..50 {
            for col in 0..60 {
                let desc = EntityDesc::new(
                    EntityKind::Bullet,
                    Vec2::new(col as f32 * 20.0 + 4.0, row as f32 * 18.0 + 4.0),
                    Vec2::new(4.0, 4.0),
                    Visual::opaque(ImageHandle(2)),
                );
                ids.push(store.spawn(desc).unwrap());
            }
        }
        let mut renderer = DirtyRectRenderer::new(&Settings::default());
        renderer.render(&store, &visible(&store), &viewport, 1.0, None);

        for &id in &ids {
            let e = store.get_mut(id).unwrap();
            e.pos.x += 1.0;
            e.prev_pos = e.pos;
        }
        let list = renderer.render(&store, &visible(&store), &viewport, 1.0, None);

        let stats = renderer.stats();
        assert_eq!(stats.raw_regions, 3000);
        assert_eq!(stats.merge_passes, 0);
        assert_eq!(stats.full_redraw, Some(RedrawReason::Saturated));
        assert_eq!(list.present_regions(), &[Region::new(0, 0, 1280, 960)]);
        assert_eq!(stats.batch.batches, 1);
        assert_eq!(stats.batch.batched_sprites, 3000);
    }

    #[test]
    fn test_merge_sweep_handles_many_disjoint_rects() {
        let mut regions: Vec<Region> = (0..4000)
            .map(|i| Region::new((i % 80) * 16, (i / 80) * 16, 12, 12))
            .collect();
        assert_eq!(merge_regions(&mut regions), 1);
        assert_eq!(regions.len(), 4000);
    }

    #[test]
    fn test_merge_collapses_a_chain() {
        // Each region only touches its neighbours; the union spans them all
        let mut regions: Vec<Region> = (0..500).rev().map(|i| Region::new(i * 5, i * 5, 8, 8)).collect();
        merge_regions(&mut regions);
        assert_eq!(regions, vec![Region::new(0, 0, 2503, 2503)]);
    }

    #[test]
    fn test_straddling_sprite_is_counted_once() {
        let mut store = EntityStore::new();
        let left = spawn_box(&mut store, 110.0, 295.0);
        let right = spawn_box(&mut store, 370.0, 295.0);
        store
            .spawn(EntityDesc::new(
                EntityKind::PowerUp,
                Vec2::new(100.0, 300.0),
                Vec2::new(300.0, 10.0),
                Visual::opaque(ImageHandle(9)),
            ))
            .unwrap();
        let mut renderer = DirtyRectRenderer::new(&Settings::default());
        renderer.render(&store, &visible(&store), &VIEWPORT, 1.0, None);

        move_to(&mut store, left, 113.0, 295.0);
        move_to(&mut store, right, 373.0, 295.0);
        let list = renderer.render(&store, &visible(&store), &VIEWPORT, 1.0, None);

        assert_eq!(list.present_regions().len(), 2);
        // The long power-up is drawn into both regions...
        assert_eq!(list.draw_calls(), 4);
        // ...but it is one sprite
        let batch = renderer.stats().batch;
        assert_eq!(batch.individual_sprites, 3);
        assert_eq!(batch.batched_sprites, 0);
    }

    #[test]
    fn test_grid_cells_are_dirty_while_shown_and_once_after() {
        let store = EntityStore::new();
        let mut renderer = DirtyRectRenderer::new(&Settings::default());
        renderer.render(&store, &[], &VIEWPORT, 1.0, None);

        let cell = GridCell {
            rect: Region::new(64, 64, 64, 64),
            occupancy: 2,
        };
        renderer.set_grid_overlay(Some(GridOverlay { cells: vec![cell] }));
        let list = renderer.render(&store, &[], &VIEWPORT, 1.0, None);
        assert_eq!(list.present_regions(), &[cell.rect]);
        assert!(matches!(list.ops().last(), Some(DrawOp::Grid { cells, .. }) if cells == &vec![cell]));

        // Unchanged cells stay dirty: their shading follows occupancy
        let list = renderer.render(&store, &[], &VIEWPORT, 1.0, None);
        assert_eq!(list.present_regions(), &[cell.rect]);

        renderer.set_grid_overlay(None);
        let list = renderer.render(&store, &[], &VIEWPORT, 1.0, None);
        assert_eq!(list.present_regions(), &[cell.rect]);
        assert!(!list.ops().iter().any(|op| matches!(op, DrawOp::Grid { .. })));

        let list = renderer.render(&store, &[], &VIEWPORT, 1.0, None);
        assert!(list.is_empty());
    }

    #[test]
    fn test_offscreen_rects_are_clamped() {
        let mut store = EntityStore::new();
        let mut renderer = DirtyRectRenderer::new(&Settings::default());
        renderer.render(&store, &[], &VIEWPORT, 1.0, None);

        spawn_box(&mut store, -10.0, 590.0);
        let list = renderer.render(&store, &visible(&store), &VIEWPORT, 1.0, None);
        assert_eq!(list.present_regions(), &[Region::new(0, 586, 14, 14)]);
    }

    #[test]
    fn test_overlay_is_dirty_while_shown_and_once_after() {
        let store = EntityStore::new();
        let mut renderer = DirtyRectRenderer::new(&Settings::default());
        let panel = OverlayPanel {
            rect: Region::new(5, 5, 200, 115),
            lines: vec!["FPS: 60.0".to_string()],
        };
        renderer.render(&store, &[], &VIEWPORT, 1.0, Some(&panel));

        let list = renderer.render(&store, &[], &VIEWPORT, 1.0, Some(&panel));
        assert_eq!(list.present_regions(), &[panel.rect]);
        assert!(matches!(list.ops().last(), Some(DrawOp::Overlay { .. })));

        let list = renderer.render(&store, &[], &VIEWPORT, 1.0, None);
        assert_eq!(list.present_regions(), &[panel.rect]);
        assert!(!list.ops().iter().any(|op| matches!(op, DrawOp::Overlay { .. })));

        let list = renderer.render(&store, &[], &VIEWPORT, 1.0, None);
        assert!(list.is_empty());
    }

    #[test]
    fn test_merge_leaves_no_overlaps() {
        let mut regions = vec![
            Region::new(0, 0, 10, 10),
            Region::new(50, 50, 10, 10),
            Region::new(5, 5, 10, 10),
            Region::new(12, 12, 40, 40),
            Region::new(200, 0, 5, 5),
        ];
        merge_regions(&mut regions);
        assert_eq!(regions.len(), 2);
        for (i, a) in regions.iter().enumerate() {
            for b in &regions[i + 1..] {
                assert!(!a.intersects(b));
            }
        }
        assert!(regions.contains(&Region::new(0, 0, 60, 60)));
    }

    #[test]
    fn test_incremental_matches_full_redraw() {
        let incremental_settings = Settings {
            full_redraw_interval: 10_000,
            full_redraw_area_ratio: 1.0,
            max_dirty_regions: 10_000,
            ..Settings::default()
        };
        let full_settings = Settings {
            full_redraw_interval: 1,
            ..Settings::default()
        };
        let viewport = Bounds::new(0.0, 0.0, 320.0, 240.0);
        let mut incremental = DirtyRectRenderer::new(&incremental_settings);
        let mut full = DirtyRectRenderer::new(&full_settings);
        let mut canvas_inc = SoftwareCanvas::new(320, 240);
        let mut canvas_full = SoftwareCanvas::new(320, 240);
        for (image, color) in [(1, 0xFFFF_4040), (2, 0xFF40_FF40), (3, 0xFF40_40FF), (4, 0xFFFF_FF00)] {
            canvas_inc.set_image_color(ImageHandle(image), color);
            canvas_full.set_image_color(ImageHandle(image), color);
        }

        let mut rng = Pcg32::seed_from_u64(42);
        let mut store = EntityStore::new();
        let random_visual = |rng: &mut Pcg32| {
            let image = ImageHandle(rng.random_range(1..=4));
            match rng.random_range(0..6) {
                0 => Visual::rotated(image, rng.random_range(-3.0..3.0)),
                1 => Visual::translucent(image, rng.random_range(40..220)),
                _ => Visual::opaque(image),
            }
        };
        let kinds = [EntityKind::Bullet, EntityKind::Enemy, EntityKind::Effect, EntityKind::Player];
        let spawn_random = |store: &mut EntityStore, rng: &mut Pcg32| {
            let kind = kinds[rng.random_range(0..kinds.len())];
            let pos = Vec2::new(rng.random_range(-20.0..330.0), rng.random_range(-20.0..250.0));
            let size = Vec2::new(rng.random_range(3.0..30.0), rng.random_range(3.0..30.0));
            let visual = random_visual(rng);
            store.spawn(EntityDesc::new(kind, pos, size, visual)).unwrap();
        };
        for _ in 0..60 {
            spawn_random(&mut store, &mut rng);
        }

        let mut incremental_frames = 0;
        for frame in 0..80 {
            if frame > 0 {
                let ids = visible(&store);
                for id in ids {
                    match rng.random_range(0..10) {
                        0..=3 => {
                            let e = store.get_mut(id).unwrap();
                            e.prev_pos = e.pos;
                            e.pos += Vec2::new(rng.random_range(-6.0..6.0), rng.random_range(-6.0..6.0));
                        }
                        4 => {
                            let visual = random_visual(&mut rng);
                            store.get_mut(id).unwrap().visual = visual;
                        }
                        5 if rng.random_bool(0.2) => {
                            store.kill(id);
                        }
                        _ => {
                            let e = store.get_mut(id).unwrap();
                            e.prev_pos = e.pos;
                        }
                    }
                }
                store.sweep_dead();
                for _ in 0..rng.random_range(0..3) {
                    spawn_random(&mut store, &mut rng);
                }
            }

            let alpha = rng.random_range(0.0..=1.0);
            let panel = OverlayPanel {
                rect: Region::new(5, 5, 100, 40),
                lines: vec![format!("frame {frame}")],
            };
            let overlay = ((frame / 10) % 2 == 1).then_some(&panel);
            let ids = visible(&store);

            let list = incremental.render(&store, &ids, &viewport, alpha, overlay);
            if !list.is_full_redraw() {
                incremental_frames += 1;
            }
            list.execute(&mut canvas_inc);
            full.render(&store, &ids, &viewport, alpha, overlay).execute(&mut canvas_full);

            assert!(
                canvas_inc.pixels() == canvas_full.pixels(),
                "frame {frame} differs from a full redraw"
            );
        }
        assert_eq!(incremental_frames, 79);
    }

    proptest! {
        #[test]
        fn prop_move_leaves_no_trail(
            x in 0.0f32..760.0,
            y in 0.0f32..560.0,
            dx in -30.0f32..30.0,
            dy in -30.0f32..30.0,
            padding in 0i32..8,
        ) {
            prop_assume!(dx != 0.0 || dy != 0.0);
            let settings = Settings { dirty_padding: padding, ..Settings::default() };
            let mut store = EntityStore::new();
            let id = spawn_box(&mut store, x, y);
            let mut renderer = DirtyRectRenderer::new(&settings);
            renderer.render(&store, &visible(&store), &VIEWPORT, 1.0, None);

            let before = Region::covering(&store.get(id).unwrap().bounds());
            move_to(&mut store, id, x + dx, y + dy);
            let after = Region::covering(&store.get(id).unwrap().bounds());
            let list = renderer.render(&store, &visible(&store), &VIEWPORT, 1.0, None);

            let frame = Region::new(0, 0, 800, 600);
            for rect in [before.clamp_to(&frame), after.clamp_to(&frame)] {
                prop_assert!(list.present_regions().iter().any(|r| r.contains(&rect)));
            }
        }
    }
}
