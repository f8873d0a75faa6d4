//! Viewport culling
//!
//! Decides which entities are worth drawing this frame, and which have
//! drifted so far out of the world that they should be despawned.

use super::entity::{EntityId, EntityKind, EntityStore};
use super::rect::Bounds;

/// Tracks the set of entities intersecting the viewport
#[derive(Debug, Clone)]
pub struct VisibilityTracker {
    /// Viewport grows by this much before testing, to avoid pop-in at the edges
    margin: f32,
    /// Distance outside the viewport beyond which entities are despawned
    despawn_margin: f32,
    visible: Vec<EntityId>,
}

impl VisibilityTracker {
    pub fn new(margin: f32, despawn_margin: f32) -> Self {
        Self {
            margin,
            despawn_margin,
            visible: Vec::new(),
        }
    }

    /// True if `bounds` intersects the viewport grown by the margin
    #[inline]
    pub fn is_visible(&self, bounds: &Bounds, viewport: &Bounds) -> bool {
        bounds.intersects(&viewport.expand(self.margin))
    }

    /// True if `bounds` has left the world (viewport plus despawn margin)
    #[inline]
    pub fn is_out_of_world(&self, bounds: &Bounds, viewport: &Bounds) -> bool {
        !bounds.intersects(&viewport.expand(self.despawn_margin))
    }

    /// Kill non-player entities that have left the world; returns how many
    pub fn despawn_out_of_world(&self, store: &mut EntityStore, viewport: &Bounds) -> usize {
        let mut despawned = 0;
        for entity in store.iter_mut() {
            if entity.alive
                && entity.kind != EntityKind::Player
                && self.is_out_of_world(&entity.bounds(), viewport)
            {
                entity.alive = false;
                despawned += 1;
            }
        }
        despawned
    }

    /// Recompute the visible set using interpolated positions
    pub fn refresh(&mut self, store: &EntityStore, viewport: &Bounds, alpha: f32) -> &[EntityId] {
        self.visible.clear();
        let grown = viewport.expand(self.margin);
        self.visible.extend(
            store
                .alive()
                .filter(|e| e.interpolated_bounds(alpha).intersects(&grown))
                .map(|e| e.id),
        );
        &self.visible
    }

    /// Visible ids from the last refresh, in id order
    pub fn visible(&self) -> &[EntityId] {
        &self.visible
    }

    pub fn is_id_visible(&self, id: EntityId) -> bool {
        self.visible.binary_search(&id).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::entity::{EntityDesc, ImageHandle, Visual};
    use glam::Vec2;

    fn spawn(store: &mut EntityStore, kind: EntityKind, x: f32, y: f32) -> EntityId {
        store
            .spawn(EntityDesc::new(kind, Vec2::new(x, y), Vec2::new(10.0, 10.0), Visual::opaque(ImageHandle(1))))
            .unwrap()
    }

    #[test]
    fn test_margin_prevents_pop_in() {
        let tracker = VisibilityTracker::new(16.0, 128.0);
        let viewport = Bounds::new(0.0, 0.0, 800.0, 600.0);
        assert!(tracker.is_visible(&Bounds::new(100.0, 100.0, 10.0, 10.0), &viewport));
        // Just off the left edge but inside the margin
        assert!(tracker.is_visible(&Bounds::new(-20.0, 100.0, 10.0, 10.0), &viewport));
        assert!(!tracker.is_visible(&Bounds::new(-40.0, 100.0, 10.0, 10.0), &viewport));
    }

    #[test]
    fn test_refresh_lists_visible_in_id_order() {
        let mut store = EntityStore::new();
        let a = spawn(&mut store, EntityKind::Enemy, 10.0, 10.0);
        let _off = spawn(&mut store, EntityKind::Enemy, 5000.0, 10.0);
        let c = spawn(&mut store, EntityKind::Bullet, 700.0, 500.0);
        let mut tracker = VisibilityTracker::new(16.0, 128.0);
        let viewport = Bounds::new(0.0, 0.0, 800.0, 600.0);

        assert_eq!(tracker.refresh(&store, &viewport, 1.0), &[a, c]);
        assert!(tracker.is_id_visible(c));
    }

    #[test]
    fn test_despawn_spares_player() {
        let mut store = EntityStore::new();
        let player = spawn(&mut store, EntityKind::Player, -1000.0, 0.0);
        let bullet = spawn(&mut store, EntityKind::Bullet, 100.0, -500.0);
        let kept = spawn(&mut store, EntityKind::Bullet, 100.0, -100.0);
        let tracker = VisibilityTracker::new(16.0, 128.0);
        let viewport = Bounds::new(0.0, 0.0, 800.0, 600.0);

        assert_eq!(tracker.despawn_out_of_world(&mut store, &viewport), 1);
        assert!(store.get(player).unwrap().alive);
        assert!(!store.get(bullet).unwrap().alive);
        assert!(store.get(kept).unwrap().alive);
    }
}
