//! Fixed timestep motion step
//!
//! One physics substep: remember where everything was, then move it by
//! velocity * dt. Gameplay behaviour (AI, spawning, timers) runs before this
//! through the frame loop's gameplay hook.

use super::entity::EntityStore;

/// Record current positions as the interpolation start of this substep
pub fn snapshot_previous(store: &mut EntityStore) {
    for entity in store.iter_mut() {
        entity.prev_pos = entity.pos;
    }
}

/// Advance live entities by their velocity; returns how many moved
pub fn integrate(store: &mut EntityStore, dt: f32) -> usize {
    let mut moved = 0;
    for entity in store.iter_mut().filter(|e| e.alive) {
        if entity.vel.x != 0.0 || entity.vel.y != 0.0 {
            entity.pos += entity.vel * dt;
            moved += 1;
        }
    }
    moved
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::SIM_DT;
    use crate::sim::entity::{EntityDesc, EntityKind, ImageHandle, Visual};
    use glam::Vec2;

    #[test]
    fn test_integrate_scales_by_dt() {
        let mut store = EntityStore::new();
        let id = store
            .spawn(
                EntityDesc::new(
                    EntityKind::Bullet,
                    Vec2::new(100.0, 500.0),
                    Vec2::new(4.0, 10.0),
                    Visual::opaque(ImageHandle(1)),
                )
                .with_vel(Vec2::new(0.0, -480.0)),
            )
            .unwrap();

        snapshot_previous(&mut store);
        assert_eq!(integrate(&mut store, SIM_DT), 1);
        let e = store.get(id).unwrap();
        assert_eq!(e.prev_pos, Vec2::new(100.0, 500.0));
        assert!((e.pos.y - 496.0).abs() < 1e-4);

        // Halfway between substeps
        let mid = e.interpolated_bounds(0.5);
        assert!((mid.pos.y - 498.0).abs() < 1e-4);
    }

    #[test]
    fn test_resting_and_dead_entities_do_not_move() {
        let mut store = EntityStore::new();
        let still = store
            .spawn(EntityDesc::new(
                EntityKind::Enemy,
                Vec2::new(10.0, 10.0),
                Vec2::new(20.0, 20.0),
                Visual::opaque(ImageHandle(2)),
            ))
            .unwrap();
        let dead = store
            .spawn(
                EntityDesc::new(
                    EntityKind::Enemy,
                    Vec2::new(50.0, 10.0),
                    Vec2::new(20.0, 20.0),
                    Visual::opaque(ImageHandle(2)),
                )
                .with_vel(Vec2::new(60.0, 0.0)),
            )
            .unwrap();
        store.kill(dead);

        assert_eq!(integrate(&mut store, SIM_DT), 0);
        assert_eq!(store.get(still).unwrap().pos, Vec2::new(10.0, 10.0));
        assert_eq!(store.get(dead).unwrap().pos, Vec2::new(50.0, 10.0));
    }
}
