//! Simulation-side stages of the frame pipeline
//!
//! Everything here is pure CPU work on the entity store:
//! - Stable iteration order (by entity ID)
//! - No rendering or platform dependencies
//! - Stages hold entity ids, never copies of entities

pub mod collision;
pub mod entity;
pub mod rect;
pub mod spatial;
pub mod tick;
pub mod visibility;

pub use collision::{CollisionPair, CollisionResolver, CollisionStats};
pub use entity::{Entity, EntityDesc, EntityId, EntityKind, EntityStore, ImageHandle, Visual, VisualFlags};
pub use rect::{Bounds, Region};
pub use spatial::{CellKey, SpatialIndex};
pub use tick::{integrate, snapshot_previous};
pub use visibility::VisibilityTracker;
