//! Entity records and the contiguous entity store
//!
//! Entities are plain data. The store keeps them in one `Vec` sorted by id
//! (ids only ever increase), so iteration order is stable and lookups are a
//! binary search. Other stages hold ids, never copies.

use glam::Vec2;
use serde::{Deserialize, Serialize};

use super::rect::Bounds;
use crate::error::{CoreError, Result};
use crate::lerp;

/// Unique entity identifier, never reused within a store
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityId(pub u32);

/// Opaque handle to an image owned by the presentation layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ImageHandle(pub u32);

/// Logical group tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    Player,
    Enemy,
    Bullet,
    EnemyBullet,
    PowerUp,
    /// Explosions and other purely visual effects
    Effect,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Player => "player",
            EntityKind::Enemy => "enemy",
            EntityKind::Bullet => "bullet",
            EntityKind::EnemyBullet => "enemy_bullet",
            EntityKind::PowerUp => "powerup",
            EntityKind::Effect => "effect",
        }
    }

    /// Back-to-front draw layer (0 is drawn first, right above the background)
    pub fn layer(&self) -> u8 {
        match self {
            EntityKind::Bullet => 0,
            EntityKind::EnemyBullet => 1,
            EntityKind::Enemy => 2,
            EntityKind::Player => 3,
            EntityKind::PowerUp => 4,
            EntityKind::Effect => 5,
        }
    }

    /// Whether a pair of these kinds is worth an exact collision test
    pub fn interacts_with(&self, other: EntityKind) -> bool {
        use EntityKind::*;
        matches!(
            (*self, other),
            (Player, Enemy)
                | (Enemy, Player)
                | (Player, EnemyBullet)
                | (EnemyBullet, Player)
                | (Player, PowerUp)
                | (PowerUp, Player)
                | (Bullet, Enemy)
                | (Enemy, Bullet)
        )
    }
}

/// Per-instance draw parameters that rule out batching
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct VisualFlags(u8);

impl VisualFlags {
    pub const NONE: Self = Self(0);
    pub const ROTATED: Self = Self(1 << 0);
    pub const TRANSLUCENT: Self = Self(1 << 1);

    #[inline]
    pub fn contains(&self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    #[inline]
    pub fn intersects(&self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    #[inline]
    pub fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }
}

/// What an entity looks like
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Visual {
    pub image: ImageHandle,
    pub flags: VisualFlags,
    /// Rotation in radians (only honoured with `VisualFlags::ROTATED`)
    pub rotation: f32,
    /// Opacity 0-255 (only honoured with `VisualFlags::TRANSLUCENT`)
    pub alpha: u8,
}

impl Visual {
    pub fn opaque(image: ImageHandle) -> Self {
        Self {
            image,
            flags: VisualFlags::NONE,
            rotation: 0.0,
            alpha: 255,
        }
    }

    pub fn rotated(image: ImageHandle, rotation: f32) -> Self {
        Self {
            flags: VisualFlags::ROTATED,
            rotation,
            ..Self::opaque(image)
        }
    }

    pub fn translucent(image: ImageHandle, alpha: u8) -> Self {
        Self {
            flags: VisualFlags::TRANSLUCENT,
            alpha,
            ..Self::opaque(image)
        }
    }

    /// Shares a single batch draw with other instances of the same image
    #[inline]
    pub fn batchable(&self) -> bool {
        !self
            .flags
            .intersects(VisualFlags::ROTATED.union(VisualFlags::TRANSLUCENT))
    }
}

/// Spawn parameters
#[derive(Debug, Clone)]
pub struct EntityDesc {
    pub kind: EntityKind,
    /// Top-left corner in world space
    pub pos: Vec2,
    pub size: Vec2,
    pub vel: Vec2,
    /// Collision radius; half the smaller side when `None`
    pub radius: Option<f32>,
    pub visual: Visual,
}

impl EntityDesc {
    pub fn new(kind: EntityKind, pos: Vec2, size: Vec2, visual: Visual) -> Self {
        Self {
            kind,
            pos,
            size,
            vel: Vec2::ZERO,
            radius: None,
            visual,
        }
    }

    pub fn with_vel(mut self, vel: Vec2) -> Self {
        self.vel = vel;
        self
    }

    pub fn with_radius(mut self, radius: f32) -> Self {
        self.radius = Some(radius);
        self
    }
}

/// A game object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: EntityId,
    pub kind: EntityKind,
    /// Top-left corner in world space
    pub pos: Vec2,
    /// Position before the most recent physics substep (for interpolation)
    pub prev_pos: Vec2,
    pub vel: Vec2,
    pub size: Vec2,
    pub radius: f32,
    pub visual: Visual,
    pub alive: bool,
}

impl Entity {
    #[inline]
    pub fn bounds(&self) -> Bounds {
        Bounds {
            pos: self.pos,
            size: self.size,
        }
    }

    #[inline]
    pub fn center(&self) -> Vec2 {
        self.pos + self.size * 0.5
    }

    /// Bounds at `alpha` between the previous and current substep
    pub fn interpolated_bounds(&self, alpha: f32) -> Bounds {
        Bounds {
            pos: lerp(self.prev_pos, self.pos, alpha),
            size: self.size,
        }
    }

    /// Bounding rectangle grown to also contain the collision circle
    ///
    /// Indexing this extent guarantees two overlapping circles share a cell,
    /// even when an explicit radius pokes outside the sprite rectangle.
    pub fn broad_phase_bounds(&self) -> Bounds {
        let circle = Bounds::from_center(self.center(), Vec2::splat(self.radius));
        self.bounds().union(&circle)
    }

    /// Exact test: `distance(center1, center2) < radius1 + radius2`
    #[inline]
    pub fn circles_overlap(&self, other: &Entity) -> bool {
        let reach = self.radius + other.radius;
        self.center().distance_squared(other.center()) < reach * reach
    }

    /// Reject extents and motion that would corrupt the broad phase
    pub(crate) fn validate(&self) -> Result<()> {
        if !self.pos.is_finite() || !self.vel.is_finite() {
            return Err(CoreError::entity(format!(
                "{} has non-finite position or velocity",
                self.kind.as_str()
            )));
        }
        if !self.size.is_finite() || self.size.x <= 0.0 || self.size.y <= 0.0 {
            return Err(CoreError::entity(format!(
                "{} has non-positive size {:?}",
                self.kind.as_str(),
                self.size
            )));
        }
        if !self.radius.is_finite() || self.radius < 0.0 {
            return Err(CoreError::entity(format!(
                "{} has invalid radius {}",
                self.kind.as_str(),
                self.radius
            )));
        }
        Ok(())
    }
}

/// All live entities, sorted by id
#[derive(Debug, Clone, Default)]
pub struct EntityStore {
    entities: Vec<Entity>,
    next_id: u32,
}

impl EntityStore {
    pub fn new() -> Self {
        Self {
            entities: Vec::new(),
            next_id: 1,
        }
    }

    /// Validate and add an entity, returning its id
    pub fn spawn(&mut self, desc: EntityDesc) -> Result<EntityId> {
        let radius = desc.radius.unwrap_or(desc.size.x.min(desc.size.y) * 0.5);
        let mut entity = Entity {
            id: EntityId(0),
            kind: desc.kind,
            pos: desc.pos,
            prev_pos: desc.pos,
            vel: desc.vel,
            size: desc.size,
            radius,
            visual: desc.visual,
            alive: true,
        };
        entity.validate()?;

        let id = self.next_entity_id();
        entity.id = id;
        self.entities.push(entity);
        Ok(id)
    }

    fn next_entity_id(&mut self) -> EntityId {
        // Default-constructed stores start at 0; keep 0 unused
        self.next_id = self.next_id.max(1);
        let id = EntityId(self.next_id);
        self.next_id += 1;
        id
    }

    #[inline]
    fn index_of(&self, id: EntityId) -> Option<usize> {
        self.entities.binary_search_by_key(&id, |e| e.id).ok()
    }

    pub fn get(&self, id: EntityId) -> Option<&Entity> {
        self.index_of(id).map(|i| &self.entities[i])
    }

    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        self.index_of(id).map(move |i| &mut self.entities[i])
    }

    /// Mark an entity dead; it is removed at the next sweep
    pub fn kill(&mut self, id: EntityId) -> bool {
        match self.get_mut(id) {
            Some(entity) if entity.alive => {
                entity.alive = false;
                true
            }
            _ => false,
        }
    }

    /// Drop dead entities, returning how many were removed
    pub fn sweep_dead(&mut self) -> usize {
        let before = self.entities.len();
        self.entities.retain(|e| e.alive);
        before - self.entities.len()
    }

    /// Remove everything except the player (game reset)
    pub fn retain_player(&mut self) {
        self.entities.retain(|e| e.kind == EntityKind::Player);
        log::info!("Entity store cleared. Remaining entities: {}", self.entities.len());
    }

    pub fn iter(&self) -> impl Iterator<Item = &Entity> {
        self.entities.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Entity> {
        self.entities.iter_mut()
    }

    pub fn alive(&self) -> impl Iterator<Item = &Entity> {
        self.entities.iter().filter(|e| e.alive)
    }

    pub fn as_slice(&self) -> &[Entity] {
        &self.entities
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn count_kind(&self, kind: EntityKind) -> usize {
        self.alive().filter(|e| e.kind == kind).count()
    }
}
