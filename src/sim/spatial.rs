//! Grid-based broad phase
//!
//! World space is cut into square cells of a fixed size; every entity is
//! listed in each cell its extent overlaps. Neighbour queries then only look at
//! the entity's own cells plus a one-cell ring around them, turning the O(n²)
//! pair scan into roughly O(n) for evenly spread scenes.
//!
//! The grid is rebuilt from scratch once per physics step. Entities move every
//! step, so diffing old and new cells would cost more than it saves.

use std::collections::HashMap;

use glam::Vec2;

use super::entity::{Entity, EntityId};
use super::rect::Bounds;
use crate::error::{CoreError, Result};

/// Integer cell coordinate: `floor(position / cell_size)`
pub type CellKey = (i32, i32);

/// Refuse entities covering more cells than this (almost certainly a bad extent)
pub const MAX_CELLS_PER_ENTITY: i64 = 1 << 16;

/// Inclusive rectangle of cells
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellSpan {
    pub min: CellKey,
    pub max: CellKey,
}

impl CellSpan {
    pub fn cell_count(&self) -> i64 {
        (self.max.0 as i64 - self.min.0 as i64 + 1) * (self.max.1 as i64 - self.min.1 as i64 + 1)
    }

    /// Grow by `ring` cells on every side
    pub fn grow(&self, ring: i32) -> Self {
        Self {
            min: (self.min.0.saturating_sub(ring), self.min.1.saturating_sub(ring)),
            max: (self.max.0.saturating_add(ring), self.max.1.saturating_add(ring)),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = CellKey> + '_ {
        let (min, max) = (self.min, self.max);
        (min.1..=max.1).flat_map(move |y| (min.0..=max.0).map(move |x| (x, y)))
    }
}

/// Spatial hash mapping cells to the entities overlapping them
#[derive(Debug, Clone)]
pub struct SpatialIndex {
    cell_size: f32,
    cells: HashMap<CellKey, Vec<EntityId>>,
    entries: usize,
}

impl SpatialIndex {
    /// Create an empty index; `cell_size` must be positive and finite
    pub fn new(cell_size: f32) -> Result<Self> {
        if !cell_size.is_finite() || cell_size <= 0.0 {
            return Err(CoreError::config(
                "cell_size",
                format!("must be a positive finite number, got {cell_size}"),
            ));
        }
        log::debug!("SpatialIndex initialized with cell size {cell_size}");
        Ok(Self {
            cell_size,
            cells: HashMap::new(),
            entries: 0,
        })
    }

    pub fn cell_size(&self) -> f32 {
        self.cell_size
    }

    /// Cell containing a world-space point
    #[inline]
    pub fn cell_of(&self, point: Vec2) -> CellKey {
        (
            (point.x / self.cell_size).floor() as i32,
            (point.y / self.cell_size).floor() as i32,
        )
    }

    /// Every cell a rectangle overlaps
    pub fn span_of(&self, bounds: &Bounds) -> CellSpan {
        CellSpan {
            min: self.cell_of(bounds.pos),
            max: self.cell_of(bounds.max()),
        }
    }

    /// Empty all cells (keeps the map's allocation)
    pub fn clear(&mut self) {
        self.cells.clear();
        self.entries = 0;
    }

    /// List an entity in every cell its broad-phase extent overlaps
    pub fn insert(&mut self, entity: &Entity) -> Result<()> {
        // Fields are public, so gameplay may have broken them after spawn
        entity.validate()?;
        let bounds = entity.broad_phase_bounds();
        if !bounds.is_finite() {
            return Err(CoreError::entity(format!(
                "entity {:?} has non-finite bounds",
                entity.id
            )));
        }
        let span = self.span_of(&bounds);
        let count = span.cell_count();
        if count <= 0 {
            return Err(CoreError::entity(format!(
                "entity {:?} covers no cells ({span:?})",
                entity.id
            )));
        }
        if count > MAX_CELLS_PER_ENTITY {
            return Err(CoreError::entity(format!(
                "entity {:?} spans {count} cells (cell size {})",
                entity.id, self.cell_size
            )));
        }

        for key in span.iter() {
            self.cells.entry(key).or_default().push(entity.id);
        }
        self.entries += count as usize;
        Ok(())
    }

    /// Clear and reinsert every live entity
    ///
    /// Returns the ids that were rejected; the caller decides what to do with
    /// them (the frame loop despawns them).
    pub fn rebuild<'a>(&mut self, entities: impl IntoIterator<Item = &'a Entity>) -> Vec<EntityId> {
        self.clear();
        let mut rejected = Vec::new();
        for entity in entities.into_iter().filter(|e| e.alive) {
            if let Err(e) = self.insert(entity) {
                log::warn!("Spatial index rejected entity: {e}");
                rejected.push(entity.id);
            }
        }
        rejected
    }

    /// Every other entity in the same or an adjacent cell, sorted and deduplicated
    ///
    /// Never misses an entity whose collision circle overlaps `entity`'s;
    /// false positives are left to the exact test.
    pub fn neighbors(&self, entity: &Entity) -> Vec<EntityId> {
        let span = self.span_of(&entity.broad_phase_bounds()).grow(1);
        let mut found = self.collect(span);
        found.retain(|&id| id != entity.id);
        found
    }

    /// Every entity listed in a cell overlapped by `bounds`
    pub fn query(&self, bounds: &Bounds) -> Vec<EntityId> {
        self.collect(self.span_of(bounds))
    }

    fn collect(&self, span: CellSpan) -> Vec<EntityId> {
        let mut found = Vec::new();
        // Sparse grids: walking the occupied cells is cheaper than a huge span
        if span.cell_count() > self.cells.len() as i64 {
            for (&(x, y), ids) in &self.cells {
                if x >= span.min.0 && x <= span.max.0 && y >= span.min.1 && y <= span.max.1 {
                    found.extend_from_slice(ids);
                }
            }
        } else {
            for key in span.iter() {
                if let Some(ids) = self.cells.get(&key) {
                    found.extend_from_slice(ids);
                }
            }
        }
        found.sort_unstable();
        found.dedup();
        found
    }

    /// Ids listed in one cell
    pub fn cell(&self, key: CellKey) -> &[EntityId] {
        self.cells.get(&key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Number of non-empty cells
    pub fn cells_in_use(&self) -> usize {
        self.cells.len()
    }

    /// Total (cell, entity) memberships
    pub fn entries(&self) -> usize {
        self.entries
    }

    /// Largest number of entities sharing one cell
    pub fn max_occupancy(&self) -> usize {
        self.cells.values().map(Vec::len).max().unwrap_or(0)
    }

    /// Non-empty cells with their entity counts, in no particular order
    pub fn occupied(&self) -> impl Iterator<Item = (CellKey, usize)> + '_ {
        self.cells.iter().map(|(&key, ids)| (key, ids.len()))
    }

    /// World-space rectangle of one cell
    pub fn cell_bounds(&self, key: CellKey) -> Bounds {
        Bounds::new(
            key.0 as f32 * self.cell_size,
            key.1 as f32 * self.cell_size,
            self.cell_size,
            self.cell_size,
        )
    }
}
