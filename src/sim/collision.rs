//! Narrow-phase collision on top of the spatial index
//!
//! For each live entity (in id order) the index supplies candidates; only
//! candidates with a larger id are considered, so each unordered pair is
//! looked at once per step. Pairs already reported earlier in the same frame
//! (an earlier substep) are not reported again.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::entity::{EntityId, EntityStore};
use super::spatial::SpatialIndex;

/// Two colliding entities, smaller id first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CollisionPair {
    pub a: EntityId,
    pub b: EntityId,
}

impl CollisionPair {
    pub fn new(a: EntityId, b: EntityId) -> Self {
        if a <= b { Self { a, b } } else { Self { a: b, b: a } }
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.a == id || self.b == id
    }

    /// The other member of the pair
    pub fn other(&self, id: EntityId) -> Option<EntityId> {
        if self.a == id {
            Some(self.b)
        } else if self.b == id {
            Some(self.a)
        } else {
            None
        }
    }
}

/// Counters from the latest resolve
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollisionStats {
    /// Candidate pairs handed out by the broad phase
    pub candidates: u32,
    /// Exact circle tests performed
    pub checks: u32,
    /// New pairs reported
    pub detected: u32,
}

/// Resolves colliding pairs, remembering what was reported this frame
#[derive(Debug, Default)]
pub struct CollisionResolver {
    resolved: HashSet<CollisionPair>,
    stats: CollisionStats,
}

impl CollisionResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget the pairs of the previous frame
    pub fn begin_frame(&mut self) {
        self.resolved.clear();
        self.stats = CollisionStats::default();
    }

    /// Find every new overlapping pair among live, interacting entities
    ///
    /// `index` must have been rebuilt from `store` for this step. The result is
    /// sorted by (a, b).
    pub fn resolve(&mut self, store: &EntityStore, index: &SpatialIndex) -> Vec<CollisionPair> {
        let mut pairs = Vec::new();

        for entity in store.alive() {
            for other_id in index.neighbors(entity) {
                // Pair ordering: only the smaller id drives the test
                if other_id <= entity.id {
                    continue;
                }
                self.stats.candidates += 1;
                let Some(other) = store.get(other_id) else {
                    continue;
                };
                if !other.alive || !entity.kind.interacts_with(other.kind) {
                    continue;
                }

                self.stats.checks += 1;
                if entity.circles_overlap(other) {
                    let pair = CollisionPair::new(entity.id, other.id);
                    if self.resolved.insert(pair) {
                        pairs.push(pair);
                    }
                }
            }
        }

        self.stats.detected += pairs.len() as u32;
        pairs
    }

    /// Counters accumulated since `begin_frame`
    pub fn stats(&self) -> CollisionStats {
        self.stats
    }

    /// All pairs reported since `begin_frame`
    pub fn resolved_this_frame(&self) -> usize {
        self.resolved.len()
    }
}
