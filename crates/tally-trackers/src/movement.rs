//! Last-known position tracking.
//!
//! Positions are stored in the cache as their encoded string form
//! (`world;x;y;z;unix_millis`). Writes are sampled: a new position in the same
//! world that lies closer than the configured minimum distance to the stored
//! one is skipped, which keeps the hot tier from churning on every movement
//! packet.

use tally_cache::TieredCache;
use tally_types::{Aspect, EntityKey, Position, Snapshot};
use tracing::warn;

use crate::tracker::StateTracker;

/// Tracks each entity's last sampled position.
#[derive(Debug)]
pub struct MovementTracker {
    positions: TieredCache<EntityKey, String>,
    min_distance_squared: f64,
}

impl MovementTracker {
    /// Build the tracker. `min_distance` is in blocks; zero or negative
    /// values record every position.
    pub fn new(positions: TieredCache<EntityKey, String>, min_distance: f64) -> Self {
        let min_distance = min_distance.max(0.0);
        Self {
            positions,
            min_distance_squared: min_distance * min_distance,
        }
    }

    /// Record `position` for `key`.
    ///
    /// Returns `false` when the position was skipped because it is in the
    /// same world as, and closer than the minimum distance to, the stored
    /// position.
    pub fn record_position(&self, key: EntityKey, position: &Position) -> bool {
        let mut recorded = true;
        let min_distance_squared = self.min_distance_squared;
        self.positions.update(key, |stored| {
            let previous = stored.as_deref().and_then(|s| decode(&key, s));
            if let Some(previous) = previous {
                let close = previous
                    .distance_squared(position)
                    .is_some_and(|d| d < min_distance_squared);
                if close {
                    recorded = false;
                    return previous.encode();
                }
            }
            position.encode()
        });
        recorded
    }

    /// The entity's last recorded position.
    pub fn last_position(&self, key: &EntityKey) -> Option<Position> {
        self.positions.get(key).and_then(|s| decode(key, &s))
    }

    /// Position state for `key`; `None` when unknown.
    pub fn snapshot(&self, key: &EntityKey) -> Option<Position> {
        self.last_position(key)
    }
}

fn decode(key: &EntityKey, stored: &str) -> Option<Position> {
    match Position::decode(stored) {
        Ok(position) => Some(position),
        Err(e) => {
            warn!(entity = %key, error = %e, "stored position undecodable, treating as unknown");
            None
        }
    }
}

impl StateTracker for MovementTracker {
    fn aspect(&self) -> Aspect {
        Aspect::Movement
    }

    fn tracked_entities(&self) -> Vec<EntityKey> {
        self.positions.keys()
    }

    fn fill_snapshot(&self, entity: EntityKey, snapshot: &mut Snapshot) {
        snapshot.position = self.snapshot(&entity);
    }

    fn apply_snapshot(&self, snapshot: &Snapshot) {
        let Some(remote) = &snapshot.position else {
            return;
        };
        let entity = snapshot.entity;
        self.positions.update(entity, |stored| {
            match stored.as_deref().and_then(|s| decode(&entity, s)) {
                Some(local) if local.recorded_at >= remote.recorded_at => local.encode(),
                _ => remote.encode(),
            }
        });
    }

    fn flush(&self) {
        self.positions.flush();
    }
}
