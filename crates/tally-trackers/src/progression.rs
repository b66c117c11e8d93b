//! Experience progression tracking, cached as a `(level, points, total)`
//! tuple.

use tally_cache::TieredCache;
use tally_types::{Aspect, EntityKey, Progression, Snapshot};

use crate::tracker::StateTracker;

/// Tracks each entity's experience level and points.
#[derive(Debug)]
pub struct ProgressionTracker {
    progression: TieredCache<EntityKey, (i32, i32, i32)>,
}

impl ProgressionTracker {
    /// Build the tracker over its cache.
    pub const fn new(progression: TieredCache<EntityKey, (i32, i32, i32)>) -> Self {
        Self { progression }
    }

    /// Record the entity's current progression.
    pub fn record_progression(&self, key: EntityKey, progression: Progression) {
        self.progression.put(key, progression.into());
    }

    /// The entity's last recorded progression.
    pub fn progression(&self, key: &EntityKey) -> Option<Progression> {
        self.progression.get(key).map(Progression::from)
    }

    /// Progression state for `key`.
    pub fn snapshot(&self, key: &EntityKey) -> Option<Progression> {
        self.progression(key)
    }
}

impl StateTracker for ProgressionTracker {
    fn aspect(&self) -> Aspect {
        Aspect::Progression
    }

    fn tracked_entities(&self) -> Vec<EntityKey> {
        self.progression.keys()
    }

    fn fill_snapshot(&self, entity: EntityKey, snapshot: &mut Snapshot) {
        snapshot.progression = self.snapshot(&entity);
    }

    fn apply_snapshot(&self, snapshot: &Snapshot) {
        if let Some(progression) = snapshot.progression {
            self.record_progression(snapshot.entity, progression);
        }
    }

    fn flush(&self) {
        self.progression.flush();
    }
}

#[cfg(test)]
mod tests {
    use tally_cache::CacheStore;

    use super::*;

    #[test]
    fn progression_round_trips_through_tuple() {
        let tracker = ProgressionTracker::new(CacheStore::disabled().cache("progression", 4));
        let key = EntityKey::new();
        assert_eq!(tracker.progression(&key), None);
        let value = Progression { level: 30, points: 12, total: 1_395 };
        tracker.record_progression(key, value);
        assert_eq!(tracker.progression(&key), Some(value));
    }
}
