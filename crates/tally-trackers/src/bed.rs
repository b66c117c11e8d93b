//! Bed (respawn point) tracking. Locations are cached in their encoded
//! `world;x;y;z` form.

use tally_cache::TieredCache;
use tally_types::{Aspect, BedLocation, EntityKey, Snapshot};
use tracing::warn;

use crate::tracker::StateTracker;

/// Tracks each entity's last bed location.
#[derive(Debug)]
pub struct BedTracker {
    beds: TieredCache<EntityKey, String>,
}

impl BedTracker {
    /// Build the tracker over its cache.
    pub const fn new(beds: TieredCache<EntityKey, String>) -> Self {
        Self { beds }
    }

    /// Record the entity's bed location, replacing any previous one.
    pub fn record_bed(&self, key: EntityKey, bed: &BedLocation) {
        self.beds.put(key, bed.encode());
    }

    /// The entity's bed location; `None` when unknown or undecodable.
    pub fn bed(&self, key: &EntityKey) -> Option<BedLocation> {
        let stored = self.beds.get(key)?;
        match BedLocation::decode(&stored) {
            Ok(bed) => Some(bed),
            Err(e) => {
                warn!(entity = %key, error = %e, "stored bed location undecodable, treating as unknown");
                None
            }
        }
    }

    /// Bed state for `key`.
    pub fn snapshot(&self, key: &EntityKey) -> Option<BedLocation> {
        self.bed(key)
    }
}

impl StateTracker for BedTracker {
    fn aspect(&self) -> Aspect {
        Aspect::Bed
    }

    fn tracked_entities(&self) -> Vec<EntityKey> {
        self.beds.keys()
    }

    fn fill_snapshot(&self, entity: EntityKey, snapshot: &mut Snapshot) {
        snapshot.bed = self.snapshot(&entity);
    }

    fn apply_snapshot(&self, snapshot: &Snapshot) {
        if let Some(bed) = &snapshot.bed {
            self.record_bed(snapshot.entity, bed);
        }
    }

    fn flush(&self) {
        self.beds.flush();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use tally_cache::CacheStore;

    use super::*;

    #[test]
    fn bed_overwrites() {
        let tracker = BedTracker::new(CacheStore::disabled().cache("beds", 4));
        let key = EntityKey::new();
        assert!(tracker.bed(&key).is_none());
        let first = BedLocation { world: "overworld".to_owned(), x: 1, y: 64, z: -7 };
        let second = BedLocation { world: "overworld".to_owned(), x: 200, y: 70, z: 3 };
        tracker.record_bed(key, &first);
        tracker.record_bed(key, &second);
        assert_eq!(tracker.bed(&key), Some(second));
    }

    #[test]
    fn apply_without_bed_keeps_local() {
        let tracker = BedTracker::new(CacheStore::disabled().cache("beds", 4));
        let key = EntityKey::new();
        let bed = BedLocation { world: "overworld".to_owned(), x: 1, y: 64, z: -7 };
        tracker.record_bed(key, &bed);
        tracker.apply_snapshot(&Snapshot::empty(key, "other"));
        assert_eq!(tracker.bed(&key), Some(bed));
    }
}
