//! The full tracker set for one server.
//!
//! [`TrackerSet::open`] builds every cache once and hands each tracker its
//! own region, so any two holders of the set (domain-event handlers, the
//! inbound listener, the synchronization pipeline) observe the same state.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::Utc;
use tally_cache::CacheStore;
use tally_types::{EntityKey, Snapshot};
use tracing::{debug, info};

use crate::bed::BedTracker;
use crate::block::BlockTracker;
use crate::config::{TrackerConfig, regions};
use crate::movement::MovementTracker;
use crate::play_time::PlayTimeTracker;
use crate::progression::ProgressionTracker;
use crate::tracker::StateTracker;

/// All five trackers, sharing one cache per aspect.
///
/// Cloning is cheap; clones share the same trackers.
#[derive(Debug, Clone)]
pub struct TrackerSet {
    play_time: Arc<PlayTimeTracker>,
    movement: Arc<MovementTracker>,
    blocks: Arc<BlockTracker>,
    beds: Arc<BedTracker>,
    progression: Arc<ProgressionTracker>,
}

impl TrackerSet {
    /// Build every tracker over regions of `store`.
    ///
    /// Never fails: regions that cannot be opened run hot-only (see
    /// [`CacheStore::cache`]).
    pub fn open(store: &CacheStore, config: &TrackerConfig) -> Self {
        let caps = &config.regions;
        let set = Self {
            play_time: Arc::new(PlayTimeTracker::new(
                store.cache(regions::PLAY_TIMES, caps.play_times),
                store.cache(regions::SESSION_WINDOWS, caps.session_windows),
            )),
            movement: Arc::new(MovementTracker::new(
                store.cache(regions::MOVEMENTS, caps.movements),
                config.movement_min_distance,
            )),
            blocks: Arc::new(BlockTracker::new(
                store.cache(regions::BLOCK_INTERACTIONS, caps.block_interactions),
            )),
            beds: Arc::new(BedTracker::new(store.cache(regions::BEDS, caps.beds))),
            progression: Arc::new(ProgressionTracker::new(
                store.cache(regions::PROGRESSION, caps.progression),
            )),
        };
        info!(durable = store.is_durable(), "tracker set opened");
        set
    }

    /// Play time tracker.
    pub fn play_time(&self) -> &PlayTimeTracker {
        &self.play_time
    }

    /// Movement tracker.
    pub fn movement(&self) -> &MovementTracker {
        &self.movement
    }

    /// Block interaction tracker.
    pub fn blocks(&self) -> &BlockTracker {
        &self.blocks
    }

    /// Bed tracker.
    pub fn beds(&self) -> &BedTracker {
        &self.beds
    }

    /// Progression tracker.
    pub fn progression(&self) -> &ProgressionTracker {
        &self.progression
    }

    /// Every tracker behind the common trait, in [`Aspect::ALL`] order.
    ///
    /// [`Aspect::ALL`]: tally_types::Aspect::ALL
    pub fn trackers(&self) -> [&dyn StateTracker; 5] {
        [
            self.play_time.as_ref(),
            self.movement.as_ref(),
            self.blocks.as_ref(),
            self.beds.as_ref(),
            self.progression.as_ref(),
        ]
    }

    /// Build a snapshot of `entity` from every tracker, stamped with
    /// `origin` and the current time. Unknown entities yield an empty
    /// snapshot.
    pub fn snapshot(&self, entity: EntityKey, origin: &str) -> Snapshot {
        let mut snapshot = Snapshot::empty(entity, origin);
        for tracker in self.trackers() {
            tracker.fill_snapshot(entity, &mut snapshot);
        }
        snapshot.taken_at = Utc::now();
        snapshot
    }

    /// Merge a snapshot received from another server into every tracker.
    pub fn apply(&self, snapshot: &Snapshot) {
        debug!(entity = %snapshot.entity, origin = %snapshot.origin, "applying snapshot");
        for tracker in self.trackers() {
            tracker.apply_snapshot(snapshot);
        }
    }

    /// Every entity known to at least one tracker, in key order.
    pub fn tracked_entities(&self) -> BTreeSet<EntityKey> {
        self.trackers()
            .into_iter()
            .flat_map(|tracker| tracker.tracked_entities())
            .collect()
    }

    /// Flush every tracker's cold tier.
    pub fn flush(&self) {
        for tracker in self.trackers() {
            tracker.flush();
        }
    }
}
