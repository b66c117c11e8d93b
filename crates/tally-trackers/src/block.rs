//! Block interaction tracking.
//!
//! Only the most recent interaction is kept per entity, alongside a running
//! count of every interaction recorded for it.

use tally_cache::TieredCache;
use tally_types::{Aspect, BlockActivity, BlockInteraction, EntityKey, Snapshot};

use crate::tracker::StateTracker;

/// Tracks the latest block interaction and interaction count per entity.
#[derive(Debug)]
pub struct BlockTracker {
    activity: TieredCache<EntityKey, BlockActivity>,
}

impl BlockTracker {
    /// Build the tracker over its cache.
    pub const fn new(activity: TieredCache<EntityKey, BlockActivity>) -> Self {
        Self { activity }
    }

    /// Record an interaction, returning the entity's new running total.
    pub fn record_interaction(&self, key: EntityKey, interaction: BlockInteraction) -> u64 {
        self.activity
            .update(key, |current| BlockActivity {
                last: interaction,
                total: current.map_or(0, |c| c.total).saturating_add(1),
            })
            .total
    }

    /// The entity's most recent interaction.
    pub fn latest(&self, key: &EntityKey) -> Option<BlockInteraction> {
        self.activity.get(key).map(|activity| activity.last)
    }

    /// Block activity for `key`; `None` when unknown.
    pub fn snapshot(&self, key: &EntityKey) -> Option<BlockActivity> {
        self.activity.get(key)
    }
}

impl StateTracker for BlockTracker {
    fn aspect(&self) -> Aspect {
        Aspect::BlockInteraction
    }

    fn tracked_entities(&self) -> Vec<EntityKey> {
        self.activity.keys()
    }

    fn fill_snapshot(&self, entity: EntityKey, snapshot: &mut Snapshot) {
        snapshot.block_activity = self.snapshot(&entity);
    }

    fn apply_snapshot(&self, snapshot: &Snapshot) {
        let Some(remote) = &snapshot.block_activity else {
            return;
        };
        self.activity.update(snapshot.entity, |local| match local {
            Some(local) => {
                let total = local.total.max(remote.total);
                let last = if remote.last.at > local.last.at {
                    remote.last.clone()
                } else {
                    local.last
                };
                BlockActivity { last, total }
            }
            None => remote.clone(),
        });
    }

    fn flush(&self) {
        self.activity.flush();
    }
}
