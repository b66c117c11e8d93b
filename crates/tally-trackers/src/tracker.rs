//! The shape every tracker shares.

use tally_types::{Aspect, EntityKey, Snapshot};

/// One tracked aspect of entity state.
///
/// Trackers know nothing about the broker. The synchronization pipeline
/// reads them through [`StateTracker::fill_snapshot`] and inbound listeners
/// write through [`StateTracker::apply_snapshot`]; host collaborators use the
/// concrete trackers' typed methods.
pub trait StateTracker: Send + Sync {
    /// The aspect this tracker owns.
    fn aspect(&self) -> Aspect;

    /// Every entity with state in this tracker (both cache tiers).
    fn tracked_entities(&self) -> Vec<EntityKey>;

    /// Copy this tracker's state for `entity` into `snapshot`. Unknown
    /// entities leave the snapshot's field at its empty value.
    fn fill_snapshot(&self, entity: EntityKey, snapshot: &mut Snapshot);

    /// Merge the relevant part of a snapshot received from another origin.
    fn apply_snapshot(&self, snapshot: &Snapshot);

    /// Flush cold-tier writes to disk.
    fn flush(&self);
}
