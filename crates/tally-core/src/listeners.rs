//! Inbound event handlers.
//!
//! [`SnapshotListener`] merges snapshots published by other servers into the
//! local trackers. [`SyncRequestListener`] turns sync requests into
//! [`SyncRequest`] messages for the service loop, which owns the producer.

use std::sync::Arc;

use tally_bus::{EventHandler, HandlerError};
use tally_trackers::TrackerSet;
use tally_types::{EntityKey, EventEnvelope};
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::codec::SnapshotCodec;

/// Sync request key meaning "every tracked entity".
pub const ALL_ENTITIES_KEY: &str = "*";

/// A request to publish state outside the regular schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncRequest {
    /// Publish every tracked entity.
    All,
    /// Publish one entity.
    Entity(EntityKey),
}

impl SyncRequest {
    /// Parse a sync request record key.
    ///
    /// # Errors
    ///
    /// Returns [`HandlerError`] if the key is neither `*` nor an entity id.
    pub fn from_key(key: &str) -> Result<Self, HandlerError> {
        if key == ALL_ENTITIES_KEY {
            return Ok(Self::All);
        }
        key.parse()
            .map(Self::Entity)
            .map_err(|e| HandlerError::new(e.to_string()))
    }
}

// =============================================================================
// Snapshot listener
// =============================================================================

/// Applies snapshots from other origins to the local trackers.
pub struct SnapshotListener {
    trackers: TrackerSet,
    codec: Arc<dyn SnapshotCodec>,
    origin: String,
}

impl SnapshotListener {
    /// Build a listener that ignores snapshots stamped with `origin`.
    pub fn new(trackers: TrackerSet, codec: Arc<dyn SnapshotCodec>, origin: impl Into<String>) -> Self {
        Self {
            trackers,
            codec,
            origin: origin.into(),
        }
    }
}

impl EventHandler for SnapshotListener {
    fn handle(&self, event: &EventEnvelope) -> Result<(), HandlerError> {
        let entity: EntityKey = event
            .key()
            .parse()
            .map_err(|e: tally_types::ParseEntityKeyError| HandlerError::new(e.to_string()))?;
        let snapshot = self
            .codec
            .decode(event.payload())
            .map_err(|e| HandlerError::new(e.to_string()))?;
        if snapshot.entity != entity {
            return Err(HandlerError::new(format!(
                "record key {entity} does not match snapshot entity {}",
                snapshot.entity
            )));
        }
        if snapshot.origin == self.origin {
            trace!(entity = %entity, "ignoring own snapshot");
            return Ok(());
        }
        self.trackers.apply(&snapshot);
        Ok(())
    }

    fn name(&self) -> &str {
        "snapshot-listener"
    }
}

impl std::fmt::Debug for SnapshotListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotListener")
            .field("origin", &self.origin)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Sync request listener
// =============================================================================

/// Forwards sync requests to the service loop.
#[derive(Debug)]
pub struct SyncRequestListener {
    requests: mpsc::Sender<SyncRequest>,
}

impl SyncRequestListener {
    /// Build a listener feeding `requests`.
    pub const fn new(requests: mpsc::Sender<SyncRequest>) -> Self {
        Self { requests }
    }
}

impl EventHandler for SyncRequestListener {
    fn handle(&self, event: &EventEnvelope) -> Result<(), HandlerError> {
        let request = SyncRequest::from_key(event.key())?;
        self.requests
            .try_send(request)
            .map_err(|e| HandlerError::new(format!("sync request not queued: {e}")))?;
        debug!(request = ?request, "sync request queued");
        Ok(())
    }

    fn name(&self) -> &str {
        "sync-request-listener"
    }
}
