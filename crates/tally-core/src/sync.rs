//! Outbound synchronization pipeline.
//!
//! A cycle builds one [`Snapshot`](tally_types::Snapshot) per entity from
//! every tracker, encodes it and publishes it on
//! [`Topic::PlayerPayload`] keyed by the entity id. Entities are independent:
//! a failure is recorded in the [`SyncReport`] and the cycle moves on.
//! Publishing never writes back to the trackers, so a failed entity is simply
//! published again on the next cycle.
//!
//! A publish only hands the record to the transport. The cycle ends with a
//! flush, and only entities whose records were confirmed by that flush count
//! as succeeded.

use std::sync::Arc;

use tally_bus::{Producer, PublishError, RecordSink};
use tally_trackers::TrackerSet;
use tally_types::{EntityKey, Topic};
use tracing::{info, warn};

use crate::codec::{CodecError, SnapshotCodec};

/// Why one entity was not published.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// The snapshot could not be encoded.
    #[error(transparent)]
    Encode(#[from] CodecError),

    /// The producer rejected the record.
    #[error(transparent)]
    Publish(#[from] PublishError),

    /// The record was handed to the transport, but the end-of-cycle flush
    /// failed, so delivery is unconfirmed.
    #[error("flush after publish failed: {0}")]
    Flush(String),
}

/// One entity that failed to publish.
#[derive(Debug)]
pub struct SyncFailure {
    /// The entity.
    pub entity: EntityKey,
    /// What went wrong.
    pub error: SyncError,
}

/// Outcome of one cycle.
#[derive(Debug, Default)]
pub struct SyncReport {
    /// Entities published.
    pub succeeded: usize,
    /// Entities that failed, in cycle order.
    pub failures: Vec<SyncFailure>,
}

impl SyncReport {
    /// Entities attempted.
    pub fn attempted(&self) -> usize {
        self.succeeded.saturating_add(self.failures.len())
    }

    /// Whether every entity was published.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Reads trackers and publishes entity snapshots.
pub struct SyncPipeline<K: RecordSink> {
    trackers: TrackerSet,
    producer: Producer<K>,
    codec: Arc<dyn SnapshotCodec>,
    origin: String,
}

impl<K: RecordSink> SyncPipeline<K> {
    /// Build a pipeline stamping snapshots with `origin`.
    pub fn new(
        trackers: TrackerSet,
        producer: Producer<K>,
        codec: Arc<dyn SnapshotCodec>,
        origin: impl Into<String>,
    ) -> Self {
        Self {
            trackers,
            producer,
            codec,
            origin: origin.into(),
        }
    }

    /// The producer used for publishing.
    pub const fn producer(&self) -> &Producer<K> {
        &self.producer
    }

    /// The origin stamped on every snapshot.
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Publish a snapshot of each entity in `entities`, then flush.
    ///
    /// If the flush fails, every entity published in this cycle is reported
    /// as failed with [`SyncError::Flush`].
    pub async fn run_cycle(&self, entities: &[EntityKey]) -> SyncReport {
        let mut report = SyncReport::default();
        let mut published = Vec::with_capacity(entities.len());
        for &entity in entities {
            match self.sync_entity(entity).await {
                Ok(()) => published.push(entity),
                Err(error) => {
                    warn!(entity = %entity, error = %error, "entity not synchronized");
                    report.failures.push(SyncFailure { entity, error });
                }
            }
        }

        if !published.is_empty() {
            if let Err(e) = self.producer.flush().await {
                let message = e.to_string();
                warn!(entities = published.len(), error = %message, "flush failed, cycle unconfirmed");
                report.failures.extend(published.drain(..).map(|entity| SyncFailure {
                    entity,
                    error: SyncError::Flush(message.clone()),
                }));
            }
        }
        report.succeeded = published.len();
        info!(
            attempted = report.attempted(),
            succeeded = report.succeeded,
            failed = report.failures.len(),
            "sync cycle complete"
        );
        report
    }

    /// Publish a snapshot of every entity any tracker knows.
    pub async fn run_full_cycle(&self) -> SyncReport {
        let entities: Vec<EntityKey> = self.trackers.tracked_entities().into_iter().collect();
        self.run_cycle(&entities).await
    }

    async fn sync_entity(&self, entity: EntityKey) -> Result<(), SyncError> {
        let snapshot = self.trackers.snapshot(entity, &self.origin);
        let payload = self.codec.encode(&snapshot)?;
        self.producer
            .publish(Topic::PlayerPayload, &entity.to_string(), &payload)
            .await?;
        Ok(())
    }
}

impl<K: RecordSink> std::fmt::Debug for SyncPipeline<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncPipeline")
            .field("origin", &self.origin)
            .finish_non_exhaustive()
    }
}
