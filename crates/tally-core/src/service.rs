//! Service composition and main loop.
//!
//! [`SyncService::new`] wires the components leaves first:
//!
//! ```text
//! TrackerSet ─┬─► SnapshotListener ──┐
//!             │   SyncRequestListener ┴─► ListenerRegistry ─► Consumer (source)
//!             └─► SyncPipeline ─► Producer (sink)
//! ```
//!
//! The source and sink are separate transports, so inbound and outbound
//! traffic never share a connection. [`SyncService::run_until`] runs full
//! cycles on a fixed interval and serves sync requests as they arrive,
//! until its cancellation token fires.

use std::sync::Arc;
use std::time::Duration;

use tally_bus::{
    BusError, Consumer, ConsumerState, ConsumerStats, ListenerRegistry, Producer, RecordSink,
    RecordSource,
};
use tally_trackers::TrackerSet;
use tally_types::Topic;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::codec::{JsonCodec, SnapshotCodec};
use crate::config::TallyConfig;
use crate::listeners::{SnapshotListener, SyncRequest, SyncRequestListener};
use crate::sync::{SyncPipeline, SyncReport};

/// Errors surfaced by the service lifecycle.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// The consumer could not start.
    #[error("consumer failed to start: {0}")]
    Bus(#[from] BusError),
}

/// The composed synchronization service.
pub struct SyncService<S: RecordSource, K: RecordSink> {
    trackers: TrackerSet,
    consumer: Consumer<S>,
    pipeline: SyncPipeline<K>,
    requests: mpsc::Receiver<SyncRequest>,
    interval: Duration,
}

impl<S: RecordSource, K: RecordSink> SyncService<S, K> {
    /// Wire the service with the JSON codec.
    pub fn new(config: &TallyConfig, trackers: TrackerSet, source: S, sink: K) -> Self {
        Self::with_codec(config, trackers, source, sink, Arc::new(JsonCodec))
    }

    /// Wire the service with an explicit snapshot codec.
    pub fn with_codec(
        config: &TallyConfig,
        trackers: TrackerSet,
        source: S,
        sink: K,
        codec: Arc<dyn SnapshotCodec>,
    ) -> Self {
        let origin = config.server.id.clone();
        let (request_tx, requests) = mpsc::channel(config.sync.request_buffer.max(1));

        let mut registry = ListenerRegistry::new();
        registry.register_handler(
            Topic::PlayerPayload,
            Arc::new(SnapshotListener::new(
                trackers.clone(),
                Arc::clone(&codec),
                origin.clone(),
            )),
        );
        registry.register_handler(
            Topic::SyncRequest,
            Arc::new(SyncRequestListener::new(request_tx)),
        );

        let consumer = Consumer::new(source, Arc::new(registry), config.broker.consumer_config());
        let pipeline = SyncPipeline::new(trackers.clone(), Producer::new(sink), codec, origin);

        Self {
            trackers,
            consumer,
            pipeline,
            requests,
            interval: config.sync.interval(),
        }
    }

    /// The shared tracker set. Host code records domain events through it.
    pub const fn trackers(&self) -> &TrackerSet {
        &self.trackers
    }

    /// The outbound pipeline.
    pub const fn pipeline(&self) -> &SyncPipeline<K> {
        &self.pipeline
    }

    /// Consumer lifecycle state.
    pub const fn consumer_state(&self) -> ConsumerState {
        self.consumer.state()
    }

    /// Consumer counters.
    pub fn consumer_stats(&self) -> &ConsumerStats {
        self.consumer.stats()
    }

    /// Start consuming inbound topics.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Bus`] if the consumer cannot open its source
    /// or was already started.
    pub async fn start(&mut self) -> Result<(), ServiceError> {
        self.consumer.start().await?;
        info!(origin = self.pipeline.origin(), "sync service started");
        Ok(())
    }

    /// Run a full synchronization cycle immediately.
    pub async fn sync_now(&self) -> SyncReport {
        self.pipeline.run_full_cycle().await
    }

    /// Serve scheduled cycles and sync requests until `cancel` fires.
    ///
    /// The first scheduled cycle runs one interval after the call.
    pub async fn run_until(&mut self, cancel: CancellationToken) {
        let start = tokio::time::Instant::now()
            .checked_add(self.interval)
            .unwrap_or_else(tokio::time::Instant::now);
        let mut ticker = tokio::time::interval_at(start, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                Some(request) = self.requests.recv() => {
                    self.serve(request).await;
                }
                _ = ticker.tick() => {
                    self.pipeline.run_full_cycle().await;
                }
            }
        }
        info!("sync service loop stopped");
    }

    async fn serve(&self, request: SyncRequest) {
        let report = match request {
            SyncRequest::All => self.pipeline.run_full_cycle().await,
            SyncRequest::Entity(entity) => self.pipeline.run_cycle(&[entity]).await,
        };
        info!(request = ?request, succeeded = report.succeeded, "sync request served");
    }

    /// Stop the consumer, flush the producer and flush the trackers.
    ///
    /// Errors are logged; shutdown always completes.
    pub async fn shutdown(&mut self) {
        self.consumer.stop().await;
        if let Err(e) = self.pipeline.producer().flush().await {
            warn!(error = %e, "failed to flush producer on shutdown");
        }
        self.trackers.flush();
        info!("sync service shut down");
    }
}

impl<S: RecordSource, K: RecordSink> std::fmt::Debug for SyncService<S, K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncService")
            .field("consumer", &self.consumer)
            .field("pipeline", &self.pipeline)
            .field("interval", &self.interval)
            .finish_non_exhaustive()
    }
}
