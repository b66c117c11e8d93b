//! Background consumer: polls a [`RecordSource`] and dispatches decoded
//! events to a [`ListenerRegistry`].
//!
//! # Lifecycle
//!
//! ```text
//! Created --start()--> Running --stop()--> Stopping --> Closed
//! ```
//!
//! [`Consumer::start`] opens the source on every [`Topic`] channel and spawns
//! exactly one worker task. The worker loops: poll for at most
//! `poll_window`, dispatch each record, then wait `idle_backoff`. A
//! [`CancellationToken`] is checked while waiting and before every record,
//! so once [`Consumer::stop`] cancels it no further record is dispatched.
//!
//! Poll failures are logged and retried on the next iteration. Records
//! without a key or with a non UTF-8 payload are dropped; records on
//! unknown channels are dropped silently.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tally_types::Topic;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::BusError;
use crate::registry::ListenerRegistry;
use crate::transport::{RawRecord, RecordSource};

/// Default upper bound on one poll.
pub const DEFAULT_POLL_WINDOW: Duration = Duration::from_secs(1);

/// Default pause between polls.
pub const DEFAULT_IDLE_BACKOFF: Duration = Duration::from_millis(100);

/// Default maximum records taken per poll.
pub const DEFAULT_MAX_BATCH: usize = 500;

/// Consumer timing and batching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConsumerConfig {
    /// Upper bound on a single poll; also bounds how long a stop waits for
    /// an in-flight poll.
    pub poll_window: Duration,
    /// Pause after every poll.
    pub idle_backoff: Duration,
    /// Maximum records taken per poll (minimum 1).
    pub max_batch: usize,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            poll_window: DEFAULT_POLL_WINDOW,
            idle_backoff: DEFAULT_IDLE_BACKOFF,
            max_batch: DEFAULT_MAX_BATCH,
        }
    }
}

/// Consumer lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerState {
    /// Built, source not yet opened.
    Created,
    /// Worker running.
    Running,
    /// Stop requested, worker winding down.
    Stopping,
    /// Worker finished and source released. Terminal.
    Closed,
}

impl std::fmt::Display for ConsumerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Created => "created",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Running counters, updated by the worker.
#[derive(Debug, Default)]
pub struct ConsumerStats {
    received: AtomicU64,
    dispatched: AtomicU64,
    unknown_topic: AtomicU64,
    malformed: AtomicU64,
    poll_errors: AtomicU64,
    handler_failures: AtomicU64,
}

impl ConsumerStats {
    /// Records taken from the source.
    pub fn received(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }

    /// Records handed to the registry.
    pub fn dispatched(&self) -> u64 {
        self.dispatched.load(Ordering::Relaxed)
    }

    /// Records dropped because their channel maps to no topic.
    pub fn unknown_topic(&self) -> u64 {
        self.unknown_topic.load(Ordering::Relaxed)
    }

    /// Records dropped because they could not be decoded.
    pub fn malformed(&self) -> u64 {
        self.malformed.load(Ordering::Relaxed)
    }

    /// Failed polls.
    pub fn poll_errors(&self) -> u64 {
        self.poll_errors.load(Ordering::Relaxed)
    }

    /// Handler invocations that failed or panicked.
    pub fn handler_failures(&self) -> u64 {
        self.handler_failures.load(Ordering::Relaxed)
    }

    fn bump(counter: &AtomicU64, by: u64) {
        counter.fetch_add(by, Ordering::Relaxed);
    }
}

/// Broker consumer with a single background worker.
pub struct Consumer<S: RecordSource> {
    config: ConsumerConfig,
    registry: Arc<ListenerRegistry>,
    state: ConsumerState,
    source: Option<S>,
    worker: Option<JoinHandle<S>>,
    cancel: CancellationToken,
    stats: Arc<ConsumerStats>,
}

impl<S: RecordSource> Consumer<S> {
    /// Build a consumer in the [`ConsumerState::Created`] state.
    pub fn new(source: S, registry: Arc<ListenerRegistry>, config: ConsumerConfig) -> Self {
        Self {
            config,
            registry,
            state: ConsumerState::Created,
            source: Some(source),
            worker: None,
            cancel: CancellationToken::new(),
            stats: Arc::new(ConsumerStats::default()),
        }
    }

    /// Current lifecycle state.
    pub const fn state(&self) -> ConsumerState {
        self.state
    }

    /// Running counters.
    pub fn stats(&self) -> &ConsumerStats {
        &self.stats
    }

    /// Open the source on every topic channel and spawn the worker.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::InvalidState`] unless the consumer is
    /// [`ConsumerState::Created`], or the source's error if it cannot be
    /// opened (the consumer then stays `Created` with no source and can only
    /// be stopped).
    pub async fn start(&mut self) -> Result<(), BusError> {
        if self.state != ConsumerState::Created {
            return Err(BusError::InvalidState {
                operation: "start",
                state: self.state.to_string(),
            });
        }
        let mut source = self.source.take().ok_or_else(|| BusError::InvalidState {
            operation: "start",
            state: "created without source".to_owned(),
        })?;

        let channels = Topic::ALL.map(Topic::channel);
        source.open(&channels).await?;

        let worker = Worker {
            config: self.config,
            registry: Arc::clone(&self.registry),
            cancel: self.cancel.clone(),
            stats: Arc::clone(&self.stats),
        };
        self.worker = Some(tokio::spawn(worker.run(source)));
        self.state = ConsumerState::Running;
        info!(
            channels = ?channels,
            poll_window_ms = self.config.poll_window.as_millis(),
            "consumer started"
        );
        Ok(())
    }

    /// Stop the worker and release the source.
    ///
    /// Idempotent. Returns once the worker has exited, which happens within
    /// one poll window of the call. Errors while closing are logged.
    pub async fn stop(&mut self) {
        match self.state {
            ConsumerState::Closed | ConsumerState::Stopping => return,
            ConsumerState::Created => {
                self.source = None;
                self.state = ConsumerState::Closed;
                debug!("consumer closed before start");
                return;
            }
            ConsumerState::Running => {}
        }

        self.state = ConsumerState::Stopping;
        self.cancel.cancel();

        if let Some(worker) = self.worker.take() {
            match worker.await {
                Ok(mut source) => {
                    if let Err(e) = source.close().await {
                        warn!(error = %e, "failed to close consumer source");
                    }
                }
                Err(e) => error!(error = %e, "consumer worker did not exit cleanly"),
            }
        }

        self.state = ConsumerState::Closed;
        info!(
            received = self.stats.received(),
            dispatched = self.stats.dispatched(),
            "consumer stopped"
        );
    }
}

impl<S: RecordSource> std::fmt::Debug for Consumer<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Consumer")
            .field("state", &self.state)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Worker
// =============================================================================

struct Worker {
    config: ConsumerConfig,
    registry: Arc<ListenerRegistry>,
    cancel: CancellationToken,
    stats: Arc<ConsumerStats>,
}

impl Worker {
    /// Poll loop. Hands the source back so the owner can close it.
    async fn run<S: RecordSource>(self, mut source: S) -> S {
        let max_batch = self.config.max_batch.max(1);
        loop {
            let polled = tokio::select! {
                biased;
                () = self.cancel.cancelled() => break,
                polled = source.poll(self.config.poll_window, max_batch) => polled,
            };

            match polled {
                Ok(records) => self.dispatch_all(records),
                Err(e) => {
                    ConsumerStats::bump(&self.stats.poll_errors, 1);
                    warn!(error = %e, "consumer poll failed, retrying");
                }
            }

            tokio::select! {
                biased;
                () = self.cancel.cancelled() => break,
                () = tokio::time::sleep(self.config.idle_backoff) => {}
            }
        }
        debug!("consumer worker exiting");
        source
    }

    fn dispatch_all(&self, records: Vec<RawRecord>) {
        for record in records {
            if self.cancel.is_cancelled() {
                debug!("cancelled mid-batch, dropping remaining records");
                return;
            }
            ConsumerStats::bump(&self.stats.received, 1);
            self.dispatch(record);
        }
    }

    fn dispatch(&self, record: RawRecord) {
        let Some(topic) = Topic::resolve(&record.channel) else {
            ConsumerStats::bump(&self.stats.unknown_topic, 1);
            debug!(channel = %record.channel, "dropping record on unknown channel");
            return;
        };
        let envelope = match record.into_envelope(topic) {
            Ok(envelope) => envelope,
            Err(e) => {
                ConsumerStats::bump(&self.stats.malformed, 1);
                warn!(topic = %topic, error = %e, "dropping malformed record");
                return;
            }
        };
        debug!(topic = %topic, key = envelope.key(), "dispatching record");
        let report = self.registry.dispatch(&envelope);
        ConsumerStats::bump(&self.stats.dispatched, 1);
        ConsumerStats::bump(
            &self.stats.handler_failures,
            u64::try_from(report.failed).unwrap_or(u64::MAX),
        );
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use crate::error::HandlerError;
    use crate::memory::MemoryBroker;
    use crate::transport::RecordSink;

    use super::*;

    fn fast() -> ConsumerConfig {
        ConsumerConfig {
            poll_window: Duration::from_millis(20),
            idle_backoff: Duration::from_millis(5),
            max_batch: 100,
        }
    }

    async fn wait_for(mut done: impl FnMut() -> bool) {
        for _ in 0..200 {
            if done() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[tokio::test]
    async fn dispatches_known_topics_and_drops_the_rest() {
        let broker = MemoryBroker::new();
        let seen = Arc::new(AtomicUsize::new(0));
        let mut registry = ListenerRegistry::new();
        let counter = Arc::clone(&seen);
        registry.register(Topic::PlayerPayload, "count", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        registry.register(Topic::PlayerPayload, "reject", |_| Err(HandlerError::new("no")));

        let mut consumer = Consumer::new(broker.source(), Arc::new(registry), fast());
        consumer.start().await.unwrap();
        assert_eq!(consumer.state(), ConsumerState::Running);

        let sink = broker.sink();
        sink.send(RawRecord::new("Player-Payload", "a", "{}")).await.unwrap();
        sink.send(RawRecord::new("unknown-channel", "b", "{}")).await.unwrap();
        sink.send(RawRecord {
            channel: "player-payload".to_owned(),
            key: None,
            payload: b"{}".to_vec(),
        })
        .await
        .unwrap();

        wait_for(|| consumer.stats().received() >= 3).await;
        consumer.stop().await;

        assert_eq!(seen.load(Ordering::SeqCst), 1);
        let stats = consumer.stats();
        assert_eq!(stats.received(), 3);
        assert_eq!(stats.dispatched(), 1);
        assert_eq!(stats.unknown_topic(), 1);
        assert_eq!(stats.malformed(), 1);
        assert_eq!(stats.handler_failures(), 1);
    }

    #[tokio::test]
    async fn start_twice_is_rejected() {
        let broker = MemoryBroker::new();
        let mut consumer = Consumer::new(broker.source(), Arc::new(ListenerRegistry::new()), fast());
        consumer.start().await.unwrap();
        assert!(matches!(
            consumer.start().await,
            Err(BusError::InvalidState { operation: "start", .. })
        ));
        consumer.stop().await;
    }

    #[tokio::test]
    async fn stop_is_idempotent() {
        let broker = MemoryBroker::new();
        let mut consumer = Consumer::new(broker.source(), Arc::new(ListenerRegistry::new()), fast());
        consumer.start().await.unwrap();
        consumer.stop().await;
        consumer.stop().await;
        assert_eq!(consumer.state(), ConsumerState::Closed);
        assert_eq!(broker.open_sources(), 0);
    }

    #[tokio::test]
    async fn stop_before_start_closes() {
        let broker = MemoryBroker::new();
        let mut consumer = Consumer::new(broker.source(), Arc::new(ListenerRegistry::new()), fast());
        consumer.stop().await;
        assert_eq!(consumer.state(), ConsumerState::Closed);
        assert!(consumer.start().await.is_err());
    }
}
