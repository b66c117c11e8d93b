//! In-process broker with the same contract as the NATS transport.
//!
//! Every record sent through a [`MemorySink`] (or [`MemoryBroker::deliver`])
//! is copied to every open [`MemorySource`], whatever its channel; the
//! consumer's topic resolution does the filtering.
//!
//! Intended for tests only: the broker keeps a log of every delivered record
//! until [`MemoryBroker::take_published`] drains it.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::BusError;
use crate::transport::{RawRecord, RecordSink, RecordSource};

#[derive(Debug, Default)]
struct BrokerState {
    subscribers: Vec<mpsc::UnboundedSender<RawRecord>>,
    published: Vec<RawRecord>,
}

/// Shared in-memory broker. Cloning is cheap; clones share state.
#[derive(Debug, Clone, Default)]
pub struct MemoryBroker {
    state: Arc<Mutex<BrokerState>>,
}

impl MemoryBroker {
    /// Create an empty broker.
    pub fn new() -> Self {
        Self::default()
    }

    /// A new, unopened source attached to this broker.
    pub fn source(&self) -> MemorySource {
        MemorySource {
            broker: self.clone(),
            receiver: None,
        }
    }

    /// A sink publishing into this broker.
    pub fn sink(&self) -> MemorySink {
        MemorySink {
            broker: self.clone(),
        }
    }

    /// Deliver `record` to every open source and remember it.
    pub fn deliver(&self, record: RawRecord) {
        let mut state = self.state.lock();
        state
            .subscribers
            .retain(|subscriber| subscriber.send(record.clone()).is_ok());
        state.published.push(record);
    }

    /// Every record delivered so far, in order.
    pub fn published(&self) -> Vec<RawRecord> {
        self.state.lock().published.clone()
    }

    /// Drain and return every record delivered since the last drain.
    pub fn take_published(&self) -> Vec<RawRecord> {
        std::mem::take(&mut self.state.lock().published)
    }

    /// Number of currently open sources.
    pub fn open_sources(&self) -> usize {
        self.state
            .lock()
            .subscribers
            .iter()
            .filter(|subscriber| !subscriber.is_closed())
            .count()
    }
}

/// Inbound side of a [`MemoryBroker`].
#[derive(Debug)]
pub struct MemorySource {
    broker: MemoryBroker,
    receiver: Option<mpsc::UnboundedReceiver<RawRecord>>,
}

impl RecordSource for MemorySource {
    async fn open(&mut self, channels: &[&str]) -> Result<(), BusError> {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.broker.state.lock().subscribers.push(sender);
        self.receiver = Some(receiver);
        debug!(channels = channels.len(), "memory source open");
        Ok(())
    }

    async fn poll(&mut self, window: Duration, max_batch: usize) -> Result<Vec<RawRecord>, BusError> {
        let receiver = self
            .receiver
            .as_mut()
            .ok_or_else(|| BusError::Poll("source is not open".to_owned()))?;

        let first = match tokio::time::timeout(window, receiver.recv()).await {
            Ok(Some(record)) => record,
            Ok(None) => return Err(BusError::Disconnected),
            Err(_) => return Ok(Vec::new()),
        };

        let mut records = vec![first];
        while records.len() < max_batch {
            match receiver.try_recv() {
                Ok(record) => records.push(record),
                Err(_) => break,
            }
        }
        Ok(records)
    }

    async fn close(&mut self) -> Result<(), BusError> {
        if let Some(mut receiver) = self.receiver.take() {
            receiver.close();
        }
        Ok(())
    }
}

/// Outbound side of a [`MemoryBroker`].
#[derive(Debug, Clone)]
pub struct MemorySink {
    broker: MemoryBroker,
}

impl RecordSink for MemorySink {
    async fn send(&self, record: RawRecord) -> Result<(), BusError> {
        self.broker.deliver(record);
        Ok(())
    }

    async fn flush(&self) -> Result<(), BusError> {
        Ok(())
    }
}
