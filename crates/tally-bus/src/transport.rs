//! Transport seam between the bus logic and a concrete broker.
//!
//! A [`RecordSource`] is owned by exactly one consumer worker; a
//! [`RecordSink`] is shared by every publishing task. The two are separate
//! so the consumer and the producer never share a connection.

use std::time::Duration;

use tally_types::{EventEnvelope, Topic};

use crate::error::{BusError, DecodeError};

/// Record as it crosses the transport, before topic resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord {
    /// Raw channel (subject) name.
    pub channel: String,
    /// Record key, if the broker delivered one.
    pub key: Option<String>,
    /// Record value.
    pub payload: Vec<u8>,
}

impl RawRecord {
    /// Build a keyed record.
    pub fn new(channel: impl Into<String>, key: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            channel: channel.into(),
            key: Some(key.into()),
            payload: payload.into(),
        }
    }

    /// Decode into an envelope for an already-resolved topic.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::MissingKey`] for a keyless record and
    /// [`DecodeError::InvalidPayload`] for a payload that is not UTF-8.
    pub fn into_envelope(self, topic: Topic) -> Result<EventEnvelope, DecodeError> {
        let Some(key) = self.key else {
            return Err(DecodeError::MissingKey {
                channel: self.channel,
            });
        };
        let payload = String::from_utf8(self.payload).map_err(|source| {
            DecodeError::InvalidPayload {
                channel: self.channel,
                source,
            }
        })?;
        Ok(EventEnvelope::new(topic, key, payload))
    }
}

/// Inbound side of a broker connection.
pub trait RecordSource: Send + 'static {
    /// Subscribe to every channel in `channels`.
    fn open(&mut self, channels: &[&str]) -> impl Future<Output = Result<(), BusError>> + Send;

    /// Wait at most `window` for records and return up to `max_batch` of
    /// them. An empty batch means the window elapsed quietly.
    fn poll(
        &mut self,
        window: Duration,
        max_batch: usize,
    ) -> impl Future<Output = Result<Vec<RawRecord>, BusError>> + Send;

    /// Release subscriptions. Further polls fail.
    fn close(&mut self) -> impl Future<Output = Result<(), BusError>> + Send;
}

/// Outbound side of a broker connection.
pub trait RecordSink: Send + Sync + 'static {
    /// Send one record.
    fn send(&self, record: RawRecord) -> impl Future<Output = Result<(), BusError>> + Send;

    /// Wait until every sent record has left the client.
    fn flush(&self) -> impl Future<Output = Result<(), BusError>> + Send;
}
