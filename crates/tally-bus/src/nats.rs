//! NATS transport.
//!
//! Each [`Topic`](tally_types::Topic) channel name is used verbatim as a
//! NATS subject. The record key travels in the [`KEY_HEADER`] message
//! header; the payload is the record value.
//!
//! [`NatsSource`] and [`NatsSink`] each own a client, so the consumer and
//! the producer hold independent connections.

use std::time::Duration;

use async_nats::{HeaderMap, Message, Subscriber};
use futures::stream::SelectAll;
use futures::{FutureExt as _, StreamExt as _};
use tracing::{debug, info, warn};

use crate::error::BusError;
use crate::transport::{RawRecord, RecordSink, RecordSource};

/// Message header carrying the record key.
pub const KEY_HEADER: &str = "Tally-Key";

async fn connect(url: &str) -> Result<async_nats::Client, BusError> {
    info!(url = url, "connecting to NATS server");
    let client = async_nats::connect(url)
        .await
        .map_err(|e| BusError::Connection {
            url: url.to_owned(),
            message: e.to_string(),
        })?;
    info!("NATS connection established");
    Ok(client)
}

fn record_from(message: Message) -> RawRecord {
    let key = message
        .headers
        .as_ref()
        .and_then(|headers| headers.get(KEY_HEADER))
        .map(|value| value.as_str().to_owned());
    RawRecord {
        channel: message.subject.to_string(),
        key,
        payload: message.payload.to_vec(),
    }
}

// =============================================================================
// Source
// =============================================================================

/// Inbound NATS transport: one subscription per channel, merged into a
/// single stream.
pub struct NatsSource {
    client: async_nats::Client,
    subscriptions: Option<SelectAll<Subscriber>>,
}

impl NatsSource {
    /// Wrap an already-connected client.
    pub const fn new(client: async_nats::Client) -> Self {
        Self {
            client,
            subscriptions: None,
        }
    }

    /// Connect to a NATS server.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::Connection`] if the connection cannot be
    /// established.
    pub async fn connect(url: &str) -> Result<Self, BusError> {
        Ok(Self::new(connect(url).await?))
    }
}

impl RecordSource for NatsSource {
    async fn open(&mut self, channels: &[&str]) -> Result<(), BusError> {
        let mut subscribers = Vec::with_capacity(channels.len());
        for &channel in channels {
            let subscriber = self
                .client
                .subscribe(channel.to_owned())
                .await
                .map_err(|e| BusError::Subscribe {
                    channel: channel.to_owned(),
                    message: e.to_string(),
                })?;
            debug!(channel = channel, "subscribed");
            subscribers.push(subscriber);
        }
        info!(channels = channels.len(), "NATS source open");
        self.subscriptions = Some(futures::stream::select_all(subscribers));
        Ok(())
    }

    async fn poll(&mut self, window: Duration, max_batch: usize) -> Result<Vec<RawRecord>, BusError> {
        let stream = self
            .subscriptions
            .as_mut()
            .ok_or_else(|| BusError::Poll("source is not open".to_owned()))?;

        let first = match tokio::time::timeout(window, stream.next()).await {
            Ok(Some(message)) => message,
            Ok(None) => return Err(BusError::Disconnected),
            Err(_) => return Ok(Vec::new()),
        };

        let mut records = vec![record_from(first)];
        while records.len() < max_batch {
            // Drain whatever is already buffered without waiting again.
            match stream.next().now_or_never() {
                Some(Some(message)) => records.push(record_from(message)),
                Some(None) | None => break,
            }
        }
        Ok(records)
    }

    async fn close(&mut self) -> Result<(), BusError> {
        let Some(subscriptions) = self.subscriptions.take() else {
            return Ok(());
        };
        let mut first_error = None;
        for mut subscriber in subscriptions {
            if let Err(e) = subscriber.unsubscribe().await {
                warn!(error = %e, "failed to unsubscribe");
                first_error.get_or_insert_with(|| BusError::Close(e.to_string()));
            }
        }
        info!("NATS source closed");
        first_error.map_or(Ok(()), Err)
    }
}

impl std::fmt::Debug for NatsSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NatsSource")
            .field("open", &self.subscriptions.is_some())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Sink
// =============================================================================

/// Outbound NATS transport.
#[derive(Clone)]
pub struct NatsSink {
    client: async_nats::Client,
}

impl NatsSink {
    /// Wrap an already-connected client.
    pub const fn new(client: async_nats::Client) -> Self {
        Self { client }
    }

    /// Connect to a NATS server.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::Connection`] if the connection cannot be
    /// established.
    pub async fn connect(url: &str) -> Result<Self, BusError> {
        Ok(Self::new(connect(url).await?))
    }
}

impl RecordSink for NatsSink {
    async fn send(&self, record: RawRecord) -> Result<(), BusError> {
        let RawRecord {
            channel,
            key,
            payload,
        } = record;
        let result = match key {
            Some(key) => {
                let mut headers = HeaderMap::new();
                headers.insert(KEY_HEADER, key.as_str());
                self.client
                    .publish_with_headers(channel.clone(), headers, payload.into())
                    .await
            }
            None => self.client.publish(channel.clone(), payload.into()).await,
        };
        result.map_err(|e| BusError::Publish {
            channel,
            message: e.to_string(),
        })
    }

    async fn flush(&self) -> Result<(), BusError> {
        self.client
            .flush()
            .await
            .map_err(|e| BusError::Flush(e.to_string()))
    }
}

impl std::fmt::Debug for NatsSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NatsSink").finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use tally_types::Topic;

    use super::*;

    // Integration tests that require a live NATS server are marked #[ignore].
    #[tokio::test]
    #[ignore]
    async fn connect_to_nats() {
        assert!(NatsSource::connect("nats://localhost:4222").await.is_ok());
    }

    #[tokio::test]
    #[ignore]
    async fn key_travels_in_header() {
        let mut source = NatsSource::connect("nats://localhost:4222").await.unwrap();
        let sink = NatsSink::connect("nats://localhost:4222").await.unwrap();
        source.open(&[Topic::PlayerPayload.channel()]).await.unwrap();

        sink.send(RawRecord::new(Topic::PlayerPayload.channel(), "entity-1", "{}"))
            .await
            .unwrap();
        sink.flush().await.unwrap();

        let records = source.poll(Duration::from_secs(2), 10).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records.first().unwrap().key.as_deref(), Some("entity-1"));
        source.close().await.unwrap();
    }
}
