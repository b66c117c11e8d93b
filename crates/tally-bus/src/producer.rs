//! Keyed publishing onto broker topics.

use tally_types::Topic;
use tracing::{debug, warn};

use crate::error::{BusError, PublishError};
use crate::transport::{RawRecord, RecordSink};

/// Publishes keyed records. Safe to share across tasks; every method takes
/// `&self`.
#[derive(Debug)]
pub struct Producer<K: RecordSink> {
    sink: K,
}

impl<K: RecordSink> Producer<K> {
    /// Wrap a sink.
    pub const fn new(sink: K) -> Self {
        Self { sink }
    }

    /// Publish `payload` on `topic` under `key`.
    ///
    /// Delivery is at-least-once; a retry after an ambiguous failure may
    /// duplicate the record.
    ///
    /// # Errors
    ///
    /// Returns [`PublishError`] if the transport rejects the record.
    pub async fn publish(&self, topic: Topic, key: &str, payload: &str) -> Result<(), PublishError> {
        let record = RawRecord::new(topic.channel(), key, payload);
        match self.sink.send(record).await {
            Ok(()) => {
                debug!(topic = %topic, key = key, bytes = payload.len(), "published");
                Ok(())
            }
            Err(source) => {
                warn!(topic = %topic, key = key, error = %source, "publish failed");
                Err(PublishError {
                    topic,
                    key: key.to_owned(),
                    source,
                })
            }
        }
    }

    /// Wait until every published record has left the client.
    ///
    /// # Errors
    ///
    /// Returns the transport's flush error.
    pub async fn flush(&self) -> Result<(), BusError> {
        self.sink.flush().await
    }

    /// The underlying sink.
    pub const fn sink(&self) -> &K {
        &self.sink
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use crate::memory::MemoryBroker;

    use super::*;

    #[tokio::test]
    async fn publish_keys_record_on_topic_channel() {
        let broker = MemoryBroker::new();
        let producer = Producer::new(broker.sink());
        producer.publish(Topic::PlayerPayload, "entity", "{\"a\":1}").await.unwrap();
        producer.flush().await.unwrap();

        let published = broker.published();
        assert_eq!(published.len(), 1);
        let record = published.first().unwrap();
        assert_eq!(record.channel, "player-payload");
        assert_eq!(record.key.as_deref(), Some("entity"));
        assert_eq!(record.payload, b"{\"a\":1}");
    }

    struct Refusing;

    impl RecordSink for Refusing {
        async fn send(&self, record: RawRecord) -> Result<(), BusError> {
            Err(BusError::Publish {
                channel: record.channel,
                message: "broker unavailable".to_owned(),
            })
        }

        async fn flush(&self) -> Result<(), BusError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn failures_surface_to_caller() {
        let producer = Producer::new(Refusing);
        let err = producer.publish(Topic::SyncRequest, "*", "").await.unwrap_err();
        assert_eq!(err.topic, Topic::SyncRequest);
        assert_eq!(err.key, "*");
    }
}
