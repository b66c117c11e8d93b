//! Decoded broker event handed to listeners.

use serde::{Deserialize, Serialize};

use crate::enums::Topic;

/// An inbound broker record after topic resolution and decoding.
///
/// Envelopes are immutable once built; listeners receive them by reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEnvelope {
    topic: Topic,
    key: String,
    payload: String,
}

impl EventEnvelope {
    /// Build an envelope from its parts.
    pub fn new(topic: Topic, key: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            topic,
            key: key.into(),
            payload: payload.into(),
        }
    }

    /// The resolved topic.
    pub const fn topic(&self) -> Topic {
        self.topic
    }

    /// The record key (an entity id for both current topics).
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The record value.
    pub fn payload(&self) -> &str {
        &self.payload
    }
}
