//! Error types for the message bus.
//!
//! Uses `thiserror` for typed errors at every seam: transport I/O
//! ([`BusError`]), record decoding ([`DecodeError`]), listener failures
//! ([`HandlerError`]) and producer publishes ([`PublishError`]).

use tally_types::Topic;

/// Errors raised by a transport or by the consumer lifecycle.
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    /// The broker could not be reached.
    #[error("failed to connect to broker at {url}: {message}")]
    Connection {
        /// Broker address.
        url: String,
        /// Underlying client error.
        message: String,
    },

    /// Subscribing to a channel failed.
    #[error("failed to subscribe to {channel}: {message}")]
    Subscribe {
        /// Channel (subject) name.
        channel: String,
        /// Underlying client error.
        message: String,
    },

    /// A poll for records failed.
    #[error("poll failed: {0}")]
    Poll(String),

    /// Every subscription ended; the source will yield nothing further.
    #[error("broker connection closed")]
    Disconnected,

    /// Sending a record failed.
    #[error("failed to publish to {channel}: {message}")]
    Publish {
        /// Channel (subject) name.
        channel: String,
        /// Underlying client error.
        message: String,
    },

    /// Flushing buffered records failed.
    #[error("flush failed: {0}")]
    Flush(String),

    /// Releasing subscriptions or the connection failed.
    #[error("close failed: {0}")]
    Close(String),

    /// An operation was called in a lifecycle state that does not allow it.
    #[error("cannot {operation} in state {state}")]
    InvalidState {
        /// The rejected operation.
        operation: &'static str,
        /// The state it was attempted in.
        state: String,
    },
}

/// A raw record that cannot become an event envelope.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// The record carried no key.
    #[error("record on {channel} has no key")]
    MissingKey {
        /// Channel the record arrived on.
        channel: String,
    },

    /// The payload is not valid UTF-8.
    #[error("record on {channel} has a non UTF-8 payload: {source}")]
    InvalidPayload {
        /// Channel the record arrived on.
        channel: String,
        /// Where decoding stopped.
        source: std::string::FromUtf8Error,
    },
}

/// A listener's report that it could not handle an event.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct HandlerError(pub String);

impl HandlerError {
    /// Build an error from any message.
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// A failed [`Producer::publish`](crate::Producer::publish).
#[derive(Debug, thiserror::Error)]
#[error("publish of {key} on {topic} failed: {source}")]
pub struct PublishError {
    /// Target topic.
    pub topic: Topic,
    /// Record key.
    pub key: String,
    /// Transport failure.
    #[source]
    pub source: BusError,
}
