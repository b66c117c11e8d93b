//! Snapshot wire encoding.
//!
//! Snapshots travel as UTF-8 record values. [`JsonCodec`] is the default
//! and only shipped encoding; the [`SnapshotCodec`] seam lets tests and
//! alternative deployments swap it.

use tally_types::Snapshot;

/// Failure to encode or decode a snapshot.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The snapshot could not be serialized.
    #[error("failed to encode snapshot: {0}")]
    Encode(#[source] serde_json::Error),

    /// The payload is not a valid snapshot.
    #[error("failed to decode snapshot: {0}")]
    Decode(#[source] serde_json::Error),
}

/// Converts snapshots to and from record payloads.
pub trait SnapshotCodec: Send + Sync {
    /// Encode a snapshot as a record payload.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Encode`] if serialization fails.
    fn encode(&self, snapshot: &Snapshot) -> Result<String, CodecError>;

    /// Decode a record payload.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Decode`] if the payload is not a snapshot.
    fn decode(&self, payload: &str) -> Result<Snapshot, CodecError>;
}

/// JSON encoding via `serde_json`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl SnapshotCodec for JsonCodec {
    fn encode(&self, snapshot: &Snapshot) -> Result<String, CodecError> {
        serde_json::to_string(snapshot).map_err(CodecError::Encode)
    }

    fn decode(&self, payload: &str) -> Result<Snapshot, CodecError> {
        serde_json::from_str(payload).map_err(CodecError::Decode)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use tally_types::{EntityKey, Progression};

    use super::*;

    #[test]
    fn json_snapshot_survives_the_wire() {
        let mut snapshot = Snapshot::empty(EntityKey::new(), "alpha");
        snapshot.play_time.total_ticks = 72_000;
        snapshot.progression = Some(Progression { level: 3, points: 1, total: 40 });
        let payload = JsonCodec.encode(&snapshot).unwrap();
        assert_eq!(JsonCodec.decode(&payload).unwrap(), snapshot);
    }

    #[test]
    fn garbage_is_a_decode_error() {
        assert!(matches!(JsonCodec.decode("{not json"), Err(CodecError::Decode(_))));
        assert!(matches!(JsonCodec.decode("{}"), Err(CodecError::Decode(_))));
    }
}
