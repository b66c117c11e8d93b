//! Enumeration types for the Tally state tracker.
//!
//! [`Topic`] is the closed set of broker channels the service understands.
//! [`Aspect`] names the five tracked facets of an entity's state, and
//! [`InteractionKind`] classifies block interactions.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Broker topics
// ---------------------------------------------------------------------------

/// A logical channel on the message broker.
///
/// Every inbound record's raw channel name maps to at most one topic by
/// case-insensitive exact match. Names that match nothing are dropped by the
/// consumer rather than treated as errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Topic {
    /// Full entity snapshots, published on every synchronization cycle and
    /// applied when received from another origin.
    PlayerPayload,
    /// Requests to publish one entity (key = entity id) or all entities
    /// (key = `*`) outside the regular schedule.
    SyncRequest,
}

impl Topic {
    /// Every topic, in declaration order. The consumer subscribes to all of
    /// them on start.
    pub const ALL: [Self; 2] = [Self::PlayerPayload, Self::SyncRequest];

    /// The raw channel (subject) name on the broker.
    pub const fn channel(self) -> &'static str {
        match self {
            Self::PlayerPayload => "player-payload",
            Self::SyncRequest => "sync-request",
        }
    }

    /// Resolve a raw channel name to a topic.
    ///
    /// Matching is case-insensitive and exact: no wildcards, no prefixes,
    /// no surrounding whitespace tolerance.
    pub fn resolve(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|topic| topic.channel().eq_ignore_ascii_case(name))
    }
}

impl core::fmt::Display for Topic {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.channel())
    }
}

// ---------------------------------------------------------------------------
// Tracked aspects
// ---------------------------------------------------------------------------

/// One facet of entity state, owned by exactly one tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Aspect {
    /// Accumulated time on the server plus the current session window.
    PlayTime,
    /// Last sampled position.
    Movement,
    /// Latest block interaction and the running interaction count.
    BlockInteraction,
    /// Last bed (respawn) location.
    Bed,
    /// Experience level and points.
    Progression,
}

impl Aspect {
    /// Every aspect, in the order trackers are constructed.
    pub const ALL: [Self; 5] = [
        Self::PlayTime,
        Self::Movement,
        Self::BlockInteraction,
        Self::Bed,
        Self::Progression,
    ];

    /// Stable name used in logs.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PlayTime => "play_time",
            Self::Movement => "movement",
            Self::BlockInteraction => "block_interaction",
            Self::Bed => "bed",
            Self::Progression => "progression",
        }
    }
}

impl core::fmt::Display for Aspect {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Block interactions
// ---------------------------------------------------------------------------

/// What an entity did to a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InteractionKind {
    /// The block was broken.
    Break,
    /// The block was placed.
    Place,
    /// The block was used (opened, pressed, activated).
    Use,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_is_case_insensitive() {
        assert_eq!(Topic::resolve("Player-Payload"), Some(Topic::PlayerPayload));
        assert_eq!(Topic::resolve("player-payload"), Some(Topic::PlayerPayload));
        assert_eq!(Topic::resolve("SYNC-REQUEST"), Some(Topic::SyncRequest));
    }

    #[test]
    fn resolve_drops_unknown_channels() {
        assert_eq!(Topic::resolve("unknown-channel"), None);
        assert_eq!(Topic::resolve("player-payload.extra"), None);
        assert_eq!(Topic::resolve(" player-payload"), None);
        assert_eq!(Topic::resolve(""), None);
    }

    #[test]
    fn channels_are_distinct() {
        assert_ne!(
            Topic::PlayerPayload.channel(),
            Topic::SyncRequest.channel()
        );
    }
}
