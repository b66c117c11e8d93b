//! Type-safe identifier wrapper around [`Uuid`].
//!
//! Every tracked entity (a player, in the usual deployment) is addressed by
//! an [`EntityKey`]. The key doubles as the cache key in every tracker and as
//! the message key on the broker, where it travels in its canonical
//! hyphenated string form.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier of one tracked entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityKey(pub Uuid);

impl EntityKey {
    /// Create a new key using UUID v7 (time-ordered).
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Return the inner [`Uuid`] value.
    pub const fn into_inner(self) -> Uuid {
        self.0
    }
}

impl Default for EntityKey {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for EntityKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for EntityKey {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl From<EntityKey> for Uuid {
    fn from(key: EntityKey) -> Self {
        key.0
    }
}

/// Error returned when a broker key is not a valid entity identifier.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid entity key {input:?}: {reason}")]
pub struct ParseEntityKeyError {
    /// The rejected input.
    pub input: String,
    /// Why the UUID parser rejected it.
    pub reason: String,
}

impl FromStr for EntityKey {
    type Err = ParseEntityKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|e| ParseEntityKeyError {
                input: s.to_owned(),
                reason: e.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_and_parse_agree() {
        let key = EntityKey::new();
        let parsed: Result<EntityKey, _> = key.to_string().parse();
        assert_eq!(parsed, Ok(key));
    }

    #[test]
    fn parse_rejects_garbage() {
        let parsed = "not-a-uuid".parse::<EntityKey>();
        assert!(parsed.is_err());
    }

    #[test]
    fn serializes_as_bare_uuid_string() {
        let key = EntityKey::from(Uuid::nil());
        let json = serde_json::to_string(&key).unwrap_or_default();
        assert_eq!(json, "\"00000000-0000-0000-0000-000000000000\"");
    }
}
