//! Byte encoding for cache keys.
//!
//! `sled` keys are raw bytes, so every key type stored in a
//! [`TieredCache`](crate::TieredCache) must round-trip through a byte form.

use std::hash::Hash;

use tally_types::EntityKey;
use uuid::Uuid;

/// A key that can be stored in both cache tiers.
pub trait CacheKey: Clone + Eq + Hash + Send + core::fmt::Debug {
    /// Encode the key for the cold tier.
    fn to_key_bytes(&self) -> Vec<u8>;

    /// Decode a key read back from the cold tier. Returns `None` for bytes
    /// that were not produced by [`CacheKey::to_key_bytes`].
    fn from_key_bytes(bytes: &[u8]) -> Option<Self>;
}

impl CacheKey for Uuid {
    fn to_key_bytes(&self) -> Vec<u8> {
        self.as_bytes().to_vec()
    }

    fn from_key_bytes(bytes: &[u8]) -> Option<Self> {
        Self::from_slice(bytes).ok()
    }
}

impl CacheKey for EntityKey {
    fn to_key_bytes(&self) -> Vec<u8> {
        self.0.to_key_bytes()
    }

    fn from_key_bytes(bytes: &[u8]) -> Option<Self> {
        Uuid::from_key_bytes(bytes).map(Self)
    }
}

impl CacheKey for String {
    fn to_key_bytes(&self) -> Vec<u8> {
        self.as_bytes().to_vec()
    }

    fn from_key_bytes(bytes: &[u8]) -> Option<Self> {
        std::str::from_utf8(bytes).ok().map(str::to_owned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_key_round_trips() {
        let key = EntityKey::new();
        assert_eq!(EntityKey::from_key_bytes(&key.to_key_bytes()), Some(key));
    }

    #[test]
    fn entity_key_rejects_wrong_length() {
        assert_eq!(EntityKey::from_key_bytes(b"short"), None);
    }

    #[test]
    fn string_rejects_invalid_utf8() {
        assert_eq!(String::from_key_bytes(&[0xff, 0xfe]), None);
    }
}
