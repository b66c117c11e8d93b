//! Error types for the cold tier.
//!
//! These errors never escape a [`TieredCache`](crate::TieredCache) operation;
//! they are logged at the point of failure and the entry degrades to
//! hot-only. Only [`CacheStore::open`](crate::CacheStore::open) returns them
//! to a caller.

/// Errors that can occur in cold-tier storage.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// A `sled` operation failed.
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    /// A value could not be encoded for the cold tier.
    #[error("encode error in region {region}: {source}")]
    Encode {
        /// The region the value was bound for.
        region: String,
        /// The underlying JSON error.
        source: serde_json::Error,
    },

    /// A stored value could not be decoded.
    #[error("decode error in region {region}: {source}")]
    Decode {
        /// The region the value was read from.
        region: String,
        /// The underlying JSON error.
        source: serde_json::Error,
    },

    /// Writing the value would exceed the region's byte budget.
    #[error("region {region} is full ({used} of {budget} bytes used, {requested} requested)")]
    CapacityExceeded {
        /// The region that is full.
        region: String,
        /// Bytes currently in use.
        used: u64,
        /// The configured budget.
        budget: u64,
        /// Bytes the write would add.
        requested: u64,
    },

    /// The cache has no cold region (store disabled or region failed to open).
    #[error("region {0} has no cold tier")]
    NoColdTier(String),
}
