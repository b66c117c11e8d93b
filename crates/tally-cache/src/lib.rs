//! Tiered cache for the Tally state tracker (in-memory LRU + `sled`).
//!
//! The hot tier is a bounded in-memory map with least-recently-used
//! demotion. The cold tier is a `sled` tree per region under the host's data
//! directory, with a fixed byte budget. Every tracker owns one or two
//! [`TieredCache`] instances carved out of a shared [`CacheStore`].
//!
//! # Architecture
//!
//! ```text
//! put(k, v) --> cold region (sled, lazily flushed) --> hot tier (LRU)
//!                                                        |
//!                               over capacity? demote LRU entry
//!
//! get(k) --> hot tier hit? --> value
//!               |
//!               +-- miss --> cold region --> promote into hot tier
//! ```
//!
//! Cold-tier failures never reach the caller: they are logged and the
//! affected entry is kept hot-only until it can be written.
//!
//! # Modules
//!
//! - [`key`] -- Byte encoding for cache keys
//! - [`store`] -- `sled` database handle and per-region cold storage
//! - [`tiered`] -- The two-tier cache itself
//! - [`error`] -- Cold-tier error types

pub mod error;
pub mod key;
pub mod store;
pub mod tiered;

// Re-export primary types for convenience.
pub use error::CacheError;
pub use key::CacheKey;
pub use store::{CacheStore, ColdRegion, DEFAULT_COLD_BUDGET_BYTES};
pub use tiered::TieredCache;
