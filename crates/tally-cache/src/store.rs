//! `sled` database handle and per-region cold storage.
//!
//! A [`CacheStore`] owns one `sled` database rooted under the host's data
//! directory. Each tracker aspect gets its own named tree (a [`ColdRegion`])
//! with a fixed byte budget, so one noisy aspect cannot starve the others.
//!
//! # Regions
//!
//! | Region | Value |
//! |--------|-------|
//! | `play_times` | accumulated tick count |
//! | `session_windows` | login/logout window |
//! | `movements` | encoded last position |
//! | `beds` | encoded bed location |
//! | `progression` | `(level, points, total)` |
//! | `block_interactions` | latest interaction + count |

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{error, info, warn};

use crate::error::CacheError;
use crate::key::CacheKey;
use crate::tiered::TieredCache;

/// Default cold-tier byte budget per region (5 GiB).
pub const DEFAULT_COLD_BUDGET_BYTES: u64 = 5 * 1024 * 1024 * 1024;

fn byte_len(len: usize) -> u64 {
    u64::try_from(len).unwrap_or(u64::MAX)
}

/// Handle to the cold-tier database.
///
/// Cloning is cheap; clones share the same underlying `sled` database.
#[derive(Clone)]
pub struct CacheStore {
    db: Option<sled::Db>,
    cold_budget_bytes: u64,
}

impl CacheStore {
    /// Open (or create) the cold-tier database at `dir`.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Sled`] if the database cannot be opened, e.g.
    /// because another process holds its lock.
    pub fn open(dir: &Path, cold_budget_bytes: u64) -> Result<Self, CacheError> {
        let db = sled::Config::new().path(dir).open()?;
        info!(
            path = %dir.display(),
            recovered = db.was_recovered(),
            cold_budget_bytes,
            "cache store opened"
        );
        Ok(Self {
            db: Some(db),
            cold_budget_bytes,
        })
    }

    /// Open a throwaway database that is deleted when the last handle drops.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Sled`] if the temporary database cannot be
    /// created.
    pub fn temporary(cold_budget_bytes: u64) -> Result<Self, CacheError> {
        let db = sled::Config::new().temporary(true).open()?;
        Ok(Self {
            db: Some(db),
            cold_budget_bytes,
        })
    }

    /// A store with no cold tier. Every cache built from it is hot-only.
    pub const fn disabled() -> Self {
        Self {
            db: None,
            cold_budget_bytes: 0,
        }
    }

    /// Whether caches built from this store have a cold tier.
    pub const fn is_durable(&self) -> bool {
        self.db.is_some()
    }

    /// Open the named cold region with the store's default byte budget.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::NoColdTier`] for a disabled store, or
    /// [`CacheError::Sled`] if the tree cannot be opened or scanned.
    pub fn region(&self, name: &str) -> Result<ColdRegion, CacheError> {
        self.region_with_budget(name, self.cold_budget_bytes)
    }

    /// Open the named cold region with an explicit byte budget.
    ///
    /// # Errors
    ///
    /// Same as [`CacheStore::region`].
    pub fn region_with_budget(&self, name: &str, budget: u64) -> Result<ColdRegion, CacheError> {
        let db = self
            .db
            .as_ref()
            .ok_or_else(|| CacheError::NoColdTier(name.to_owned()))?;
        let tree = db.open_tree(name)?;
        ColdRegion::new(name, tree, budget)
    }

    /// Build a tiered cache over the named region.
    ///
    /// Never fails: if the region cannot be opened the cache runs hot-only
    /// and the failure is logged.
    pub fn cache<K, V>(&self, name: &str, hot_capacity: usize) -> TieredCache<K, V>
    where
        K: CacheKey,
        V: Clone + Serialize + DeserializeOwned,
    {
        self.cache_with_budget(name, hot_capacity, self.cold_budget_bytes)
    }

    /// Build a tiered cache over the named region with an explicit cold
    /// byte budget.
    pub fn cache_with_budget<K, V>(
        &self,
        name: &str,
        hot_capacity: usize,
        budget: u64,
    ) -> TieredCache<K, V>
    where
        K: CacheKey,
        V: Clone + Serialize + DeserializeOwned,
    {
        if self.db.is_none() {
            warn!(region = name, "cache store disabled, region runs hot-only");
            return TieredCache::new(name, hot_capacity, None);
        }
        match self.region_with_budget(name, budget) {
            Ok(region) => TieredCache::new(name, hot_capacity, Some(region)),
            Err(e) => {
                error!(region = name, error = %e, "failed to open cold region, running hot-only");
                TieredCache::new(name, hot_capacity, None)
            }
        }
    }

    /// Flush every region to disk.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Sled`] if the flush fails.
    pub fn flush(&self) -> Result<(), CacheError> {
        if let Some(db) = &self.db {
            db.flush()?;
        }
        Ok(())
    }
}

impl core::fmt::Debug for CacheStore {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CacheStore")
            .field("durable", &self.db.is_some())
            .field("cold_budget_bytes", &self.cold_budget_bytes)
            .finish()
    }
}

/// One named cold-tier region.
///
/// Writes are expected to be serialized by the owning
/// [`TieredCache`](crate::TieredCache); byte accounting assumes a single
/// writer per region.
pub struct ColdRegion {
    name: String,
    tree: sled::Tree,
    budget: u64,
    used: AtomicU64,
}

impl ColdRegion {
    /// Wrap an opened tree, scanning it once to account for existing bytes.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Sled`] if the scan fails.
    pub fn new(name: &str, tree: sled::Tree, budget: u64) -> Result<Self, CacheError> {
        let mut used: u64 = 0;
        for item in tree.iter() {
            let (k, v) = item?;
            used = used
                .saturating_add(byte_len(k.len()))
                .saturating_add(byte_len(v.len()));
        }
        info!(
            region = name,
            entries = tree.len(),
            used_bytes = used,
            budget_bytes = budget,
            "cold region opened"
        );
        Ok(Self {
            name: name.to_owned(),
            tree,
            budget,
            used: AtomicU64::new(used),
        })
    }

    /// Region name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Bytes currently stored (keys + values).
    pub fn used_bytes(&self) -> u64 {
        self.used.load(Ordering::Acquire)
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.tree.len()
    }

    /// Whether the region holds no entries.
    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    /// Read the raw value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Sled`] on I/O failure.
    pub fn read(&self, key: &[u8]) -> Result<Option<Vec<u8>>, CacheError> {
        Ok(self.tree.get(key)?.map(|v| v.to_vec()))
    }

    /// Whether `key` is stored.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Sled`] on I/O failure.
    pub fn contains(&self, key: &[u8]) -> Result<bool, CacheError> {
        Ok(self.tree.contains_key(key)?)
    }

    /// Store `value` under `key`, enforcing the byte budget.
    ///
    /// Overwrites that shrink or keep the entry's size always succeed, even
    /// on a full region.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::CapacityExceeded`] if the write would grow the
    /// region past its budget, or [`CacheError::Sled`] on I/O failure.
    pub fn write(&self, key: &[u8], value: &[u8]) -> Result<(), CacheError> {
        let new_len = byte_len(key.len()).saturating_add(byte_len(value.len()));
        let old_len = self
            .tree
            .get(key)?
            .map_or(0, |v| byte_len(key.len()).saturating_add(byte_len(v.len())));
        let used = self.used_bytes();
        let projected = used.saturating_sub(old_len).saturating_add(new_len);
        if new_len > old_len && projected > self.budget {
            return Err(CacheError::CapacityExceeded {
                region: self.name.clone(),
                used,
                budget: self.budget,
                requested: new_len.saturating_sub(old_len),
            });
        }
        self.tree.insert(key, value)?;
        self.used.store(projected, Ordering::Release);
        Ok(())
    }

    /// Delete `key`, releasing its bytes from the budget. Returns whether
    /// an entry was removed.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Sled`] on I/O failure.
    pub fn remove(&self, key: &[u8]) -> Result<bool, CacheError> {
        let Some(old) = self.tree.remove(key)? else {
            return Ok(false);
        };
        let freed = byte_len(key.len()).saturating_add(byte_len(old.len()));
        self.used
            .store(self.used_bytes().saturating_sub(freed), Ordering::Release);
        Ok(true)
    }

    /// Every stored key, in byte order.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Sled`] if the scan fails.
    pub fn keys(&self) -> Result<Vec<Vec<u8>>, CacheError> {
        self.tree
            .iter()
            .keys()
            .map(|k| k.map(|k| k.to_vec()).map_err(CacheError::from))
            .collect()
    }

    /// Flush pending writes for this region to disk.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Sled`] if the flush fails.
    pub fn flush(&self) -> Result<(), CacheError> {
        self.tree.flush()?;
        Ok(())
    }
}

impl core::fmt::Debug for ColdRegion {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ColdRegion")
            .field("name", &self.name)
            .field("used_bytes", &self.used_bytes())
            .field("budget", &self.budget)
            .finish_non_exhaustive()
    }
}
