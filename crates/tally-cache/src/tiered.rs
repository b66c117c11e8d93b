//! The two-tier cache.
//!
//! [`TieredCache`] keeps at most `hot_capacity` entries in memory and writes
//! every value through to its [`ColdRegion`]. When the hot tier overflows,
//! the least-recently-used entry is demoted (dropped from memory; it is
//! already durable). A `get` for a demoted key promotes it back.
//!
//! # Locking
//!
//! One mutex guards the hot tier and serializes cold writes for the cache.
//! That gives last-write-wins across both tiers and lets [`TieredCache::update`]
//! perform read-modify-write without lost updates. Lock hold time is one
//! in-memory map operation plus at most one buffered `sled` write per
//! demotion.

use std::collections::{BTreeMap, HashMap};

use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, error, trace, warn};

use crate::error::CacheError;
use crate::key::CacheKey;
use crate::store::ColdRegion;

/// A hot-tier slot.
struct HotEntry<V> {
    value: V,
    /// Recency stamp; the smallest stamp is the LRU entry.
    stamp: u64,
    /// Whether the value is known to be in the cold tier.
    durable: bool,
}

/// Bounded in-memory map with LRU ordering.
struct HotTier<K, V> {
    capacity: usize,
    entries: HashMap<K, HotEntry<V>>,
    recency: BTreeMap<u64, K>,
    clock: u64,
}

impl<K: CacheKey, V> HotTier<K, V> {
    fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: HashMap::new(),
            recency: BTreeMap::new(),
            clock: 0,
        }
    }

    fn next_stamp(&mut self) -> u64 {
        self.clock = self.clock.wrapping_add(1);
        self.clock
    }

    /// Look up `key` and mark it most recently used.
    fn touch(&mut self, key: &K) -> Option<&V> {
        let stamp = self.next_stamp();
        let entry = self.entries.get_mut(key)?;
        self.recency.remove(&entry.stamp);
        entry.stamp = stamp;
        self.recency.insert(stamp, key.clone());
        Some(&entry.value)
    }

    fn contains(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    /// Insert or overwrite `key`, returning the entries pushed out by the
    /// capacity bound, least recently used first.
    fn insert(&mut self, key: K, value: V, durable: bool) -> Vec<(K, HotEntry<V>)> {
        let stamp = self.next_stamp();
        if let Some(old) = self.entries.insert(
            key.clone(),
            HotEntry {
                value,
                stamp,
                durable,
            },
        ) {
            self.recency.remove(&old.stamp);
        }
        self.recency.insert(stamp, key);

        let mut evicted = Vec::new();
        while self.entries.len() > self.capacity {
            match self.pop_lru() {
                Some(victim) => evicted.push(victim),
                None => break,
            }
        }
        evicted
    }

    fn pop_lru(&mut self) -> Option<(K, HotEntry<V>)> {
        let (_, key) = self.recency.pop_first()?;
        let entry = self.entries.remove(&key)?;
        Some((key, entry))
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Bounded key/value store with an in-memory hot tier and a durable cold
/// tier.
///
/// - `put` always succeeds and is visible to the next `get` immediately.
/// - Values survive demotion and process restarts through the cold tier.
/// - Cold-tier failures are logged, never returned; the entry stays hot-only
///   and any older cold copy is dropped. A hot-only entry that is later
///   evicted reads as unknown, never as a superseded value.
pub struct TieredCache<K, V> {
    name: String,
    hot: Mutex<HotTier<K, V>>,
    cold: Option<ColdRegion>,
}

impl<K, V> TieredCache<K, V>
where
    K: CacheKey,
    V: Clone + Serialize + DeserializeOwned,
{
    /// Build a cache named `name` holding at most `hot_capacity` entries in
    /// memory (minimum 1). With `cold = None` the cache is hot-only and
    /// demoted entries are lost.
    pub fn new(name: &str, hot_capacity: usize, cold: Option<ColdRegion>) -> Self {
        Self {
            name: name.to_owned(),
            hot: Mutex::new(HotTier::new(hot_capacity)),
            cold,
        }
    }

    /// Cache (region) name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the cache has a cold tier.
    pub const fn is_durable(&self) -> bool {
        self.cold.is_some()
    }

    /// Read the value for `key`, promoting it from the cold tier if needed.
    ///
    /// Returns `None` when the key is in neither tier (or the cold read
    /// failed, which is logged).
    pub fn get(&self, key: &K) -> Option<V> {
        let mut hot = self.hot.lock();
        if let Some(value) = hot.touch(key) {
            return Some(value.clone());
        }
        let value = self.read_cold(key)?;
        trace!(cache = %self.name, ?key, "promoted from cold tier");
        self.admit(&mut hot, key.clone(), value.clone(), true);
        Some(value)
    }

    /// Store `value` under `key`, overwriting any previous value.
    pub fn put(&self, key: K, value: V) {
        let mut hot = self.hot.lock();
        let durable = self.write_cold(&key, &value);
        self.admit(&mut hot, key, value, durable);
    }

    /// Atomically replace the value for `key` with `f(current)`.
    ///
    /// `current` is `None` when the key is unknown. The closure runs under
    /// the cache lock, so concurrent updates to the same cache never lose
    /// writes. Returns the stored value.
    pub fn update<F>(&self, key: K, f: F) -> V
    where
        F: FnOnce(Option<V>) -> V,
    {
        let mut hot = self.hot.lock();
        let current = match hot.touch(&key) {
            Some(value) => Some(value.clone()),
            None => self.read_cold(&key),
        };
        let next = f(current);
        let durable = self.write_cold(&key, &next);
        self.admit(&mut hot, key, next.clone(), durable);
        next
    }

    /// Atomically replace the value for `key` with `f(current)`, only if the
    /// key is known. Returns the stored value, or `None` (and writes
    /// nothing) for an unknown key.
    pub fn update_present<F>(&self, key: K, f: F) -> Option<V>
    where
        F: FnOnce(V) -> V,
    {
        let mut hot = self.hot.lock();
        let current = match hot.touch(&key) {
            Some(value) => value.clone(),
            None => self.read_cold(&key)?,
        };
        let next = f(current);
        let durable = self.write_cold(&key, &next);
        self.admit(&mut hot, key, next.clone(), durable);
        Some(next)
    }

    /// Whether `key` is present in either tier. Does not change recency.
    pub fn contains(&self, key: &K) -> bool {
        if self.hot.lock().contains(key) {
            return true;
        }
        let Some(cold) = &self.cold else {
            return false;
        };
        match cold.contains(&key.to_key_bytes()) {
            Ok(found) => found,
            Err(e) => {
                warn!(cache = %self.name, ?key, error = %e, "cold lookup failed");
                false
            }
        }
    }

    /// Whether `key` is currently resident in the hot tier.
    pub fn is_hot(&self, key: &K) -> bool {
        self.hot.lock().contains(key)
    }

    /// Number of entries resident in the hot tier.
    pub fn hot_len(&self) -> usize {
        self.hot.lock().len()
    }

    /// Every known key across both tiers, deduplicated.
    pub fn keys(&self) -> Vec<K> {
        let mut keys: Vec<K> = self.hot.lock().entries.keys().cloned().collect();
        if let Some(cold) = &self.cold {
            match cold.keys() {
                Ok(raw) => {
                    for bytes in raw {
                        match K::from_key_bytes(&bytes) {
                            Some(key) => keys.push(key),
                            None => warn!(cache = %self.name, "skipping undecodable cold key"),
                        }
                    }
                }
                Err(e) => warn!(cache = %self.name, error = %e, "cold key scan failed"),
            }
        }
        let mut seen = std::collections::HashSet::with_capacity(keys.len());
        keys.retain(|k| seen.insert(k.clone()));
        keys
    }

    /// Flush the cold tier to disk. Failures are logged.
    pub fn flush(&self) {
        if let Some(cold) = &self.cold {
            if let Err(e) = cold.flush() {
                warn!(cache = %self.name, error = %e, "cold flush failed");
            }
        }
    }

    // =========================================================================
    // Tier plumbing
    // =========================================================================

    fn admit(&self, hot: &mut HotTier<K, V>, key: K, value: V, durable: bool) {
        for (victim, entry) in hot.insert(key, value, durable) {
            self.demote(&victim, &entry);
        }
    }

    /// Handle an entry pushed out of the hot tier. Durable entries are
    /// already in the cold tier; others get one more write attempt.
    fn demote(&self, key: &K, entry: &HotEntry<V>) {
        if entry.durable {
            trace!(cache = %self.name, ?key, "demoted to cold tier");
            return;
        }
        if self.write_cold(key, &entry.value) {
            debug!(cache = %self.name, ?key, "demoted after deferred cold write");
        } else {
            error!(
                cache = %self.name,
                ?key,
                "entry evicted from hot tier without a cold copy, value lost"
            );
        }
    }

    fn try_write_cold(&self, key: &K, value: &V) -> Result<(), CacheError> {
        let cold = self
            .cold
            .as_ref()
            .ok_or_else(|| CacheError::NoColdTier(self.name.clone()))?;
        let bytes = serde_json::to_vec(value).map_err(|source| CacheError::Encode {
            region: self.name.clone(),
            source,
        })?;
        cold.write(&key.to_key_bytes(), &bytes)
    }

    /// Write through to the cold tier. Returns whether the value is durable.
    ///
    /// On failure any older cold copy is discarded, so a later promotion can
    /// never resurrect a value this write superseded.
    fn write_cold(&self, key: &K, value: &V) -> bool {
        match self.try_write_cold(key, value) {
            Ok(()) => true,
            Err(CacheError::NoColdTier(_)) => false,
            Err(e) => {
                warn!(cache = %self.name, ?key, error = %e, "cold write failed, entry kept hot-only");
                self.discard_cold(key);
                false
            }
        }
    }

    fn discard_cold(&self, key: &K) {
        let Some(cold) = &self.cold else {
            return;
        };
        match cold.remove(&key.to_key_bytes()) {
            Ok(true) => debug!(cache = %self.name, ?key, "stale cold copy discarded"),
            Ok(false) => {}
            Err(e) => error!(
                cache = %self.name,
                ?key,
                error = %e,
                "failed to discard stale cold copy"
            ),
        }
    }

    fn try_read_cold(&self, key: &K) -> Result<Option<V>, CacheError> {
        let Some(cold) = &self.cold else {
            return Ok(None);
        };
        let Some(bytes) = cold.read(&key.to_key_bytes())? else {
            return Ok(None);
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|source| CacheError::Decode {
                region: self.name.clone(),
                source,
            })
    }

    fn read_cold(&self, key: &K) -> Option<V> {
        match self.try_read_cold(key) {
            Ok(value) => value,
            Err(e) => {
                warn!(cache = %self.name, ?key, error = %e, "cold read failed, treating key as unknown");
                None
            }
        }
    }
}

impl<K, V> core::fmt::Debug for TieredCache<K, V> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TieredCache")
            .field("name", &self.name)
            .field("durable", &self.cold.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::sync::Arc;

    use tally_types::EntityKey;

    use super::*;
    use crate::store::{CacheStore, DEFAULT_COLD_BUDGET_BYTES};

    fn store() -> CacheStore {
        CacheStore::temporary(DEFAULT_COLD_BUDGET_BYTES).expect("temporary store")
    }

    #[test]
    fn last_write_wins_in_hot_tier() {
        let cache: TieredCache<EntityKey, u64> = store().cache("lww_hot", 10);
        let key = EntityKey::new();
        cache.put(key, 1);
        cache.put(key, 2);
        assert_eq!(cache.get(&key), Some(2));
    }

    #[test]
    fn last_write_wins_after_demotion() {
        let cache: TieredCache<EntityKey, u64> = store().cache("lww_cold", 2);
        let key = EntityKey::new();
        cache.put(key, 1);
        cache.put(key, 2);
        for filler in 0..5 {
            cache.put(EntityKey::new(), filler);
        }
        assert!(!cache.is_hot(&key));
        assert_eq!(cache.get(&key), Some(2));
    }

    #[test]
    fn eviction_round_trips_through_cold_tier() {
        let cache: TieredCache<EntityKey, String> = store().cache("round_trip", 3);
        let keys: Vec<EntityKey> = (0..10).map(|_| EntityKey::new()).collect();
        for (i, key) in keys.iter().enumerate() {
            cache.put(*key, format!("value-{i}"));
        }
        assert_eq!(cache.hot_len(), 3);
        let first = keys.first().copied().unwrap();
        assert!(!cache.is_hot(&first));
        assert_eq!(cache.get(&first), Some("value-0".to_owned()));
        assert!(cache.is_hot(&first), "get promotes into the hot tier");
        assert_eq!(cache.hot_len(), 3);
    }

    #[test]
    fn get_refreshes_recency() {
        let cache: TieredCache<EntityKey, u64> = store().cache("recency", 2);
        let a = EntityKey::new();
        let b = EntityKey::new();
        let c = EntityKey::new();
        cache.put(a, 1);
        cache.put(b, 2);
        assert_eq!(cache.get(&a), Some(1));
        cache.put(c, 3);
        assert!(cache.is_hot(&a));
        assert!(!cache.is_hot(&b));
        assert!(cache.contains(&b));
    }

    #[test]
    fn unknown_key_is_absent_not_zero() {
        let cache: TieredCache<EntityKey, u64> = store().cache("unknown", 4);
        let key = EntityKey::new();
        assert_eq!(cache.get(&key), None);
        assert!(!cache.contains(&key));
    }

    #[test]
    fn survives_store_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let key = EntityKey::new();
        {
            let store = CacheStore::open(dir.path(), DEFAULT_COLD_BUDGET_BYTES).unwrap();
            let cache: TieredCache<EntityKey, u64> = store.cache("reopen", 8);
            cache.put(key, 41);
            cache.put(key, 42);
            cache.flush();
        }
        let store = CacheStore::open(dir.path(), DEFAULT_COLD_BUDGET_BYTES).unwrap();
        let cache: TieredCache<EntityKey, u64> = store.cache("reopen", 8);
        assert!(!cache.is_hot(&key));
        assert_eq!(cache.get(&key), Some(42));
        assert_eq!(cache.keys(), vec![key]);
    }

    #[test]
    fn cold_failure_degrades_to_hot_only() {
        // A 1-byte budget makes every cold write fail.
        let cache: TieredCache<EntityKey, String> =
            store().cache_with_budget("full", 4, 1);
        let key = EntityKey::new();
        cache.put(key, "kept in memory".to_owned());
        assert_eq!(cache.get(&key), Some("kept in memory".to_owned()));
        assert!(cache.contains(&key));
    }

    #[test]
    fn failed_overwrite_never_resurrects_older_value() {
        let cache: TieredCache<EntityKey, String> = CacheStore::temporary(64)
            .unwrap()
            .cache("stale", 1);
        let key = EntityKey::new();
        cache.put(key, "v1".to_owned());
        // Too large for the remaining cold budget.
        let large = "v2-".repeat(40);
        cache.put(key, large.clone());
        assert_eq!(cache.get(&key), Some(large));
        // Evicts `key`; the deferred cold write fails again.
        cache.put(EntityKey::new(), "x".to_owned());
        assert!(!cache.is_hot(&key));
        assert_eq!(cache.get(&key), None);
        assert!(!cache.contains(&key));
    }

    #[test]
    fn hot_only_cache_forgets_demoted_entries() {
        let cache: TieredCache<EntityKey, u64> = CacheStore::disabled().cache("volatile", 1);
        let a = EntityKey::new();
        cache.put(a, 1);
        cache.put(EntityKey::new(), 2);
        assert_eq!(cache.get(&a), None);
    }

    #[test]
    fn update_sees_cold_value() {
        let cache: TieredCache<EntityKey, u64> = store().cache("update_cold", 1);
        let key = EntityKey::new();
        cache.put(key, 10);
        cache.put(EntityKey::new(), 0);
        let next = cache.update(key, |current| current.unwrap_or(0).saturating_add(5));
        assert_eq!(next, 15);
        assert_eq!(cache.get(&key), Some(15));
    }

    #[test]
    fn update_present_skips_unknown_keys() {
        let cache: TieredCache<EntityKey, u64> = store().cache("update_present", 4);
        let key = EntityKey::new();
        assert_eq!(cache.update_present(key, |v| v.saturating_add(1)), None);
        assert!(!cache.contains(&key));
        cache.put(key, 7);
        assert_eq!(cache.update_present(key, |v| v.saturating_add(1)), Some(8));
    }

    #[test]
    fn concurrent_updates_do_not_lose_increments() {
        const N: u64 = 2_000;
        let cache: Arc<TieredCache<EntityKey, u64>> = Arc::new(store().cache("concurrent", 16));
        let key = EntityKey::new();
        std::thread::scope(|scope| {
            for _ in 0..2 {
                let cache = Arc::clone(&cache);
                scope.spawn(move || {
                    for _ in 0..N {
                        cache.update(key, |c| c.unwrap_or(0).saturating_add(1));
                    }
                });
            }
        });
        assert_eq!(cache.get(&key), Some(2 * N));
    }

    #[test]
    fn keys_are_deduplicated_across_tiers() {
        let cache: TieredCache<EntityKey, u64> = store().cache("keys", 2);
        let keys: Vec<EntityKey> = (0..5).map(|_| EntityKey::new()).collect();
        for key in &keys {
            cache.put(*key, 0);
        }
        let mut listed = cache.keys();
        listed.sort();
        let mut expected = keys;
        expected.sort();
        assert_eq!(listed, expected);
    }
}
