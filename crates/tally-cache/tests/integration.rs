//! Integration tests for the `tally-cache` tiered cache.
//!
//! Every test runs against a real on-disk `sled` database in a temporary
//! directory; no external services are needed.

// Integration tests use unwrap extensively for clarity -- panicking on
// failure is the correct behavior in test code.
#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tally_cache::{CacheError, CacheStore, DEFAULT_COLD_BUDGET_BYTES};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct Visit {
    world: String,
    count: u32,
}

fn visit(world: &str, count: u32) -> Visit {
    Visit {
        world: world.to_owned(),
        count,
    }
}

#[test]
fn demoted_entries_survive_a_restart() {
    let dir = tempfile::tempdir().unwrap();
    let keys: Vec<Uuid> = (0..50).map(|_| Uuid::new_v4()).collect();
    {
        let store = CacheStore::open(dir.path(), DEFAULT_COLD_BUDGET_BYTES).unwrap();
        let cache = store.cache::<Uuid, Visit>("visits", 5);
        for (i, key) in keys.iter().enumerate() {
            cache.put(*key, visit("overworld", u32::try_from(i).unwrap()));
        }
        assert_eq!(cache.hot_len(), 5);
        cache.flush();
    }

    let store = CacheStore::open(dir.path(), DEFAULT_COLD_BUDGET_BYTES).unwrap();
    let cache = store.cache::<Uuid, Visit>("visits", 5);
    assert_eq!(cache.hot_len(), 0);
    for (i, key) in keys.iter().enumerate() {
        assert_eq!(cache.get(key), Some(visit("overworld", u32::try_from(i).unwrap())));
    }
    assert_eq!(cache.keys().len(), keys.len());
}

#[test]
fn regions_are_isolated() {
    let store = CacheStore::temporary(DEFAULT_COLD_BUDGET_BYTES).unwrap();
    let beds = store.cache::<Uuid, String>("beds", 10);
    let moves = store.cache::<Uuid, String>("movements", 10);
    let key = Uuid::new_v4();
    beds.put(key, "overworld;1;64;1".to_owned());
    assert!(beds.contains(&key));
    assert!(!moves.contains(&key));
    assert!(moves.get(&key).is_none());
}

#[test]
fn full_region_rejects_growth_but_cache_keeps_working() {
    let store = CacheStore::temporary(DEFAULT_COLD_BUDGET_BYTES).unwrap();
    let region = store.region_with_budget("tiny", 64).unwrap();
    region.write(b"a", &[0_u8; 40]).unwrap();
    assert!(matches!(
        region.write(b"b", &[0_u8; 40]),
        Err(CacheError::CapacityExceeded { .. })
    ));

    // A cache over an exhausted budget still serves hot reads.
    let cache = store.cache_with_budget::<Uuid, Visit>("exhausted", 4, 1);
    let key = Uuid::new_v4();
    cache.put(key, visit("nether", 3));
    assert_eq!(cache.get(&key), Some(visit("nether", 3)));
}

#[test]
fn concurrent_updates_across_threads_do_not_lose_writes() {
    let store = CacheStore::temporary(DEFAULT_COLD_BUDGET_BYTES).unwrap();
    let cache = Arc::new(store.cache::<Uuid, u64>("play_times", 2));
    let keys: Vec<Uuid> = (0..4).map(|_| Uuid::new_v4()).collect();

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let cache = Arc::clone(&cache);
            let keys = keys.clone();
            std::thread::spawn(move || {
                for _ in 0..250 {
                    for key in &keys {
                        cache.update(*key, |v| v.unwrap_or(0) + 1);
                    }
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    for key in &keys {
        assert_eq!(cache.get(key), Some(1_000));
    }
}
