//! Time-on-server tracking.
//!
//! Two caches back this tracker: an accumulated tick count per entity and the
//! entity's current (or most recent) session window. Ticks only grow; inbound
//! merges take the larger of local and remote so a lagging server never rolls
//! a count back.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use tally_cache::TieredCache;
use tally_types::{Aspect, EntityKey, PlayTime, SessionWindow, Snapshot};
use tracing::debug;

use crate::tracker::StateTracker;

/// Tracks accumulated play ticks and session windows.
#[derive(Debug)]
pub struct PlayTimeTracker {
    ticks: TieredCache<EntityKey, u64>,
    sessions: TieredCache<EntityKey, SessionWindow>,
}

impl PlayTimeTracker {
    /// Build the tracker over its two caches.
    pub const fn new(
        ticks: TieredCache<EntityKey, u64>,
        sessions: TieredCache<EntityKey, SessionWindow>,
    ) -> Self {
        Self { ticks, sessions }
    }

    /// Count one tick for `key`, returning the new total.
    pub fn record_tick(&self, key: EntityKey) -> u64 {
        self.add_ticks(key, 1)
    }

    /// Add `n` ticks for `key`, returning the new total. Saturates at
    /// `u64::MAX`.
    pub fn add_ticks(&self, key: EntityKey, n: u64) -> u64 {
        self.ticks
            .update(key, |current| current.unwrap_or(0).saturating_add(n))
    }

    /// Accumulated ticks, or `None` if the entity has never been seen.
    pub fn ticks(&self, key: &EntityKey) -> Option<u64> {
        self.ticks.get(key)
    }

    /// Open a new session window, replacing any previous one.
    pub fn start_session(&self, key: EntityKey, at: DateTime<Utc>) {
        debug!(entity = %key, "session started");
        self.sessions.put(key, SessionWindow::open(at));
    }

    /// Close the entity's open session, returning its length.
    ///
    /// Returns `None` when the entity has no session or the session is
    /// already closed; a closed session is left untouched.
    pub fn end_session(&self, key: EntityKey, at: DateTime<Utc>) -> Option<chrono::Duration> {
        let mut length = None;
        self.sessions.update_present(key, |window| {
            if window.is_open() {
                length = Some(at.signed_duration_since(window.started_at));
                SessionWindow {
                    started_at: window.started_at,
                    ended_at: Some(at),
                }
            } else {
                window
            }
        })?;
        if let Some(length) = length {
            debug!(entity = %key, seconds = length.num_seconds(), "session ended");
        }
        length
    }

    /// The entity's current or most recent session window.
    pub fn session(&self, key: &EntityKey) -> Option<SessionWindow> {
        self.sessions.get(key)
    }

    /// Play time state for `key`; zero ticks and no session when unknown.
    pub fn snapshot(&self, key: &EntityKey) -> PlayTime {
        PlayTime {
            total_ticks: self.ticks(key).unwrap_or(0),
            session: self.session(key),
        }
    }
}

impl StateTracker for PlayTimeTracker {
    fn aspect(&self) -> Aspect {
        Aspect::PlayTime
    }

    fn tracked_entities(&self) -> Vec<EntityKey> {
        let keys: BTreeSet<EntityKey> = self
            .ticks
            .keys()
            .into_iter()
            .chain(self.sessions.keys())
            .collect();
        keys.into_iter().collect()
    }

    fn fill_snapshot(&self, entity: EntityKey, snapshot: &mut Snapshot) {
        snapshot.play_time = self.snapshot(&entity);
    }

    fn apply_snapshot(&self, snapshot: &Snapshot) {
        let remote = snapshot.play_time;
        if remote.total_ticks > 0 {
            self.ticks.update(snapshot.entity, |local| {
                local.map_or(remote.total_ticks, |local| local.max(remote.total_ticks))
            });
        }
        if let Some(window) = remote.session {
            self.sessions.put(snapshot.entity, window);
        }
    }

    fn flush(&self) {
        self.ticks.flush();
        self.sessions.flush();
    }
}
