//! Configuration for the tracker set.
//!
//! Hot-tier capacities are sized per aspect: movement sees by far the most
//! writes, play time the fewest. The [`TrackerConfig`] struct bundles every
//! tunable so callers (the service, tests) can override defaults.

use serde::Deserialize;

/// Cold-tier region (sled tree) names, one per cache.
pub mod regions {
    /// Accumulated tick counts.
    pub const PLAY_TIMES: &str = "play_times";
    /// Login/logout windows.
    pub const SESSION_WINDOWS: &str = "session_windows";
    /// Encoded last positions.
    pub const MOVEMENTS: &str = "movements";
    /// Encoded bed locations.
    pub const BEDS: &str = "beds";
    /// Progression tuples.
    pub const PROGRESSION: &str = "progression";
    /// Latest block interaction plus count.
    pub const BLOCK_INTERACTIONS: &str = "block_interactions";
}

/// Tracker configuration, usually the `trackers` section of the service
/// config file.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TrackerConfig {
    /// Hot-tier entry limits per region.
    #[serde(default)]
    pub regions: RegionCapacities,

    /// Minimum distance (blocks) an entity must move within the same world
    /// before a new position is recorded (default: 1.0).
    #[serde(default = "default_movement_min_distance")]
    pub movement_min_distance: f64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            regions: RegionCapacities::default(),
            movement_min_distance: default_movement_min_distance(),
        }
    }
}

/// Hot-tier entry limit for each cache region.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RegionCapacities {
    /// Accumulated tick counts (default: 1,000).
    #[serde(default = "default_play_times")]
    pub play_times: usize,
    /// Session windows (default: 1,000).
    #[serde(default = "default_session_windows")]
    pub session_windows: usize,
    /// Last positions (default: 70,000).
    #[serde(default = "default_movements")]
    pub movements: usize,
    /// Bed locations (default: 7,000).
    #[serde(default = "default_beds")]
    pub beds: usize,
    /// Experience progression (default: 7,000).
    #[serde(default = "default_progression")]
    pub progression: usize,
    /// Block interactions (default: 40,000).
    #[serde(default = "default_block_interactions")]
    pub block_interactions: usize,
}

impl Default for RegionCapacities {
    fn default() -> Self {
        Self {
            play_times: default_play_times(),
            session_windows: default_session_windows(),
            movements: default_movements(),
            beds: default_beds(),
            progression: default_progression(),
            block_interactions: default_block_interactions(),
        }
    }
}

const fn default_movement_min_distance() -> f64 {
    1.0
}

const fn default_play_times() -> usize {
    1_000
}

const fn default_session_windows() -> usize {
    1_000
}

const fn default_movements() -> usize {
    70_000
}

const fn default_beds() -> usize {
    7_000
}

const fn default_progression() -> usize {
    7_000
}

const fn default_block_interactions() -> usize {
    40_000
}
