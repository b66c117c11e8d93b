//! Per-entity state trackers for the Tally state tracker.
//!
//! Each tracker owns one aspect of an entity's state and persists it through
//! a [`TieredCache`](tally_cache::TieredCache):
//!
//! - [`PlayTimeTracker`]: accumulated ticks and session windows
//! - [`MovementTracker`]: last sampled position
//! - [`BlockTracker`]: latest block interaction and running count
//! - [`BedTracker`]: last bed location
//! - [`ProgressionTracker`]: experience level and points
//!
//! Host code records state through the concrete trackers' typed methods. The
//! synchronization side works through the [`StateTracker`] trait, usually via
//! a [`TrackerSet`] that holds all five.
//!
//! Every read is total: an entity that was never recorded yields an empty
//! value, never an error.

pub mod bed;
pub mod block;
pub mod config;
pub mod movement;
pub mod play_time;
pub mod progression;
pub mod set;
pub mod tracker;

pub use bed::BedTracker;
pub use block::BlockTracker;
pub use config::{RegionCapacities, TrackerConfig};
pub use movement::MovementTracker;
pub use play_time::PlayTimeTracker;
pub use progression::ProgressionTracker;
pub use set::TrackerSet;
pub use tracker::StateTracker;
