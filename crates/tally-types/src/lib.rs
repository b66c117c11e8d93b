//! Shared type definitions for the Tally state tracker.
//!
//! This crate is the single source of truth for the types that cross crate
//! boundaries: entity identifiers, broker topics and envelopes, the value
//! types each tracker stores, and the aggregate [`Snapshot`] published on
//! every synchronization cycle.
//!
//! # Modules
//!
//! - [`ids`] -- Type-safe UUID wrapper for tracked entities
//! - [`enums`] -- Closed enumerations (topics, tracked aspects, interaction kinds)
//! - [`envelope`] -- Decoded broker event passed to listeners
//! - [`structs`] -- Tracker value types and the aggregate snapshot

pub mod enums;
pub mod envelope;
pub mod ids;
pub mod structs;

// Re-export all public types at crate root for convenience.
pub use enums::{Aspect, InteractionKind, Topic};
pub use envelope::EventEnvelope;
pub use ids::{EntityKey, ParseEntityKeyError};
pub use structs::{
    BedLocation, BlockActivity, BlockInteraction, ParseLocationError, PlayTime, Position,
    Progression, SessionWindow, Snapshot,
};
