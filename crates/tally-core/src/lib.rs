//! Synchronization service for the Tally state tracker.
//!
//! This crate composes the lower layers into a running service:
//!
//! - [`config`]: typed YAML configuration ([`TallyConfig`])
//! - [`codec`]: snapshot wire encoding ([`SnapshotCodec`], [`JsonCodec`])
//! - [`listeners`]: inbound handlers for snapshots and sync requests
//! - [`sync`]: the outbound [`SyncPipeline`]
//! - [`service`]: [`SyncService`], which wires trackers, consumer, producer
//!   and pipeline and drives scheduled cycles

pub mod codec;
pub mod config;
pub mod listeners;
pub mod service;
pub mod sync;

pub use codec::{CodecError, JsonCodec, SnapshotCodec};
pub use config::{ConfigError, TallyConfig};
pub use listeners::{SnapshotListener, SyncRequest, SyncRequestListener};
pub use service::{ServiceError, SyncService};
pub use sync::{SyncError, SyncFailure, SyncPipeline, SyncReport};
