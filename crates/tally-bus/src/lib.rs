//! Message bus plumbing for the Tally state tracker.
//!
//! # Architecture
//!
//! ```text
//!  broker ──► RecordSource ──► Consumer worker ──► ListenerRegistry ──► handlers
//!                               (poll, decode,        (per topic,
//!                                resolve topic)        in order)
//!
//!  callers ──► Producer ──► RecordSink ──► broker
//! ```
//!
//! Two transports implement the seam: [`nats`] (`async-nats`, one client per
//! side) and [`memory`] (in-process, for tests and single-node runs).
//!
//! # Modules
//!
//! - [`transport`]: [`RawRecord`], [`RecordSource`], [`RecordSink`]
//! - [`registry`]: [`ListenerRegistry`], [`EventHandler`]
//! - [`consumer`]: [`Consumer`] lifecycle and poll loop
//! - [`producer`]: [`Producer`]
//! - [`error`]: error types

pub mod consumer;
pub mod error;
pub mod memory;
pub mod nats;
pub mod producer;
pub mod registry;
pub mod transport;

pub use consumer::{Consumer, ConsumerConfig, ConsumerState, ConsumerStats};
pub use error::{BusError, DecodeError, HandlerError, PublishError};
pub use memory::{MemoryBroker, MemorySink, MemorySource};
pub use nats::{NatsSink, NatsSource};
pub use producer::Producer;
pub use registry::{DispatchReport, EventHandler, ListenerRegistry};
pub use transport::{RawRecord, RecordSink, RecordSource};
