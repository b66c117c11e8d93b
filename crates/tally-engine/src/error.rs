//! Error types for the engine binary.
//!
//! [`EngineError`] wraps every failure that can abort startup, so `main`
//! can propagate with `?`. Failures after startup are logged, not returned.

/// Top-level error for the engine binary.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: tally_core::ConfigError,
    },

    /// Connecting to the broker failed.
    #[error("broker error: {source}")]
    Broker {
        /// The underlying transport error.
        #[from]
        source: tally_bus::BusError,
    },

    /// The service failed to start.
    #[error("service error: {source}")]
    Service {
        /// The underlying service error.
        #[from]
        source: tally_core::ServiceError,
    },
}
