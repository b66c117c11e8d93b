//! Tally state tracker service binary.
//!
//! Wires the tracker set, the NATS transports and the synchronization
//! service, then runs until interrupted.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `tally-config.yaml` (or `TALLY_CONFIG`)
//! 2. Initialize structured logging (tracing)
//! 3. Open the cold-tier cache store, falling back to hot-only
//! 4. Build the tracker set
//! 5. Connect the consumer and the producer (separate NATS connections)
//! 6. Start the service and run scheduled cycles until Ctrl-C
//! 7. Shut down: stop the consumer, flush the producer and the caches

mod error;

use tally_bus::{NatsSink, NatsSource};
use tally_cache::CacheStore;
use tally_core::config::LoggingConfig;
use tally_core::{SyncService, TallyConfig};
use tally_trackers::TrackerSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::error::EngineError;

/// Application entry point.
///
/// # Errors
///
/// Returns an error if configuration cannot be loaded, the broker is
/// unreachable, or the consumer cannot start.
#[tokio::main]
async fn main() -> Result<(), EngineError> {
    // 1. Load configuration.
    let config = TallyConfig::load()?;

    // 2. Initialize structured logging.
    init_logging(&config.logging);
    info!(
        origin = config.server.id,
        data_dir = %config.server.data_dir.display(),
        nats_url = config.broker.nats_url,
        sync_interval_secs = config.sync.interval_secs,
        "tally-engine starting"
    );

    // 3. Open the cache store.
    let store = open_store(&config);

    // 4. Build trackers.
    let trackers = TrackerSet::open(&store, &config.trackers);

    // 5. Connect transports. The consumer and the producer each get their
    //    own connection.
    let nats_url = &config.broker.nats_url;
    let source = NatsSource::connect(nats_url).await?;
    let sink = NatsSink::connect(nats_url).await?;

    // 6. Start and run.
    let mut service = SyncService::new(&config, trackers, source, sink);
    service.start().await?;

    let cancel = CancellationToken::new();
    let signal_token = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("interrupt received, shutting down"),
            Err(e) => error!(error = %e, "failed to listen for interrupt, shutting down"),
        }
        signal_token.cancel();
    });

    service.run_until(cancel).await;

    // 7. Shut down.
    service.shutdown().await;
    if let Err(e) = store.flush() {
        warn!(error = %e, "failed to flush cache store");
    }
    info!("tally-engine stopped");
    Ok(())
}

fn init_logging(config: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);
    if config.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Open the configured cold tier, or a hot-only store if it is disabled or
/// cannot be opened.
fn open_store(config: &TallyConfig) -> CacheStore {
    if !config.cache.persistent {
        info!("cold tier disabled by config, caches are hot-only");
        return CacheStore::disabled();
    }
    let dir = config.cache_dir();
    match CacheStore::open(&dir, config.cache.cold_budget_bytes) {
        Ok(store) => store,
        Err(e) => {
            error!(
                path = %dir.display(),
                error = %e,
                "failed to open cache store, caches are hot-only"
            );
            CacheStore::disabled()
        }
    }
}
