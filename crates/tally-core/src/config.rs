//! Configuration loading and typed config structures for the Tally service.
//!
//! The canonical configuration lives in `tally-config.yaml` next to the
//! binary (or wherever `TALLY_CONFIG` points). This module defines
//! strongly-typed structs that mirror the YAML structure and a loader that
//! reads the file. Every field has a default, so an empty or missing file is
//! a valid configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tally_bus::ConsumerConfig;
use tally_cache::DEFAULT_COLD_BUDGET_BYTES;
use tally_trackers::TrackerConfig;
use tracing::info;

/// Default config file name, resolved against the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "tally-config.yaml";

/// Environment variable overriding the config file path.
pub const CONFIG_PATH_ENV: &str = "TALLY_CONFIG";

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level service configuration.
///
/// Mirrors the structure of `tally-config.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct TallyConfig {
    /// Server identity and data location.
    #[serde(default)]
    pub server: ServerConfig,

    /// Broker connection and consumer timing.
    #[serde(default)]
    pub broker: BrokerConfig,

    /// Cold-tier storage.
    #[serde(default)]
    pub cache: CacheConfig,

    /// Tracker sizing and sampling.
    #[serde(default)]
    pub trackers: TrackerConfig,

    /// Synchronization schedule.
    #[serde(default)]
    pub sync: SyncConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl TallyConfig {
    /// Load configuration from `TALLY_CONFIG` or `tally-config.yaml`.
    ///
    /// A missing file yields the defaults. Environment overrides are applied
    /// either way.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file exists but cannot be read, or
    /// [`ConfigError::Yaml`] if it is not valid YAML.
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var(CONFIG_PATH_ENV)
            .map_or_else(|_| PathBuf::from(DEFAULT_CONFIG_FILE), PathBuf::from);
        if path.exists() {
            Self::from_file(&path)
        } else {
            info!(path = %path.display(), "config file not found, using defaults");
            let mut config = Self::default();
            config.apply_env_overrides();
            Ok(config)
        }
    }

    /// Load configuration from a YAML file at the given path.
    ///
    /// Environment variables override YAML values:
    /// - `NATS_URL` overrides `broker.nats_url`
    /// - `TALLY_DATA_DIR` overrides `server.data_dir`
    /// - `TALLY_SERVER_ID` overrides `server.id`
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, or
    /// [`ConfigError::Yaml`] if the content is not valid YAML.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let mut config = Self::parse(&contents)?;
        config.apply_env_overrides();
        info!(path = %path.display(), "config loaded");
        Ok(config)
    }

    /// Parse configuration from a YAML string. No overrides are applied.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yml::from_str(yaml)?)
    }

    /// Apply overrides from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    /// Apply overrides from an arbitrary variable lookup.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(val) = lookup("NATS_URL") {
            self.broker.nats_url = val;
        }
        if let Some(val) = lookup("TALLY_DATA_DIR") {
            self.server.data_dir = PathBuf::from(val);
        }
        if let Some(val) = lookup("TALLY_SERVER_ID") {
            self.server.id = val;
        }
    }

    /// Directory holding the cold-tier database.
    pub fn cache_dir(&self) -> PathBuf {
        self.server.data_dir.join("cache")
    }
}

/// Server identity.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ServerConfig {
    /// Origin stamped on published snapshots. Snapshots received with this
    /// origin are ignored. Defaults to a random id per process, so two
    /// unconfigured servers never mistake each other for themselves.
    #[serde(default = "default_server_id")]
    pub id: String,

    /// Root of persisted state.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            id: default_server_id(),
            data_dir: default_data_dir(),
        }
    }
}

/// Broker connection and consumer timing.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BrokerConfig {
    /// NATS messaging URL.
    #[serde(default = "default_nats_url")]
    pub nats_url: String,

    /// Upper bound on a single consumer poll, in milliseconds.
    #[serde(default = "default_poll_window_ms")]
    pub poll_window_ms: u64,

    /// Pause between consumer polls, in milliseconds.
    #[serde(default = "default_idle_backoff_ms")]
    pub idle_backoff_ms: u64,

    /// Maximum records taken per poll.
    #[serde(default = "default_max_batch")]
    pub max_batch: usize,
}

impl BrokerConfig {
    /// Consumer settings derived from this section.
    pub const fn consumer_config(&self) -> ConsumerConfig {
        ConsumerConfig {
            poll_window: Duration::from_millis(self.poll_window_ms),
            idle_backoff: Duration::from_millis(self.idle_backoff_ms),
            max_batch: self.max_batch,
        }
    }
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            nats_url: default_nats_url(),
            poll_window_ms: default_poll_window_ms(),
            idle_backoff_ms: default_idle_backoff_ms(),
            max_batch: default_max_batch(),
        }
    }
}

/// Cold-tier storage.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CacheConfig {
    /// When false, every cache is hot-only.
    #[serde(default = "default_true")]
    pub persistent: bool,

    /// Byte budget per cold region (default: 5 GiB).
    #[serde(default = "default_cold_budget_bytes")]
    pub cold_budget_bytes: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            persistent: true,
            cold_budget_bytes: default_cold_budget_bytes(),
        }
    }
}

/// Synchronization schedule.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SyncConfig {
    /// Seconds between full synchronization cycles (default: 300).
    #[serde(default = "default_sync_interval_secs")]
    pub interval_secs: u64,

    /// Pending sync requests buffered before new ones are rejected.
    #[serde(default = "default_request_buffer")]
    pub request_buffer: usize,
}

impl SyncConfig {
    /// Interval between full cycles, never shorter than one second.
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_sync_interval_secs(),
            request_buffer: default_request_buffer(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive (trace, debug, info, warn, error), used when
    /// `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_server_id() -> String {
    format!("tally-{}", uuid::Uuid::new_v4().simple())
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_nats_url() -> String {
    "nats://localhost:4222".to_owned()
}

const fn default_poll_window_ms() -> u64 {
    1_000
}

const fn default_idle_backoff_ms() -> u64 {
    100
}

const fn default_max_batch() -> usize {
    500
}

const fn default_true() -> bool {
    true
}

const fn default_cold_budget_bytes() -> u64 {
    DEFAULT_COLD_BUDGET_BYTES
}

const fn default_sync_interval_secs() -> u64 {
    300
}

const fn default_request_buffer() -> usize {
    64
}

fn default_log_level() -> String {
    "info".to_owned()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn empty_yaml_gives_defaults() {
        let config = TallyConfig::parse("").unwrap();
        assert_eq!(config.broker.nats_url, "nats://localhost:4222");
        assert_eq!(config.broker.poll_window_ms, 1_000);
        assert_eq!(config.cache.cold_budget_bytes, 5 * 1024 * 1024 * 1024);
        assert_eq!(config.trackers.regions.movements, 70_000);
        assert!(config.server.id.starts_with("tally-"));
    }

    #[test]
    fn partial_yaml_overrides_only_named_fields() {
        let yaml = "
server:
  id: lobby-1
broker:
  poll_window_ms: 250
trackers:
  movement_min_distance: 4.0
logging:
  json: true
";
        let config = TallyConfig::parse(yaml).unwrap();
        assert_eq!(config.server.id, "lobby-1");
        assert_eq!(config.server.data_dir, PathBuf::from("data"));
        assert_eq!(config.broker.idle_backoff_ms, 100);
        assert_eq!(
            config.broker.consumer_config().poll_window,
            Duration::from_millis(250)
        );
        assert!((config.trackers.movement_min_distance - 4.0).abs() < f64::EPSILON);
        assert!(config.logging.json);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn invalid_yaml_is_an_error() {
        assert!(matches!(
            TallyConfig::parse("broker: [unclosed"),
            Err(ConfigError::Yaml { .. })
        ));
    }

    #[test]
    fn overrides_replace_values() {
        let mut config = TallyConfig::default();
        config.apply_overrides(|name| match name {
            "NATS_URL" => Some("nats://broker:4222".to_owned()),
            "TALLY_DATA_DIR" => Some("/var/lib/tally".to_owned()),
            "TALLY_SERVER_ID" => Some("survival-2".to_owned()),
            _ => None,
        });
        assert_eq!(config.broker.nats_url, "nats://broker:4222");
        assert_eq!(config.cache_dir(), PathBuf::from("/var/lib/tally/cache"));
        assert_eq!(config.server.id, "survival-2");
    }

    #[test]
    fn from_file_reads_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tally-config.yaml");
        std::fs::write(&path, "sync:\n  interval_secs: 30\n").unwrap();
        let config = TallyConfig::from_file(&path).unwrap();
        assert_eq!(config.sync.interval(), Duration::from_secs(30));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            TallyConfig::from_file(&dir.path().join("absent.yaml")),
            Err(ConfigError::Io { .. })
        ));
    }
}
