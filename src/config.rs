//! Configuration loading and defaults.
//!
//! Configuration is resolved in order of precedence (highest wins):
//!
//! 1. **Environment variables**: `PATHXFER_KEY`, `PATHXFER_LISTEN`,
//!    `PATHXFER_URL`, `PATHXFER_OUTPUT_DIR`
//! 2. **Config file**: path via `--config <path>`, or `pathxfer.toml` in CWD
//! 3. **Compiled defaults**: see each field's default value below
//!
//! Both subcommands read the same file; `serve` uses `[server]`, `send` uses
//! `[client]` and `[chunking]`, and both use `[transfer]`.
//!
//! ```toml
//! [server]
//! listen = "0.0.0.0:8080"
//! output_dir = "received_files"
//! retain_finalized = true
//! history_size = 100
//! max_concurrent_requests = 64
//!
//! [transfer]
//! encryption_key = "shared-secret"
//! path_suffix = "/@v/v1.info"
//! sweep_interval_secs = 300
//! inactivity_timeout_secs = 1800
//! duplicate_init = "resume"        # resume | reset | reject
//!
//! [client]
//! url = "http://127.0.0.1:8080"
//! max_request_length = 2000
//! path_overhead = 84
//! retry_count = 3
//! retry_backoff_ms = 1000
//! inter_chunk_delay_ms = 500
//! connect_timeout_secs = 10
//! request_timeout_secs = 30
//!
//! [chunking]
//! fallback_size = 500
//! largest_size = 15000
//! bands = [
//!   { below = 20000, size = 1000 },
//!   { below = 200000, size = 1500 },
//! ]
//!
//! [logging]
//! level = "info"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::util::expand_tilde;
use crate::xfer::chunking::{self, ChunkPolicy, SizeBand};
use crate::xfer::manager::ManagerConfig;
use crate::xfer::request::DEFAULT_PATH_SUFFIX;
use crate::xfer::sender::{RetryPolicy, SenderConfig};
use crate::xfer::transport::HttpOptions;
use crate::xfer::types::DuplicateInit;

/// Config file looked up in the working directory when `--config` is absent.
pub const DEFAULT_CONFIG_FILE: &str = "pathxfer.toml";

pub const DEFAULT_KEY: &str = "change-me";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level configuration, deserialized from TOML.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub transfer: TransferConfig,
    #[serde(default)]
    pub client: ClientConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Receiver settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Socket address to bind (default `0.0.0.0:8080`).
    #[serde(default = "default_listen")]
    pub listen: String,
    /// Directory for decrypted files (default `received_files`). `~` is expanded.
    #[serde(default = "default_output_dir")]
    pub output_dir: String,
    /// Keep finalized transfers in memory until swept (default true).
    #[serde(default = "default_true")]
    pub retain_finalized: bool,
    /// Completion records kept for `/api/health` (default 100).
    #[serde(default = "default_history_size")]
    pub history_size: usize,
    /// Requests processed concurrently (default 64).
    #[serde(default = "default_max_concurrent_requests")]
    pub max_concurrent_requests: usize,
}

/// Settings both ends must agree on, plus receiver lifecycle timings.
#[derive(Debug, Clone, Deserialize)]
pub struct TransferConfig {
    /// Shared key string; the cipher key is its SHA-256. Defaults to
    /// `"change-me"`, which triggers a startup warning.
    #[serde(default = "default_key")]
    pub encryption_key: String,
    #[serde(default = "default_path_suffix")]
    pub path_suffix: String,
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
    /// Idle time after which a transfer is evicted (default 30 min).
    #[serde(default = "default_inactivity_timeout")]
    pub inactivity_timeout_secs: u64,
    #[serde(default)]
    pub duplicate_init: DuplicateInit,
}

/// Sender settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    /// Receiver base URL.
    #[serde(default = "default_url")]
    pub url: String,
    #[serde(default = "default_max_request_length")]
    pub max_request_length: usize,
    /// Estimated fixed part of a chunk path.
    #[serde(default = "default_path_overhead")]
    pub path_overhead: usize,
    /// Attempts per chunk, including the first (default 3).
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,
    /// Backoff unit; attempt `n` waits `n × unit` (default 1000 ms).
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    #[serde(default = "default_inter_chunk_delay_ms")]
    pub inter_chunk_delay_ms: u64,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

/// Chunk size table.
#[derive(Debug, Clone, Deserialize)]
pub struct ChunkingConfig {
    #[serde(default = "default_fallback_size")]
    pub fallback_size: usize,
    #[serde(default = "chunking::default_bands")]
    pub bands: Vec<SizeBand>,
    #[serde(default = "default_largest_size")]
    pub largest_size: usize,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// tracing filter level (default `info`). Overridden by `RUST_LOG` env var.
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_listen() -> String {
    "0.0.0.0:8080".to_string()
}
fn default_output_dir() -> String {
    "received_files".to_string()
}
fn default_true() -> bool {
    true
}
fn default_history_size() -> usize {
    100
}
fn default_max_concurrent_requests() -> usize {
    64
}
fn default_key() -> String {
    DEFAULT_KEY.to_string()
}
fn default_path_suffix() -> String {
    DEFAULT_PATH_SUFFIX.to_string()
}
fn default_sweep_interval() -> u64 {
    300
}
fn default_inactivity_timeout() -> u64 {
    1800
}
fn default_url() -> String {
    "http://127.0.0.1:8080".to_string()
}
fn default_max_request_length() -> usize {
    chunking::DEFAULT_MAX_REQUEST_LENGTH
}
fn default_path_overhead() -> usize {
    chunking::DEFAULT_PATH_OVERHEAD
}
fn default_retry_count() -> u32 {
    3
}
fn default_retry_backoff_ms() -> u64 {
    1000
}
fn default_inter_chunk_delay_ms() -> u64 {
    500
}
fn default_connect_timeout() -> u64 {
    10
}
fn default_request_timeout() -> u64 {
    30
}
fn default_fallback_size() -> usize {
    chunking::DEFAULT_FALLBACK_SIZE
}
fn default_largest_size() -> usize {
    chunking::DEFAULT_LARGEST_SIZE
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            output_dir: default_output_dir(),
            retain_finalized: default_true(),
            history_size: default_history_size(),
            max_concurrent_requests: default_max_concurrent_requests(),
        }
    }
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            encryption_key: default_key(),
            path_suffix: default_path_suffix(),
            sweep_interval_secs: default_sweep_interval(),
            inactivity_timeout_secs: default_inactivity_timeout(),
            duplicate_init: DuplicateInit::default(),
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            max_request_length: default_max_request_length(),
            path_overhead: default_path_overhead(),
            retry_count: default_retry_count(),
            retry_backoff_ms: default_retry_backoff_ms(),
            inter_chunk_delay_ms: default_inter_chunk_delay_ms(),
            connect_timeout_secs: default_connect_timeout(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            fallback_size: default_fallback_size(),
            bands: chunking::default_bands(),
            largest_size: default_largest_size(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration with the precedence chain: env vars > file > defaults.
    ///
    /// If `path` is `Some`, reads that file. Otherwise looks for
    /// `pathxfer.toml` in the current directory, falling back to compiled
    /// defaults.
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::from_file(DEFAULT_CONFIG_FILE)?
            }
            None => Self::default(),
        };

        config.apply_env(|name| std::env::var(name).ok());
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_string(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_string(),
            source,
        })
    }

    /// Apply `PATHXFER_*` overrides from `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(key) = lookup("PATHXFER_KEY") {
            self.transfer.encryption_key = key;
        }
        if let Some(listen) = lookup("PATHXFER_LISTEN") {
            self.server.listen = listen;
        }
        if let Some(url) = lookup("PATHXFER_URL") {
            self.client.url = url;
        }
        if let Some(dir) = lookup("PATHXFER_OUTPUT_DIR") {
            self.server.output_dir = dir;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.chunk_policy().validate().map_err(ConfigError::Invalid)?;
        if self.transfer.encryption_key.is_empty() {
            return Err(ConfigError::Invalid("encryption_key must not be empty".into()));
        }
        if self.transfer.sweep_interval_secs == 0 {
            return Err(ConfigError::Invalid("sweep_interval_secs must be positive".into()));
        }
        if self.client.retry_count == 0 {
            return Err(ConfigError::Invalid("retry_count must be at least 1".into()));
        }
        if self.server.max_concurrent_requests == 0 {
            return Err(ConfigError::Invalid(
                "max_concurrent_requests must be positive".into(),
            ));
        }
        Ok(())
    }

    pub fn uses_default_key(&self) -> bool {
        self.transfer.encryption_key == DEFAULT_KEY
    }

    pub fn output_dir(&self) -> PathBuf {
        PathBuf::from(expand_tilde(&self.server.output_dir).into_owned())
    }

    pub fn chunk_policy(&self) -> ChunkPolicy {
        ChunkPolicy {
            max_request_length: self.client.max_request_length,
            path_overhead: self.client.path_overhead,
            bands: self.chunking.bands.clone(),
            largest_size: self.chunking.largest_size,
            fallback_size: self.chunking.fallback_size,
        }
    }

    pub fn sender_config(&self) -> SenderConfig {
        SenderConfig {
            policy: self.chunk_policy(),
            retry: RetryPolicy {
                max_attempts: self.client.retry_count,
                backoff_unit: Duration::from_millis(self.client.retry_backoff_ms),
            },
            inter_chunk_delay: Duration::from_millis(self.client.inter_chunk_delay_ms),
        }
    }

    pub fn http_options(&self) -> HttpOptions {
        HttpOptions {
            connect_timeout: Duration::from_secs(self.client.connect_timeout_secs),
            request_timeout: Duration::from_secs(self.client.request_timeout_secs),
            path_suffix: self.transfer.path_suffix.clone(),
        }
    }

    pub fn manager_config(&self) -> ManagerConfig {
        ManagerConfig {
            duplicate_init: self.transfer.duplicate_init,
            retain_finalized: self.server.retain_finalized,
            history_size: self.server.history_size,
        }
    }
}
