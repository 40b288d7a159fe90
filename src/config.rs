//! Runtime configuration from environment variables
//!
//! Environment variables (a `.env` file is loaded by the binary):
//!   MINERFLOW_DB_PATH            - SQLite ledger path (default: data/minerflow.db)
//!   NODE_HOST                    - Ledger node host (default: 127.0.0.1)
//!   NODE_HTTP_PORT               - JSON-RPC HTTP port (default: 12537)
//!   NODE_PUBSUB_PORT             - WebSocket pub/sub port (default: 12535)
//!   INITIAL_EPOCH                - First epoch when the ledger is empty (default: 0)
//!   TRACKING_START_TIMESTAMP     - Tracking window start, inclusive (default: 0)
//!   TRACKING_END_TIMESTAMP       - Tracking window end, inclusive (default: i64::MAX)
//!   BACKFILL_WORKERS             - Backfill worker-pool size (default: 4)
//!   RETRY_INTERVAL_MS            - Not-yet-executed retry / re-subscribe delay (default: 1000)
//!   FEED_INACTIVITY_TIMEOUT_SECS - Live feed inactivity window (default: 3600)
//!   RPC_TIMEOUT_SECS             - Per-request HTTP timeout (default: 3600)
//!   PROGRESS_INTERVAL_SECS       - Progress log period (default: 10)
//!   QUERY_PORT                   - Serve the query API on this port (default: disabled)
//!   RUST_LOG                     - Log filter (default: info)

use crate::pipeline::types::TrackingWindow;
use crate::pipeline::EngineSettings;
use std::env;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {var}: {reason}")]
    InvalidValue { var: &'static str, reason: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeConfig {
    pub db_path: String,
    pub node_host: String,
    pub http_port: u16,
    pub pubsub_port: u16,
    pub initial_epoch: u64,
    pub tracking_start: i64,
    pub tracking_end: i64,
    pub worker_count: usize,
    pub retry_interval_ms: u64,
    pub feed_timeout_secs: u64,
    pub rpc_timeout_secs: u64,
    pub progress_interval_secs: u64,
    pub query_port: Option<u16>,
    pub rust_log: String,
}

impl RuntimeConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| env::var(var).ok())
    }

    /// Build the configuration from any variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let config = Self {
            db_path: lookup("MINERFLOW_DB_PATH").unwrap_or_else(|| "data/minerflow.db".to_string()),
            node_host: lookup("NODE_HOST").unwrap_or_else(|| "127.0.0.1".to_string()),
            http_port: parse_var(&lookup, "NODE_HTTP_PORT", 12_537)?,
            pubsub_port: parse_var(&lookup, "NODE_PUBSUB_PORT", 12_535)?,
            initial_epoch: parse_var(&lookup, "INITIAL_EPOCH", 0)?,
            tracking_start: parse_var(&lookup, "TRACKING_START_TIMESTAMP", 0)?,
            tracking_end: parse_var(&lookup, "TRACKING_END_TIMESTAMP", i64::MAX)?,
            worker_count: parse_var(&lookup, "BACKFILL_WORKERS", 4)?,
            retry_interval_ms: parse_var(&lookup, "RETRY_INTERVAL_MS", 1_000)?,
            feed_timeout_secs: parse_var(&lookup, "FEED_INACTIVITY_TIMEOUT_SECS", 3_600)?,
            rpc_timeout_secs: parse_var(&lookup, "RPC_TIMEOUT_SECS", 3_600)?,
            progress_interval_secs: parse_var(&lookup, "PROGRESS_INTERVAL_SECS", 10)?,
            query_port: match lookup("QUERY_PORT") {
                Some(raw) => Some(parse_value("QUERY_PORT", &raw)?),
                None => None,
            },
            rust_log: lookup("RUST_LOG").unwrap_or_else(|| "info".to_string()),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.worker_count == 0 {
            return Err(ConfigError::InvalidValue {
                var: "BACKFILL_WORKERS",
                reason: "must be at least 1".to_string(),
            });
        }

        if self.tracking_start > self.tracking_end {
            return Err(ConfigError::InvalidValue {
                var: "TRACKING_START_TIMESTAMP",
                reason: format!(
                    "window start {} is after window end {}",
                    self.tracking_start, self.tracking_end
                ),
            });
        }

        for (var, value) in [
            ("RETRY_INTERVAL_MS", self.retry_interval_ms),
            ("FEED_INACTIVITY_TIMEOUT_SECS", self.feed_timeout_secs),
            ("RPC_TIMEOUT_SECS", self.rpc_timeout_secs),
            ("PROGRESS_INTERVAL_SECS", self.progress_interval_secs),
        ] {
            if value == 0 {
                return Err(ConfigError::InvalidValue {
                    var,
                    reason: "must be greater than 0".to_string(),
                });
            }
        }

        Ok(())
    }

    /// ChainSource endpoint.
    pub fn http_rpc_url(&self) -> String {
        format!("http://{}:{}", self.node_host, self.http_port)
    }

    /// EpochFeed endpoint.
    pub fn pubsub_url(&self) -> String {
        format!("ws://{}:{}", self.node_host, self.pubsub_port)
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_secs(self.rpc_timeout_secs)
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            worker_count: self.worker_count,
            retry_interval: Duration::from_millis(self.retry_interval_ms),
            feed_timeout: Duration::from_secs(self.feed_timeout_secs),
            initial_epoch: self.initial_epoch,
            window: TrackingWindow::new(self.initial_epoch, self.tracking_start, self.tracking_end),
            progress_interval: Duration::from_secs(self.progress_interval_secs),
        }
    }
}

fn parse_var<F, T>(lookup: &F, var: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(var) {
        Some(raw) => parse_value(var, &raw),
        None => Ok(default),
    }
}

fn parse_value<T>(var: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse::<T>().map_err(|e| ConfigError::InvalidValue {
        var,
        reason: format!("{:?}: {}", raw, e),
    })
}
