//! Scheduler configuration
//!
//! Configuration loaded from environment variables and command line.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// Balancer command scheduler configuration
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Directory of the sled store holding recovery records
    pub store_path: PathBuf,

    /// How long a single distributed-lock attempt may wait (0 = one try)
    pub lock_timeout_ms: u64,

    /// Upper bound on a single remote dispatch
    pub dispatch_timeout_secs: u64,

    /// Prefix of the reason string recorded with each lock
    pub lock_reason_prefix: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            store_path: PathBuf::from("./shardbal_data"),
            lock_timeout_ms: 0,
            dispatch_timeout_secs: 300, // 5 minutes
            lock_reason_prefix: "balancer".to_string(),
        }
    }
}

fn parse_env<T: std::str::FromStr>(name: &str) -> Result<Option<T>, ConfigError> {
    match std::env::var(name) {
        Ok(value) => value
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue(name.to_string(), value)),
        Err(_) => Ok(None),
    }
}

impl SchedulerConfig {
    /// Create configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let store_path = std::env::var("SHARDBAL_STORE_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.store_path);

        let lock_timeout_ms =
            parse_env("SHARDBAL_LOCK_TIMEOUT_MS")?.unwrap_or(defaults.lock_timeout_ms);

        let dispatch_timeout_secs: u64 = parse_env("SHARDBAL_DISPATCH_TIMEOUT_SECS")?
            .unwrap_or(defaults.dispatch_timeout_secs);
        if dispatch_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "SHARDBAL_DISPATCH_TIMEOUT_SECS".to_string(),
                "0".to_string(),
            ));
        }

        let lock_reason_prefix = std::env::var("SHARDBAL_LOCK_REASON_PREFIX")
            .unwrap_or(defaults.lock_reason_prefix);

        Ok(Self {
            store_path,
            lock_timeout_ms,
            dispatch_timeout_secs,
            lock_reason_prefix,
        })
    }

    /// Get lock attempt timeout as Duration
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    /// Get dispatch timeout as Duration
    pub fn dispatch_timeout(&self) -> Duration {
        Duration::from_secs(self.dispatch_timeout_secs)
    }

    /// Set the store path
    pub fn with_store_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.store_path = path.into();
        self
    }

    /// Set the dispatch timeout
    pub fn with_dispatch_timeout(mut self, timeout: Duration) -> Self {
        self.dispatch_timeout_secs = timeout.as_secs().max(1);
        self
    }
}
