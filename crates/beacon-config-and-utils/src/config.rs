//! Configuration management.

use crate::{CoreError, CoreResult, Paths};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::warn;
use url::Url;

/// Default analytics API base URL (can be overridden at compile time via BEACON_API_URL env var).
pub const DEFAULT_API_URL: &str = match option_env!("BEACON_API_URL") {
    Some(url) => url,
    None => "https://api.calq.io",
};

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

const DEFAULT_FLUSH_INTERVAL_SECS: u64 = 60;
const DEFAULT_BATCH_SIZE: usize = 100;
const DEFAULT_MAX_BATCHES_PER_CYCLE: usize = 100;
const DEFAULT_TRANSPORT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_BACKOFF_BASE_SECS: u64 = 60;
const DEFAULT_BACKOFF_MAX_SECS: u64 = 900;

/// Main configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Analytics API base URL; the endpoint name is appended as a path segment.
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// Seconds between scheduled delivery passes.
    #[serde(default = "default_flush_interval_secs")]
    pub flush_interval_secs: u64,
    /// Records peeked per batch.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Upper bound on batches drained in one scheduled delivery pass.
    #[serde(default = "default_max_batches_per_cycle")]
    pub max_batches_per_cycle: usize,
    /// Timeout for a single transport call, in seconds.
    #[serde(default = "default_transport_timeout_secs")]
    pub transport_timeout_secs: u64,
    /// First backoff step after a failed scheduled pass, in seconds. Zero disables backoff.
    #[serde(default = "default_backoff_base_secs")]
    pub backoff_base_secs: u64,
    /// Backoff cap, in seconds.
    #[serde(default = "default_backoff_max_secs")]
    pub backoff_max_secs: u64,
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

fn default_flush_interval_secs() -> u64 {
    DEFAULT_FLUSH_INTERVAL_SECS
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

fn default_max_batches_per_cycle() -> usize {
    DEFAULT_MAX_BATCHES_PER_CYCLE
}

fn default_transport_timeout_secs() -> u64 {
    DEFAULT_TRANSPORT_TIMEOUT_SECS
}

fn default_backoff_base_secs() -> u64 {
    DEFAULT_BACKOFF_BASE_SECS
}

fn default_backoff_max_secs() -> u64 {
    DEFAULT_BACKOFF_MAX_SECS
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            api_url: default_api_url(),
            flush_interval_secs: DEFAULT_FLUSH_INTERVAL_SECS,
            batch_size: DEFAULT_BATCH_SIZE,
            max_batches_per_cycle: DEFAULT_MAX_BATCHES_PER_CYCLE,
            transport_timeout_secs: DEFAULT_TRANSPORT_TIMEOUT_SECS,
            backoff_base_secs: DEFAULT_BACKOFF_BASE_SECS,
            backoff_max_secs: DEFAULT_BACKOFF_MAX_SECS,
        }
    }
}

impl Config {
    /// Load configuration from the config file (if present), then apply environment
    /// overrides and validate.
    pub fn load(paths: &Paths) -> CoreResult<Self> {
        let config_path = paths.config_file();

        let mut config = if config_path.exists() {
            Self::load_from_file(&config_path)?
        } else {
            Self::default()
        };

        config.load_from_env();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a file.
    pub fn save(&self, paths: &Paths) -> CoreResult<()> {
        paths.ensure_dirs()?;
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(paths.config_file(), content)?;
        Ok(())
    }

    fn load_from_env(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    /// Apply overrides from a variable lookup.
    ///
    /// Recognized names: BEACON_LOG_LEVEL, BEACON_API_URL, BEACON_FLUSH_INTERVAL_SECS,
    /// BEACON_BATCH_SIZE, BEACON_TRANSPORT_TIMEOUT_SECS. Unparseable numbers are ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let lookup = |name: &str| lookup(name).and_then(non_empty);

        if let Some(level) = lookup("BEACON_LOG_LEVEL") {
            self.log_level = level;
        }
        if let Some(url) = lookup("BEACON_API_URL") {
            self.api_url = url;
        }
        if let Some(secs) = parse_override(&lookup, "BEACON_FLUSH_INTERVAL_SECS") {
            self.flush_interval_secs = secs;
        }
        if let Some(size) = parse_override(&lookup, "BEACON_BATCH_SIZE") {
            self.batch_size = size;
        }
        if let Some(secs) = parse_override(&lookup, "BEACON_TRANSPORT_TIMEOUT_SECS") {
            self.transport_timeout_secs = secs;
        }
    }

    /// Reject values the delivery loop cannot run with.
    pub fn validate(&self) -> CoreResult<()> {
        if self.flush_interval_secs == 0 {
            return Err(CoreError::Config("flush_interval_secs must be > 0".to_string()));
        }
        if self.batch_size == 0 {
            return Err(CoreError::Config("batch_size must be > 0".to_string()));
        }
        if self.max_batches_per_cycle == 0 {
            return Err(CoreError::Config("max_batches_per_cycle must be > 0".to_string()));
        }
        if self.transport_timeout_secs == 0 {
            return Err(CoreError::Config("transport_timeout_secs must be > 0".to_string()));
        }
        if self.backoff_max_secs < self.backoff_base_secs {
            return Err(CoreError::Config(
                "backoff_max_secs must be >= backoff_base_secs".to_string(),
            ));
        }
        self.api_url()?;
        Ok(())
    }

    /// Get the API base URL as a parsed URL.
    pub fn api_url(&self) -> CoreResult<Url> {
        Url::parse(&self.api_url).map_err(CoreError::from)
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.flush_interval_secs)
    }

    pub fn transport_timeout(&self) -> Duration {
        Duration::from_secs(self.transport_timeout_secs)
    }

    pub fn backoff_base(&self) -> Duration {
        Duration::from_secs(self.backoff_base_secs)
    }

    pub fn backoff_max(&self) -> Duration {
        Duration::from_secs(self.backoff_max_secs)
    }
}

fn non_empty(raw: String) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn parse_override<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
) -> Option<T> {
    let raw = lookup(name)?;
    match raw.parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(name, value = %raw, "Ignoring unparseable config override");
            None
        }
    }
}
