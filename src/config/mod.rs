//! Configuration management for submerge.
//!
//! Configuration is read from `~/.config/submerge/config.toml` at startup.
//! If the file doesn't exist, a default configuration with comments is created.

use serde::Deserialize;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::fetcher::http_fetcher::DEFAULT_USER_AGENT;
use crate::fetcher::parallel::{DEFAULT_TIMEOUT, DEFAULT_WORKERS};
use crate::merger::MergePolicy;
use crate::scheduler::SchedulerConfig;

pub const DEFAULT_BIND_ADDRESS: &str = "127.0.0.1:8000";

/// Main configuration struct.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub scheduler: ScheduleConfig,
    pub fetch: FetchConfig,
    pub storage: StorageConfig,
    pub merge: MergePolicy,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: DEFAULT_BIND_ADDRESS.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Refresh interval such as "10m", "1h" or "90s".
    pub interval: String,
    pub refresh_on_start: bool,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            interval: "10m".to_string(),
            refresh_on_start: true,
        }
    }
}

impl ScheduleConfig {
    pub fn to_scheduler_config(&self) -> Result<SchedulerConfig, ConfigError> {
        let interval_secs =
            SchedulerConfig::parse_interval(&self.interval).map_err(ConfigError::Invalid)?;
        Ok(SchedulerConfig {
            interval_secs,
            refresh_on_start: self.refresh_on_start,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub timeout_secs: u64,
    pub workers: usize,
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_TIMEOUT.as_secs(),
            workers: DEFAULT_WORKERS,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl FetchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding subscriptions, custom rules and the merged result.
    /// Defaults to the platform data directory.
    pub data_dir: Option<PathBuf>,
}

impl StorageConfig {
    pub fn resolve_data_dir(&self) -> Result<PathBuf, ConfigError> {
        match &self.data_dir {
            Some(dir) => Ok(dir.clone()),
            None => {
                let data_dir = dirs::data_dir().ok_or(ConfigError::NoDataDir)?;
                Ok(data_dir.join("submerge"))
            }
        }
    }
}

impl Config {
    /// Load configuration from the default path.
    ///
    /// If the config file doesn't exist, creates a default one with comments.
    /// If the config file exists but is invalid, returns an error.
    /// Missing fields in the config file will use default values.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::default_config_path()?;
        Self::load_from(&config_path)
    }

    /// Load configuration from `path`, writing the commented default there
    /// first if it doesn't exist.
    pub fn load_from(config_path: &Path) -> Result<Self, ConfigError> {
        if !config_path.exists() {
            Self::create_default_config(config_path)?;
            return Ok(Self::default());
        }

        let content = fs::read_to_string(config_path).map_err(|e| ConfigError::Io {
            path: config_path.to_path_buf(),
            source: e,
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: config_path.to_path_buf(),
            source: e,
        })?;
        config.validate()?;

        Ok(config)
    }

    /// Get the default config file path: `~/.config/submerge/config.toml`
    pub fn default_config_path() -> Result<PathBuf, ConfigError> {
        let config_dir = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
        Ok(config_dir.join("submerge").join("config.toml"))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.scheduler.to_scheduler_config()?;
        Ok(())
    }

    /// Create a default config file with comments.
    fn create_default_config(path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| ConfigError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let mut file = fs::File::create(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;

        file.write_all(Self::default_config_content().as_bytes())
            .map_err(|e| ConfigError::Io {
                path: path.to_path_buf(),
                source: e,
            })?;

        Ok(())
    }

    /// Generate the default config file content with comments.
    fn default_config_content() -> String {
        format!(
            r##"# submerge configuration
#
# Intervals can be written as "90s", "10m", "1h" or "1d".

[server]
# Address the HTTP API listens on
bind_address = "{bind}"

[scheduler]
# How often every subscription is fetched and merged again
interval = "10m"

# Refresh once as soon as the server starts
refresh_on_start = true

[fetch]
# Per-request timeout in seconds
timeout_secs = {timeout}

# Maximum concurrent downloads; 0 fetches every subscription at once.
# Waiting for a free slot counts against timeout_secs.
workers = {workers}

# Some providers only serve Clash YAML to Clash-like clients
user_agent = "{agent}"

[storage]
# Where subscriptions.json, custom_rules.txt and merged.yaml live.
# Defaults to the platform data directory.
# data_dir = "/var/lib/submerge"

[merge]
# Prefix proxy-group names with the subscription label, like proxy names.
# When false, group names are kept and a later duplicate gets a numeric suffix.
namespace_groups = true
"##,
            bind = DEFAULT_BIND_ADDRESS,
            timeout = DEFAULT_TIMEOUT.as_secs(),
            workers = DEFAULT_WORKERS,
            agent = DEFAULT_USER_AGENT,
        )
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Could not determine config directory")]
    NoConfigDir,

    #[error("Could not determine data directory")]
    NoDataDir,

    #[error("Failed to read/write config file at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file at {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
