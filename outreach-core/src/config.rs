//! Configuration loading and management
//!
//! Configuration is loaded from `~/.config/outreach/config.toml`
//!
//! This module follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/outreach/` (~/.config/outreach/)
//! - Data: `$XDG_DATA_HOME/outreach/` (~/.local/share/outreach/)
//! - State/Logs: `$XDG_STATE_HOME/outreach/` (~/.local/state/outreach/)

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::PathBuf;

/// Returns a best-effort home directory path.
fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Returns XDG_CONFIG_HOME or ~/.config
fn xdg_config_home() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
}

/// Returns XDG_DATA_HOME or ~/.local/share
fn xdg_data_home() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/share"))
}

/// Returns XDG_STATE_HOME or ~/.local/state
fn xdg_state_home() -> PathBuf {
    std::env::var("XDG_STATE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/state"))
}

/// Main configuration struct
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    /// Pipeline policy knobs
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Pipeline policy configuration.
///
/// The suppression thresholds and the cooldown window are business policy,
/// not invariants, so they live here rather than in code.
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// Consecutive `no` events before a target is hard-suppressed
    #[serde(default = "default_no_threshold")]
    pub no_threshold: u32,

    /// Cooldown window applied on a `bounce` event, in days
    #[serde(default = "default_bounce_cooldown_days")]
    pub bounce_cooldown_days: i64,

    /// `no`/`bounce` events without a reply before a claim is staged cold
    #[serde(default = "default_cold_threshold")]
    pub cold_threshold: u32,

    /// Default pipeline list page size
    #[serde(default = "default_list_limit")]
    pub default_list_limit: u32,

    /// Lower bound for the pipeline list limit
    #[serde(default = "default_min_list_limit")]
    pub min_list_limit: u32,

    /// Upper bound for the pipeline list limit
    #[serde(default = "default_max_list_limit")]
    pub max_list_limit: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            no_threshold: default_no_threshold(),
            bounce_cooldown_days: default_bounce_cooldown_days(),
            cold_threshold: default_cold_threshold(),
            default_list_limit: default_list_limit(),
            min_list_limit: default_min_list_limit(),
            max_list_limit: default_max_list_limit(),
        }
    }
}

impl PipelineConfig {
    /// Clamp a requested list limit into the configured bounds.
    pub fn clamp_list_limit(&self, requested: Option<u32>) -> u32 {
        requested
            .unwrap_or(self.default_list_limit)
            .clamp(self.min_list_limit, self.max_list_limit)
    }
}

fn default_no_threshold() -> u32 {
    3
}

fn default_bounce_cooldown_days() -> i64 {
    14
}

fn default_cold_threshold() -> u32 {
    3
}

fn default_list_limit() -> u32 {
    50
}

fn default_min_list_limit() -> u32 {
    10
}

fn default_max_list_limit() -> u32 {
    200
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Maximum number of log files to keep
    #[serde(default = "default_max_log_files")]
    pub max_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            max_files: default_max_log_files(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_log_files() -> usize {
    5
}

impl Config {
    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            return Ok(Config::default());
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &PathBuf) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {:?}: {}", path, e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;

        Ok(config)
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/outreach/config.toml` (~/.config/outreach/config.toml)
    pub fn config_path() -> PathBuf {
        xdg_config_home().join("outreach").join("config.toml")
    }

    /// Returns the data directory path (for SQLite database)
    ///
    /// `$XDG_DATA_HOME/outreach/` (~/.local/share/outreach/)
    pub fn data_dir() -> PathBuf {
        xdg_data_home().join("outreach")
    }

    /// Returns the state directory path (for logs)
    ///
    /// `$XDG_STATE_HOME/outreach/` (~/.local/state/outreach/)
    pub fn state_dir() -> PathBuf {
        xdg_state_home().join("outreach")
    }

    /// Returns the database file path
    ///
    /// `$XDG_DATA_HOME/outreach/pipeline.db` (~/.local/share/outreach/pipeline.db)
    pub fn database_path() -> PathBuf {
        Self::data_dir().join("pipeline.db")
    }

    /// Returns the log file path
    ///
    /// `$XDG_STATE_HOME/outreach/outreach.log` (~/.local/state/outreach/outreach.log)
    pub fn log_path() -> PathBuf {
        Self::state_dir().join("outreach.log")
    }
}
