//! Configuration loading and management
//!
//! Configuration is loaded from `~/.config/scolaris/config.toml`
//!
//! This module follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/scolaris/` (~/.config/scolaris/)
//! - Data: `$XDG_DATA_HOME/scolaris/` (~/.local/share/scolaris/)
//! - State/Logs: `$XDG_STATE_HOME/scolaris/` (~/.local/state/scolaris/)

use crate::error::{Error, Result};
use chrono::{Datelike, NaiveDate, Utc};
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
    /// Statistics engine configuration
    #[serde(default)]
    pub stats: StatsConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Statistics engine configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StatsConfig {
    /// First day of the academic year; seeds week-period generation
    /// for duplicate detection.
    #[serde(default = "default_academic_year_start")]
    pub academic_year_start: NaiveDate,

    /// Seconds before a cached stats entry is considered stale.
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,

    /// Bound on the record-fetch step, in seconds.
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            academic_year_start: default_academic_year_start(),
            cache_ttl_secs: default_cache_ttl_secs(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
        }
    }
}

/// September 1st of the current academic year.
fn default_academic_year_start() -> NaiveDate {
    let today = Utc::now().date_naive();
    let year = if today.month() >= 9 {
        today.year()
    } else {
        today.year() - 1
    };
    // September 1st always exists
    NaiveDate::from_ymd_opt(year, 9, 1).unwrap_or(today)
}

fn default_cache_ttl_secs() -> u64 {
    60
}

fn default_fetch_timeout_secs() -> u64 {
    10
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

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        if self.stats.cache_ttl_secs == 0 {
            return Err(Error::Config(
                "stats.cache_ttl_secs must be greater than 0".to_string(),
            ));
        }
        if self.stats.fetch_timeout_secs == 0 {
            return Err(Error::Config(
                "stats.fetch_timeout_secs must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/scolaris/config.toml` (~/.config/scolaris/config.toml)
    pub fn config_path() -> PathBuf {
        xdg_config_home().join("scolaris").join("config.toml")
    }

    /// Returns the data directory path (for the SQLite database)
    ///
    /// `$XDG_DATA_HOME/scolaris/` (~/.local/share/scolaris/)
    pub fn data_dir() -> PathBuf {
        xdg_data_home().join("scolaris")
    }

    /// Returns the state directory path (for logs)
    ///
    /// `$XDG_STATE_HOME/scolaris/` (~/.local/state/scolaris/)
    pub fn state_dir() -> PathBuf {
        xdg_state_home().join("scolaris")
    }

    /// Returns the database file path
    ///
    /// `$XDG_DATA_HOME/scolaris/data.db` (~/.local/share/scolaris/data.db)
    pub fn database_path() -> PathBuf {
        Self::data_dir().join("data.db")
    }

    /// Returns the log file path
    ///
    /// `$XDG_STATE_HOME/scolaris/scolaris.log` (~/.local/state/scolaris/scolaris.log)
    pub fn log_path() -> PathBuf {
        Self::state_dir().join("scolaris.log")
    }
}
