//! Configuration loading and persisted preferences
//!
//! Resolution follows a fixed priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. TOML config file in the platform config directory
//! 4. Compiled defaults (fallback)
//!
//! A missing config file is not an error: the player starts on defaults and
//! logs a warning.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "STREAMER_CONFIG";

/// Idle window after which a non-rendering player stops itself
pub const DEFAULT_INACTIVITY_TIMEOUT_MS: u64 = 30_000;

/// Persisted user preferences, read once when the coordinator starts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Preferences {
    /// Show a transport-control notification while playing
    pub notifications_enabled: bool,
    /// Default catalog country (ISO 3166-1 alpha-2)
    pub country: String,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            notifications_enabled: true,
            country: "US".to_string(),
        }
    }
}

/// Player configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// HTTP control port
    pub port: u16,
    /// Idle self-stop delay in milliseconds
    pub inactivity_timeout_ms: u64,
    /// Progress publication interval in milliseconds
    pub progress_interval_ms: u64,
    /// Length of a preview clip in milliseconds
    pub preview_duration_ms: u64,
    /// Event bus buffer size
    pub event_capacity: usize,
    /// Persisted preferences
    pub preferences: Preferences,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            port: 5750,
            inactivity_timeout_ms: DEFAULT_INACTIVITY_TIMEOUT_MS,
            progress_interval_ms: 1000,
            preview_duration_ms: crate::track::PREVIEW_DURATION_MS,
            event_capacity: 100,
            preferences: Preferences::default(),
        }
    }
}

impl PlayerConfig {
    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: PlayerConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate configuration from a TOML file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Reject values the player cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.progress_interval_ms == 0 {
            return Err(Error::Config(
                "progress_interval_ms must be greater than zero".to_string(),
            ));
        }
        if self.inactivity_timeout_ms == 0 {
            return Err(Error::Config(
                "inactivity_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.preview_duration_ms == 0 {
            return Err(Error::Config(
                "preview_duration_ms must be greater than zero".to_string(),
            ));
        }
        if self.event_capacity == 0 {
            return Err(Error::Config("event_capacity must be greater than zero".to_string()));
        }
        if self.preferences.country.len() != 2
            || !self.preferences.country.chars().all(|c| c.is_ascii_alphabetic())
        {
            return Err(Error::Config(format!(
                "country must be a two-letter code, got {:?}",
                self.preferences.country
            )));
        }
        Ok(())
    }
}

/// Resolve the config file path following the priority order
///
/// Returns `None` when no explicit path was given and the platform default
/// does not exist.
pub fn resolve_config_path(cli_arg: Option<&Path>, env_var_name: &str) -> Option<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(env_var_name) {
        if !path.is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    // Priority 3: Platform config directory
    default_config_path().filter(|path| path.exists())
}

/// Platform default config file location (`<config_dir>/streamer/config.toml`)
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("streamer").join("config.toml"))
}

/// Load configuration, falling back to compiled defaults when no file exists
///
/// An explicitly named file that is missing falls back to defaults with a
/// warning; a file that exists but fails to parse or validate is an error.
pub fn load_config(cli_arg: Option<&Path>, env_var_name: &str) -> Result<PlayerConfig> {
    let Some(path) = resolve_config_path(cli_arg, env_var_name) else {
        info!("No config file found, using compiled defaults");
        return Ok(PlayerConfig::default());
    };

    if !path.exists() {
        warn!("Config file {} not found, using compiled defaults", path.display());
        return Ok(PlayerConfig::default());
    }

    info!("Loading configuration from {}", path.display());
    PlayerConfig::load_from_file(&path)
}
