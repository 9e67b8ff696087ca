//! Configuration file parser for ~/.config/calfeed/config.toml.
//!
//! The config file is optional and a missing file yields `Config::default()`.
//! Unknown keys are accepted, but each one is logged as a warning since it is
//! most likely a typo.
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Color given to calendars created without one.
pub const DEFAULT_COLOR: &str = "#0084d1";

/// Hourly, like a `0 * * * *` schedule.
pub const DEFAULT_REFRESH_INTERVAL_MINUTES: u64 = 60;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Config file too large: {0}")]
    TooLarge(String),
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Log output format for the subscriber installed by the binary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Pretty,
    /// One JSON object per event.
    Json,
}

/// Top-level application configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// SQLite file holding calendar sources and snapshots.
    /// `None` means `calendars.db` next to the config file.
    pub database_path: Option<PathBuf>,

    /// Color for calendars created or edited without one.
    pub default_color: String,

    pub log_format: LogFormat,

    /// Minutes between full refreshes in `watch` mode. 0 = manual refresh only.
    pub refresh_interval_minutes: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: None,
            default_color: DEFAULT_COLOR.to_string(),
            log_format: LogFormat::default(),
            refresh_interval_minutes: DEFAULT_REFRESH_INTERVAL_MINUTES,
        }
    }
}

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    const KNOWN_KEYS: [&'static str; 4] = [
        "database_path",
        "default_color",
        "log_format",
        "refresh_interval_minutes",
    ];

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → accepted, logged as warning
    ///
    /// An empty `default_color` is replaced by [`DEFAULT_COLOR`].
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // Deleted between metadata and read
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if !Self::KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let mut config: Config = toml::from_str(&content)?;
        if config.default_color.trim().is_empty() {
            config.default_color = DEFAULT_COLOR.to_string();
        }
        tracing::info!(
            path = %path.display(),
            log_format = ?config.log_format,
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Period of the `watch` loop, or `None` when scheduled refresh is off.
    pub fn refresh_interval(&self) -> Option<std::time::Duration> {
        (self.refresh_interval_minutes > 0)
            .then(|| std::time::Duration::from_secs(self.refresh_interval_minutes * 60))
    }

    /// Database location: the configured path, or `calendars.db` in `config_dir`.
    pub fn database_path_in(&self, config_dir: &Path) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(|| config_dir.join("calendars.db"))
    }
}

// ============================================================================
// Tests
// ============================================================================
