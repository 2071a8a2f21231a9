use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::Deserialize;

/// Application configuration loaded from TOML config file.
/// All fields have sensible defaults — the config file is optional.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Database path (overrides XDG default).
    pub db_path: Option<PathBuf>,
    /// Backfill pass settings.
    pub backfill: BackfillConfig,
}

/// Backfill configuration.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct BackfillConfig {
    /// Fill shows that have no related URL with a generated NPR.org link.
    pub generate: bool,
}

impl AppConfig {
    /// Load config from `~/.config/show-urls/config.toml`.
    /// Returns default config if file doesn't exist.
    /// Logs a warning if the file exists but can't be parsed.
    pub fn load() -> Self {
        let config_path = Self::config_path();
        match config_path {
            Some(path) if path.exists() => match Self::load_from(&path) {
                Ok(config) => config,
                Err(e) => {
                    log::warn!("{e:#}. Using defaults.");
                    Self::default()
                }
            },
            _ => {
                log::debug!("No config file found, using defaults");
                Self::default()
            }
        }
    }

    /// Load config from an explicit path. Unlike [`AppConfig::load`], a missing
    /// or broken file is an error.
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config = Self::parse(&contents)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        log::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    fn parse(contents: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    /// Get the config file path.
    fn config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", crate::APP_NAME)
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }
}

/// Resolve the default database path using XDG data directory.
///
/// The directory is not created: the database must already exist.
pub fn default_db_path() -> PathBuf {
    if let Some(dirs) = ProjectDirs::from("", "", crate::APP_NAME) {
        dirs.data_dir().join("shows.db")
    } else {
        // Fallback: current directory
        PathBuf::from("shows.db")
    }
}
