//! Configuration management for the journal.
//!
//! This module provides configuration loading, saving, and defaults.
//! Configuration is stored in TOML format in a platform-appropriate location.

use crate::error::{JournalError, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Main configuration structure for the journal.
///
/// ## Example Configuration File (journal.toml)
///
/// ```toml
/// [general]
/// log_level = "debug"
///
/// [paging]
/// page_size = 10
/// min_pages_to_cache = 3
/// max_pages_to_cache = 5
///
/// [storage]
/// metadata_dir = ".Sugar-Metadata"
///
/// [remote]
/// mount_root = "/tmp/"
///
/// [user]
/// icon_color = "#FF0000,#00FF00"
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Result set window sizing
    pub paging: PagingConfig,

    /// Sidecar layout on removable media
    pub storage: StorageConfig,

    /// Remote share locations
    pub remote: RemoteConfig,

    /// Per-user settings
    pub user: UserConfig,
}

/// General configuration options
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        GeneralConfig {
            log_level: "info".to_string(),
        }
    }
}

/// Window sizing for result sets.
///
/// A fresh window holds `min_pages_to_cache` pages; incremental scrolling
/// may grow it up to `max_pages_to_cache` pages before the far end is
/// trimmed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PagingConfig {
    /// Entries per page
    pub page_size: usize,

    /// Pages fetched when the window is (re)built
    pub min_pages_to_cache: usize,

    /// Upper bound on cached pages
    pub max_pages_to_cache: usize,
}

impl Default for PagingConfig {
    fn default() -> Self {
        PagingConfig {
            page_size: 10,
            min_pages_to_cache: 3,
            max_pages_to_cache: 5,
        }
    }
}

impl PagingConfig {
    /// Check that the window can grow before it has to be trimmed.
    pub fn validate(&self) -> Result<()> {
        if self.page_size == 0 || self.min_pages_to_cache == 0 {
            return Err(JournalError::ConfigError {
                reason: "page_size and min_pages_to_cache must be positive".to_string(),
            });
        }
        if self.min_pages_to_cache >= self.max_pages_to_cache {
            return Err(JournalError::ConfigError {
                reason: format!(
                    "min_pages_to_cache ({}) must be less than max_pages_to_cache ({})",
                    self.min_pages_to_cache, self.max_pages_to_cache
                ),
            });
        }
        Ok(())
    }
}

/// Sidecar metadata layout
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Hidden directory holding `.metadata` and `.preview` sidecars
    pub metadata_dir: String,

    /// Directory used by the old on-device object store layout
    pub legacy_store_dir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig {
            metadata_dir: ".Sugar-Metadata".to_string(),
            legacy_store_dir: ".olpc.store".to_string(),
        }
    }
}

/// Remote share configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Mount points below this prefix are remote shares
    pub mount_root: String,

    /// Where the share client mirrors downloaded metadata (defaults to
    /// `mount_root`)
    pub mirror_root: Option<PathBuf>,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        RemoteConfig {
            mount_root: "/tmp/".to_string(),
            mirror_root: None,
        }
    }
}

impl RemoteConfig {
    pub fn mirror_root(&self) -> PathBuf {
        self.mirror_root
            .clone()
            .unwrap_or_else(|| PathBuf::from(&self.mount_root))
    }
}

/// Per-user settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UserConfig {
    /// Colour stamped on entries copied into the object store that still
    /// carry the default colour
    pub icon_color: String,
}

impl Default for UserConfig {
    fn default() -> Self {
        UserConfig {
            icon_color: crate::types::DEFAULT_ICON_COLOR.to_string(),
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    ///
    /// Returns default config if no config file exists.
    pub fn load() -> Result<Self> {
        let config_path = Self::default_config_path()?;
        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "Config file not found, using defaults");
            return Ok(Config::default());
        }

        info!(path = %path.display(), "Loading configuration");
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents).map_err(|e| JournalError::ConfigError {
            reason: format!("Failed to parse config: {}", e),
        })?;
        config.paging.validate()?;

        Ok(config)
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<()> {
        let config_path = Self::default_config_path()?;
        self.save_to(&config_path)
    }

    /// Save configuration to a specific path.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        info!(path = %path.display(), "Saving configuration");
        let contents = toml::to_string_pretty(self).map_err(|e| JournalError::ConfigError {
            reason: format!("Failed to serialize config: {}", e),
        })?;

        fs::write(path, contents)?;
        Ok(())
    }

    /// Get the default configuration file path.
    pub fn default_config_path() -> Result<PathBuf> {
        let dirs =
            ProjectDirs::from("org", "sugarlabs", "journal").ok_or_else(|| {
                JournalError::ConfigError {
                    reason: "Could not determine config directory".to_string(),
                }
            })?;

        Ok(dirs.config_dir().join("journal.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.paging.page_size, 10);
        assert_eq!(config.storage.metadata_dir, ".Sugar-Metadata");
        assert_eq!(config.remote.mirror_root(), PathBuf::from("/tmp/"));
        assert!(config.paging.validate().is_ok());
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("journal.toml");

        let mut config = Config::default();
        config.paging.page_size = 25;
        config.remote.mount_root = "/run/shares/".to_string();

        config.save_to(&config_path).unwrap();
        let loaded = Config::load_from(&config_path).unwrap();

        assert_eq!(loaded.paging.page_size, 25);
        assert_eq!(loaded.remote.mount_root, "/run/shares/");
        assert_eq!(loaded.storage, StorageConfig::default());
    }

    #[test]
    fn test_load_nonexistent() {
        let temp_dir = TempDir::new().unwrap();
        let config = Config::load_from(&temp_dir.path().join("missing.toml")).unwrap();
        assert_eq!(config.paging, PagingConfig::default());
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("journal.toml");
        fs::write(&config_path, "[paging]\npage_size = 4\n").unwrap();

        let config = Config::load_from(&config_path).unwrap();
        assert_eq!(config.paging.page_size, 4);
        assert_eq!(config.paging.max_pages_to_cache, 5);
        assert_eq!(config.general.log_level, "info");
    }

    #[test]
    fn test_rejects_window_without_headroom() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("journal.toml");
        fs::write(
            &config_path,
            "[paging]\nmin_pages_to_cache = 5\nmax_pages_to_cache = 5\n",
        )
        .unwrap();

        let err = Config::load_from(&config_path).unwrap_err();
        assert!(matches!(err, JournalError::ConfigError { .. }));
    }
}
