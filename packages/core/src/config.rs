//! Storefront Configuration
//!
//! Paths and limits shared by the services and the `category-tree` binary.
//! Values start from [`StorefrontConfig::default`] and can be overridden from
//! the environment:
//!
//! | Variable                  | Field             |
//! |---------------------------|-------------------|
//! | `STOREFRONT_DB_PATH`      | `db_path`         |
//! | `STOREFRONT_BACKUP_DIR`   | `backup_dir`      |
//! | `STOREFRONT_MEDIA_ROOT`   | `media_root`      |
//! | `STOREFRONT_MAX_NAME_LEN` | `max_name_length` |

use crate::models::MAX_NAME_LENGTH;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

pub const ENV_DB_PATH: &str = "STOREFRONT_DB_PATH";
pub const ENV_BACKUP_DIR: &str = "STOREFRONT_BACKUP_DIR";
pub const ENV_MEDIA_ROOT: &str = "STOREFRONT_MEDIA_ROOT";
pub const ENV_MAX_NAME_LEN: &str = "STOREFRONT_MAX_NAME_LEN";

/// Configuration errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {reason}")]
    InvalidValue { key: String, reason: String },
}

impl ConfigError {
    pub fn invalid_value(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            key: key.into(),
            reason: reason.into(),
        }
    }
}

/// Catalog configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StorefrontConfig {
    /// SQLite database file (default: ./data/storefront.db)
    pub db_path: PathBuf,
    /// Directory for category snapshots (default: ./backups)
    pub backup_dir: PathBuf,
    /// Root of stored media files (default: ./media)
    pub media_root: PathBuf,
    /// Maximum category/product name length in characters (default: 200)
    pub max_name_length: usize,
}

impl Default for StorefrontConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("data/storefront.db"),
            backup_dir: PathBuf::from("backups"),
            media_root: PathBuf::from("media"),
            max_name_length: MAX_NAME_LENGTH,
        }
    }
}

impl StorefrontConfig {
    /// Defaults with environment overrides applied, then validated
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as `from_env`, reading variables through `lookup`
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(path) = lookup(ENV_DB_PATH) {
            config.db_path = PathBuf::from(path);
        }
        if let Some(dir) = lookup(ENV_BACKUP_DIR) {
            config.backup_dir = PathBuf::from(dir);
        }
        if let Some(root) = lookup(ENV_MEDIA_ROOT) {
            config.media_root = PathBuf::from(root);
        }
        if let Some(raw) = lookup(ENV_MAX_NAME_LEN) {
            config.max_name_length = raw.trim().parse().map_err(|e| {
                ConfigError::invalid_value(ENV_MAX_NAME_LEN, format!("'{}': {}", raw, e))
            })?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.db_path.as_os_str().is_empty() {
            return Err(ConfigError::invalid_value("db_path", "must not be empty"));
        }
        if self.max_name_length == 0 {
            return Err(ConfigError::invalid_value(
                "max_name_length",
                "must be at least 1",
            ));
        }
        Ok(())
    }

    /// Timestamped snapshot path inside `backup_dir`
    ///
    /// `categories_backup_YYYYMMDDHHMMSS.json`
    pub fn default_backup_path(&self, now: DateTime<Utc>) -> PathBuf {
        self.backup_dir.join(format!(
            "categories_backup_{}.json",
            now.format("%Y%m%d%H%M%S")
        ))
    }
}
