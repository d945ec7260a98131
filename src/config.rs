//! Configuration file support for pos-backup
//!
//! Reads from .pos-backup/config.toml (found by walking up from the working
//! directory) or from an explicit `--config` path.

use crate::error::{Error, Result};
use crate::seed::SeedCategory;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Configuration structure
#[derive(Debug, Deserialize, Serialize, Default, Clone)]
pub struct Config {
    /// Local database settings
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Backup directory and restore script settings
    #[serde(default)]
    pub backup: BackupConfig,

    /// Remote document store settings
    #[serde(default)]
    pub remote: RemoteConfig,

    /// Category seeding settings
    #[serde(default)]
    pub seed: SeedConfig,
}

/// Local database settings
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DatabaseConfig {
    /// Database file used when `--db` / POS_BACKUP_DB_PATH are not given
    /// Default: "restaurant_ohbombaymilton_at_gmail_com.db"
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

/// Backup-related configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct BackupConfig {
    /// Directory under which tablet_backup_<timestamp> folders are created
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Destination database path hard-coded into generated restore scripts
    #[serde(default = "default_restore_db_path")]
    pub restore_db_path: String,

    /// Tables that get a dedicated restore_<table>.sh script
    /// Default: ["categories", "menu_items"]
    #[serde(default = "default_script_tables")]
    pub script_tables: Vec<String>,
}

/// Remote (Firestore) configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RemoteConfig {
    /// Google Cloud project hosting the Firestore database
    #[serde(default)]
    pub project_id: Option<String>,

    /// Category names kept by `prune` when `--keep` is not given
    /// Default: ["Snacks", "Receipts"]
    #[serde(default = "default_keep_categories")]
    pub keep_categories: Vec<String>,
}

/// Seeding configuration
#[derive(Debug, Deserialize, Serialize, Default, Clone)]
pub struct SeedConfig {
    /// Replaces the built-in category list when present
    #[serde(default)]
    pub categories: Option<Vec<SeedCategory>>,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("restaurant_ohbombaymilton_at_gmail_com.db")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_restore_db_path() -> String {
    "restaurant_ohbombaymilton_at_gmail_com.db".to_string()
}

fn default_script_tables() -> Vec<String> {
    vec!["categories".to_string(), "menu_items".to_string()]
}

fn default_keep_categories() -> Vec<String> {
    vec!["Snacks".to_string(), "Receipts".to_string()]
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            restore_db_path: default_restore_db_path(),
            script_tables: default_script_tables(),
        }
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            project_id: None,
            keep_categories: default_keep_categories(),
        }
    }
}

impl Config {
    /// Load config from an explicit path, or from .pos-backup/config.toml
    ///
    /// An explicit path must exist and parse. A discovered file that fails to
    /// parse is reported and ignored, and defaults are used instead.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            let contents = std::fs::read_to_string(path).map_err(|e| {
                Error::Malformed(format!("could not read config {}: {}", path.display(), e))
            })?;
            return Self::from_toml_str(&contents)
                .map_err(|e| Error::Malformed(format!("{}: {}", path.display(), e)));
        }

        if let Some(path) = Self::find_config_path() {
            match std::fs::read_to_string(&path) {
                Ok(contents) => match Self::from_toml_str(&contents) {
                    Ok(config) => {
                        tracing::debug!(path = %path.display(), "loaded config");
                        return Ok(config);
                    }
                    Err(e) => {
                        tracing::warn!(path = %path.display(), error = %e, "ignoring unparsable config");
                    }
                },
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "ignoring unreadable config");
                }
            }
        }
        Ok(Self::default())
    }

    /// Parse a TOML document
    pub fn from_toml_str(contents: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    /// Find config.toml by walking up directory tree
    fn find_config_path() -> Option<PathBuf> {
        let current_dir = std::env::current_dir().ok()?;
        let mut dir = current_dir.as_path();

        loop {
            let config_path = dir.join(".pos-backup").join("config.toml");
            if config_path.exists() {
                return Some(config_path);
            }

            match dir.parent() {
                Some(parent) => dir = parent,
                None => break,
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.backup.script_tables, vec!["categories", "menu_items"]);
        assert_eq!(config.remote.keep_categories, vec!["Snacks", "Receipts"]);
        assert!(config.remote.project_id.is_none());
        assert!(config.seed.categories.is_none());
    }

    #[test]
    fn test_parse_config() {
        let toml = r#"
[database]
path = "pos.db"

[backup]
restore_db_path = "/sdcard/pos.db"
script_tables = ["categories", "orders"]

[remote]
project_id = "pos-prod"
keep_categories = ["Snacks"]

[[seed.categories]]
name = "DESSERTS"
description = "Sweet things"
icon = "🍨"
sort_order = 11
"#;
        let config = Config::from_toml_str(toml).unwrap();
        assert_eq!(config.database.path, PathBuf::from("pos.db"));
        assert_eq!(config.backup.restore_db_path, "/sdcard/pos.db");
        assert_eq!(config.backup.script_tables, vec!["categories", "orders"]);
        assert_eq!(config.remote.project_id.as_deref(), Some("pos-prod"));
        assert_eq!(config.remote.keep_categories, vec!["Snacks"]);

        let seeds = config.seed.categories.unwrap();
        assert_eq!(seeds.len(), 1);
        assert_eq!(seeds[0].name, "DESSERTS");
        assert_eq!(seeds[0].sort_order, 11);
        // Unset fields fall back to their defaults
        assert_eq!(seeds[0].color, "#FF6B6B");
        assert!(seeds[0].id.is_none());
    }

    #[test]
    fn test_partial_config_keeps_defaults() {
        let config = Config::from_toml_str("[remote]\nproject_id = \"x\"\n").unwrap();
        assert_eq!(config.backup.output_dir, PathBuf::from("."));
        assert_eq!(config.remote.keep_categories.len(), 2);
    }

    #[test]
    fn test_explicit_missing_config_is_error() {
        let err = Config::load(Some(Path::new("/nonexistent/pos-backup.toml"))).unwrap_err();
        assert!(matches!(err, Error::Malformed(_)));
    }
}
