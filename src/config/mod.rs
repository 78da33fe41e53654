//! Configuration
//!
//! Sources, lowest precedence first: built-in defaults,
//! `$XDG_CONFIG_HOME/notecask/config.toml`, an explicit `--config` file, and
//! `NOTECASK__*` environment variables (`__` separates nested keys).

mod facade;
pub mod paths {
    pub mod xdg_root;
}
pub mod merge {
    pub mod policy;
    pub mod service;
}
pub mod preferences;
pub mod sources {
    pub mod environment;
    pub mod global_file;
}

pub use facade::ConfigLoader;
pub use paths::xdg_root as xdg;
pub use preferences::Preferences;

use crate::archive::ArchiveOptions;
use crate::error::ApiError;
use crate::index::IndexBackend;
use crate::logging::LoggingConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NotecaskConfig {
    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub archive: ArchiveConfig,

    #[serde(default)]
    pub index: IndexConfig,
}

/// Backup and restore settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchiveConfig {
    /// Directory for automatically named backups; defaults to the
    /// notebook's parent directory.
    #[serde(default)]
    pub backup_dir: Option<PathBuf>,

    /// Archive siblings in name order
    #[serde(default = "default_true")]
    pub sort_entries: bool,

    /// How often the CLI redraws progress
    #[serde(default = "default_progress_interval_ms")]
    pub progress_interval_ms: u64,
}

fn default_true() -> bool {
    true
}

fn default_progress_interval_ms() -> u64 {
    100
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            backup_dir: None,
            sort_entries: default_true(),
            progress_interval_ms: default_progress_interval_ms(),
        }
    }
}

impl ArchiveConfig {
    pub fn options(&self) -> ArchiveOptions {
        ArchiveOptions {
            sort_entries: self.sort_entries,
        }
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms.max(1))
    }

    /// Directory to place backups of the notebook at `notebook` in.
    pub fn backup_dir_for(&self, notebook: &Path) -> PathBuf {
        match &self.backup_dir {
            Some(dir) => dir.clone(),
            None => notebook
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from(".")),
        }
    }
}

/// Node index settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Index database location; defaults to the notebook's XDG data directory.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            path: None,
        }
    }
}

impl IndexConfig {
    /// Index backend for the notebook stored at `notebook`.
    pub fn backend(&self, notebook: &Path) -> Result<IndexBackend, ApiError> {
        if !self.enabled {
            return Ok(IndexBackend::Disabled);
        }
        let path = match &self.path {
            Some(path) => path.clone(),
            None => xdg::notebook_data_dir(notebook)?.join("index"),
        };
        Ok(IndexBackend::Sled { path })
    }
}
