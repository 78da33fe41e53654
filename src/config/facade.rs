//! ConfigLoader facade delegating to the merge service.

use super::merge::service::MergeService;
use super::NotecaskConfig;
use config::ConfigError;
use std::path::{Path, PathBuf};

/// Configuration loader facade.
pub struct ConfigLoader;

impl ConfigLoader {
    /// `$XDG_CONFIG_HOME/notecask/config.toml`, if it can be located.
    pub fn global_config_path() -> Option<PathBuf> {
        super::sources::global_file::path()
    }

    /// Load configuration from the standard sources plus an optional explicit file.
    pub fn load(explicit: Option<&Path>) -> Result<NotecaskConfig, ConfigError> {
        MergeService::load(explicit)
    }

    /// Load configuration from one file with the environment overlay only.
    pub fn load_from_file(path: &Path) -> Result<NotecaskConfig, ConfigError> {
        MergeService::load_from_file(path)
    }
}
