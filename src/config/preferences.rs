//! Remembered user choices
//!
//! Directories last used for backups and restores, kept in
//! `$XDG_CONFIG_HOME/notecask/preferences.toml`.

use super::xdg;
use crate::error::ApiError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

const PREFERENCES_FILE: &str = "preferences.toml";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preferences {
    /// Directory of the last archive written.
    #[serde(default)]
    pub backup_dir: Option<PathBuf>,

    /// Directory of the last archive restored from.
    #[serde(default)]
    pub restore_dir: Option<PathBuf>,
}

impl Preferences {
    pub fn default_path() -> Result<PathBuf, ApiError> {
        Ok(xdg::config_dir()?.join(PREFERENCES_FILE))
    }

    /// Read preferences; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ApiError> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(e.into()),
        };
        toml::from_str(&text).map_err(|e| {
            ApiError::ConfigError(format!("Invalid preferences file {}: {}", path.display(), e))
        })
    }

    pub fn save(&self, path: &Path) -> Result<(), ApiError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let text = toml::to_string_pretty(self)
            .map_err(|e| ApiError::ConfigError(format!("Could not encode preferences: {}", e)))?;
        fs::write(path, text)?;
        debug!(path = %path.display(), "Saved preferences");
        Ok(())
    }

    pub fn remember_backup(&mut self, archive: &Path) {
        self.backup_dir = parent_dir(archive);
    }

    pub fn remember_restore(&mut self, archive: &Path) {
        self.restore_dir = parent_dir(archive);
    }
}

fn parent_dir(path: &Path) -> Option<PathBuf> {
    path.parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
}
