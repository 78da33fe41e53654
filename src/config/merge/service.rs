//! MergeService: orchestrates sources, applies merge policy, deserializes to NotecaskConfig.

use super::policy;
use crate::config::sources::{environment, global_file};
use crate::config::NotecaskConfig;
use config::{ConfigError, File};
use std::path::Path;

/// Merge service for config composition.
pub struct MergeService;

impl MergeService {
    /// Precedence: defaults (lowest) -> global file -> explicit file -> environment (highest).
    pub fn load(explicit: Option<&Path>) -> Result<NotecaskConfig, ConfigError> {
        let builder = policy::builder_with_defaults()?;
        let builder = global_file::add_to_builder(builder)?;
        let builder = match explicit {
            Some(path) => builder.add_source(File::from(path.to_path_buf()).required(true)),
            None => builder,
        };
        let builder = environment::add_to_builder(builder)?;

        builder.build()?.try_deserialize()
    }

    /// Load config from a specific file with environment overlay.
    pub fn load_from_file(path: &Path) -> Result<NotecaskConfig, ConfigError> {
        let builder = policy::builder_with_defaults()?;
        let builder = builder.add_source(File::from(path.to_path_buf()).required(true));
        let builder = environment::add_to_builder(builder)?;

        builder.build()?.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_file_overrides_defaults() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("notecask.toml");
        fs::write(
            &path,
            "[archive]\nsort_entries = false\nbackup_dir = \"/backups\"\n\n[index]\nenabled = false\n",
        )
        .unwrap();

        let config = MergeService::load_from_file(&path).unwrap();
        if std::env::var("NOTECASK__ARCHIVE__SORT_ENTRIES").is_err() {
            assert!(!config.archive.sort_entries);
        }
        assert_eq!(config.archive.backup_dir, Some("/backups".into()));
        assert_eq!(config.archive.progress_interval_ms, 100);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_missing_explicit_file_fails() {
        let temp = tempfile::tempdir().unwrap();
        let missing = temp.path().join("missing.toml");
        assert!(MergeService::load(Some(&missing)).is_err());
    }
}
