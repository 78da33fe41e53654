//! Notebook backup and restore
//!
//! A backup is a gzip-compressed tar stream holding one top-level directory,
//! named after the notebook directory, with the whole node tree below it.
//! Entries use ustar headers; names the format cannot carry verbatim are
//! preceded by a PAX `path` record.

pub mod reader;
pub mod writer;

pub use reader::{restore_notebook, RestoreMode, RestoreSummary};
pub use writer::{archive_notebook, ArchiveOptions, ArchiveSummary};

use crate::store::naming::{self, NewFilename};
use chrono::NaiveDate;
use std::io;
use std::path::{Path, PathBuf};

/// Extension given to backups.
pub const ARCHIVE_EXTENSION: &str = ".tar.gz";

/// Longest progress detail shown for one entry.
pub const MAX_DETAIL_LEN: usize = 100;

/// Names longer than this (in bytes) do not fit a ustar name field.
pub(crate) const USTAR_NAME_LEN: usize = 100;

/// Shorten `name` to at most `max` characters, keeping its tail.
pub fn truncate_filename(name: &str, max: usize) -> String {
    let len = name.chars().count();
    if len <= max {
        return name.to_string();
    }
    let keep = max.saturating_sub(3);
    let tail: String = name.chars().skip(len - keep).collect();
    format!("...{}", tail)
}

/// Unused backup path `<backup_dir>/<notebook name>-YYYY-MM-DD.tar.gz`.
///
/// Later backups on the same day become `...-YYYY-MM-DD.2.tar.gz` and so on.
pub fn default_archive_path(
    notebook_path: &Path,
    backup_dir: &Path,
    date: NaiveDate,
) -> io::Result<PathBuf> {
    let name = notebook_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "notebook".to_string());
    let base = format!("{}-{}", name, date.format("%Y-%m-%d"));
    let opts = NewFilename::new(&base)
        .ext(ARCHIVE_EXTENSION)
        .sep(".")
        .ensure_valid(false);
    naming::unique_path(backup_dir, &opts)
}

/// Append `.tar.gz` when the file name carries no extension at all.
pub fn ensure_archive_extension(path: &Path) -> PathBuf {
    let has_dot = path
        .file_name()
        .map(|n| n.to_string_lossy().contains('.'))
        .unwrap_or(false);
    if has_dot {
        path.to_path_buf()
    } else {
        let mut name = path.as_os_str().to_os_string();
        name.push(ARCHIVE_EXTENSION);
        PathBuf::from(name)
    }
}
