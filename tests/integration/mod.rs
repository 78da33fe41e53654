//! Integration tests for notecask storage, archive, and restore

mod archive_roundtrip;
mod cancellation;
mod node_store;

use notecask::error::ConnectionError;
use notecask::notebook::NotebookModel;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// A bare directory standing in for a notebook.
pub struct DirNotebook {
    pub path: PathBuf,
}

impl NotebookModel for DirNotebook {
    fn save(&mut self) -> Result<(), ConnectionError> {
        Ok(())
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn title(&self) -> String {
        self.path.file_name().unwrap().to_string_lossy().into_owned()
    }
}

/// Create `files` (relative path, contents) below `root`; a `None` body makes a directory.
pub fn build_tree(root: &Path, files: &[(&str, Option<&str>)]) {
    fs::create_dir_all(root).unwrap();
    for (rel, body) in files {
        let path = root.join(rel);
        match body {
            Some(body) => {
                fs::create_dir_all(path.parent().unwrap()).unwrap();
                fs::write(&path, body).unwrap();
            }
            None => fs::create_dir_all(&path).unwrap(),
        }
    }
}

/// Relative path -> file contents (`None` for directories), root excluded.
pub fn snapshot(root: &Path) -> BTreeMap<String, Option<Vec<u8>>> {
    WalkDir::new(root)
        .min_depth(1)
        .into_iter()
        .map(|entry| {
            let entry = entry.unwrap();
            let rel = entry
                .path()
                .strip_prefix(root)
                .unwrap()
                .to_string_lossy()
                .replace('\\', "/");
            let body = if entry.file_type().is_file() {
                Some(fs::read(entry.path()).unwrap())
            } else {
                None
            };
            (rel, body)
        })
        .collect()
}
