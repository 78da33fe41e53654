//! Attached files of filesystem nodes

use super::codec::{self, EntryKind, NODE_META_FILE};
use super::fs::FsConnection;
use super::{FileSource, OpenMode};
use crate::error::ConnectionError;
use crate::types::NodeId;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Attached file holding a page's XHTML body.
pub const PAGE_FILE: &str = "page.html";

/// Classify on-disk names inside the node directory `dir`.
pub(super) fn probe(dir: &Path) -> impl Fn(&str) -> EntryKind + '_ {
    move |name| {
        let path = dir.join(name);
        match path.symlink_metadata() {
            Err(_) => EntryKind::Missing,
            Ok(meta)
                if meta.is_dir()
                    && codec::is_valid_node_dirname(name)
                    && path.join(NODE_META_FILE).is_file() =>
            {
                EntryKind::NodeDir
            }
            Ok(_) => EntryKind::Attached,
        }
    }
}

fn check_component(part: &str, nested: bool) -> Result<(), ConnectionError> {
    if part == "." || part == ".." || part.contains('\\') {
        return Err(ConnectionError::InvalidPath(part.to_string()));
    }
    // a nested node.json would make the attached directory look like a node
    if nested && codec::is_reserved(part) {
        return Err(ConnectionError::InvalidPath(format!(
            "'{}' is reserved inside attached directories",
            part
        )));
    }
    Ok(())
}

/// On-disk path of the attached file `filename` in node directory `dir`.
fn resolve(dir: &Path, filename: &str) -> Result<PathBuf, ConnectionError> {
    let (head, rest) = codec::split_first(filename);
    if head.is_empty() {
        return Err(ConnectionError::InvalidPath(filename.to_string()));
    }
    check_component(head, false)?;

    let mut path = dir.join(codec::to_disk(head, probe(dir)));
    if let Some(rest) = rest {
        for part in rest.split('/').filter(|p| !p.is_empty()) {
            check_component(part, true)?;
            path.push(part);
        }
    }
    Ok(path)
}

fn not_found_as_unknown(err: io::Error, filename: &str) -> ConnectionError {
    if err.kind() == io::ErrorKind::NotFound {
        ConnectionError::UnknownFile(filename.to_string())
    } else {
        ConnectionError::Io(err)
    }
}

fn copy_dir(from: &Path, to: &Path) -> Result<(), ConnectionError> {
    for entry in WalkDir::new(from).follow_links(false) {
        let entry = entry.map_err(io::Error::from)?;
        let rel = entry.path().strip_prefix(from).unwrap_or(entry.path());
        let target = to.join(rel);
        let kind = entry.file_type();
        if kind.is_dir() {
            fs::create_dir_all(&target)?;
        } else if kind.is_file() {
            fs::copy(entry.path(), &target)?;
        } else {
            debug!(path = %entry.path().display(), "Skipping non-regular file");
        }
    }
    Ok(())
}

/// Reduce page markup to searchable text.
pub fn strip_tags(html: &str) -> String {
    let mut text = String::with_capacity(html.len());
    let mut chars = html.chars();
    while let Some(c) = chars.next() {
        match c {
            '<' => {
                let tag: String = chars.by_ref().take_while(|&c| c != '>').collect();
                let name: String = tag
                    .trim_start_matches('/')
                    .chars()
                    .take_while(|c| c.is_ascii_alphanumeric())
                    .collect::<String>()
                    .to_ascii_lowercase();
                if matches!(
                    name.as_str(),
                    "br" | "p" | "div" | "li" | "tr" | "h1" | "h2" | "h3" | "h4" | "h5" | "h6"
                ) {
                    text.push('\n');
                }
            }
            '&' => {
                let entity: String = chars.by_ref().take_while(|&c| c != ';').collect();
                match entity.as_str() {
                    "amp" => text.push('&'),
                    "lt" => text.push('<'),
                    "gt" => text.push('>'),
                    "quot" => text.push('"'),
                    "apos" => text.push('\''),
                    "nbsp" => text.push(' '),
                    _ => {}
                }
            }
            c => text.push(c),
        }
    }
    text.trim().to_string()
}

impl FsConnection {
    /// On-disk path of an attached file.
    pub fn get_file_path(&self, nodeid: &NodeId, filename: &str) -> Result<PathBuf, ConnectionError> {
        resolve(&self.node_dir(nodeid)?, filename)
    }

    /// Plain text of a page body, or `None` when the node has no page file.
    pub fn read_data_as_plain_text(&self, nodeid: &NodeId) -> Result<Option<String>, ConnectionError> {
        self.plain_text_at(&self.node_dir(nodeid)?)
    }

    pub(super) fn plain_text_at(&self, dir: &Path) -> Result<Option<String>, ConnectionError> {
        let path = dir.join(codec::to_disk(PAGE_FILE, probe(dir)));
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(strip_tags(&String::from_utf8_lossy(&bytes)))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub(super) fn attached_open(
        &self,
        nodeid: &NodeId,
        filename: &str,
        mode: OpenMode,
    ) -> Result<File, ConnectionError> {
        let path = self.get_file_path(nodeid, filename)?;
        let opened = match mode {
            OpenMode::Read => File::open(&path),
            OpenMode::Write => OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&path),
            OpenMode::Append => OpenOptions::new().append(true).create(true).open(&path),
        };
        opened.map_err(|e| not_found_as_unknown(e, filename))
    }

    pub(super) fn attached_delete(&self, nodeid: &NodeId, filename: &str) -> Result<(), ConnectionError> {
        let path = self.get_file_path(nodeid, filename)?;
        let meta = path
            .symlink_metadata()
            .map_err(|e| not_found_as_unknown(e, filename))?;
        if meta.is_dir() {
            fs::remove_dir_all(&path)?;
        } else {
            fs::remove_file(&path)?;
        }
        Ok(())
    }

    pub(super) fn attached_list(
        &self,
        nodeid: &NodeId,
        subdir: Option<&str>,
    ) -> Result<Vec<String>, ConnectionError> {
        let dir = self.node_dir(nodeid)?;
        let (target, top_level) = match subdir.map(|s| s.trim_matches('/')) {
            None | Some("") => (dir.clone(), true),
            Some(sub) => (resolve(&dir, sub)?, false),
        };

        let entries = fs::read_dir(&target).map_err(|e| {
            not_found_as_unknown(e, subdir.unwrap_or_default())
        })?;
        let classify = probe(&dir);

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry?;
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                warn!(path = %entry.path().display(), "Skipping non UTF-8 filename");
                continue;
            };
            let is_dir = entry.file_type()?.is_dir();

            let visible = if top_level {
                if codec::is_reserved(&name) || classify(&name) == EntryKind::NodeDir {
                    continue;
                }
                codec::decode(&name).to_string()
            } else {
                name
            };
            names.push(if is_dir { format!("{}/", visible) } else { visible });
        }
        names.sort();
        Ok(names)
    }

    pub(super) fn attached_copy(
        &self,
        source: FileSource<'_>,
        nodeid: &NodeId,
        filename: &str,
    ) -> Result<(), ConnectionError> {
        let (from, label) = match source {
            FileSource::Node {
                nodeid: src_id,
                filename: src_name,
            } => (self.get_file_path(src_id, src_name)?, src_name.to_string()),
            FileSource::External(path) => (path.to_path_buf(), path.display().to_string()),
        };
        let meta = from
            .symlink_metadata()
            .map_err(|e| not_found_as_unknown(e, &label))?;

        let to = self.get_file_path(nodeid, filename)?;
        if let Some(parent) = to.parent() {
            fs::create_dir_all(parent)?;
        }
        if meta.is_dir() {
            copy_dir(&from, &to)?;
        } else {
            fs::copy(&from, &to)?;
        }
        debug!(from = %from.display(), to = %to.display(), "Copied attached file");
        Ok(())
    }

    pub(super) fn attached_mkdir(&self, nodeid: &NodeId, filename: &str) -> Result<(), ConnectionError> {
        let path = self.get_file_path(nodeid, filename)?;
        fs::create_dir_all(path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::IndexBackend;
    use crate::store::{NewFilename, NotebookConnection};
    use crate::types::{new_attrs, NodeKind};
    use std::io::Write;
    use tempfile::TempDir;

    fn page(temp: &TempDir) -> (FsConnection, NodeId, NodeId) {
        let mut conn =
            FsConnection::open(&temp.path().join("nb"), IndexBackend::Disabled).unwrap();
        let root = NodeId::from("root");
        conn.create_root(&root, new_attrs("nb", &NodeKind::Folder, None))
            .unwrap();
        let page = NodeId::from("page");
        conn.create_node(&page, new_attrs("Page", &NodeKind::Page, Some(&root)))
            .unwrap();
        (conn, root, page)
    }

    #[test]
    fn test_strip_tags() {
        assert_eq!(strip_tags("<b>Milk</b> &amp; eggs"), "Milk & eggs");
        assert_eq!(strip_tags("<p>one</p><p>two</p>"), "one\n\ntwo");
        assert_eq!(strip_tags("plain"), "plain");
    }

    #[test]
    fn test_attached_file_beside_child_node_is_quoted() {
        let temp = TempDir::new().unwrap();
        let (mut conn, root, _) = page(&temp);
        let child = NodeId::from("child");
        conn.create_node(&child, new_attrs("notes", &NodeKind::Page, Some(&root)))
            .unwrap();

        conn.write_file_string(&root, "notes", "attached").unwrap();
        let root_dir = conn.get_node_path(&root).unwrap();
        assert!(root_dir.join("__notes").is_file());
        assert!(root_dir.join("notes").join(NODE_META_FILE).is_file());
        assert_eq!(conn.read_file_to_string(&root, "notes").unwrap(), "attached");

        let files = conn.list_files(&root, None).unwrap();
        assert_eq!(files, vec!["notes"]);
    }

    #[test]
    fn test_prefixed_and_reserved_names_round_trip() {
        let temp = TempDir::new().unwrap();
        let (conn, _, page) = page(&temp);
        conn.write_file_string(&page, "__init", "x").unwrap();
        conn.write_file_string(&page, "node.json", "y").unwrap();
        let dir = conn.get_node_path(&page).unwrap();
        assert!(dir.join("____init").is_file());
        assert!(dir.join("__node.json").is_file());

        let files = conn.list_files(&page, None).unwrap();
        assert_eq!(files, vec!["__init", "node.json"]);
        assert_eq!(conn.read_file_to_string(&page, "node.json").unwrap(), "y");
    }

    #[test]
    fn test_subdirectories_and_listing() {
        let temp = TempDir::new().unwrap();
        let (conn, _, page) = page(&temp);
        conn.mkdir(&page, "img").unwrap();
        conn.mkdir(&page, "img").unwrap();
        conn.write_file_string(&page, "img/a.png", "png").unwrap();
        conn.write_file_string(&page, "page.html", "<p>x</p>").unwrap();

        assert_eq!(
            conn.list_files(&page, None).unwrap(),
            vec!["img/", "page.html"]
        );
        assert_eq!(conn.list_files(&page, Some("img")).unwrap(), vec!["a.png"]);
        assert!(conn.file_exists(&page, "img/a.png").unwrap());
        assert!(matches!(
            conn.write_file_string(&page, "img/node.json", "x"),
            Err(ConnectionError::InvalidPath(_))
        ));
        assert!(matches!(
            conn.open_file(&page, "../escape", OpenMode::Write),
            Err(ConnectionError::InvalidPath(_))
        ));
    }

    #[test]
    fn test_append_delete_and_missing() {
        let temp = TempDir::new().unwrap();
        let (conn, _, page) = page(&temp);
        conn.write_file_string(&page, "log.txt", "a").unwrap();
        let mut file = conn.open_file(&page, "log.txt", OpenMode::Append).unwrap();
        file.write_all(b"b").unwrap();
        drop(file);
        assert_eq!(conn.read_file_to_string(&page, "log.txt").unwrap(), "ab");

        conn.delete_file(&page, "log.txt").unwrap();
        assert!(!conn.file_exists(&page, "log.txt").unwrap());
        assert!(matches!(
            conn.open_file(&page, "log.txt", OpenMode::Read),
            Err(ConnectionError::UnknownFile(name)) if name == "log.txt"
        ));
        assert!(matches!(
            conn.delete_file(&page, "log.txt"),
            Err(ConnectionError::UnknownFile(_))
        ));
    }

    #[test]
    fn test_copy_between_nodes_and_from_outside() {
        let temp = TempDir::new().unwrap();
        let (mut conn, root, page) = page(&temp);
        let other = NodeId::from("other");
        conn.create_node(&other, new_attrs("Other", &NodeKind::Page, Some(&root)))
            .unwrap();

        conn.mkdir(&page, "img").unwrap();
        conn.write_file_string(&page, "img/a.png", "png").unwrap();
        conn.write_file_string(&page, "page.html", "body").unwrap();
        conn.copy_all_files(&page, &other).unwrap();
        assert_eq!(conn.read_file_to_string(&other, "img/a.png").unwrap(), "png");
        assert_eq!(conn.read_file_to_string(&other, "page.html").unwrap(), "body");

        let outside = temp.path().join("photo.jpg");
        fs::write(&outside, "jpg").unwrap();
        conn.copy_file(FileSource::External(&outside), &other, "photo.jpg")
            .unwrap();
        assert_eq!(conn.read_file_to_string(&other, "photo.jpg").unwrap(), "jpg");

        let missing = temp.path().join("missing");
        assert!(matches!(
            conn.copy_file(FileSource::External(&missing), &other, "x"),
            Err(ConnectionError::UnknownFile(_))
        ));
    }

    #[test]
    fn test_new_unique_filename_skips_taken_names() {
        let temp = TempDir::new().unwrap();
        let (conn, _, page) = page(&temp);
        conn.write_file_string(&page, "image.png", "").unwrap();
        let found = conn
            .new_unique_filename(&page, &NewFilename::new("image").ext(".png"))
            .unwrap();
        assert_eq!(found.name, "image 2.png");
        assert_eq!(found.number, Some(2));
    }

    #[test]
    fn test_plain_text_of_page() {
        let temp = TempDir::new().unwrap();
        let (conn, _, page) = page(&temp);
        assert_eq!(conn.read_data_as_plain_text(&page).unwrap(), None);
        conn.write_file_string(&page, PAGE_FILE, "<h1>Title</h1>body")
            .unwrap();
        assert_eq!(
            conn.read_data_as_plain_text(&page).unwrap(),
            Some("Title\nbody".to_string())
        );
    }
}
