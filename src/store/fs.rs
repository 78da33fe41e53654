//! Filesystem notebook connection
//!
//! Each node is a directory holding a `node.json` attribute file. Child nodes
//! are sub-directories that hold their own `node.json`; everything else in a
//! node directory is an attached file, named through [`codec`].

use super::codec::{self, NODE_META_FILE, NODE_META_TMP};
use super::naming::{self, NewFilename, UniqueName};
use super::{FileSource, NotebookConnection, OpenMode};
use crate::error::ConnectionError;
use crate::index::{IndexBackend, IndexRecord, NodeIndex, NullIndex, SearchHits};
use crate::types::{Attrs, AttrsExt, NodeId, ATTR_NODEID, ATTR_PARENTID};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Notebook connection backed by nested directories
pub struct FsConnection {
    root: Option<PathBuf>,
    /// nodeid -> absolute node directory
    paths: RwLock<HashMap<NodeId, PathBuf>>,
    backend: IndexBackend,
    index: Box<dyn NodeIndex>,
    index_stale: AtomicBool,
    /// Set after a full scan; cleared when a cached path turns out stale.
    cache_complete: AtomicBool,
}

impl FsConnection {
    /// Connection without a secondary index.
    pub fn new() -> Self {
        Self::with_index(IndexBackend::Disabled)
    }

    /// Connection that opens `backend` on connect.
    pub fn with_index(backend: IndexBackend) -> Self {
        Self {
            root: None,
            paths: RwLock::new(HashMap::new()),
            backend,
            index: Box::new(NullIndex),
            index_stale: AtomicBool::new(false),
            cache_complete: AtomicBool::new(false),
        }
    }

    /// Create a connection and connect it to `path`.
    pub fn open(path: &Path, backend: IndexBackend) -> Result<Self, ConnectionError> {
        let mut conn = Self::with_index(backend);
        conn.connect(path)?;
        Ok(conn)
    }

    /// Root directory of the connected notebook.
    pub fn root_path(&self) -> Result<&Path, ConnectionError> {
        self.root.as_deref().ok_or(ConnectionError::NotConnected)
    }

    /// Absolute directory of a node.
    pub fn get_node_path(&self, nodeid: &NodeId) -> Result<PathBuf, ConnectionError> {
        self.node_dir(nodeid)
    }

    /// Directory name of a node.
    pub fn get_node_basename(&self, nodeid: &NodeId) -> Result<String, ConnectionError> {
        let dir = self.node_dir(nodeid)?;
        Ok(dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default())
    }

    pub(super) fn node_dir(&self, nodeid: &NodeId) -> Result<PathBuf, ConnectionError> {
        let root = self.root_path()?;

        let cached = self.paths.read().get(nodeid).cloned();
        if let Some(dir) = &cached {
            if dir.join(NODE_META_FILE).is_file() {
                return Ok(dir.clone());
            }
            self.cache_complete.store(false, Ordering::Relaxed);
        }

        if let Ok(Some(rel)) = self.index.node_path(nodeid) {
            let dir = root.join(rel);
            if read_attrs(&dir).ok().and_then(|a| a.node_id()).as_ref() == Some(nodeid) {
                self.paths.write().insert(nodeid.clone(), dir.clone());
                return Ok(dir);
            }
        }

        if cached.is_none() && self.cache_complete.load(Ordering::Relaxed) {
            return Err(ConnectionError::UnknownNode(nodeid.clone()));
        }

        debug!(%nodeid, "Node not cached, rescanning notebook");
        self.scan()?;
        self.paths
            .read()
            .get(nodeid)
            .cloned()
            .ok_or_else(|| ConnectionError::UnknownNode(nodeid.clone()))
    }

    /// Rebuild the nodeid -> directory cache from disk.
    fn scan(&self) -> Result<usize, ConnectionError> {
        let root = self.root_path()?;
        let mut found: HashMap<NodeId, PathBuf> = HashMap::new();

        let walker = WalkDir::new(root)
            .follow_links(false)
            .into_iter()
            .filter_entry(|e| e.file_type().is_dir() && is_node_dir(e.path(), e.depth() == 0));
        for entry in walker {
            let entry = entry.map_err(std::io::Error::from)?;
            match read_attrs(entry.path()).map(|a| a.node_id()) {
                Ok(Some(id)) => {
                    if let Some(previous) = found.insert(id.clone(), entry.path().to_path_buf()) {
                        warn!(%id, previous = %previous.display(), "Duplicate node id on disk");
                    }
                }
                Ok(None) => warn!(path = %entry.path().display(), "Node without nodeid"),
                Err(e) => warn!(path = %entry.path().display(), error = %e, "Unreadable node"),
            }
        }

        let count = found.len();
        *self.paths.write() = found;
        self.cache_complete.store(true, Ordering::Relaxed);
        Ok(count)
    }

    fn relative(&self, dir: &Path) -> PathBuf {
        match self.root.as_deref().map(|root| dir.strip_prefix(root)) {
            Some(Ok(rel)) => rel.to_path_buf(),
            _ => dir.to_path_buf(),
        }
    }

    /// Pick a directory for a node titled `title` inside `parent`.
    ///
    /// `current` is the node's present directory when renaming; it does not
    /// count as a collision.
    fn allocate_dir(
        parent: &Path,
        title: &str,
        current: Option<&Path>,
    ) -> Result<PathBuf, ConnectionError> {
        let opts = NewFilename::new(title);
        let found = naming::unique_name(&opts, |candidate| {
            let path = parent.join(candidate);
            if Some(path.as_path()) == current {
                return Ok(false);
            }
            Ok(!codec::is_valid_node_dirname(candidate) || path.symlink_metadata().is_ok())
        })?;
        Ok(parent.join(found.name))
    }

    /// Point cached paths below `from` at `to`.
    fn relocate(&self, from: &Path, to: &Path) {
        for dir in self.paths.write().values_mut() {
            if let Ok(rest) = dir.strip_prefix(from) {
                *dir = if rest.as_os_str().is_empty() {
                    to.to_path_buf()
                } else {
                    to.join(rest)
                };
            }
        }
    }

    fn index_record(
        &self,
        nodeid: &NodeId,
        dir: &Path,
        attrs: &Attrs,
    ) -> Result<IndexRecord, ConnectionError> {
        Ok(IndexRecord {
            nodeid: nodeid.clone(),
            parentid: attrs.parent_id(),
            path: self.relative(dir),
            attrs: attrs.clone(),
            content: self.plain_text_at(dir)?,
        })
    }

    /// Update the index without failing the caller; a failure marks it stale.
    fn index_quietly(&self, nodeid: &NodeId, dir: &Path, attrs: &Attrs) {
        let result = self
            .index_record(nodeid, dir, attrs)
            .and_then(|record| self.index.update_node(&record));
        if let Err(e) = result {
            warn!(%nodeid, error = %e, "Index update failed; index marked stale");
            self.index_stale.store(true, Ordering::Relaxed);
        }
    }

    fn index_subtree(&self, dir: &Path) {
        let moved: Vec<(NodeId, PathBuf)> = self
            .paths
            .read()
            .iter()
            .filter(|(_, p)| p.starts_with(dir))
            .map(|(id, p)| (id.clone(), p.clone()))
            .collect();
        for (id, path) in moved {
            match read_attrs(&path) {
                Ok(attrs) => self.index_quietly(&id, &path, &attrs),
                Err(e) => {
                    warn!(%id, error = %e, "Could not reindex moved node");
                    self.index_stale.store(true, Ordering::Relaxed);
                }
            }
        }
    }

    /// Run an index query, rebuilding the index once if it reports corruption.
    fn query_index<T, F>(&mut self, query: F) -> Result<T, ConnectionError>
    where
        F: Fn(&dyn NodeIndex) -> Result<T, ConnectionError>,
    {
        match query(self.index.as_ref()) {
            Err(e) if e.is_corrupt_index() => {
                warn!(error = %e, "Index corrupt, rebuilding");
                self.index_all()?;
                query(self.index.as_ref())
            }
            other => other,
        }
    }

    fn list_children(&self, dir: &Path) -> Result<Vec<(PathBuf, Attrs)>, ConnectionError> {
        let mut children = Vec::new();
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();
            if !entry.file_type()?.is_dir() || !is_node_dir(&path, false) {
                continue;
            }
            match read_attrs(&path) {
                Ok(attrs) => children.push((path, attrs)),
                Err(e) => warn!(path = %path.display(), error = %e, "Skipping unreadable child node"),
            }
        }

        children.sort_by(|(pa, a), (pb, b)| {
            a.order()
                .unwrap_or(i64::MAX)
                .cmp(&b.order().unwrap_or(i64::MAX))
                .then_with(|| pa.file_name().cmp(&pb.file_name()))
        });

        let mut paths = self.paths.write();
        for (path, attrs) in &children {
            if let Some(id) = attrs.node_id() {
                paths.insert(id, path.clone());
            }
        }
        Ok(children)
    }
}

impl Default for FsConnection {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for FsConnection {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(error = %e, "Failed to close notebook connection");
        }
    }
}

/// Whether `path` is a node directory. The root may carry any name.
fn is_node_dir(path: &Path, is_root: bool) -> bool {
    let named_ok = is_root
        || path
            .file_name()
            .and_then(|n| n.to_str())
            .map(codec::is_valid_node_dirname)
            .unwrap_or(false);
    named_ok && path.join(NODE_META_FILE).is_file()
}

pub(super) fn read_attrs(dir: &Path) -> Result<Attrs, ConnectionError> {
    let bytes = fs::read(dir.join(NODE_META_FILE))?;
    let attrs: Attrs = serde_json::from_slice(&bytes)?;
    Ok(attrs)
}

/// Write attributes through a scratch file so readers never see half a file.
fn write_attrs(dir: &Path, attrs: &Attrs) -> Result<(), ConnectionError> {
    let bytes = serde_json::to_vec_pretty(attrs)?;
    let tmp = dir.join(NODE_META_TMP);
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, dir.join(NODE_META_FILE))?;
    Ok(())
}

/// Write `attrs` into `dir`, then move `dir` to `target`.
///
/// A failed move puts `old` back so the node is left as it was.
fn replace_attrs(
    dir: &Path,
    target: &Path,
    attrs: &Attrs,
    old: &Attrs,
) -> Result<(), ConnectionError> {
    write_attrs(dir, attrs)?;
    if target == dir {
        return Ok(());
    }
    if let Err(e) = fs::rename(dir, target) {
        if let Err(undo) = write_attrs(dir, old) {
            warn!(path = %dir.display(), error = %undo, "Could not restore node attributes");
        }
        return Err(e.into());
    }
    Ok(())
}

fn validate_attrs(attrs: &Attrs, is_root: bool) -> Result<(), ConnectionError> {
    if attrs.title().is_none() {
        return Err(ConnectionError::InvalidAttrs(
            "missing string attribute 'title'".to_string(),
        ));
    }
    if attrs.content_type().is_none() {
        return Err(ConnectionError::InvalidAttrs(
            "missing string attribute 'content_type'".to_string(),
        ));
    }
    match (is_root, attrs.contains_key(ATTR_PARENTID)) {
        (true, true) => Err(ConnectionError::InvalidAttrs(
            "the root node cannot have a parent".to_string(),
        )),
        (false, false) => Err(ConnectionError::InvalidAttrs(
            "missing attribute 'parentid'".to_string(),
        )),
        _ if !is_root && attrs.parent_id().is_none() => Err(ConnectionError::InvalidAttrs(
            "attribute 'parentid' must be a string".to_string(),
        )),
        _ => Ok(()),
    }
}

fn with_nodeid(mut attrs: Attrs, nodeid: &NodeId) -> Result<Attrs, ConnectionError> {
    match attrs.node_id() {
        Some(existing) if &existing != nodeid => Err(ConnectionError::InvalidAttrs(format!(
            "nodeid attribute '{}' does not match node {}",
            existing, nodeid
        ))),
        _ => {
            attrs.insert(ATTR_NODEID.to_string(), Value::from(nodeid.as_str()));
            Ok(attrs)
        }
    }
}

impl NotebookConnection for FsConnection {
    fn connect(&mut self, path: &Path) -> Result<(), ConnectionError> {
        if self.is_connected() {
            self.close()?;
        }
        self.root = Some(path.to_path_buf());

        self.index = match self.backend.open() {
            Ok(index) => index,
            Err(e) => {
                warn!(error = %e, "Could not open node index; continuing without it");
                self.index_stale.store(true, Ordering::Relaxed);
                Box::new(NullIndex)
            }
        };

        let nodes = if path.join(NODE_META_FILE).is_file() {
            self.scan()?
        } else {
            self.cache_complete.store(true, Ordering::Relaxed);
            0
        };
        info!(path = %path.display(), nodes, "Connected to notebook");

        if let Err(e) = self.index.init() {
            warn!(error = %e, "Node index unusable, rebuilding");
            self.index_all()?;
        }
        Ok(())
    }

    fn close(&mut self) -> Result<(), ConnectionError> {
        if self.root.take().is_none() {
            return Ok(());
        }
        let index = std::mem::replace(&mut self.index, Box::new(NullIndex));
        self.paths.write().clear();
        self.cache_complete.store(false, Ordering::Relaxed);
        index.flush()?;
        debug!("Closed notebook connection");
        Ok(())
    }

    fn save(&mut self) -> Result<(), ConnectionError> {
        self.root_path()?;
        self.index.flush()
    }

    fn is_connected(&self) -> bool {
        self.root.is_some()
    }

    fn create_root(&mut self, nodeid: &NodeId, attrs: Attrs) -> Result<(), ConnectionError> {
        let root = self.root_path()?.to_path_buf();
        if root.join(NODE_META_FILE).exists() {
            let existing = read_attrs(&root)
                .ok()
                .and_then(|a| a.node_id())
                .unwrap_or_else(|| nodeid.clone());
            return Err(ConnectionError::NodeExists(existing));
        }
        validate_attrs(&attrs, true)?;
        let attrs = with_nodeid(attrs, nodeid)?;

        fs::create_dir_all(&root)?;
        write_attrs(&root, &attrs)?;
        self.paths.write().insert(nodeid.clone(), root.clone());
        self.index_quietly(nodeid, &root, &attrs);
        info!(%nodeid, path = %root.display(), "Created notebook root");
        Ok(())
    }

    fn create_node(&mut self, nodeid: &NodeId, attrs: Attrs) -> Result<(), ConnectionError> {
        self.root_path()?;
        validate_attrs(&attrs, false)?;
        if self.has_node(nodeid) {
            return Err(ConnectionError::NodeExists(nodeid.clone()));
        }
        let attrs = with_nodeid(attrs, nodeid)?;

        let parentid = attrs
            .parent_id()
            .ok_or_else(|| ConnectionError::InvalidAttrs("missing attribute 'parentid'".into()))?;
        let parent_dir = self.node_dir(&parentid)?;
        let title = attrs.title().unwrap_or_default();
        let dir = Self::allocate_dir(&parent_dir, title, None)?;

        fs::create_dir(&dir)?;
        write_attrs(&dir, &attrs)?;
        self.paths.write().insert(nodeid.clone(), dir.clone());
        self.index_quietly(nodeid, &dir, &attrs);
        debug!(%nodeid, path = %dir.display(), "Created node");
        Ok(())
    }

    fn read_root(&self) -> Result<Attrs, ConnectionError> {
        let root = self.root_path()?;
        if !root.join(NODE_META_FILE).is_file() {
            return Err(ConnectionError::UnknownNode(NodeId::from("root")));
        }
        read_attrs(root)
    }

    fn read_node(&self, nodeid: &NodeId) -> Result<Attrs, ConnectionError> {
        read_attrs(&self.node_dir(nodeid)?)
    }

    fn update_node(&mut self, nodeid: &NodeId, attrs: Attrs) -> Result<(), ConnectionError> {
        let dir = self.node_dir(nodeid)?;
        let is_root = dir == self.root_path()?;
        validate_attrs(&attrs, is_root)?;
        let attrs = with_nodeid(attrs, nodeid)?;
        let old = read_attrs(&dir)?;

        let mut target = dir.clone();
        if !is_root {
            let title = attrs.title().unwrap_or_default();
            let new_parent = attrs.parent_id();
            if new_parent != old.parent_id() {
                let parentid = new_parent.ok_or_else(|| {
                    ConnectionError::InvalidAttrs("missing attribute 'parentid'".into())
                })?;
                let parent_dir = self.node_dir(&parentid)?;
                if parent_dir.starts_with(&dir) {
                    return Err(ConnectionError::InvalidAttrs(format!(
                        "cannot move node {} into its own subtree",
                        nodeid
                    )));
                }
                target = Self::allocate_dir(&parent_dir, title, None)?;
            } else if old.title() != attrs.title() {
                if let Some(parent_dir) = dir.parent() {
                    target = Self::allocate_dir(parent_dir, title, Some(&dir))?;
                }
            }
        }

        replace_attrs(&dir, &target, &attrs, &old)?;
        if target != dir {
            self.relocate(&dir, &target);
            debug!(%nodeid, from = %dir.display(), to = %target.display(), "Moved node directory");
        }

        if target != dir {
            self.index_subtree(&target);
        } else {
            self.index_quietly(nodeid, &target, &attrs);
        }
        Ok(())
    }

    fn delete_node(&mut self, nodeid: &NodeId) -> Result<(), ConnectionError> {
        let dir = self.node_dir(nodeid)?;
        if dir == self.root_path()? {
            return Err(ConnectionError::InvalidPath(
                "the root node cannot be deleted".to_string(),
            ));
        }
        fs::remove_dir_all(&dir)?;

        let removed: Vec<NodeId> = {
            let mut paths = self.paths.write();
            let ids: Vec<NodeId> = paths
                .iter()
                .filter(|(_, p)| p.starts_with(&dir))
                .map(|(id, _)| id.clone())
                .collect();
            for id in &ids {
                paths.remove(id);
            }
            ids
        };
        for id in &removed {
            if let Err(e) = self.index.remove_node(id) {
                warn!(%id, error = %e, "Index removal failed; index marked stale");
                self.index_stale.store(true, Ordering::Relaxed);
            }
        }
        debug!(%nodeid, removed = removed.len(), "Deleted node subtree");
        Ok(())
    }

    fn has_node(&self, nodeid: &NodeId) -> bool {
        self.node_dir(nodeid).is_ok()
    }

    fn get_rootid(&self) -> Result<NodeId, ConnectionError> {
        self.read_root()?.node_id().ok_or_else(|| {
            ConnectionError::InvalidAttrs("root node has no nodeid".to_string())
        })
    }

    fn get_parentid(&self, nodeid: &NodeId) -> Result<Option<NodeId>, ConnectionError> {
        let dir = self.node_dir(nodeid)?;
        if dir == self.root_path()? {
            return Ok(None);
        }
        let parent = dir
            .parent()
            .ok_or_else(|| ConnectionError::InvalidPath(dir.display().to_string()))?;
        Ok(read_attrs(parent)?.node_id())
    }

    fn list_children_ids(&self, nodeid: &NodeId) -> Result<Vec<NodeId>, ConnectionError> {
        let dir = self.node_dir(nodeid)?;
        Ok(self
            .list_children(&dir)?
            .into_iter()
            .filter_map(|(_, attrs)| attrs.node_id())
            .collect())
    }

    fn list_children_attrs(&self, nodeid: &NodeId) -> Result<Vec<Attrs>, ConnectionError> {
        let dir = self.node_dir(nodeid)?;
        Ok(self
            .list_children(&dir)?
            .into_iter()
            .map(|(_, attrs)| attrs)
            .collect())
    }

    fn open_file(
        &self,
        nodeid: &NodeId,
        filename: &str,
        mode: OpenMode,
    ) -> Result<fs::File, ConnectionError> {
        self.attached_open(nodeid, filename, mode)
    }

    fn delete_file(&self, nodeid: &NodeId, filename: &str) -> Result<(), ConnectionError> {
        self.attached_delete(nodeid, filename)
    }

    fn list_files(
        &self,
        nodeid: &NodeId,
        subdir: Option<&str>,
    ) -> Result<Vec<String>, ConnectionError> {
        self.attached_list(nodeid, subdir)
    }

    fn file_exists(&self, nodeid: &NodeId, filename: &str) -> Result<bool, ConnectionError> {
        Ok(self.get_file_path(nodeid, filename)?.symlink_metadata().is_ok())
    }

    fn copy_file(
        &self,
        source: FileSource<'_>,
        nodeid: &NodeId,
        filename: &str,
    ) -> Result<(), ConnectionError> {
        self.attached_copy(source, nodeid, filename)
    }

    fn copy_all_files(&self, from: &NodeId, to: &NodeId) -> Result<(), ConnectionError> {
        for name in self.attached_list(from, None)? {
            let name = name.trim_end_matches('/');
            self.attached_copy(
                FileSource::Node {
                    nodeid: from,
                    filename: name,
                },
                to,
                name,
            )?;
        }
        Ok(())
    }

    fn new_unique_filename(
        &self,
        nodeid: &NodeId,
        opts: &NewFilename<'_>,
    ) -> Result<UniqueName, ConnectionError> {
        let dir = self.node_dir(nodeid)?;
        let found = naming::unique_name(opts, |candidate| {
            let on_disk = codec::to_disk(candidate, super::files::probe(&dir));
            Ok(dir.join(on_disk).symlink_metadata().is_ok())
        })?;
        Ok(found)
    }

    fn mkdir(&self, nodeid: &NodeId, filename: &str) -> Result<(), ConnectionError> {
        self.attached_mkdir(nodeid, filename)
    }

    fn init_index(&mut self) -> Result<(), ConnectionError> {
        match self.index.init() {
            Err(e) if e.is_corrupt_index() => {
                warn!(error = %e, "Node index corrupt, rebuilding");
                self.index_all().map(|_| ())
            }
            other => other,
        }
    }

    fn index_needed(&self) -> bool {
        self.index_stale.load(Ordering::Relaxed) || self.index.is_empty().unwrap_or(true)
    }

    fn clear_index(&mut self) -> Result<(), ConnectionError> {
        self.index.clear()?;
        self.index_stale.store(true, Ordering::Relaxed);
        Ok(())
    }

    fn index_all(&mut self) -> Result<usize, ConnectionError> {
        self.index.clear()?;
        self.scan()?;
        let nodes: Vec<(NodeId, PathBuf)> = self
            .paths
            .read()
            .iter()
            .map(|(id, p)| (id.clone(), p.clone()))
            .collect();

        for (id, dir) in &nodes {
            let attrs = read_attrs(dir)?;
            let record = self.index_record(id, dir, &attrs)?;
            self.index.update_node(&record)?;
        }
        self.index.flush()?;
        self.index_stale.store(false, Ordering::Relaxed);
        info!(nodes = nodes.len(), "Rebuilt node index");
        Ok(nodes.len())
    }

    fn update_index_node(&mut self, nodeid: &NodeId, attrs: &Attrs) -> Result<(), ConnectionError> {
        let dir = self.node_dir(nodeid)?;
        let record = self.index_record(nodeid, &dir, attrs)?;
        self.index.update_node(&record)
    }

    fn has_fulltext_search(&self) -> bool {
        self.index.has_fulltext_search()
    }

    fn search_node_titles(&mut self, text: &str) -> Result<SearchHits, ConnectionError> {
        self.query_index(|index| index.search_titles(text))
    }

    fn search_node_contents(&mut self, text: &str) -> Result<SearchHits, ConnectionError> {
        self.query_index(|index| index.search_contents(text))
    }

    fn get_node_path_by_id(&self, nodeid: &NodeId) -> Result<Option<PathBuf>, ConnectionError> {
        match self.index.node_path(nodeid) {
            Ok(Some(path)) => return Ok(Some(path)),
            Ok(None) => {}
            Err(e) => warn!(%nodeid, error = %e, "Index lookup failed, reading from disk"),
        }
        match self.node_dir(nodeid) {
            Ok(dir) => Ok(Some(self.relative(&dir))),
            Err(ConnectionError::UnknownNode(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn get_attr_by_id(&self, nodeid: &NodeId, key: &str) -> Result<Option<Value>, ConnectionError> {
        match self.index.attr(nodeid, key) {
            Ok(Some(value)) => return Ok(Some(value)),
            Ok(None) => {}
            Err(e) => warn!(%nodeid, error = %e, "Index lookup failed, reading from disk"),
        }
        match self.read_node(nodeid) {
            Ok(attrs) => Ok(attrs.get(key).cloned()),
            Err(ConnectionError::UnknownNode(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn index_attr(&mut self, key: &str, index_value: bool) -> Result<(), ConnectionError> {
        self.root_path()?;
        self.index.index_attr(key, index_value)
    }

    fn get_nodes_by_attr(
        &self,
        key: &str,
        value: &Value,
    ) -> Result<Vec<NodeId>, ConnectionError> {
        match self.index.nodes_by_attr(key, value) {
            Ok(Some(ids)) => return Ok(ids),
            Ok(None) => {}
            Err(e) => warn!(key, error = %e, "Index lookup failed, reading from disk"),
        }
        if !self.cache_complete.load(Ordering::Relaxed) {
            self.scan()?;
        }
        let nodes: Vec<(NodeId, PathBuf)> = self
            .paths
            .read()
            .iter()
            .map(|(id, p)| (id.clone(), p.clone()))
            .collect();
        let mut ids = Vec::new();
        for (id, dir) in nodes {
            match read_attrs(&dir) {
                Ok(attrs) if attrs.get(key) == Some(value) => ids.push(id),
                Ok(_) => {}
                Err(e) => warn!(%id, error = %e, "Skipping unreadable node"),
            }
        }
        ids.sort();
        Ok(ids)
    }
}
