//! Notebook model
//!
//! A [`Notebook`] owns a connected [`FsConnection`] and adds the conveniences
//! the front end needs: creating folders and pages, walking the tree, and
//! searching with or without a full-text index.

use crate::error::ConnectionError;
use crate::index::{normalize, tokenize, IndexBackend};
use crate::store::codec::NODE_META_FILE;
use crate::store::{FsConnection, NotebookConnection, PAGE_FILE};
use crate::types::{new_attrs, Attrs, AttrsExt, NodeId, NodeKind, ATTR_ORDER};
use serde_json::Value;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

const EMPTY_PAGE: &str = "<html><body></body></html>";

/// What archive and restore need from a notebook.
pub trait NotebookModel {
    /// Flush in-memory state to disk.
    fn save(&mut self) -> Result<(), ConnectionError>;

    /// Root directory of the notebook.
    fn path(&self) -> &Path;

    fn title(&self) -> String;
}

/// One node met while walking the tree.
#[derive(Debug, Clone)]
pub struct TreeEntry {
    pub depth: usize,
    pub nodeid: NodeId,
    pub attrs: Attrs,
}

/// A notebook stored on disk
pub struct Notebook {
    conn: FsConnection,
    path: PathBuf,
    rootid: NodeId,
}

impl Notebook {
    /// Create a new notebook directory at `path`.
    pub fn create(path: &Path, title: &str, index: IndexBackend) -> Result<Self, ConnectionError> {
        let mut conn = FsConnection::open(path, index)?;
        let rootid = NodeId::generate();
        conn.create_root(&rootid, new_attrs(title, &NodeKind::Folder, None))?;
        conn.save()?;
        info!(path = %path.display(), %rootid, "Created notebook");
        Ok(Self {
            conn,
            path: path.to_path_buf(),
            rootid,
        })
    }

    /// Open an existing notebook, rebuilding the index when it is missing or stale.
    pub fn open(path: &Path, index: IndexBackend) -> Result<Self, ConnectionError> {
        if !path.join(NODE_META_FILE).is_file() {
            return Err(ConnectionError::InvalidPath(format!(
                "{} is not a notebook",
                path.display()
            )));
        }
        let mut conn = FsConnection::open(path, index)?;
        let rootid = conn.get_rootid()?;
        if conn.index_needed() {
            match conn.index_all() {
                Ok(count) => info!(nodes = count, "Indexed notebook"),
                Err(e) => warn!(error = %e, "Could not index notebook"),
            }
        }
        Ok(Self {
            conn,
            path: path.to_path_buf(),
            rootid,
        })
    }

    pub fn root_id(&self) -> &NodeId {
        &self.rootid
    }

    pub fn connection(&self) -> &FsConnection {
        &self.conn
    }

    pub fn connection_mut(&mut self) -> &mut FsConnection {
        &mut self.conn
    }

    /// Add a folder as the last child of `parent`.
    pub fn new_folder(&mut self, parent: &NodeId, title: &str) -> Result<NodeId, ConnectionError> {
        self.new_node(parent, title, NodeKind::Folder)
    }

    /// Add a page as the last child of `parent`, with `html` as its body.
    pub fn new_page(
        &mut self,
        parent: &NodeId,
        title: &str,
        html: Option<&str>,
    ) -> Result<NodeId, ConnectionError> {
        let nodeid = self.new_node(parent, title, NodeKind::Page)?;
        self.conn
            .write_file_string(&nodeid, PAGE_FILE, html.unwrap_or(EMPTY_PAGE))?;
        let attrs = self.conn.read_node(&nodeid)?;
        if let Err(e) = self.conn.update_index_node(&nodeid, &attrs) {
            warn!(%nodeid, error = %e, "Could not index page content");
        }
        Ok(nodeid)
    }

    fn new_node(
        &mut self,
        parent: &NodeId,
        title: &str,
        kind: NodeKind,
    ) -> Result<NodeId, ConnectionError> {
        let order = self.conn.list_children_ids(parent)?.len();
        let mut attrs = new_attrs(title, &kind, Some(parent));
        attrs.insert(ATTR_ORDER.to_string(), Value::from(order as i64));
        let nodeid = NodeId::generate();
        self.conn.create_node(&nodeid, attrs)?;
        Ok(nodeid)
    }

    /// Depth-first, pre-order walk of the whole tree, root first.
    pub fn walk(&self) -> Result<Vec<TreeEntry>, ConnectionError> {
        let mut entries = Vec::new();
        let mut stack = vec![(0usize, self.rootid.clone())];
        let mut seen = HashSet::new();
        while let Some((depth, nodeid)) = stack.pop() {
            if !seen.insert(nodeid.clone()) {
                continue;
            }
            let attrs = self.conn.read_node(&nodeid)?;
            let children = self.conn.list_children_ids(&nodeid)?;
            stack.extend(children.into_iter().rev().map(|child| (depth + 1, child)));
            entries.push(TreeEntry {
                depth,
                nodeid,
                attrs,
            });
        }
        Ok(entries)
    }

    /// Nodes whose title contains `text`, best matches first.
    pub fn search_titles(&mut self, text: &str) -> Result<Vec<NodeId>, ConnectionError> {
        if self.conn.has_fulltext_search() {
            return Ok(self.conn.search_node_titles(text)?.collect());
        }
        let query = normalize(text.trim());
        if query.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self
            .walk()?
            .into_iter()
            .filter(|entry| {
                entry
                    .attrs
                    .title()
                    .map(|title| normalize(title).contains(&query))
                    .unwrap_or(false)
            })
            .map(|entry| entry.nodeid)
            .collect())
    }

    /// Pages whose text contains every word of `text`.
    pub fn search_contents(&mut self, text: &str) -> Result<Vec<NodeId>, ConnectionError> {
        if self.conn.has_fulltext_search() {
            return Ok(self.conn.search_node_contents(text)?.collect());
        }
        let terms: HashSet<String> = tokenize(text).into_iter().collect();
        if terms.is_empty() {
            return Ok(Vec::new());
        }
        let mut hits = Vec::new();
        for entry in self.walk()? {
            let Some(body) = self.conn.read_data_as_plain_text(&entry.nodeid)? else {
                continue;
            };
            let words: HashSet<String> = tokenize(&body).into_iter().collect();
            if terms.is_subset(&words) {
                hits.push(entry.nodeid);
            }
        }
        Ok(hits)
    }

    /// Save and disconnect.
    pub fn close(mut self) -> Result<(), ConnectionError> {
        self.conn.save()?;
        self.conn.close()
    }
}

impl NotebookModel for Notebook {
    fn save(&mut self) -> Result<(), ConnectionError> {
        self.conn.save()
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn title(&self) -> String {
        self.conn
            .read_root()
            .ok()
            .and_then(|attrs| attrs.title().map(str::to_string))
            .or_else(|| {
                self.path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
            })
            .unwrap_or_default()
    }
}
