//! Notebook connection
//!
//! Low-level create/read/update/delete interface mapping a tree of nodes,
//! each with attributes and attached files, onto a storage backend. The
//! filesystem backend lives in [`fs`]; every filename decision it makes goes
//! through [`codec`].

pub mod codec;
mod files;
pub mod fs;
pub mod naming;

pub use files::{strip_tags, PAGE_FILE};
pub use fs::FsConnection;
pub use naming::{NewFilename, UniqueName};

use crate::error::ConnectionError;
use crate::index::SearchHits;
use crate::types::{Attrs, NodeId};
use serde_json::Value;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

/// How an attached file is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    Read,
    /// Create or truncate.
    Write,
    /// Create or append.
    Append,
}

/// Where a copied file comes from.
#[derive(Debug, Clone, Copy)]
pub enum FileSource<'a> {
    /// A file attached to another node.
    Node { nodeid: &'a NodeId, filename: &'a str },
    /// A file outside the notebook.
    External(&'a Path),
}

/// CRUD connection to a notebook
pub trait NotebookConnection {
    // --- connection ---

    /// Open the notebook stored at `path`.
    fn connect(&mut self, path: &Path) -> Result<(), ConnectionError>;

    /// Release the backing resources. Calling it twice is fine.
    fn close(&mut self) -> Result<(), ConnectionError>;

    /// Flush any unsynced state.
    fn save(&mut self) -> Result<(), ConnectionError>;

    fn is_connected(&self) -> bool;

    // --- nodes ---

    fn create_root(&mut self, nodeid: &NodeId, attrs: Attrs) -> Result<(), ConnectionError>;

    /// Create a node below the node named by its `parentid` attribute.
    fn create_node(&mut self, nodeid: &NodeId, attrs: Attrs) -> Result<(), ConnectionError>;

    fn read_root(&self) -> Result<Attrs, ConnectionError>;

    fn read_node(&self, nodeid: &NodeId) -> Result<Attrs, ConnectionError>;

    /// Replace the attribute set of a node.
    fn update_node(&mut self, nodeid: &NodeId, attrs: Attrs) -> Result<(), ConnectionError>;

    /// Remove a node, its subtree, and all attached files.
    fn delete_node(&mut self, nodeid: &NodeId) -> Result<(), ConnectionError>;

    fn has_node(&self, nodeid: &NodeId) -> bool;

    fn get_rootid(&self) -> Result<NodeId, ConnectionError>;

    fn get_parentid(&self, nodeid: &NodeId) -> Result<Option<NodeId>, ConnectionError>;

    fn list_children_ids(&self, nodeid: &NodeId) -> Result<Vec<NodeId>, ConnectionError>;

    fn list_children_attrs(&self, nodeid: &NodeId) -> Result<Vec<Attrs>, ConnectionError>;

    // --- attached files ---

    fn open_file(
        &self,
        nodeid: &NodeId,
        filename: &str,
        mode: OpenMode,
    ) -> Result<std::fs::File, ConnectionError>;

    fn delete_file(&self, nodeid: &NodeId, filename: &str) -> Result<(), ConnectionError>;

    /// Visible names of the files in a node, or in one of its attached
    /// directories. Directories carry a trailing `/`.
    fn list_files(
        &self,
        nodeid: &NodeId,
        subdir: Option<&str>,
    ) -> Result<Vec<String>, ConnectionError>;

    fn file_exists(&self, nodeid: &NodeId, filename: &str) -> Result<bool, ConnectionError>;

    fn copy_file(
        &self,
        source: FileSource<'_>,
        nodeid: &NodeId,
        filename: &str,
    ) -> Result<(), ConnectionError>;

    /// Copy every attached file of `from` into `to`.
    fn copy_all_files(&self, from: &NodeId, to: &NodeId) -> Result<(), ConnectionError>;

    fn new_unique_filename(
        &self,
        nodeid: &NodeId,
        opts: &NewFilename<'_>,
    ) -> Result<UniqueName, ConnectionError>;

    fn mkdir(&self, nodeid: &NodeId, filename: &str) -> Result<(), ConnectionError>;

    /// Read an attached file as UTF-8 text.
    fn read_file_to_string(
        &self,
        nodeid: &NodeId,
        filename: &str,
    ) -> Result<String, ConnectionError> {
        let mut file = self.open_file(nodeid, filename, OpenMode::Read)?;
        let mut text = String::new();
        file.read_to_string(&mut text)?;
        Ok(text)
    }

    /// Replace an attached file with UTF-8 text.
    fn write_file_string(
        &self,
        nodeid: &NodeId,
        filename: &str,
        text: &str,
    ) -> Result<(), ConnectionError> {
        let mut file = self.open_file(nodeid, filename, OpenMode::Write)?;
        file.write_all(text.as_bytes())?;
        Ok(())
    }

    // --- index ---

    fn init_index(&mut self) -> Result<(), ConnectionError>;

    /// True when the index is missing or known to be stale.
    fn index_needed(&self) -> bool;

    fn clear_index(&mut self) -> Result<(), ConnectionError>;

    /// Rebuild the index from disk. Returns the number of nodes indexed.
    fn index_all(&mut self) -> Result<usize, ConnectionError>;

    fn update_index_node(&mut self, nodeid: &NodeId, attrs: &Attrs)
        -> Result<(), ConnectionError>;

    fn has_fulltext_search(&self) -> bool;

    fn search_node_titles(&mut self, text: &str) -> Result<SearchHits, ConnectionError>;

    fn search_node_contents(&mut self, text: &str) -> Result<SearchHits, ConnectionError>;

    /// Node directory relative to the notebook root.
    fn get_node_path_by_id(&self, nodeid: &NodeId) -> Result<Option<PathBuf>, ConnectionError>;

    fn get_attr_by_id(&self, nodeid: &NodeId, key: &str)
        -> Result<Option<Value>, ConnectionError>;

    /// Register attribute `key` with the index; `index_value` also makes
    /// its values searchable through `get_nodes_by_attr`.
    fn index_attr(&mut self, key: &str, index_value: bool) -> Result<(), ConnectionError>;

    /// Nodes whose attribute `key` equals `value`, in node id order.
    fn get_nodes_by_attr(&self, key: &str, value: &Value)
        -> Result<Vec<NodeId>, ConnectionError>;
}
