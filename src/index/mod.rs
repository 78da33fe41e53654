//! Secondary node index
//!
//! Speeds up title/content search and id lookups. Nothing depends on it for
//! correctness: a connection without an index answers lookups from disk, and
//! callers fall back to walking the tree when
//! [`NodeIndex::has_fulltext_search`] is false.

pub mod sled_index;

pub use sled_index::SledIndex;

use crate::error::ConnectionError;
use crate::types::{Attrs, NodeId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;
use unicode_normalization::UnicodeNormalization;

/// Everything the index stores about one node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexRecord {
    pub nodeid: NodeId,
    #[serde(default)]
    pub parentid: Option<NodeId>,
    /// Node directory relative to the notebook root.
    pub path: PathBuf,
    pub attrs: Attrs,
    /// Plain-text page content, when the node has any.
    #[serde(default, skip_serializing)]
    pub content: Option<String>,
}

/// Ranked search results.
///
/// A finite iterator in relevance order, ties broken by node id so identical
/// inputs give identical sequences. Every search call yields a fresh one.
#[derive(Debug, Clone, Default)]
pub struct SearchHits {
    hits: std::vec::IntoIter<NodeId>,
}

impl SearchHits {
    /// Build from `(score, id)` pairs; higher scores rank first.
    pub fn ranked(mut scored: Vec<(u64, NodeId)>) -> Self {
        scored.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));
        Self {
            hits: scored
                .into_iter()
                .map(|(_, id)| id)
                .collect::<Vec<_>>()
                .into_iter(),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }
}

impl Iterator for SearchHits {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        self.hits.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.hits.size_hint()
    }
}

impl ExactSizeIterator for SearchHits {}

/// Index backend interface
pub trait NodeIndex: Send {
    /// Prepare storage; safe to call on an existing index.
    fn init(&self) -> Result<(), ConnectionError>;

    /// Drop every indexed record.
    fn clear(&self) -> Result<(), ConnectionError>;

    /// True when nothing has been indexed yet.
    fn is_empty(&self) -> Result<bool, ConnectionError>;

    /// Insert or replace one node.
    fn update_node(&self, record: &IndexRecord) -> Result<(), ConnectionError>;

    fn remove_node(&self, nodeid: &NodeId) -> Result<(), ConnectionError>;

    fn search_titles(&self, text: &str) -> Result<SearchHits, ConnectionError>;

    fn search_contents(&self, text: &str) -> Result<SearchHits, ConnectionError>;

    fn has_fulltext_search(&self) -> bool;

    /// Node directory relative to the notebook root, if indexed.
    fn node_path(&self, nodeid: &NodeId) -> Result<Option<PathBuf>, ConnectionError>;

    fn attr(&self, nodeid: &NodeId, key: &str) -> Result<Option<Value>, ConnectionError>;

    /// Register attribute `key`; with `index_value`, nodes become findable
    /// by the key's value through [`NodeIndex::nodes_by_attr`].
    fn index_attr(&self, key: &str, index_value: bool) -> Result<(), ConnectionError>;

    /// Nodes whose `key` equals `value`, or `None` when values of `key` are
    /// not indexed.
    fn nodes_by_attr(
        &self,
        key: &str,
        value: &Value,
    ) -> Result<Option<Vec<NodeId>>, ConnectionError>;

    fn flush(&self) -> Result<(), ConnectionError>;
}

/// Index used when indexing is disabled.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullIndex;

impl NodeIndex for NullIndex {
    fn init(&self) -> Result<(), ConnectionError> {
        Ok(())
    }

    fn clear(&self) -> Result<(), ConnectionError> {
        Ok(())
    }

    fn is_empty(&self) -> Result<bool, ConnectionError> {
        Ok(false)
    }

    fn update_node(&self, _record: &IndexRecord) -> Result<(), ConnectionError> {
        Ok(())
    }

    fn remove_node(&self, _nodeid: &NodeId) -> Result<(), ConnectionError> {
        Ok(())
    }

    fn search_titles(&self, _text: &str) -> Result<SearchHits, ConnectionError> {
        Ok(SearchHits::empty())
    }

    fn search_contents(&self, _text: &str) -> Result<SearchHits, ConnectionError> {
        Ok(SearchHits::empty())
    }

    fn has_fulltext_search(&self) -> bool {
        false
    }

    fn node_path(&self, _nodeid: &NodeId) -> Result<Option<PathBuf>, ConnectionError> {
        Ok(None)
    }

    fn attr(&self, _nodeid: &NodeId, _key: &str) -> Result<Option<Value>, ConnectionError> {
        Ok(None)
    }

    fn index_attr(&self, _key: &str, _index_value: bool) -> Result<(), ConnectionError> {
        Ok(())
    }

    fn nodes_by_attr(
        &self,
        _key: &str,
        _value: &Value,
    ) -> Result<Option<Vec<NodeId>>, ConnectionError> {
        Ok(None)
    }

    fn flush(&self) -> Result<(), ConnectionError> {
        Ok(())
    }
}

/// Which index a connection opens.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum IndexBackend {
    #[default]
    Disabled,
    Sled { path: PathBuf },
}

impl IndexBackend {
    pub fn open(&self) -> Result<Box<dyn NodeIndex>, ConnectionError> {
        match self {
            IndexBackend::Disabled => Ok(Box::new(NullIndex)),
            IndexBackend::Sled { path } => Ok(Box::new(SledIndex::open(path)?)),
        }
    }
}

/// Case- and width-insensitive form used for matching.
pub fn normalize(text: &str) -> String {
    text.nfkc().flat_map(char::to_lowercase).collect()
}

/// Split text into normalised alphanumeric terms.
pub fn tokenize(text: &str) -> Vec<String> {
    normalize(text)
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_normalizes() {
        assert_eq!(
            tokenize("Hello, WORLD! ｆｕｌｌwidth"),
            vec!["hello", "world", "fullwidth"]
        );
        assert!(tokenize("  ...  ").is_empty());
    }

    #[test]
    fn test_search_hits_rank_then_id() {
        let hits = SearchHits::ranked(vec![
            (1, NodeId::from("b")),
            (3, NodeId::from("c")),
            (1, NodeId::from("a")),
        ]);
        let ids: Vec<String> = hits.map(|id| id.to_string()).collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
    }

    #[test]
    fn test_null_index_has_no_fulltext() {
        let index = NullIndex;
        assert!(!index.has_fulltext_search());
        assert_eq!(index.search_titles("x").unwrap().count(), 0);
        assert_eq!(index.node_path(&NodeId::from("x")).unwrap(), None);
    }
}
