//! Sled-backed node index
//!
//! Trees:
//! - `nodes`: node id -> JSON [`IndexRecord`]
//! - `terms`: `term \0 node id` -> occurrence count (u32, big endian)
//! - `node_terms`: node id -> JSON list of the node's terms, for removal
//! - `attr_keys`: registered attribute key -> `[1]` if its values are indexed
//! - `attr_values`: `key \0 JSON value \0 node id` -> empty

use super::{normalize, tokenize, IndexRecord, NodeIndex, SearchHits};
use crate::error::ConnectionError;
use crate::types::{AttrsExt, NodeId};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use tracing::debug;

const NODES_TREE: &str = "nodes";
const TERMS_TREE: &str = "terms";
const NODE_TERMS_TREE: &str = "node_terms";
const ATTR_KEYS_TREE: &str = "attr_keys";
const ATTR_VALUES_TREE: &str = "attr_values";

/// Persistent index stored in a sled database
pub struct SledIndex {
    db: sled::Db,
    nodes: sled::Tree,
    terms: sled::Tree,
    node_terms: sled::Tree,
    attr_keys: sled::Tree,
    attr_values: sled::Tree,
}

impl SledIndex {
    /// Open (or create) an index database at `path`.
    pub fn open(path: &Path) -> Result<Self, ConnectionError> {
        std::fs::create_dir_all(path)?;
        let db = sled::open(path)?;
        Self::from_db(db)
    }

    /// Wrap an already opened database.
    pub fn from_db(db: sled::Db) -> Result<Self, ConnectionError> {
        let nodes = db.open_tree(NODES_TREE)?;
        let terms = db.open_tree(TERMS_TREE)?;
        let node_terms = db.open_tree(NODE_TERMS_TREE)?;
        let attr_keys = db.open_tree(ATTR_KEYS_TREE)?;
        let attr_values = db.open_tree(ATTR_VALUES_TREE)?;
        Ok(Self {
            db,
            nodes,
            terms,
            node_terms,
            attr_keys,
            attr_values,
        })
    }

    fn term_key(term: &str, nodeid: &NodeId) -> Vec<u8> {
        let mut key = Vec::with_capacity(term.len() + 1 + nodeid.as_str().len());
        key.extend_from_slice(term.as_bytes());
        key.push(0);
        key.extend_from_slice(nodeid.as_str().as_bytes());
        key
    }

    fn value_prefix(key: &str, value: &Value) -> Result<Vec<u8>, ConnectionError> {
        let mut prefix = key.as_bytes().to_vec();
        prefix.push(0);
        prefix.extend_from_slice(&serde_json::to_vec(value)?);
        prefix.push(0);
        Ok(prefix)
    }

    /// Keys whose values are indexed.
    fn value_keys(&self) -> Result<Vec<String>, ConnectionError> {
        let mut keys = Vec::new();
        for entry in self.attr_keys.iter() {
            let (key, flag) = entry?;
            if flag.as_ref() == [1u8].as_slice() {
                keys.push(String::from_utf8_lossy(&key).into_owned());
            }
        }
        Ok(keys)
    }

    fn write_values(
        &self,
        record: &IndexRecord,
        keys: &[String],
        batch: &mut sled::Batch,
    ) -> Result<(), ConnectionError> {
        for key in keys {
            if let Some(value) = record.attrs.get(key) {
                let mut entry = Self::value_prefix(key, value)?;
                entry.extend_from_slice(record.nodeid.as_str().as_bytes());
                batch.insert(entry, Vec::new());
            }
        }
        Ok(())
    }

    fn remove_values(&self, old: &IndexRecord) -> Result<(), ConnectionError> {
        let mut batch = sled::Batch::default();
        for key in self.value_keys()? {
            if let Some(value) = old.attrs.get(&key) {
                let mut entry = Self::value_prefix(&key, value)?;
                entry.extend_from_slice(old.nodeid.as_str().as_bytes());
                batch.remove(entry);
            }
        }
        self.attr_values.apply_batch(batch)?;
        Ok(())
    }

    fn read_record(&self, nodeid: &NodeId) -> Result<Option<IndexRecord>, ConnectionError> {
        match self.nodes.get(nodeid.as_str().as_bytes())? {
            Some(bytes) => decode_record(nodeid.as_str(), &bytes).map(Some),
            None => Ok(None),
        }
    }

    fn remove_terms(&self, nodeid: &NodeId) -> Result<(), ConnectionError> {
        let Some(bytes) = self.node_terms.remove(nodeid.as_str().as_bytes())? else {
            return Ok(());
        };
        let old: Vec<String> = serde_json::from_slice(&bytes).map_err(|e| {
            ConnectionError::corrupt_index(format!("undecodable term list for node {}", nodeid), e)
        })?;
        let mut batch = sled::Batch::default();
        for term in old {
            batch.remove(Self::term_key(&term, nodeid));
        }
        self.terms.apply_batch(batch)?;
        Ok(())
    }

    fn write_terms(&self, nodeid: &NodeId, content: &str) -> Result<(), ConnectionError> {
        let mut counts: BTreeMap<String, u32> = BTreeMap::new();
        for term in tokenize(content) {
            *counts.entry(term).or_insert(0) += 1;
        }

        let mut batch = sled::Batch::default();
        for (term, count) in &counts {
            batch.insert(Self::term_key(term, nodeid), count.to_be_bytes().to_vec());
        }
        self.terms.apply_batch(batch)?;

        let list: Vec<&String> = counts.keys().collect();
        self.node_terms
            .insert(nodeid.as_str().as_bytes(), serde_json::to_vec(&list)?)?;
        Ok(())
    }
}

fn decode_record(key: &str, bytes: &[u8]) -> Result<IndexRecord, ConnectionError> {
    serde_json::from_slice(bytes).map_err(|e| {
        ConnectionError::corrupt_index(format!("undecodable index record for node {}", key), e)
    })
}

impl NodeIndex for SledIndex {
    fn init(&self) -> Result<(), ConnectionError> {
        // Trees are created on open; verify the first record decodes.
        if let Some(entry) = self.nodes.iter().next() {
            let (key, value) = entry?;
            decode_record(&String::from_utf8_lossy(&key), &value)?;
        }
        Ok(())
    }

    fn clear(&self) -> Result<(), ConnectionError> {
        self.nodes.clear()?;
        self.terms.clear()?;
        self.node_terms.clear()?;
        // registered keys survive; their values are rebuilt with the nodes
        self.attr_values.clear()?;
        debug!("Cleared node index");
        Ok(())
    }

    fn is_empty(&self) -> Result<bool, ConnectionError> {
        Ok(self.nodes.is_empty())
    }

    fn update_node(&self, record: &IndexRecord) -> Result<(), ConnectionError> {
        if let Some(old) = self.read_record(&record.nodeid)? {
            self.remove_values(&old)?;
        }
        let bytes = serde_json::to_vec(record)?;
        self.nodes.insert(record.nodeid.as_str().as_bytes(), bytes)?;
        let mut batch = sled::Batch::default();
        self.write_values(record, &self.value_keys()?, &mut batch)?;
        self.attr_values.apply_batch(batch)?;
        self.remove_terms(&record.nodeid)?;
        if let Some(content) = &record.content {
            self.write_terms(&record.nodeid, content)?;
        }
        Ok(())
    }

    fn remove_node(&self, nodeid: &NodeId) -> Result<(), ConnectionError> {
        if let Some(old) = self.read_record(nodeid)? {
            self.remove_values(&old)?;
        }
        self.nodes.remove(nodeid.as_str().as_bytes())?;
        self.remove_terms(nodeid)
    }

    fn search_titles(&self, text: &str) -> Result<SearchHits, ConnectionError> {
        let query = normalize(text.trim());
        if query.is_empty() {
            return Ok(SearchHits::empty());
        }

        let mut scored = Vec::new();
        for entry in self.nodes.iter() {
            let (key, value) = entry?;
            let record = decode_record(&String::from_utf8_lossy(&key), &value)?;
            let Some(title) = record.attrs.title() else {
                continue;
            };
            let title = normalize(title);
            let score = if title == query {
                3
            } else if title.starts_with(&query) {
                2
            } else if title.contains(&query) {
                1
            } else {
                continue;
            };
            scored.push((score, record.nodeid));
        }
        Ok(SearchHits::ranked(scored))
    }

    fn search_contents(&self, text: &str) -> Result<SearchHits, ConnectionError> {
        let terms: BTreeSet<String> = tokenize(text).into_iter().collect();
        if terms.is_empty() {
            return Ok(SearchHits::empty());
        }

        let mut matches: HashMap<NodeId, (u64, usize)> = HashMap::new();
        for term in &terms {
            let mut prefix = term.as_bytes().to_vec();
            prefix.push(0);
            for entry in self.terms.scan_prefix(&prefix) {
                let (key, value) = entry?;
                let id = String::from_utf8_lossy(&key[prefix.len()..]).into_owned();
                let count: [u8; 4] = (&value[..]).try_into().map_err(|e| {
                    ConnectionError::corrupt_index(format!("bad term count for node {}", id), e)
                })?;
                let slot = matches.entry(NodeId::from(id)).or_insert((0, 0));
                slot.0 += u64::from(u32::from_be_bytes(count));
                slot.1 += 1;
            }
        }

        let scored = matches
            .into_iter()
            .filter(|(_, (_, matched))| *matched == terms.len())
            .map(|(id, (score, _))| (score, id))
            .collect();
        Ok(SearchHits::ranked(scored))
    }

    fn has_fulltext_search(&self) -> bool {
        true
    }

    fn node_path(&self, nodeid: &NodeId) -> Result<Option<PathBuf>, ConnectionError> {
        Ok(self.read_record(nodeid)?.map(|r| r.path))
    }

    fn attr(&self, nodeid: &NodeId, key: &str) -> Result<Option<Value>, ConnectionError> {
        Ok(self
            .read_record(nodeid)?
            .and_then(|r| r.attrs.get(key).cloned()))
    }

    fn index_attr(&self, key: &str, index_value: bool) -> Result<(), ConnectionError> {
        let already = self
            .attr_keys
            .get(key.as_bytes())?
            .map(|flag| flag.as_ref() == [1u8].as_slice())
            .unwrap_or(false);
        if index_value && !already {
            self.attr_keys.insert(key.as_bytes(), vec![1u8])?;
            let keys = [key.to_string()];
            let mut batch = sled::Batch::default();
            for entry in self.nodes.iter() {
                let (id, value) = entry?;
                let record = decode_record(&String::from_utf8_lossy(&id), &value)?;
                self.write_values(&record, &keys, &mut batch)?;
            }
            self.attr_values.apply_batch(batch)?;
            debug!(key, "Indexed attribute values");
        } else if !already {
            self.attr_keys.insert(key.as_bytes(), vec![0u8])?;
        }
        Ok(())
    }

    fn nodes_by_attr(
        &self,
        key: &str,
        value: &Value,
    ) -> Result<Option<Vec<NodeId>>, ConnectionError> {
        match self.attr_keys.get(key.as_bytes())? {
            Some(flag) if flag.as_ref() == [1u8].as_slice() => {}
            _ => return Ok(None),
        }
        let prefix = Self::value_prefix(key, value)?;
        let mut ids = Vec::new();
        for entry in self.attr_values.scan_prefix(&prefix) {
            let (entry, _) = entry?;
            ids.push(NodeId::from(
                String::from_utf8_lossy(&entry[prefix.len()..]).into_owned(),
            ));
        }
        Ok(Some(ids))
    }

    fn flush(&self) -> Result<(), ConnectionError> {
        self.db.flush()?;
        Ok(())
    }
}
