//! Core types for notebook nodes.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Node attribute map. Keys are attribute names, values are JSON values.
pub type Attrs = serde_json::Map<String, Value>;

/// Attribute holding the node identifier.
pub const ATTR_NODEID: &str = "nodeid";
/// Attribute holding the parent's identifier (absent on the root).
pub const ATTR_PARENTID: &str = "parentid";
/// Attribute holding the node title.
pub const ATTR_TITLE: &str = "title";
/// Attribute discriminating folders from pages.
pub const ATTR_CONTENT_TYPE: &str = "content_type";
/// Optional integer ordering children of a node.
pub const ATTR_ORDER: &str = "order";

/// NodeId: opaque, globally unique, immutable node identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        NodeId(id.into())
    }

    /// Fresh random identifier.
    pub fn generate() -> Self {
        NodeId(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        NodeId(s.to_string())
    }
}

impl From<String> for NodeId {
    fn from(s: String) -> Self {
        NodeId(s)
    }
}

/// Node kind, derived from the `content_type` attribute
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    Folder,
    Page,
    Other(String),
}

impl NodeKind {
    pub const FOLDER_CONTENT_TYPE: &'static str = "application/x-notebook-dir";
    pub const PAGE_CONTENT_TYPE: &'static str = "text/xhtml+xml";

    pub fn from_content_type(content_type: &str) -> Self {
        match content_type {
            Self::FOLDER_CONTENT_TYPE => NodeKind::Folder,
            Self::PAGE_CONTENT_TYPE => NodeKind::Page,
            other => NodeKind::Other(other.to_string()),
        }
    }

    pub fn content_type(&self) -> &str {
        match self {
            NodeKind::Folder => Self::FOLDER_CONTENT_TYPE,
            NodeKind::Page => Self::PAGE_CONTENT_TYPE,
            NodeKind::Other(s) => s,
        }
    }

    pub fn label(&self) -> &str {
        match self {
            NodeKind::Folder => "folder",
            NodeKind::Page => "page",
            NodeKind::Other(s) => s,
        }
    }
}

/// Typed accessors over an attribute map.
pub trait AttrsExt {
    fn title(&self) -> Option<&str>;
    fn content_type(&self) -> Option<&str>;
    fn kind(&self) -> Option<NodeKind>;
    fn node_id(&self) -> Option<NodeId>;
    fn parent_id(&self) -> Option<NodeId>;
    fn order(&self) -> Option<i64>;
}

impl AttrsExt for Attrs {
    fn title(&self) -> Option<&str> {
        self.get(ATTR_TITLE).and_then(Value::as_str)
    }

    fn content_type(&self) -> Option<&str> {
        self.get(ATTR_CONTENT_TYPE).and_then(Value::as_str)
    }

    fn kind(&self) -> Option<NodeKind> {
        self.content_type().map(NodeKind::from_content_type)
    }

    fn node_id(&self) -> Option<NodeId> {
        self.get(ATTR_NODEID)
            .and_then(Value::as_str)
            .map(NodeId::from)
    }

    fn parent_id(&self) -> Option<NodeId> {
        self.get(ATTR_PARENTID)
            .and_then(Value::as_str)
            .map(NodeId::from)
    }

    fn order(&self) -> Option<i64> {
        self.get(ATTR_ORDER).and_then(Value::as_i64)
    }
}

/// Build a minimal attribute map for a new node.
pub fn new_attrs(title: &str, kind: &NodeKind, parent: Option<&NodeId>) -> Attrs {
    let mut attrs = Attrs::new();
    attrs.insert(ATTR_TITLE.to_string(), Value::from(title));
    attrs.insert(
        ATTR_CONTENT_TYPE.to_string(),
        Value::from(kind.content_type()),
    );
    if let Some(parent) = parent {
        attrs.insert(ATTR_PARENTID.to_string(), Value::from(parent.as_str()));
    }
    attrs
}
