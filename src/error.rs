//! Error types
//!
//! `ConnectionError` covers the CRUD contract of a notebook connection,
//! `NotebookError` covers archive and restore, and `ApiError` is what the
//! command-line front end reports.

use crate::types::NodeId;
use std::error::Error as StdError;
use std::path::PathBuf;
use thiserror::Error;

/// Boxed cause carried by wrapping variants.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Errors raised by a notebook connection and its index.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("unknown node: {0}")]
    UnknownNode(NodeId),

    #[error("node exists: {0}")]
    NodeExists(NodeId),

    #[error("unknown file: {0}")]
    UnknownFile(String),

    #[error("index error: {message}")]
    CorruptIndex {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    #[error("invalid node attributes: {0}")]
    InvalidAttrs(String),

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("connection is not open")]
    NotConnected,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ConnectionError {
    pub fn corrupt_index(message: impl Into<String>, source: impl Into<BoxError>) -> Self {
        ConnectionError::CorruptIndex {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// True for the index inconsistencies a caller answers with a rebuild.
    pub fn is_corrupt_index(&self) -> bool {
        matches!(self, ConnectionError::CorruptIndex { .. })
    }
}

impl From<sled::Error> for ConnectionError {
    fn from(err: sled::Error) -> Self {
        ConnectionError::corrupt_index("index storage failure", err)
    }
}

/// Errors raised while archiving or restoring a notebook.
#[derive(Debug, Error)]
pub enum NotebookError {
    #[error("File '{}' already exists", .0.display())]
    FileAlreadyExists(PathBuf),

    #[error("{message}")]
    Failed {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// A cancellation request was honored. Not a failure to report loudly.
    #[error("{operation} canceled")]
    Canceled { operation: String },
}

impl NotebookError {
    pub fn failed(message: impl Into<String>) -> Self {
        NotebookError::Failed {
            message: message.into(),
            source: None,
        }
    }

    pub fn wrap(message: impl Into<String>, source: impl Into<BoxError>) -> Self {
        NotebookError::Failed {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    pub fn canceled(operation: impl Into<String>) -> Self {
        NotebookError::Canceled {
            operation: operation.into(),
        }
    }

    pub fn is_canceled(&self) -> bool {
        matches!(self, NotebookError::Canceled { .. })
    }
}

/// Top-level errors for the front end.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error(transparent)]
    Notebook(#[from] NotebookError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<config::ConfigError> for ApiError {
    fn from(err: config::ConfigError) -> Self {
        ApiError::ConfigError(err.to_string())
    }
}
