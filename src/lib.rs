//! notecask: Directory-Backed Notebooks
//!
//! A notebook is a tree of nodes stored as nested directories, each holding a
//! `node.json` attribute file and any attached data files. The crate provides
//! the CRUD connection over that layout, an optional node index, and a
//! cancellable `.tar.gz` backup and restore pipeline.

pub mod archive;
pub mod config;
pub mod error;
pub mod index;
pub mod logging;
pub mod notebook;
pub mod store;
pub mod task;
pub mod tooling;
pub mod types;
