//! Tooling & Integration Layer
//!
//! Command-line front end over the notebook library.

pub mod cli;

pub use cli::{Cli, CliContext, Commands};
