//! CLI Tooling
//!
//! Command-line front end for notebooks: node creation, attached files,
//! search, and backup / restore driven through a polled [`Task`].

use crate::archive::{
    archive_notebook, default_archive_path, ensure_archive_extension, restore_notebook,
    truncate_filename, ArchiveSummary, RestoreMode, RestoreSummary,
};
use crate::config::{ConfigLoader, NotecaskConfig, Preferences};
use crate::error::{ApiError, ConnectionError};
use crate::index::IndexBackend;
use crate::logging::LoggingConfig;
use crate::notebook::{Notebook, TreeEntry};
use crate::store::{FileSource, NewFilename, NotebookConnection};
use crate::task::{Task, TaskState, TaskStatus, WaitAction};
use crate::types::{AttrsExt, NodeId, NodeKind};
use clap::{Parser, Subcommand};
use comfy_table::Table;
use owo_colors::OwoColorize;
use parking_lot::Mutex;
use serde_json::json;
use std::io::{IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

/// notecask - directory-backed notebooks with tar.gz backups
#[derive(Parser)]
#[command(name = "notecask")]
#[command(about = "Directory-backed notebooks with tar.gz backup and restore")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Notebook directory
    #[arg(long, short = 'n', default_value = ".")]
    pub notebook: PathBuf,

    /// Configuration file path (layered over the global config)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging (default: off)
    #[arg(long, default_value = "false")]
    pub verbose: bool,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long)]
    pub log_format: Option<String>,

    /// Log output (stdout, stderr, file, file+stderr, both)
    #[arg(long)]
    pub log_output: Option<String>,

    /// Log file path (if output includes "file")
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create a new notebook at --notebook
    Init {
        /// Notebook title (defaults to the directory name)
        #[arg(long)]
        title: Option<String>,
    },
    /// Add a page or folder
    Add {
        /// Title of the new node
        title: String,
        /// Parent node ID (defaults to the root)
        #[arg(long)]
        parent: Option<String>,
        /// Create a folder instead of a page
        #[arg(long)]
        folder: bool,
        /// HTML body for a new page
        #[arg(long, conflicts_with = "folder")]
        html: Option<String>,
    },
    /// Print the node tree
    Tree {
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Copy an outside file into a node
    Attach {
        /// Node ID
        node: String,
        /// File to attach
        file: PathBuf,
        /// Name inside the node (defaults to the file name, made unique)
        #[arg(long)]
        name: Option<String>,
    },
    /// List files attached to a node
    Files {
        /// Node ID
        node: String,
        /// Subdirectory inside the node
        #[arg(long)]
        dir: Option<String>,
    },
    /// Search node titles, or page contents with --contents
    Search {
        query: String,
        #[arg(long)]
        contents: bool,
    },
    /// Rebuild the node index
    Reindex,
    /// Write a .tar.gz backup of the notebook
    Backup {
        /// Archive path (defaults to <backup dir>/<name>-<date>.tar.gz)
        dest: Option<PathBuf>,
    },
    /// Restore a notebook from a .tar.gz backup
    Restore {
        /// Archive to read
        archive: PathBuf,
        /// Directory to create
        dest: PathBuf,
        /// Extract straight into dest, which may already exist
        #[arg(long)]
        direct: bool,
    },
}

impl Cli {
    /// Logging settings from `base` with command-line overrides applied.
    pub fn logging_config(&self, base: &LoggingConfig) -> LoggingConfig {
        let mut config = base.clone();
        if self.verbose {
            config.level = "debug".to_string();
        }
        if let Some(level) = &self.log_level {
            config.level = level.clone();
        }
        if let Some(format) = &self.log_format {
            config.format = format.clone();
        }
        if let Some(output) = &self.log_output {
            config.output = output.clone();
        }
        if let Some(file) = &self.log_file {
            config.file = Some(file.clone());
        }
        config
    }
}

/// CLI context for one notebook
pub struct CliContext {
    notebook_path: PathBuf,
    config: NotecaskConfig,
    preferences_path: Option<PathBuf>,
    interrupt: Arc<Interrupt>,
}

/// Ctrl-C state shared between the signal handler and the running task
#[derive(Debug, Default)]
pub struct Interrupt {
    current: Mutex<Option<Task>>,
    requested: AtomicBool,
}

impl Interrupt {
    /// Ask the running task, or the next one, to cancel.
    ///
    /// Returns false when nothing is running or a cancel was already
    /// requested; the caller should then exit instead.
    pub fn request(&self) -> bool {
        let repeated = self.requested.swap(true, Ordering::SeqCst);
        match &*self.current.lock() {
            Some(task) if !repeated => {
                task.abort();
                true
            }
            _ => false,
        }
    }

    fn watch(&self, task: &Task) {
        if self.requested.load(Ordering::SeqCst) {
            task.abort();
        }
        *self.current.lock() = Some(task.clone());
    }

    fn release(&self) {
        *self.current.lock() = None;
        self.requested.store(false, Ordering::SeqCst);
    }
}

impl CliContext {
    /// Create a new CLI context, loading configuration.
    pub fn new(notebook_path: PathBuf, config_path: Option<PathBuf>) -> Result<Self, ApiError> {
        let config = ConfigLoader::load(config_path.as_deref())?;
        let preferences_path = match Preferences::default_path() {
            Ok(path) => Some(path),
            Err(e) => {
                warn!(error = %e, "Preferences disabled");
                None
            }
        };
        Ok(Self::with_config(notebook_path, config, preferences_path))
    }

    pub fn with_config(
        notebook_path: PathBuf,
        config: NotecaskConfig,
        preferences_path: Option<PathBuf>,
    ) -> Self {
        Self {
            notebook_path,
            config,
            preferences_path,
            interrupt: Arc::new(Interrupt::default()),
        }
    }

    pub fn config(&self) -> &NotecaskConfig {
        &self.config
    }

    /// Handle for a signal handler to cancel running backups and restores.
    pub fn interrupt(&self) -> Arc<Interrupt> {
        Arc::clone(&self.interrupt)
    }

    /// Execute a CLI command
    pub fn execute(&self, command: &Commands) -> Result<String, ApiError> {
        match command {
            Commands::Init { title } => self.handle_init(title.as_deref()),
            Commands::Add {
                title,
                parent,
                folder,
                html,
            } => self.handle_add(title, parent.as_deref(), *folder, html.as_deref()),
            Commands::Tree { format } => self.handle_tree(format),
            Commands::Attach { node, file, name } => {
                self.handle_attach(node, file, name.as_deref())
            }
            Commands::Files { node, dir } => self.handle_files(node, dir.as_deref()),
            Commands::Search { query, contents } => self.handle_search(query, *contents),
            Commands::Reindex => self.handle_reindex(),
            Commands::Backup { dest } => self.handle_backup(dest.as_deref()),
            Commands::Restore {
                archive,
                dest,
                direct,
            } => self.handle_restore(archive, dest, *direct),
        }
    }

    fn index_backend(&self, notebook: &Path) -> Result<IndexBackend, ApiError> {
        self.config.index.backend(notebook)
    }

    fn open_notebook(&self) -> Result<Notebook, ApiError> {
        let backend = self.index_backend(&self.notebook_path)?;
        Ok(Notebook::open(&self.notebook_path, backend)?)
    }

    fn handle_init(&self, title: Option<&str>) -> Result<String, ApiError> {
        std::fs::create_dir_all(&self.notebook_path)?;
        let default_title = dir_name(&self.notebook_path);
        let title = title.unwrap_or(&default_title);
        let backend = self.index_backend(&self.notebook_path)?;
        let notebook = Notebook::create(&self.notebook_path, title, backend)?;
        let rootid = notebook.root_id().clone();
        notebook.close()?;
        Ok(format!(
            "Created notebook {} at {} (root: {})",
            title.bold(),
            self.notebook_path.display(),
            rootid
        ))
    }

    fn handle_add(
        &self,
        title: &str,
        parent: Option<&str>,
        folder: bool,
        html: Option<&str>,
    ) -> Result<String, ApiError> {
        let mut notebook = self.open_notebook()?;
        let parent = match parent {
            Some(id) => NodeId::from(id),
            None => notebook.root_id().clone(),
        };
        let nodeid = if folder {
            notebook.new_folder(&parent, title)?
        } else {
            notebook.new_page(&parent, title, html)?
        };
        notebook.close()?;
        Ok(nodeid.to_string())
    }

    fn handle_tree(&self, format: &str) -> Result<String, ApiError> {
        let notebook = self.open_notebook()?;
        let entries = notebook.walk()?;
        if format == "json" {
            let rows: Vec<serde_json::Value> = entries
                .iter()
                .map(|entry| {
                    json!({
                        "depth": entry.depth,
                        "nodeid": entry.nodeid.as_str(),
                        "title": entry.attrs.title(),
                        "content_type": entry.attrs.content_type(),
                    })
                })
                .collect();
            return serde_json::to_string_pretty(&rows)
                .map_err(|e| ApiError::Connection(ConnectionError::Serialization(e)));
        }
        Ok(format_tree_text(&entries))
    }

    fn handle_attach(
        &self,
        node: &str,
        file: &Path,
        name: Option<&str>,
    ) -> Result<String, ApiError> {
        let notebook = self.open_notebook()?;
        let nodeid = NodeId::from(node);
        let conn = notebook.connection();
        let filename = match name {
            Some(name) => name.to_string(),
            None => {
                let base = dir_name(file);
                let (stem, ext) = split_extension(&base);
                let opts = NewFilename::new(stem).ext(ext).ensure_valid(false);
                conn.new_unique_filename(&nodeid, &opts)?.name
            }
        };
        conn.copy_file(FileSource::External(file), &nodeid, &filename)?;
        info!(%nodeid, filename = %filename, "Attached file");
        notebook.close()?;
        Ok(filename)
    }

    fn handle_files(&self, node: &str, dir: Option<&str>) -> Result<String, ApiError> {
        let notebook = self.open_notebook()?;
        let nodeid = NodeId::from(node);
        let files = notebook
            .connection()
            .list_files(&nodeid, dir)?;

        let mut table = Table::new();
        table.load_preset(comfy_table::presets::UTF8_FULL);
        table.set_header(vec!["Name", "Kind"]);
        for name in &files {
            let kind = if name.ends_with('/') { "dir" } else { "file" };
            table.add_row(vec![name.as_str(), kind]);
        }
        Ok(table.to_string())
    }

    fn handle_search(&self, query: &str, contents: bool) -> Result<String, ApiError> {
        let mut notebook = self.open_notebook()?;
        let hits = if contents {
            notebook.search_contents(query)?
        } else {
            notebook.search_titles(query)?
        };
        if hits.is_empty() {
            return Ok(format!("No matches for \"{}\"", query));
        }

        let conn = notebook.connection();
        let mut table = Table::new();
        table.load_preset(comfy_table::presets::UTF8_FULL);
        table.set_header(vec!["Title", "Node ID", "Path"]);
        for nodeid in &hits {
            let title = conn
                .read_node(nodeid)
                .ok()
                .and_then(|attrs| attrs.title().map(str::to_string))
                .unwrap_or_else(|| "-".to_string());
            let path = conn
                .get_node_path_by_id(nodeid)?
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "-".to_string());
            table.add_row(vec![title, nodeid.to_string(), path]);
        }
        Ok(table.to_string())
    }

    fn handle_reindex(&self) -> Result<String, ApiError> {
        let mut notebook = self.open_notebook()?;
        let conn = notebook.connection_mut();
        if !conn.has_fulltext_search() {
            return Ok("Index is disabled".to_string());
        }
        let count = conn.index_all()?;
        notebook.close()?;
        Ok(format!("Indexed {} nodes", count))
    }

    /// Where an unnamed backup goes: configured dir, then the last one used,
    /// then beside the notebook.
    fn backup_dir(&self, preferences: &Preferences) -> PathBuf {
        if let Some(dir) = &self.config.archive.backup_dir {
            return dir.clone();
        }
        preferences
            .backup_dir
            .clone()
            .filter(|dir| dir.is_dir())
            .unwrap_or_else(|| self.config.archive.backup_dir_for(&self.notebook_path))
    }

    fn handle_backup(&self, dest: Option<&Path>) -> Result<String, ApiError> {
        let mut preferences = self.load_preferences();
        let dest = match dest {
            Some(dest) => ensure_archive_extension(dest),
            None => {
                let dir = self.backup_dir(&preferences);
                let today = chrono::Local::now().date_naive();
                default_archive_path(&self.notebook_path, &dir, today)?
            }
        };

        let mut notebook = self.open_notebook()?;
        let options = self.config.archive.options();
        let worker_dest = dest.clone();
        let summary: ArchiveSummary = self.run_with_progress("backup", move |task| {
            let result = archive_notebook(&mut notebook, &worker_dest, task, &options);
            if let Err(e) = notebook.close() {
                warn!(error = %e, "Could not close notebook after backup");
            }
            result
        })?;

        preferences.remember_backup(&dest);
        self.save_preferences(&preferences);
        Ok(format!(
            "{} {} ({} files, {} directories)",
            "Backed up to".green(),
            summary.path.display(),
            summary.files,
            summary.directories
        ))
    }

    fn handle_restore(
        &self,
        archive: &Path,
        dest: &Path,
        direct: bool,
    ) -> Result<String, ApiError> {
        let mode = if direct {
            RestoreMode::Direct
        } else {
            RestoreMode::Rename
        };
        let worker_archive = archive.to_path_buf();
        let worker_dest = dest.to_path_buf();
        let summary: RestoreSummary = self.run_with_progress("restore", move |task| {
            restore_notebook(&worker_archive, &worker_dest, mode, task)
        })?;

        let mut preferences = self.load_preferences();
        preferences.remember_restore(archive);
        self.save_preferences(&preferences);
        Ok(format!(
            "{} {} ({} members)",
            "Restored to".green(),
            summary.path.display(),
            summary.members
        ))
    }

    /// Run `work` on a worker thread and draw its progress until it exits.
    fn run_with_progress<T, F>(&self, name: &str, work: F) -> Result<T, ApiError>
    where
        T: Send + 'static,
        F: FnOnce(&Task) -> Result<T, crate::error::NotebookError> + Send + 'static,
    {
        let task = Task::new();
        self.interrupt.watch(&task);
        let mut line = ProgressLine::new();
        let result = task.spawn(name, work).and_then(|handle| {
            handle.wait(self.config.archive.progress_interval(), |status| {
                line.draw(status);
                WaitAction::Continue
            })
        });
        self.interrupt.release();
        line.clear();
        Ok(result?)
    }

    fn load_preferences(&self) -> Preferences {
        let Some(path) = &self.preferences_path else {
            return Preferences::default();
        };
        Preferences::load(path).unwrap_or_else(|e| {
            warn!(error = %e, "Ignoring unreadable preferences");
            Preferences::default()
        })
    }

    fn save_preferences(&self, preferences: &Preferences) {
        if let Some(path) = &self.preferences_path {
            if let Err(e) = preferences.save(path) {
                warn!(error = %e, "Could not save preferences");
            }
        }
    }
}

/// Single-line progress display on stderr, drawn only on terminals.
struct ProgressLine {
    enabled: bool,
    width: usize,
}

impl ProgressLine {
    fn new() -> Self {
        Self {
            enabled: std::io::stderr().is_terminal(),
            width: 0,
        }
    }

    fn draw(&mut self, status: &TaskStatus) {
        if !self.enabled || status.state == TaskState::Created {
            return;
        }
        let text = format_progress(status);
        let pad = self.width.saturating_sub(text.chars().count());
        self.width = text.chars().count();
        let mut err = std::io::stderr().lock();
        let _ = write!(err, "\r{}{}", text, " ".repeat(pad));
        let _ = err.flush();
    }

    fn clear(&mut self) {
        if self.enabled && self.width > 0 {
            let mut err = std::io::stderr().lock();
            let _ = write!(err, "\r{}\r", " ".repeat(self.width));
            let _ = err.flush();
        }
    }
}

fn format_progress(status: &TaskStatus) -> String {
    let percent = (status.percent * 100.0).round() as u32;
    let detail = truncate_filename(&status.detail, 60);
    if detail.is_empty() {
        format!("{:>3}% {}", percent, status.phase)
    } else {
        format!("{:>3}% {} {}", percent, status.phase, detail)
    }
}

fn format_tree_text(entries: &[TreeEntry]) -> String {
    let mut out = String::new();
    for entry in entries {
        let title = entry.attrs.title().unwrap_or("(untitled)");
        let label = match entry.attrs.kind() {
            Some(NodeKind::Folder) => format!("{}", title.bold()),
            _ => title.to_string(),
        };
        out.push_str(&format!(
            "{}{}  {}\n",
            "  ".repeat(entry.depth),
            label,
            entry.nodeid.as_str().dimmed()
        ));
    }
    out.truncate(out.trim_end().len());
    out
}

fn dir_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .or_else(|| {
            dunce::canonicalize(path)
                .ok()
                .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
        })
        .unwrap_or_else(|| "Notebook".to_string())
}

/// `"photo.jpg"` -> `("photo", ".jpg")`; dotfiles keep their name as the stem.
fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(pos) if pos > 0 => name.split_at(pos),
        _ => (name, ""),
    }
}
