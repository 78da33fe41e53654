//! Write a notebook into a compressed backup archive.

use super::{truncate_filename, MAX_DETAIL_LEN, USTAR_NAME_LEN};
use crate::error::NotebookError;
use crate::notebook::NotebookModel;
use crate::task::{Task, TaskMessage};
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::{self, File, Metadata};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tar::{Builder, Header};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Archive options
#[derive(Debug, Clone)]
pub struct ArchiveOptions {
    /// Visit siblings in name order instead of directory-listing order.
    pub sort_entries: bool,
}

impl Default for ArchiveOptions {
    fn default() -> Self {
        Self { sort_entries: true }
    }
}

/// What a finished backup contains.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveSummary {
    pub files: usize,
    pub directories: usize,
    pub path: PathBuf,
}

#[derive(Debug, Clone, Copy, Default)]
struct Tally {
    files: usize,
    directories: usize,
}

enum Interrupt {
    Canceled,
    Io(io::Error),
}

impl From<io::Error> for Interrupt {
    fn from(err: io::Error) -> Self {
        Interrupt::Io(err)
    }
}

struct Walk<'a, W: Write> {
    builder: Builder<W>,
    task: &'a Task,
    total: usize,
    sort: bool,
}

/// Archive the notebook directory into a new `.tar.gz` file at `dest`.
///
/// The notebook is saved first. The task is started if needed and always
/// finished on return; cancellation leaves no archive behind.
pub fn archive_notebook<N>(
    notebook: &mut N,
    dest: &Path,
    task: &Task,
    options: &ArchiveOptions,
) -> Result<ArchiveSummary, NotebookError>
where
    N: NotebookModel + ?Sized,
{
    task.start();
    let result = write_archive(notebook, dest, task, options);
    if let Err(e) = &result {
        task.fail(e);
    }
    task.finish();
    result
}

fn write_archive<N>(
    notebook: &mut N,
    dest: &Path,
    task: &Task,
    options: &ArchiveOptions,
) -> Result<ArchiveSummary, NotebookError>
where
    N: NotebookModel + ?Sized,
{
    if dest.symlink_metadata().is_ok() {
        return Err(NotebookError::FileAlreadyExists(dest.to_path_buf()));
    }

    notebook
        .save()
        .map_err(|e| NotebookError::wrap("Could not save notebook before archiving", e))?;

    let root = notebook.path().to_path_buf();
    let name = root
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| {
            NotebookError::failed(format!("Notebook path {} has no name", root.display()))
        })?;

    task.set_message(TaskMessage::phase("Archiving..."));
    let total = count_files(&root)
        .map_err(|e| NotebookError::wrap("Could not read notebook directory", e))?;
    info!(notebook = %root.display(), archive = %dest.display(), files = total, "Archiving notebook");

    let file = File::create(dest)
        .map_err(|e| NotebookError::wrap(format!("Could not create {}", dest.display()), e))?;
    let mut walk = Walk {
        builder: Builder::new(GzEncoder::new(file, Compression::default())),
        task,
        total,
        sort: options.sort_entries,
    };

    let walked = walk_entry(&mut walk, &root, &name, Tally::default());
    let closed = match walked {
        Ok(tally) => close_archive(walk.builder).map(|_| tally).map_err(Interrupt::Io),
        Err(e) => {
            drop(walk);
            Err(e)
        }
    };

    match closed {
        Ok(tally) => {
            if total == 0 {
                task.set_percent(1.0);
            }
            info!(files = tally.files, directories = tally.directories, "Archive written");
            Ok(ArchiveSummary {
                files: tally.files,
                directories: tally.directories,
                path: dest.to_path_buf(),
            })
        }
        Err(Interrupt::Canceled) => {
            remove_partial(dest);
            info!(archive = %dest.display(), "Backup canceled");
            Err(NotebookError::canceled("Backup"))
        }
        Err(Interrupt::Io(e)) => {
            remove_partial(dest);
            Err(NotebookError::wrap("Error while archiving notebook", e))
        }
    }
}

/// Regular files below `root`, symlinks excluded.
fn count_files(root: &Path) -> io::Result<usize> {
    let mut total = 0;
    for entry in WalkDir::new(root).follow_links(false) {
        if entry.map_err(io::Error::from)?.file_type().is_file() {
            total += 1;
        }
    }
    Ok(total)
}

fn close_archive<W: Write>(builder: Builder<GzEncoder<W>>) -> io::Result<()> {
    let encoder = builder.into_inner()?;
    let mut inner = encoder.finish()?;
    inner.flush()
}

fn remove_partial(dest: &Path) {
    if let Err(e) = fs::remove_file(dest) {
        if e.kind() != io::ErrorKind::NotFound {
            warn!(archive = %dest.display(), error = %e, "Could not remove partial archive");
        }
    }
}

fn walk_entry<W: Write>(
    walk: &mut Walk<'_, W>,
    path: &Path,
    name: &str,
    mut tally: Tally,
) -> Result<Tally, Interrupt> {
    if walk.task.is_aborted() {
        return Err(Interrupt::Canceled);
    }

    let meta = fs::symlink_metadata(path)?;
    walk.task
        .set_message(TaskMessage::detail(truncate_filename(name, MAX_DETAIL_LEN)));
    append_entry(&mut walk.builder, name, path, &meta)?;
    debug!(entry = name, "Archived entry");

    if meta.is_file() {
        tally.files += 1;
        walk.task
            .set_percent(tally.files as f64 / walk.total.max(1) as f64);
    } else if meta.is_dir() {
        tally.directories += 1;
        let mut children = fs::read_dir(path)?.collect::<io::Result<Vec<_>>>()?;
        if walk.sort {
            children.sort_by_key(|entry| entry.file_name());
        }
        for child in children {
            if child.file_type()?.is_symlink() {
                debug!(path = %child.path().display(), "Skipping symlink");
                continue;
            }
            let child_name = child.file_name();
            let child_name = match child_name.to_str() {
                Some(s) => format!("{}/{}", name, s),
                None => {
                    warn!(path = %child.path().display(), "Archiving non UTF-8 name lossily");
                    format!("{}/{}", name, child_name.to_string_lossy())
                }
            };
            tally = walk_entry(walk, &child.path(), &child_name, tally)?;
        }
    }
    Ok(tally)
}

/// Whether `name` needs a PAX `path` record to survive exactly.
fn needs_pax_path(name: &str) -> bool {
    !name.is_ascii() || name.len() > USTAR_NAME_LEN
}

/// ASCII stand-in written into the ustar name field under a PAX record.
fn fallback_name(name: &str) -> String {
    let ascii: String = name
        .chars()
        .map(|c| if c.is_ascii() && c != '\0' { c } else { '_' })
        .collect();
    let tail = if ascii.len() > USTAR_NAME_LEN {
        &ascii[ascii.len() - USTAR_NAME_LEN..]
    } else {
        &ascii[..]
    };
    tail.trim_start_matches(['/', '.']).to_string()
}

fn append_entry<W: Write>(
    builder: &mut Builder<W>,
    name: &str,
    path: &Path,
    meta: &Metadata,
) -> io::Result<()> {
    let mut header = Header::new_ustar();
    header.set_metadata(meta);

    if needs_pax_path(name) {
        builder.append_pax_extensions([("path", name.as_bytes())])?;
        header.set_path(fallback_name(name))?;
    } else {
        header.set_path(name)?;
    }
    header.set_cksum();

    if meta.is_file() {
        builder.append(&header, File::open(path)?)
    } else {
        header.set_size(0);
        header.set_cksum();
        builder.append(&header, io::empty())
    }
}
