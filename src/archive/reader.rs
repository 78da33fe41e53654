//! Restore a notebook from a backup archive.

use super::{truncate_filename, MAX_DETAIL_LEN};
use crate::error::NotebookError;
use crate::store::naming::{self, NewFilename};
use crate::task::{Task, TaskMessage};
use flate2::read::GzDecoder;
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Component, Path, PathBuf};
use tar::{Archive, Entry, EntryType};
use tracing::{debug, info, warn};

/// Where restored members go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RestoreMode {
    /// `dest` names the restored notebook directory itself. It must not
    /// exist; the archive's single top-level directory is renamed onto it.
    #[default]
    Rename,
    /// Members are extracted as-is into the directory `dest`.
    Direct,
}

/// What a finished restore produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreSummary {
    /// Archive members extracted or skipped.
    pub members: usize,
    /// Restored notebook directory (rename mode) or extraction root (direct).
    pub path: PathBuf,
}

enum Interrupt {
    Canceled,
    Unsafe(PathBuf),
    Io(io::Error),
}

impl From<io::Error> for Interrupt {
    fn from(err: io::Error) -> Self {
        Interrupt::Io(err)
    }
}

/// Restore the archive at `archive` into `dest`.
///
/// The task is started if needed and always finished on return.
pub fn restore_notebook(
    archive: &Path,
    dest: &Path,
    mode: RestoreMode,
    task: &Task,
) -> Result<RestoreSummary, NotebookError> {
    task.start();
    let result = restore(archive, dest, mode, task);
    if let Err(e) = &result {
        task.fail(e);
    }
    task.finish();
    result
}

fn restore(
    archive: &Path,
    dest: &Path,
    mode: RestoreMode,
    task: &Task,
) -> Result<RestoreSummary, NotebookError> {
    // collecting components drops trailing separators
    let dest: PathBuf = dest.components().collect();
    if dest.as_os_str().is_empty() {
        return Err(NotebookError::failed(
            "Must specify a path for restoring notebook",
        ));
    }

    match mode {
        RestoreMode::Rename => restore_renamed(archive, &dest, task),
        RestoreMode::Direct => {
            fs::create_dir_all(&dest).map_err(extract_error)?;
            info!(archive = %archive.display(), dest = %dest.display(), "Restoring notebook");
            let members = extract_into(archive, &dest, task)?;
            Ok(RestoreSummary {
                members,
                path: dest,
            })
        }
    }
}

fn restore_renamed(
    archive: &Path,
    dest: &Path,
    task: &Task,
) -> Result<RestoreSummary, NotebookError> {
    if dest.symlink_metadata().is_ok() {
        return Err(NotebookError::failed("Notebook path already exists"));
    }

    let parent = match dest.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let name = dest
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| NotebookError::failed("Must specify a path for restoring notebook"))?;

    let tmp_base = format!("{}-tmp", name);
    let opts = NewFilename::new(&tmp_base).sep("-").ensure_valid(false);
    let tmp = naming::unique_path(&parent, &opts).map_err(extract_error)?;
    fs::create_dir(&tmp).map_err(extract_error)?;
    info!(archive = %archive.display(), dest = %dest.display(), tmp = %tmp.display(), "Restoring notebook");

    let members = extract_into(archive, &tmp, task)?;

    let mut top = Vec::new();
    for entry in fs::read_dir(&tmp).map_err(extract_error)? {
        top.push(entry.map_err(extract_error)?.path());
    }
    let extracted = match top.as_slice() {
        [only] if only.is_dir() => only.clone(),
        _ => {
            return Err(NotebookError::failed(format!(
                "Notebook archive must hold exactly one top-level directory, found {}",
                top.len()
            )))
        }
    };

    fs::rename(&extracted, dest).map_err(extract_error)?;
    fs::remove_dir(&tmp).map_err(extract_error)?;
    Ok(RestoreSummary {
        members,
        path: dest.to_path_buf(),
    })
}

fn extract_error(err: io::Error) -> NotebookError {
    NotebookError::wrap("File writing error while extracting notebook", err)
}

fn open_archive(path: &Path) -> Result<Archive<GzDecoder<File>>, NotebookError> {
    let file = File::open(path).map_err(|e| {
        NotebookError::wrap(format!("Could not open archive {}", path.display()), e)
    })?;
    Ok(Archive::new(GzDecoder::new(file)))
}

/// Header-only entries that describe the member after them.
fn is_metadata(kind: EntryType) -> bool {
    kind.is_pax_local_extensions()
        || kind.is_pax_global_extensions()
        || kind.is_gnu_longname()
        || kind.is_gnu_longlink()
}

fn count_members(path: &Path) -> Result<usize, NotebookError> {
    let read_error = |e: io::Error| NotebookError::wrap("Could not read notebook archive", e);
    let mut archive = open_archive(path)?;
    let mut total = 0;
    for entry in archive.entries().map_err(read_error)?.raw(true) {
        if !is_metadata(entry.map_err(read_error)?.header().entry_type()) {
            total += 1;
        }
    }
    Ok(total)
}

fn extract_into(archive: &Path, into: &Path, task: &Task) -> Result<usize, NotebookError> {
    task.set_message(TaskMessage::phase("Restoring..."));
    let total = count_members(archive)?;
    debug!(members = total, "Counted archive members");

    let mut opened = open_archive(archive)?;
    match extract_members(&mut opened, into, task, total) {
        Ok(members) => {
            info!(members, dest = %into.display(), "Archive extracted");
            Ok(members)
        }
        Err(Interrupt::Canceled) => {
            info!(dest = %into.display(), "Restore canceled");
            Err(NotebookError::canceled("Restore"))
        }
        Err(Interrupt::Unsafe(name)) => Err(NotebookError::failed(format!(
            "Refusing to extract unsafe archive member {}",
            name.display()
        ))),
        Err(Interrupt::Io(e)) => Err(extract_error(e)),
    }
}

fn extract_members<R: Read>(
    archive: &mut Archive<R>,
    into: &Path,
    task: &Task,
    total: usize,
) -> Result<usize, Interrupt> {
    let mut long_name: Option<Vec<u8>> = None;
    let mut processed = 0usize;
    for entry in archive.entries()?.raw(true) {
        let mut entry = entry?;
        let kind = entry.header().entry_type();

        if kind.is_pax_local_extensions() {
            if let Some(name) = pax_path(&mut entry)? {
                long_name = Some(name);
            }
            continue;
        }
        if kind.is_gnu_longname() {
            let mut name = Vec::new();
            entry.read_to_end(&mut name)?;
            while name.last() == Some(&0) {
                name.pop();
            }
            long_name = Some(name);
            continue;
        }
        if is_metadata(kind) {
            continue;
        }

        if task.is_aborted() {
            return Err(Interrupt::Canceled);
        }

        let name = match long_name.take() {
            Some(bytes) => PathBuf::from(String::from_utf8_lossy(&bytes).into_owned()),
            None => entry.path()?.into_owned(),
        };
        processed += 1;
        task.set_message(TaskMessage::detail(truncate_filename(
            &name.to_string_lossy(),
            MAX_DETAIL_LEN,
        )));

        let target = sanitize_member_path(into, &name)
            .ok_or_else(|| Interrupt::Unsafe(name.clone()))?;
        if target.as_path() == into {
            debug!(member = %name.display(), "Skipping archive root member");
        } else if kind.is_symlink() || kind.is_hard_link() {
            warn!(member = %name.display(), "Skipping link in notebook archive");
        } else {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            entry.unpack(&target)?;
            debug!(member = %name.display(), "Extracted member");
        }
        task.set_percent(processed as f64 / total.max(1) as f64);
    }
    Ok(processed)
}

/// The PAX `path` record of an extended header entry.
fn pax_path<R: Read>(entry: &mut Entry<'_, R>) -> io::Result<Option<Vec<u8>>> {
    let mut found = None;
    if let Some(extensions) = entry.pax_extensions()? {
        for extension in extensions {
            let extension = extension?;
            if matches!(extension.key(), Ok("path")) {
                found = Some(extension.value_bytes().to_vec());
            }
        }
    }
    Ok(found)
}

/// Join a member name below `root`, refusing absolute names and `..`.
///
/// `.` and `./` resolve to `root` itself.
fn sanitize_member_path(root: &Path, name: &Path) -> Option<PathBuf> {
    let mut clean = PathBuf::new();
    for component in name.components() {
        match component {
            Component::Normal(part) => clean.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    if clean.as_os_str().is_empty() {
        return Some(root.to_path_buf());
    }
    Some(root.join(clean))
}
