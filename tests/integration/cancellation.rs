use crate::integration::{build_tree, DirNotebook};
use notecask::archive::{archive_notebook, restore_notebook, ArchiveOptions, RestoreMode};
use notecask::error::NotebookError;
use notecask::task::{Task, TaskState, WaitAction};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn notebook(root: &std::path::Path) -> DirNotebook {
    let path = root.join("MyNotes");
    build_tree(
        &path,
        &[
            ("node.json", Some("{}")),
            ("a/node.json", Some("{}")),
            ("a/page.html", Some("<p>a</p>")),
        ],
    );
    DirNotebook { path }
}

#[test]
fn aborted_backup_leaves_no_archive() {
    let temp = TempDir::new().unwrap();
    let mut nb = notebook(temp.path());
    let dest = temp.path().join("out.tar.gz");
    let task = Task::new();
    task.abort();

    let err = archive_notebook(&mut nb, &dest, &task, &ArchiveOptions::default()).unwrap_err();
    assert!(err.is_canceled());
    assert_eq!(err.to_string(), "Backup canceled");
    assert!(!dest.exists());
    assert_eq!(task.state(), TaskState::Aborted);
}

#[test]
fn aborted_restore_leaves_destination_absent() {
    let temp = TempDir::new().unwrap();
    let mut nb = notebook(temp.path());
    let archive = temp.path().join("out.tar.gz");
    archive_notebook(&mut nb, &archive, &Task::new(), &ArchiveOptions::default()).unwrap();

    let dest = temp.path().join("Restored");
    let task = Task::new();
    task.abort();
    let err = restore_notebook(&archive, &dest, RestoreMode::Rename, &task).unwrap_err();
    assert!(err.is_canceled());
    assert!(!dest.exists());
    assert!(temp.path().join("Restored-tmp").is_dir());
}

#[test]
fn existing_destinations_are_refused_before_work() {
    let temp = TempDir::new().unwrap();
    let mut nb = notebook(temp.path());
    let archive = temp.path().join("out.tar.gz");
    std::fs::write(&archive, "keep").unwrap();

    let err = archive_notebook(&mut nb, &archive, &Task::new(), &ArchiveOptions::default())
        .unwrap_err();
    assert!(matches!(err, NotebookError::FileAlreadyExists(ref p) if p == &archive));
    assert_eq!(std::fs::read_to_string(&archive).unwrap(), "keep");

    let real = temp.path().join("real.tar.gz");
    archive_notebook(&mut nb, &real, &Task::new(), &ArchiveOptions::default()).unwrap();
    let existing = temp.path().join("Existing");
    std::fs::create_dir(&existing).unwrap();
    let task = Task::new();
    let err = restore_notebook(&real, &existing, RestoreMode::Rename, &task).unwrap_err();
    assert_eq!(err.to_string(), "Notebook path already exists");
    assert!(std::fs::read_dir(&existing).unwrap().next().is_none());
    assert!(!temp.path().join("Existing-tmp").exists());
    assert!(task.exc_info().is_some());
}

#[test]
fn observer_abort_reaches_worker() {
    let task = Task::new();
    let handle = task
        .spawn("spin", |task| {
            while !task.is_aborted() {
                std::thread::sleep(Duration::from_millis(1));
            }
            Err::<(), _>(NotebookError::canceled("Spin"))
        })
        .unwrap();

    let err = handle
        .wait(Duration::from_millis(1), |_| WaitAction::Abort)
        .unwrap_err();
    assert!(err.is_canceled());
    assert_eq!(task.state(), TaskState::Aborted);
    let failure = task.exc_info().unwrap();
    assert_eq!(failure.kind, "NotebookError");
}

fn wide_notebook(root: &std::path::Path, files: usize) -> DirNotebook {
    let path = root.join("MyNotes");
    let mut tree = vec![("node.json".to_string(), Some("{}"))];
    for i in 0..files {
        tree.push((format!("page{:02}/page.html", i), Some("<p>text</p>")));
    }
    let borrowed: Vec<(&str, Option<&str>)> =
        tree.iter().map(|(p, b)| (p.as_str(), *b)).collect();
    build_tree(&path, &borrowed);
    DirNotebook { path }
}

#[test]
fn one_percent_update_per_archived_file() {
    let temp = TempDir::new().unwrap();
    let mut nb = wide_notebook(temp.path(), 7);
    let dest = temp.path().join("out.tar.gz");
    let task = Task::new();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    task.on_progress(move |status| sink.lock().push(status.percent));

    let summary = archive_notebook(&mut nb, &dest, &task, &ArchiveOptions::default()).unwrap();
    assert_eq!(summary.files, 8);
    let seen = seen.lock();
    assert_eq!(seen.len(), 8);
    assert!(seen.windows(2).all(|w| w[0] < w[1]));
    assert_eq!(seen.last().copied(), Some(1.0));
}

#[test]
fn backup_aborted_mid_walk_leaves_no_archive() {
    let temp = TempDir::new().unwrap();
    let mut nb = wide_notebook(temp.path(), 20);
    let dest = temp.path().join("out.tar.gz");
    let task = Task::new();
    let aborter = task.clone();
    task.on_progress(move |status| {
        if status.percent > 0.1 {
            aborter.abort();
        }
    });

    let err = archive_notebook(&mut nb, &dest, &task, &ArchiveOptions::default()).unwrap_err();
    assert!(err.is_canceled());
    assert!(!dest.exists());
    let status = task.status();
    assert!(status.percent > 0.1 && status.percent < 1.0);
    assert_eq!(status.state, TaskState::Aborted);
}

#[test]
fn backup_aborted_by_observer_leaves_no_archive() {
    let temp = TempDir::new().unwrap();
    let nb = wide_notebook(temp.path(), 20);
    let dest = temp.path().join("out.tar.gz");
    let task = Task::new();

    // Hold the worker at its first file until the observer has aborted.
    let gate = task.clone();
    task.on_progress(move |_| {
        while !gate.is_aborted() {
            std::thread::sleep(Duration::from_millis(1));
        }
    });
    let worker_dest = dest.clone();
    let handle = task
        .spawn("backup", move |task| {
            let mut nb = nb;
            archive_notebook(&mut nb, &worker_dest, task, &ArchiveOptions::default())
        })
        .unwrap();

    let err = handle
        .wait(Duration::from_millis(1), |status| {
            if status.percent > 0.0 {
                WaitAction::Abort
            } else {
                WaitAction::Continue
            }
        })
        .unwrap_err();
    assert!(err.is_canceled());
    assert!(!dest.exists());
    assert_eq!(task.state(), TaskState::Aborted);
}

#[test]
fn restore_aborted_mid_extract_leaves_destination_absent() {
    let temp = TempDir::new().unwrap();
    let mut nb = wide_notebook(temp.path(), 10);
    let archive = temp.path().join("out.tar.gz");
    archive_notebook(&mut nb, &archive, &Task::new(), &ArchiveOptions::default()).unwrap();

    let task = Task::new();
    let aborter = task.clone();
    task.on_progress(move |status| {
        if status.percent > 0.3 {
            aborter.abort();
        }
    });
    let dest = temp.path().join("Restored");
    let err = restore_notebook(&archive, &dest, RestoreMode::Rename, &task).unwrap_err();
    assert!(err.is_canceled());
    assert!(!dest.exists());
    assert!(temp.path().join("Restored-tmp/MyNotes").is_dir());
    assert!(task.status().percent < 1.0);
    assert_eq!(task.state(), TaskState::Aborted);
}
