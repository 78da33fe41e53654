use crate::integration::{build_tree, snapshot, DirNotebook};
use flate2::read::GzDecoder;
use notecask::archive::{
    archive_notebook, restore_notebook, ArchiveOptions, RestoreMode,
};
use notecask::index::IndexBackend;
use notecask::notebook::Notebook;
use notecask::store::{FsConnection, NotebookConnection};
use notecask::task::{Task, TaskState, WaitAction};
use notecask::types::AttrsExt;
use std::fs::File;
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;

fn entry_names(archive: &Path) -> Vec<String> {
    let mut archive = tar::Archive::new(GzDecoder::new(File::open(archive).unwrap()));
    archive
        .entries()
        .unwrap()
        .map(|e| {
            let e = e.unwrap();
            let name = e.path().unwrap().to_string_lossy().into_owned();
            if e.header().entry_type().is_dir() {
                format!("{}/", name.trim_end_matches('/'))
            } else {
                name
            }
        })
        .collect()
}

fn my_notes(root: &Path) -> DirNotebook {
    let path = root.join("MyNotes");
    build_tree(
        &path,
        &[
            ("node.json", Some(r#"{"title":"MyNotes"}"#)),
            ("Projects/node.json", Some(r#"{"title":"Projects"}"#)),
            ("Projects/Ideas.page/node.json", Some(r#"{"title":"Ideas"}"#)),
            ("Projects/Ideas.page/content.html", Some("<p>ideas</p>")),
            ("Todo.page/node.json", Some(r#"{"title":"Todo"}"#)),
            ("Todo.page/content.html", Some("<p>todo</p>")),
        ],
    );
    DirNotebook { path }
}

#[test]
fn my_notes_archive_and_rename_restore() {
    let temp = TempDir::new().unwrap();
    let mut notebook = my_notes(temp.path());
    let archive = temp.path().join("backup.tar.gz");

    let summary = archive_notebook(
        &mut notebook,
        &archive,
        &Task::new(),
        &ArchiveOptions::default(),
    )
    .unwrap();
    assert_eq!(summary.files, 6);
    assert_eq!(summary.directories, 4);

    let names = entry_names(&archive);
    assert_eq!(names[0], "MyNotes/");
    for expected in [
        "MyNotes/Projects/",
        "MyNotes/Projects/Ideas.page/content.html",
        "MyNotes/Todo.page/content.html",
    ] {
        assert!(names.iter().any(|n| n == expected), "missing {}", expected);
    }

    let dest = temp.path().join("dest/MyNotes2");
    std::fs::create_dir(temp.path().join("dest")).unwrap();
    let task = Task::new();
    let restored = restore_notebook(&archive, &dest, RestoreMode::Rename, &task).unwrap();
    assert_eq!(restored.path, dest);
    assert_eq!(task.state(), TaskState::Finished);
    assert!(task.exc_info().is_none());

    assert_eq!(snapshot(&dest), snapshot(&notebook.path));
    let leftovers: Vec<_> = std::fs::read_dir(temp.path().join("dest"))
        .unwrap()
        .map(|e| e.unwrap().file_name())
        .collect();
    assert_eq!(leftovers, vec!["MyNotes2"]);
}

#[test]
fn unicode_and_long_names_survive() {
    let temp = TempDir::new().unwrap();
    let long = format!("{}.txt", "x".repeat(150));
    let deep = format!("{}/{}", "d".repeat(60), "e".repeat(60));
    let path = temp.path().join("Notizen");
    build_tree(
        &path,
        &[
            ("Café/résumé.html", Some("crème")),
            ("日本語/メモ.txt", Some("こんにちは")),
            (long.as_str(), Some("long")),
            (format!("{}/leaf.txt", deep).as_str(), Some("deep")),
        ],
    );
    let mut notebook = DirNotebook { path };
    let archive = temp.path().join("notizen.tar.gz");
    archive_notebook(
        &mut notebook,
        &archive,
        &Task::new(),
        &ArchiveOptions::default(),
    )
    .unwrap();

    let names = entry_names(&archive);
    assert!(names.contains(&format!("Notizen/{}", long)));
    assert!(names.contains(&"Notizen/Café/résumé.html".to_string()));

    let dest = temp.path().join("Restored");
    restore_notebook(&archive, &dest, RestoreMode::Rename, &Task::new()).unwrap();
    assert_eq!(snapshot(&dest), snapshot(&notebook.path));
}

#[test]
fn quoted_attached_file_round_trips_through_archive() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("Book");
    let mut nb = Notebook::create(&path, "Book", IndexBackend::Disabled).unwrap();
    let root = nb.root_id().clone();
    let page = nb.new_page(&root, "Page1", None).unwrap();
    nb.connection()
        .write_file_string(&page, "__image.png", "png-bytes")
        .unwrap();
    nb.connection()
        .write_file_string(&page, "image.png", "other")
        .unwrap();

    let archive = temp.path().join("book.tar.gz");
    archive_notebook(&mut nb, &archive, &Task::new(), &ArchiveOptions::default()).unwrap();
    nb.close().unwrap();

    let names = entry_names(&archive);
    assert!(names.contains(&"Book/Page1/____image.png".to_string()));
    assert!(names.contains(&"Book/Page1/image.png".to_string()));

    let dest = temp.path().join("Book2");
    restore_notebook(&archive, &dest, RestoreMode::Rename, &Task::new()).unwrap();

    let conn = FsConnection::open(&dest, IndexBackend::Disabled).unwrap();
    assert_eq!(conn.get_rootid().unwrap(), root);
    let children = conn.list_children_ids(&root).unwrap();
    assert_eq!(children, vec![page.clone()]);
    assert_eq!(conn.read_node(&page).unwrap().title(), Some("Page1"));
    assert_eq!(
        conn.read_file_to_string(&page, "__image.png").unwrap(),
        "png-bytes"
    );
    let mut files = conn.list_files(&page, None).unwrap();
    files.sort();
    assert_eq!(files, vec!["__image.png", "image.png", "page.html"]);
}

#[test]
fn progress_is_monotonic_and_completes() {
    let temp = TempDir::new().unwrap();
    let files: Vec<(String, Option<&str>)> = (0..40)
        .map(|i| (format!("dir{}/file{}.txt", i % 4, i), Some("data")))
        .collect();
    let files: Vec<(&str, Option<&str>)> =
        files.iter().map(|(n, b)| (n.as_str(), *b)).collect();
    let path = temp.path().join("Big");
    build_tree(&path, &files);

    let archive = temp.path().join("big.tar.gz");
    let task = Task::new();
    let handle = task
        .spawn("backup", move |task| {
            let mut notebook = DirNotebook { path };
            archive_notebook(&mut notebook, &archive, task, &ArchiveOptions::default())
        })
        .unwrap();

    let mut seen = Vec::new();
    let summary = handle
        .wait(Duration::from_millis(1), |status| {
            seen.push(status.percent);
            WaitAction::Continue
        })
        .unwrap();

    assert_eq!(summary.files, 40);
    assert!(seen.windows(2).all(|w| w[0] <= w[1]), "{:?}", seen);
    assert_eq!(seen.last().copied(), Some(1.0));
    let status = task.status();
    assert_eq!(status.state, TaskState::Finished);
    assert_eq!(status.phase, "Archiving...");
}

#[test]
fn empty_notebook_reports_full_progress() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("Empty");
    std::fs::create_dir(&path).unwrap();
    let mut notebook = DirNotebook { path };
    let task = Task::new();
    let summary = archive_notebook(
        &mut notebook,
        &temp.path().join("empty.tar.gz"),
        &task,
        &ArchiveOptions::default(),
    )
    .unwrap();
    assert_eq!(summary.files, 0);
    assert_eq!(task.status().percent, 1.0);
}
