use notecask::error::ConnectionError;
use notecask::index::IndexBackend;
use notecask::notebook::Notebook;
use notecask::store::codec;
use notecask::store::{FileSource, FsConnection, NotebookConnection, OpenMode};
use notecask::types::{new_attrs, AttrsExt, NodeId, NodeKind};
use std::io::{Read, Write};
use std::path::PathBuf;
use tempfile::TempDir;

#[test]
fn attached_file_named_like_quoted_name_round_trips() {
    let temp = TempDir::new().unwrap();
    let root_path = temp.path().join("Notebook");
    let mut conn = FsConnection::open(&root_path, IndexBackend::Disabled).unwrap();
    let root = NodeId::new("root");
    conn.create_root(&root, new_attrs("Notebook", &NodeKind::Folder, None))
        .unwrap();
    let page = NodeId::new("page1");
    conn.create_node(&page, new_attrs("Page1", &NodeKind::Page, Some(&root)))
        .unwrap();

    conn.write_file_string(&page, "__image.png", "quoted").unwrap();
    conn.write_file_string(&page, "image.png", "plain").unwrap();

    let dir = conn.get_node_path(&page).unwrap();
    assert_eq!(dir.file_name().unwrap(), "Page1");
    assert!(dir.join("____image.png").is_file());
    assert!(dir.join("image.png").is_file());
    assert_eq!(codec::decode("____image.png"), "__image.png");
    assert_eq!(codec::decode("image.png"), "image.png");

    let mut files = conn.list_files(&page, None).unwrap();
    files.sort();
    assert_eq!(files, vec!["__image.png", "image.png"]);
    assert_eq!(
        conn.read_file_to_string(&page, "__image.png").unwrap(),
        "quoted"
    );
}

#[test]
fn node_tree_survives_reconnect() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("MyNotes");
    let mut nb = Notebook::create(&path, "MyNotes", IndexBackend::Disabled).unwrap();
    let root = nb.root_id().clone();
    let projects = nb.new_folder(&root, "Projects").unwrap();
    let ideas = nb.new_page(&projects, "Ideas", Some("<p>idea</p>")).unwrap();
    nb.close().unwrap();

    let mut conn = FsConnection::new();
    conn.connect(&path).unwrap();
    assert_eq!(conn.get_rootid().unwrap(), root);
    assert_eq!(conn.list_children_ids(&root).unwrap(), vec![projects.clone()]);
    assert_eq!(conn.get_parentid(&ideas).unwrap(), Some(projects.clone()));
    assert_eq!(conn.read_node(&ideas).unwrap().title(), Some("Ideas"));
    assert_eq!(
        conn.read_file_to_string(&ideas, "page.html").unwrap(),
        "<p>idea</p>"
    );
}

#[test]
fn file_handles_follow_open_mode() {
    let temp = TempDir::new().unwrap();
    let mut nb =
        Notebook::create(&temp.path().join("nb"), "nb", IndexBackend::Disabled).unwrap();
    let root = nb.root_id().clone();
    let page = nb.new_page(&root, "Log", None).unwrap();
    let conn = nb.connection();

    conn.open_file(&page, "log.txt", OpenMode::Write)
        .unwrap()
        .write_all(b"one\n")
        .unwrap();
    conn.open_file(&page, "log.txt", OpenMode::Append)
        .unwrap()
        .write_all(b"two\n")
        .unwrap();
    let mut text = String::new();
    conn.open_file(&page, "log.txt", OpenMode::Read)
        .unwrap()
        .read_to_string(&mut text)
        .unwrap();
    assert_eq!(text, "one\ntwo\n");

    assert!(matches!(
        conn.open_file(&page, "missing.txt", OpenMode::Read),
        Err(ConnectionError::UnknownFile(_))
    ));
}

#[test]
fn copy_between_nodes_and_delete() {
    let temp = TempDir::new().unwrap();
    let mut nb =
        Notebook::create(&temp.path().join("nb"), "nb", IndexBackend::Disabled).unwrap();
    let root = nb.root_id().clone();
    let a = nb.new_page(&root, "A", Some("<p>a</p>")).unwrap();
    let b = nb.new_page(&root, "B", None).unwrap();
    let conn = nb.connection();

    conn.mkdir(&a, "img").unwrap();
    conn.write_file_string(&a, "img/x.png", "png").unwrap();
    conn.copy_file(
        FileSource::Node {
            nodeid: &a,
            filename: "img",
        },
        &b,
        "img",
    )
    .unwrap();
    assert_eq!(conn.read_file_to_string(&b, "img/x.png").unwrap(), "png");

    conn.delete_file(&a, "img").unwrap();
    assert!(!conn.file_exists(&a, "img").unwrap());
    assert!(conn.file_exists(&b, "img/x.png").unwrap());
}

#[test]
fn sled_index_is_rebuilt_on_open() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("nb");
    let index_path = temp.path().join("index");
    let mut nb = Notebook::create(&path, "nb", IndexBackend::Disabled).unwrap();
    let root = nb.root_id().clone();
    let page = nb.new_page(&root, "Quarterly Report", None).unwrap();
    nb.close().unwrap();

    let mut nb = Notebook::open(
        &path,
        IndexBackend::Sled {
            path: index_path.clone(),
        },
    )
    .unwrap();
    assert!(!nb.connection().index_needed());
    assert_eq!(nb.search_titles("quarterly").unwrap(), vec![page.clone()]);
    assert_eq!(
        nb.connection().get_node_path_by_id(&page).unwrap(),
        Some(PathBuf::from("Quarterly Report"))
    );
}
