mod support;

use std::sync::Arc;

use codepad_vfs::{
    ClipboardOperation, MemoryBackend, Node, NodeKind, Session, VfsConfig, VfsError,
};
use support::FlakyBackend;

fn memory_session() -> Session {
    Session::open(Arc::new(MemoryBackend::new()), VfsConfig::default()).unwrap()
}

fn files(node: &Node) -> Vec<&Node> {
    node.walk()
        .into_iter()
        .filter(|n| n.kind == NodeKind::File)
        .collect()
}

#[test]
fn copied_file_survives_deleting_its_source_folder() {
    let mut session = memory_session();
    let app = session.create_node(NodeKind::Folder, "app", None).unwrap();
    let index = session
        .create_node(NodeKind::File, "index.js", Some("app"))
        .unwrap();
    session.write_file(&index.id, "a").unwrap();

    session.copy(&index.id).unwrap();
    let copy = session.paste(None).unwrap();
    assert_eq!(copy.name, "index.js - copy");
    assert_eq!(copy.path, "index.js - copy");
    assert_ne!(copy.id, index.id);
    assert_eq!(session.read_file(&copy.id).unwrap(), "a");

    session.delete_node(&app.id).unwrap();
    assert_eq!(session.purge_orphans().unwrap(), 1);
    assert_eq!(session.nodes().len(), 1);
    assert_eq!(session.nodes()[0].id, copy.id);
    assert_eq!(session.contents().stored_ids().unwrap(), vec![copy.id]);
}

#[test]
fn copying_a_folder_duplicates_every_level() {
    let mut session = memory_session();
    let app = session.create_node(NodeKind::Folder, "app", None).unwrap();
    let index = session
        .create_node(NodeKind::File, "index.js", Some("app"))
        .unwrap();
    session.create_node(NodeKind::Folder, "lib", Some("app")).unwrap();
    let util = session
        .create_node(NodeKind::File, "util.js", Some("app/lib"))
        .unwrap();
    session.write_file(&index.id, "main()").unwrap();
    session.write_file(&util.id, "export {}").unwrap();

    session.copy(&app.id).unwrap();
    let pasted = session.paste(None).unwrap();
    let source = session.find_node(&app.id).unwrap().clone();

    assert_eq!(pasted.name, "app - copy");
    let originals = source.walk();
    let copies = pasted.walk();
    assert_eq!(originals.len(), copies.len());
    for (index, (original, copy)) in originals.iter().zip(copies.iter()).enumerate() {
        assert_ne!(original.id, copy.id);
        assert_eq!(original.kind, copy.kind);
        if index > 0 {
            assert_eq!(original.name, copy.name);
        }
    }
    for (original, copy) in files(&source).into_iter().zip(files(&pasted)) {
        assert_eq!(
            session.read_file(&original.id).unwrap(),
            session.read_file(&copy.id).unwrap()
        );
    }
    assert_eq!(source.children().len(), 2);
    assert_eq!(
        session.find_by_path("app - copy/lib/util.js").unwrap().kind,
        NodeKind::File
    );
}

#[test]
fn cut_and_paste_moves_content_to_new_ids() {
    let mut session = memory_session();
    session.create_node(NodeKind::Folder, "dest", None).unwrap();
    let file = session.create_node(NodeKind::File, "a.txt", None).unwrap();
    session.write_file(&file.id, "body").unwrap();

    session.cut(&file.id).unwrap();
    let moved = session.paste(Some("dest")).unwrap();

    assert_ne!(moved.id, file.id);
    assert_eq!(moved.path, "dest/a.txt");
    assert_eq!(session.read_file(&moved.id).unwrap(), "body");
    assert!(session.find_node(&file.id).is_none());
    assert!(!session.contents().stored_ids().unwrap().contains(&file.id));
    assert!(!session.clipboard().has_content());
}

#[test]
fn failed_paste_after_cut_keeps_source_and_clipboard() {
    let backend = FlakyBackend::shared();
    let mut session = Session::open(backend.clone(), VfsConfig::default()).unwrap();
    let file = session.create_node(NodeKind::File, "a.txt", None).unwrap();
    session.write_file(&file.id, "body").unwrap();
    session.cut(&file.id).unwrap();

    backend.fail_writes("file_content_");
    let err = session.paste(None).unwrap_err();
    assert!(matches!(err, VfsError::Persistence(_)));
    assert_eq!(session.nodes().len(), 1);
    assert_eq!(session.nodes()[0].id, file.id);
    assert_eq!(
        session.clipboard().peek().map(|slot| slot.operation),
        Some(ClipboardOperation::Cut)
    );

    backend.heal();
    assert_eq!(session.read_file(&file.id).unwrap(), "body");
    let moved = session.paste(None).unwrap();
    assert_eq!(moved.name, "a.txt");
    assert_eq!(session.nodes().len(), 1);
    assert_eq!(session.read_file(&moved.id).unwrap(), "body");
}

#[test]
fn cut_pasted_into_its_own_folder_keeps_its_name() {
    let mut session = memory_session();
    session.create_node(NodeKind::Folder, "app", None).unwrap();
    let index = session
        .create_node(NodeKind::File, "index.js", Some("app"))
        .unwrap();
    session.write_file(&index.id, "a").unwrap();

    session.cut(&index.id).unwrap();
    let moved = session.paste(Some("app")).unwrap();

    assert_eq!(moved.name, "index.js");
    assert_eq!(moved.path, "app/index.js");
    let app = session.find_by_path("app").unwrap();
    let names: Vec<_> = app.children().iter().map(|n| n.name.as_str()).collect();
    assert_eq!(names, vec!["index.js"]);
    assert_eq!(session.read_file(&moved.id).unwrap(), "a");
    assert_eq!(session.contents().stored_ids().unwrap(), vec![moved.id]);
}

#[test]
fn cut_folder_carries_children_added_after_the_cut() {
    let mut session = memory_session();
    session.create_node(NodeKind::Folder, "dest", None).unwrap();
    let src = session.create_node(NodeKind::Folder, "src", None).unwrap();
    session.cut(&src.id).unwrap();
    let late = session
        .create_node(NodeKind::File, "late.rs", Some("src"))
        .unwrap();
    session.write_file(&late.id, "fn late() {}").unwrap();

    let moved = session.paste(Some("dest")).unwrap();
    assert_eq!(moved.path, "dest/src");
    let copy = session.find_by_path("dest/src/late.rs").unwrap().id.clone();
    assert_eq!(session.read_file(&copy).unwrap(), "fn late() {}");
    assert!(session.find_by_path("src").is_none());
}

#[test]
fn failed_tree_write_leaves_visible_tree_unchanged() {
    let backend = FlakyBackend::shared();
    let mut session = Session::open(backend.clone(), VfsConfig::default()).unwrap();
    let docs = session.create_node(NodeKind::Folder, "docs", None).unwrap();

    backend.fail_writes("files_structure");
    assert!(session.create_node(NodeKind::File, "x.md", None).is_err());
    assert!(session.rename_node(&docs.id, "notes").is_err());
    assert!(session.delete_node(&docs.id).is_err());
    assert_eq!(session.nodes().len(), 1);
    assert_eq!(session.nodes()[0].name, "docs");

    backend.heal();
    let reopened = Session::open(backend.clone(), VfsConfig::default()).unwrap();
    assert_eq!(reopened.nodes(), session.nodes());
}

#[test]
fn renaming_a_folder_moves_every_descendant_path() {
    let mut session = memory_session();
    let root = session.create_node(NodeKind::Folder, "a", None).unwrap();
    session.create_node(NodeKind::Folder, "b", Some("a")).unwrap();
    session.create_node(NodeKind::File, "c.txt", Some("a/b")).unwrap();
    session.create_node(NodeKind::Folder, "d", Some("a")).unwrap();

    let renamed = session.rename_node(&root.id, "z").unwrap();
    assert_eq!(renamed.path, "z");
    for node in renamed.walk() {
        assert!(node.path == "z" || node.path.starts_with("z/"));
        for child in node.children() {
            assert_eq!(child.path, format!("{}/{}", node.path, child.name));
        }
    }
    assert!(session.find_by_path("z/b/c.txt").is_some());
    assert!(session.find_by_path("a/b/c.txt").is_none());
}

#[test]
fn duplicate_sibling_names_are_rejected() {
    let mut session = memory_session();
    session.create_node(NodeKind::File, "main.rs", None).unwrap();
    let err = session
        .create_node(NodeKind::File, "main.rs", None)
        .unwrap_err();
    assert!(matches!(err, VfsError::InvalidName(_)));
    // A folder may share a file's name.
    session.create_node(NodeKind::Folder, "main.rs", None).unwrap();
    assert_eq!(session.nodes().len(), 2);
}

#[test]
fn folder_delete_purges_content_when_configured() {
    let config = VfsConfig {
        purge_on_delete: true,
        ..VfsConfig::default()
    };
    let mut session = Session::open(Arc::new(MemoryBackend::new()), config).unwrap();
    let src = session.create_node(NodeKind::Folder, "src", None).unwrap();
    let deep = session
        .create_node(NodeKind::Folder, "deep", Some("src"))
        .unwrap();
    let leaf = session
        .create_node(NodeKind::File, "leaf.rs", Some("src/deep"))
        .unwrap();
    let keep = session.create_node(NodeKind::File, "keep.rs", None).unwrap();
    session.write_file(&leaf.id, "fn leaf() {}").unwrap();
    session.write_file(&keep.id, "fn keep() {}").unwrap();

    let removed = session.delete_node(&src.id).unwrap();
    assert!(removed.contains(&deep.id));
    assert!(session.find_node(&deep.id).is_none());
    assert!(session.find_node(&leaf.id).is_none());
    assert_eq!(session.contents().stored_ids().unwrap(), vec![keep.id]);
}

#[test]
fn search_and_toggle_work_on_the_loose_tree() {
    let mut session = memory_session();
    let folder = session.create_node(NodeKind::Folder, "Docs", None).unwrap();
    session
        .create_node(NodeKind::File, "readme.md", Some("Docs"))
        .unwrap();
    session.create_node(NodeKind::File, "DOCS.txt", None).unwrap();

    let hits: Vec<_> = session
        .search_nodes("docs")
        .into_iter()
        .map(|node| node.path.clone())
        .collect();
    assert_eq!(hits, vec!["Docs".to_string(), "DOCS.txt".to_string()]);

    assert!(session.toggle_expanded(&folder.id).unwrap().expanded);
    assert!(!session.toggle_expanded(&folder.id).unwrap().expanded);
}
