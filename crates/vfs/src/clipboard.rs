//! Single-slot clipboard for copy/cut/paste of subtrees.
//! 單一槽位的剪貼簿，處理子樹的複製、剪下與貼上。

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::content::ContentStore;
use crate::error::VfsError;
use crate::tree::{join_path, Node, NodeId, NodeKind};
use crate::tree_store::TreeStore;

/// Suffix appended to the top-level name of a copied subtree.
pub const COPY_SUFFIX: &str = " - copy";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClipboardOperation {
    Copy,
    Cut,
}

/// The pending payload: a deep copy of a subtree and how it was taken.
#[derive(Debug, Clone, PartialEq)]
pub struct ClipboardSlot {
    pub node: Node,
    pub operation: ClipboardOperation,
}

/// Holds at most one copied or cut subtree.
/// 最多保存一個已複製或剪下的子樹。
#[derive(Debug, Default)]
pub struct ClipboardManager {
    slot: Option<ClipboardSlot>,
}

impl ClipboardManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stages a deep copy of `node`; the source is untouched.
    pub fn copy(&mut self, node: &Node) {
        self.stage(node, ClipboardOperation::Copy);
    }

    /// Stages a deep copy of `node` for a move. The source stays in place until a paste succeeds.
    pub fn cut(&mut self, node: &Node) {
        self.stage(node, ClipboardOperation::Cut);
    }

    fn stage(&mut self, node: &Node, operation: ClipboardOperation) {
        debug!(node = %node.id, ?operation, "clipboard staged");
        self.slot = Some(ClipboardSlot {
            node: node.clone(),
            operation,
        });
    }

    pub fn peek(&self) -> Option<&ClipboardSlot> {
        self.slot.as_ref()
    }

    pub fn has_content(&self) -> bool {
        self.slot.is_some()
    }

    pub fn clear(&mut self) {
        self.slot = None;
    }

    pub(crate) fn restore(&mut self, slot: Option<ClipboardSlot>) {
        self.slot = slot;
    }

    /// Materialises the staged subtree under `target_folder` (root level when `None`).
    /// 將剪貼簿內容以全新識別碼貼到目標資料夾下。
    ///
    /// Every pasted node gets a fresh id and every file's content is
    /// duplicated. A cut keeps its name and swaps the source for the new
    /// subtree in one tree commit, so the source must still be in `tree`. The
    /// slot is cleared only after that commit; any earlier failure rolls back
    /// the duplicated content and leaves both the tree and the slot as they were.
    pub fn paste(
        &mut self,
        target_folder: Option<&str>,
        tree: &mut TreeStore,
    ) -> Result<Node, VfsError> {
        let slot = self.slot.clone().ok_or(VfsError::EmptyClipboard)?;
        let target = target_folder
            .map(|path| path.trim_matches('/'))
            .filter(|path| !path.is_empty());

        let (source, name) = match slot.operation {
            ClipboardOperation::Copy => {
                let base = format!("{}{COPY_SUFFIX}", slot.node.name);
                let name = tree
                    .tree()
                    .unique_sibling_name(target, &base, slot.node.kind)?;
                (slot.node.clone(), name)
            }
            ClipboardOperation::Cut => {
                let Some(live) = tree.find(&slot.node.id).cloned() else {
                    warn!(node = %slot.node.id, "cut source is not in this tree; paste refused");
                    return Err(VfsError::node_not_found(&slot.node.id));
                };
                ensure_outside_source(tree, &live.id, target)?;
                // Checked against the tree without the source.
                let name = tree
                    .tree()
                    .remove(&live.id)?
                    .tree
                    .unique_sibling_name(target, &live.name, live.kind)?;
                (live, name)
            }
        };
        let (fresh, file_ids) = clone_with_fresh_ids(&source, Some(&name));

        let contents = tree.contents().clone();
        let mut written = Vec::with_capacity(file_ids.len());
        for (from, to) in &file_ids {
            if let Err(err) = contents.duplicate(from, to) {
                warn!(node = %from, error = %err, "content duplication failed; paste aborted");
                rollback_content(&contents, &written);
                return Err(err.into());
            }
            written.push(to.clone());
        }

        let placed = match slot.operation {
            ClipboardOperation::Copy => tree.insert_subtree(target, fresh),
            ClipboardOperation::Cut => tree.move_subtree(&source.id, target, fresh),
        };
        let pasted = match placed {
            Ok(node) => node,
            Err(err) => {
                rollback_content(&contents, &written);
                return Err(err);
            }
        };

        if slot.operation == ClipboardOperation::Cut {
            for (from, _) in &file_ids {
                if let Err(err) = contents.delete(from) {
                    warn!(node = %from, error = %err, "moved content not removed; left for purge");
                }
            }
            self.slot = None;
        }

        info!(
            node = %pasted.id,
            path = %pasted.path,
            operation = ?slot.operation,
            "clipboard pasted"
        );
        Ok(pasted)
    }
}

/// Deep-clones `node` with a fresh id at every level.
/// 深層複製節點並為每一層指派新的識別碼。
///
/// Returns the copy and the `(old, new)` id pairs of every file in it, so
/// callers can duplicate content. `name` overrides the top-level name.
pub fn clone_with_fresh_ids(node: &Node, name: Option<&str>) -> (Node, Vec<(NodeId, NodeId)>) {
    let mut file_ids = Vec::new();
    let copy = clone_recursive(node, name, None, &mut file_ids);
    (copy, file_ids)
}

fn clone_recursive(
    node: &Node,
    name: Option<&str>,
    parent_path: Option<&str>,
    file_ids: &mut Vec<(NodeId, NodeId)>,
) -> Node {
    let mut copy = Node::new(node.kind, name.unwrap_or(node.name.as_str()));
    copy.path = join_path(parent_path, &copy.name);
    copy.expanded = node.expanded;
    match node.kind {
        NodeKind::File => file_ids.push((node.id.clone(), copy.id.clone())),
        NodeKind::Folder => {
            let children = node
                .children()
                .iter()
                .map(|child| clone_recursive(child, None, Some(&copy.path), file_ids))
                .collect();
            copy.children = Some(children);
        }
    }
    copy
}

fn ensure_outside_source(
    tree: &TreeStore,
    source: &NodeId,
    target: Option<&str>,
) -> Result<(), VfsError> {
    let (Some(target), Some(live)) = (target, tree.find(source)) else {
        return Ok(());
    };
    if !live.is_folder() {
        return Ok(());
    }
    let inside = target == live.path || target.starts_with(&format!("{}/", live.path));
    if inside {
        return Err(VfsError::MoveIntoDescendant(source.clone()));
    }
    Ok(())
}

fn rollback_content(contents: &ContentStore, written: &[NodeId]) {
    for id in written {
        if let Err(err) = contents.delete(id) {
            warn!(node = %id, error = %err, "content rollback failed; left for purge");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{KeyValueBackend, MemoryBackend};
    use std::sync::Arc;

    fn store() -> TreeStore {
        let backend: Arc<dyn KeyValueBackend> = Arc::new(MemoryBackend::new());
        TreeStore::load(backend.clone(), ContentStore::new(backend)).unwrap()
    }

    #[test]
    fn paste_on_empty_clipboard_fails() {
        let mut tree = store();
        let mut clipboard = ClipboardManager::new();
        let err = clipboard.paste(None, &mut tree).unwrap_err();
        assert!(matches!(err, VfsError::EmptyClipboard));
    }

    #[test]
    fn copy_paste_keeps_slot_and_counts_names_up() {
        let mut tree = store();
        let file = tree.create(NodeKind::File, "a.txt", None).unwrap();
        let mut clipboard = ClipboardManager::new();
        clipboard.copy(&file);

        let first = clipboard.paste(None, &mut tree).unwrap();
        let second = clipboard.paste(None, &mut tree).unwrap();
        assert_eq!(first.name, "a.txt - copy");
        assert_eq!(second.name, "a.txt - copy (2)");
        assert!(clipboard.has_content());
        assert_eq!(
            clipboard.peek().map(|slot| slot.operation),
            Some(ClipboardOperation::Copy)
        );
    }

    #[test]
    fn cut_paste_clears_slot() {
        let mut tree = store();
        tree.create(NodeKind::Folder, "dest", None).unwrap();
        let file = tree.create(NodeKind::File, "a.txt", None).unwrap();
        let mut clipboard = ClipboardManager::new();
        clipboard.cut(&file);
        assert!(tree.find(&file.id).is_some());

        let moved = clipboard.paste(Some("dest"), &mut tree).unwrap();
        assert_eq!(moved.path, "dest/a.txt");
        assert!(tree.find(&file.id).is_none());
        assert!(!clipboard.has_content());
    }

    #[test]
    fn cut_folder_into_its_own_subtree_is_rejected() {
        let mut tree = store();
        let app = tree.create(NodeKind::Folder, "app", None).unwrap();
        tree.create(NodeKind::Folder, "src", Some("app")).unwrap();
        let mut clipboard = ClipboardManager::new();
        clipboard.cut(&app);

        for target in ["app", "app/src"] {
            let err = clipboard.paste(Some(target), &mut tree).unwrap_err();
            assert!(matches!(err, VfsError::MoveIntoDescendant(_)));
        }
        assert!(clipboard.has_content());
        assert_eq!(tree.tree().len(), 2);
    }

    #[test]
    fn paste_into_missing_folder_leaves_everything_alone() {
        let mut tree = store();
        let file = tree.create(NodeKind::File, "a.txt", None).unwrap();
        tree.contents().save(&file.id, "body").unwrap();
        let mut clipboard = ClipboardManager::new();
        clipboard.cut(&file);

        let err = clipboard.paste(Some("missing"), &mut tree).unwrap_err();
        assert!(err.is_not_found());
        assert!(tree.find(&file.id).is_some());
        assert!(clipboard.has_content());
        assert_eq!(tree.contents().stored_ids().unwrap(), vec![file.id]);
    }

    #[test]
    fn cut_needs_its_source_in_the_target_tree() {
        let mut tree = store();
        let file = tree.create(NodeKind::File, "a.txt", None).unwrap();
        let mut clipboard = ClipboardManager::new();
        clipboard.cut(&file);

        let backend: Arc<dyn KeyValueBackend> = Arc::new(MemoryBackend::new());
        let mut other = TreeStore::detached(ContentStore::new(backend), Vec::new());
        let err = clipboard.paste(None, &mut other).unwrap_err();
        assert!(err.is_not_found());
        assert!(other.tree().is_empty());
        assert!(clipboard.has_content());

        let moved = clipboard.paste(None, &mut tree).unwrap();
        assert_eq!(moved.name, "a.txt");
        assert_eq!(tree.nodes().len(), 1);
        assert!(!clipboard.has_content());
    }

    #[test]
    fn clone_with_fresh_ids_rewrites_every_level() {
        let source = Node::folder("app")
            .with_child(Node::file("index.js"))
            .with_child(Node::folder("lib").with_child(Node::file("util.js")));
        let (copy, files) = clone_with_fresh_ids(&source, Some("app2"));

        assert_eq!(copy.name, "app2");
        assert_eq!(copy.children()[1].children()[0].path, "app2/lib/util.js");
        assert_eq!(files.len(), 2);
        let old_ids = source.subtree_ids();
        assert!(copy.subtree_ids().iter().all(|id| !old_ids.contains(id)));
    }
}
