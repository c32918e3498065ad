use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::backend::{load_json, store_json, KeyValueBackend, FILES_STRUCTURE_KEY};
use crate::content::ContentStore;
use crate::error::{PersistenceError, VfsError};
use crate::tree::{FileTree, Node, NodeId, NodeKind, TreeChange};

/// Owns the visible file tree and persists it after every mutation.
/// 持有目前可見的檔案樹，並在每次變更後寫回儲存層。
///
/// Mutations are staged on a copy of the tree, persisted, and only then
/// swapped in; a failed write leaves the visible tree untouched. A detached
/// store (a project's tree) skips persistence and lets the owner write the
/// snapshot elsewhere.
pub struct TreeStore {
    backend: Option<Arc<dyn KeyValueBackend>>,
    contents: ContentStore,
    tree: FileTree,
}

impl TreeStore {
    /// Loads the loose tree from `files_structure`, starting empty when absent.
    /// 從 `files_structure` 載入樹狀結構；若不存在則建立空樹。
    pub fn load(
        backend: Arc<dyn KeyValueBackend>,
        contents: ContentStore,
    ) -> Result<Self, VfsError> {
        let nodes: Vec<Node> =
            load_json(backend.as_ref(), FILES_STRUCTURE_KEY)?.unwrap_or_default();
        debug!(roots = nodes.len(), "loaded files structure");
        Ok(Self {
            backend: Some(backend),
            contents,
            tree: FileTree::from_nodes(nodes),
        })
    }

    /// Wraps `nodes` without binding them to any storage key.
    /// 建立不綁定儲存鍵的樹（用於專案樹）。
    pub fn detached(contents: ContentStore, nodes: Vec<Node>) -> Self {
        Self {
            backend: None,
            contents,
            tree: FileTree::from_nodes(nodes),
        }
    }

    pub fn is_detached(&self) -> bool {
        self.backend.is_none()
    }

    pub fn tree(&self) -> &FileTree {
        &self.tree
    }

    pub fn nodes(&self) -> &[Node] {
        self.tree.nodes()
    }

    pub fn contents(&self) -> &ContentStore {
        &self.contents
    }

    pub fn find(&self, id: &NodeId) -> Option<&Node> {
        self.tree.find(id)
    }

    pub fn find_by_path(&self, path: &str) -> Option<&Node> {
        self.tree.find_by_path(path)
    }

    pub fn search(&self, query: &str) -> Vec<&Node> {
        self.tree.search(query)
    }

    pub fn ids(&self) -> HashSet<NodeId> {
        self.tree.ids()
    }

    /// Creates a file or folder under `parent_path` (root level when `None`).
    /// 在指定路徑下建立檔案或資料夾。
    pub fn create(
        &mut self,
        kind: NodeKind,
        name: &str,
        parent_path: Option<&str>,
    ) -> Result<Node, VfsError> {
        let change = self.tree.insert(parent_path, Node::new(kind, name))?;
        let node = self.commit(change)?;
        info!(node = %node.id, path = %node.path, ?kind, "node created");
        Ok(node)
    }

    /// Attaches an already-built subtree under `parent_path`.
    pub fn insert_subtree(
        &mut self,
        parent_path: Option<&str>,
        node: Node,
    ) -> Result<Node, VfsError> {
        let change = self.tree.insert(parent_path, node)?;
        self.commit(change)
    }

    /// Replaces `source` with `node` under `parent_path` in one commit.
    pub fn move_subtree(
        &mut self,
        source: &NodeId,
        parent_path: Option<&str>,
        node: Node,
    ) -> Result<Node, VfsError> {
        let change = self.tree.transplant(source, parent_path, node)?;
        let moved = self.commit(change)?;
        info!(from = %source, node = %moved.id, path = %moved.path, "node moved");
        Ok(moved)
    }

    /// Renames a node; descendants' paths follow.
    /// 重新命名節點，子孫節點路徑同步更新。
    pub fn rename(&mut self, id: &NodeId, new_name: &str) -> Result<Node, VfsError> {
        let change = self.tree.rename(id, new_name)?;
        let node = self.commit(change)?;
        info!(node = %node.id, path = %node.path, "node renamed");
        Ok(node)
    }

    /// Removes a node and its subtree, dropping the node's own content.
    /// 刪除節點與其子樹，並立即移除該節點本身的內容。
    ///
    /// Content of descendants is left for [`ContentStore::purge_orphans`].
    pub fn delete(&mut self, id: &NodeId) -> Result<Node, VfsError> {
        let change = self.tree.remove(id)?;
        let removed = self.commit(change)?;
        if let Err(err) = self.contents.delete(&removed.id) {
            warn!(node = %removed.id, error = %err, "content delete failed; left for purge");
        }
        info!(node = %removed.id, path = %removed.path, "node deleted");
        Ok(removed)
    }

    /// Flips the expanded flag of a folder; no-op for files.
    pub fn toggle_expanded(&mut self, id: &NodeId) -> Result<Node, VfsError> {
        let change = self.tree.toggle_expanded(id)?;
        self.commit(change)
    }

    /// Replaces the whole tree with `nodes`.
    pub fn replace(&mut self, nodes: Vec<Node>) -> Result<(), VfsError> {
        self.restore(FileTree::from_nodes(nodes))
    }

    /// Puts back a previously captured tree, persisting it first.
    pub fn restore(&mut self, tree: FileTree) -> Result<(), VfsError> {
        self.persist(&tree)?;
        self.tree = tree;
        Ok(())
    }

    /// Encodes the structural fields of the tree as JSON.
    /// 將樹狀結構欄位序列化為 JSON（不含檔案內容）。
    pub fn serialize(&self) -> Result<String, PersistenceError> {
        serde_json::to_string(self.tree.nodes()).map_err(|source| PersistenceError::Serialize {
            key: FILES_STRUCTURE_KEY.to_string(),
            source,
        })
    }

    /// Decodes a serialized node list, re-deriving paths on the way in.
    pub fn deserialize(payload: &str) -> Result<Vec<Node>, PersistenceError> {
        let nodes: Vec<Node> =
            serde_json::from_str(payload).map_err(|source| PersistenceError::Parse {
                key: FILES_STRUCTURE_KEY.to_string(),
                source,
            })?;
        Ok(FileTree::from_nodes(nodes).into_nodes())
    }

    fn commit(&mut self, change: TreeChange) -> Result<Node, VfsError> {
        if change.diff.is_empty() {
            return Ok(change.node);
        }
        if let Err(err) = self.persist(&change.tree) {
            warn!(revision = change.tree.revision(), error = %err, "tree commit discarded");
            return Err(err);
        }
        debug!(
            revision = change.tree.revision(),
            added = change.diff.added.len(),
            removed = change.diff.removed.len(),
            updated = change.diff.updated.len(),
            "tree committed"
        );
        self.tree = change.tree;
        Ok(change.node)
    }

    fn persist(&self, tree: &FileTree) -> Result<(), VfsError> {
        if let Some(backend) = &self.backend {
            store_json(backend.as_ref(), FILES_STRUCTURE_KEY, tree.nodes())?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for TreeStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TreeStore")
            .field("detached", &self.is_detached())
            .field("tree", &self.tree)
            .finish()
    }
}
