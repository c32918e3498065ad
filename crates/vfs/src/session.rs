use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::backend::KeyValueBackend;
use crate::bundle::ProjectBundle;
use crate::clipboard::{clone_with_fresh_ids, ClipboardManager, ClipboardOperation};
use crate::config::VfsConfig;
use crate::content::ContentStore;
use crate::error::VfsError;
use crate::project::{Project, ProjectDraft, ProjectId, ProjectPatch, RecentEntry};
use crate::registry::ProjectRegistry;
use crate::template::starter_tree;
use crate::tree::{Node, NodeId, NodeKind};
use crate::tree_store::TreeStore;

/// Request/response facade over the tree, contents, clipboard, and projects.
/// 整合檔案樹、內容、剪貼簿與專案的操作入口。
///
/// Without a current project the session edits the loose tree stored under
/// `files_structure`. While a project is current it edits that project's
/// tree and mirrors every structural change into the registry; when the
/// mirror write fails the tree, the clipboard, and any content the change
/// removed are put back before the error is returned.
pub struct Session {
    backend: Arc<dyn KeyValueBackend>,
    contents: ContentStore,
    tree: TreeStore,
    clipboard: ClipboardManager,
    registry: ProjectRegistry,
    config: VfsConfig,
}

impl Session {
    /// Opens a session over `backend`, resuming the current project if one is set.
    /// 開啟工作階段；若有目前專案則接續使用其檔案樹。
    pub fn open(backend: Arc<dyn KeyValueBackend>, config: VfsConfig) -> Result<Self, VfsError> {
        let mut config = config;
        config.sanitize();
        let contents = ContentStore::new(backend.clone());
        let registry = ProjectRegistry::load(backend.clone(), config.recent_limit)?;
        let tree = match registry.current_project() {
            Some(project) => TreeStore::detached(contents.clone(), project.tree.clone()),
            None => TreeStore::load(backend.clone(), contents.clone())?,
        };
        debug!(
            project = ?registry.current_project().map(|project| &project.id),
            "session opened"
        );
        Ok(Self {
            backend,
            contents,
            tree,
            clipboard: ClipboardManager::new(),
            registry,
            config,
        })
    }

    /// Swaps in a caller-provided clipboard, e.g. one shared between sessions.
    pub fn with_clipboard(mut self, clipboard: ClipboardManager) -> Self {
        self.clipboard = clipboard;
        self
    }

    pub fn config(&self) -> &VfsConfig {
        &self.config
    }

    pub fn tree(&self) -> &TreeStore {
        &self.tree
    }

    pub fn nodes(&self) -> &[Node] {
        self.tree.nodes()
    }

    pub fn contents(&self) -> &ContentStore {
        &self.contents
    }

    pub fn clipboard(&self) -> &ClipboardManager {
        &self.clipboard
    }

    pub fn registry(&self) -> &ProjectRegistry {
        &self.registry
    }

    pub fn find_node(&self, id: &NodeId) -> Option<&Node> {
        self.tree.find(id)
    }

    pub fn find_by_path(&self, path: &str) -> Option<&Node> {
        self.tree.find_by_path(path)
    }

    pub fn search_nodes(&self, query: &str) -> Vec<&Node> {
        self.tree.search(query)
    }

    pub fn create_node(
        &mut self,
        kind: NodeKind,
        name: &str,
        parent_path: Option<&str>,
    ) -> Result<Node, VfsError> {
        self.mutate_tree(None, |tree, _| tree.create(kind, name, parent_path))
    }

    pub fn rename_node(&mut self, id: &NodeId, new_name: &str) -> Result<Node, VfsError> {
        self.mutate_tree(None, |tree, _| tree.rename(id, new_name))
    }

    /// Deletes a node and its subtree; sweeps orphan content afterwards when
    /// a folder went and `purge_on_delete` is set.
    /// 刪除節點；若設定要求則於刪除資料夾後清除孤立內容。
    pub fn delete_node(&mut self, id: &NodeId) -> Result<Node, VfsError> {
        let guard = self.tree.find(id).cloned();
        let removed = self.mutate_tree(guard, |tree, _| tree.delete(id))?;
        if removed.is_folder() && self.config.purge_on_delete {
            match self.purge_orphans() {
                Ok(count) => debug!(removed = count, "purged after folder delete"),
                Err(err) => warn!(error = %err, "purge after delete failed"),
            }
        }
        Ok(removed)
    }

    pub fn toggle_expanded(&mut self, id: &NodeId) -> Result<Node, VfsError> {
        self.mutate_tree(None, |tree, _| tree.toggle_expanded(id))
    }

    /// Reads a file's content; files never written read as empty.
    pub fn read_file(&self, id: &NodeId) -> Result<String, VfsError> {
        self.require_file(id)?;
        Ok(self.contents.load(id)?)
    }

    pub fn write_file(&self, id: &NodeId, content: &str) -> Result<(), VfsError> {
        self.require_file(id)?;
        self.contents.save(id, content)?;
        Ok(())
    }

    fn require_file(&self, id: &NodeId) -> Result<&Node, VfsError> {
        self.tree
            .find(id)
            .filter(|node| node.kind == NodeKind::File)
            .ok_or_else(|| VfsError::NotFound(format!("file {id}")))
    }

    pub fn copy(&mut self, id: &NodeId) -> Result<(), VfsError> {
        let node = self
            .tree
            .find(id)
            .ok_or_else(|| VfsError::NotFound(format!("node {id}")))?;
        self.clipboard.copy(node);
        Ok(())
    }

    pub fn cut(&mut self, id: &NodeId) -> Result<(), VfsError> {
        let node = self
            .tree
            .find(id)
            .ok_or_else(|| VfsError::NotFound(format!("node {id}")))?;
        self.clipboard.cut(node);
        Ok(())
    }

    /// Pastes the clipboard under `target_folder` (root level when `None`).
    pub fn paste(&mut self, target_folder: Option<&str>) -> Result<Node, VfsError> {
        let guard = self
            .clipboard
            .peek()
            .filter(|slot| slot.operation == ClipboardOperation::Cut)
            .and_then(|slot| self.tree.find(&slot.node.id))
            .cloned();
        self.mutate_tree(guard, |tree, clipboard| {
            clipboard.paste(target_folder, tree)
        })
    }

    pub fn clear_clipboard(&mut self) {
        self.clipboard.clear();
    }

    pub fn projects(&self) -> &[Project] {
        self.registry.projects()
    }

    pub fn current_project(&self) -> Option<&Project> {
        self.registry.current_project()
    }

    pub fn recent_projects(&self) -> Vec<RecentEntry> {
        self.registry.recent_projects()
    }

    pub fn search_projects(&self, query: &str) -> Vec<&Project> {
        self.registry.search_projects(query)
    }

    /// Creates a project and writes the seed content of its starter files.
    /// 建立專案並寫入範本檔案的初始內容。
    pub fn create_project(&mut self, draft: ProjectDraft) -> Result<Project, VfsError> {
        let mut draft = draft;
        if draft.language.is_none() {
            draft.language = self.config.default_language.clone();
        }
        let mut seeded = Vec::new();
        if draft.initial_tree.is_none() {
            let starter = starter_tree(&draft.name, draft.language.as_deref());
            for (id, content) in &starter.contents {
                if let Err(err) = self.contents.save(id, content) {
                    self.discard_contents(&seeded);
                    return Err(err.into());
                }
                seeded.push(id.clone());
            }
            draft.initial_tree = Some(starter.nodes);
        }
        match self.registry.create_project(draft) {
            Ok(project) => Ok(project),
            Err(err) => {
                self.discard_contents(&seeded);
                Err(err)
            }
        }
    }

    pub fn update_project(
        &mut self,
        id: &ProjectId,
        patch: ProjectPatch,
    ) -> Result<Project, VfsError> {
        let updated = self.registry.update_project(id, patch)?;
        if self.is_current(id) {
            self.tree = TreeStore::detached(self.contents.clone(), updated.tree.clone());
        }
        Ok(updated)
    }

    /// Deletes a project, closing it first when it is current, then sweeps
    /// content no tree references any more.
    /// 刪除專案；若為目前專案則先關閉，之後清除孤立內容。
    pub fn delete_project(&mut self, id: &ProjectId) -> Result<Project, VfsError> {
        let was_current = self.is_current(id);
        let removed = self.registry.delete_project(id)?;
        if was_current {
            self.close_project()?;
        }
        let purged = self.purge_orphans()?;
        info!(project = %removed.id, purged, "project removed with its content");
        Ok(removed)
    }

    pub fn open_project(&mut self, id: &ProjectId) -> Result<Project, VfsError> {
        let project = self.registry.open_project(id)?;
        self.tree = TreeStore::detached(self.contents.clone(), project.tree.clone());
        Ok(project)
    }

    /// Clears the current project and returns to the loose tree.
    pub fn close_project(&mut self) -> Result<(), VfsError> {
        self.registry.close_project()?;
        self.tree = TreeStore::load(self.backend.clone(), self.contents.clone())?;
        Ok(())
    }

    fn is_current(&self, id: &ProjectId) -> bool {
        self.registry
            .current_project()
            .is_some_and(|project| project.id == *id)
    }

    /// Removes content whose node is in neither the loose tree nor any project.
    /// 清除不屬於任何檔案樹的孤立內容。
    pub fn purge_orphans(&self) -> Result<usize, VfsError> {
        let mut valid: HashSet<NodeId> = self.tree.ids();
        if self.tree.is_detached() {
            let loose = TreeStore::load(self.backend.clone(), self.contents.clone())?;
            valid.extend(loose.ids());
        }
        for project in self.registry.projects() {
            valid.extend(
                project
                    .tree
                    .iter()
                    .flat_map(|root| root.subtree_ids()),
            );
        }
        let removed = self.contents.purge_orphans(&valid)?;
        debug!(removed, "orphan sweep finished");
        Ok(removed)
    }

    /// Packs a project and its file contents into a bundle.
    /// 將專案與其檔案內容打包匯出。
    pub fn export_project(&self, id: &ProjectId) -> Result<ProjectBundle, VfsError> {
        let project = self
            .registry
            .project(id)
            .cloned()
            .ok_or_else(|| VfsError::NotFound(format!("project {id}")))?;
        let mut contents = BTreeMap::new();
        for node in project.tree.iter().flat_map(|root| root.walk()) {
            if node.kind != NodeKind::File {
                continue;
            }
            if let Some(entry) = self.contents.entry(&node.id)? {
                contents.insert(node.id.to_string(), entry.content);
            }
        }
        debug!(project = %project.id, files = contents.len(), "project exported");
        Ok(ProjectBundle::new(project, contents))
    }

    /// Recreates a bundled project under fresh project and node ids.
    /// 以全新的專案與節點識別碼匯入專案包。
    pub fn import_project(&mut self, bundle: ProjectBundle) -> Result<Project, VfsError> {
        bundle.validate()?;
        let ProjectBundle {
            project, contents, ..
        } = bundle;

        let mut nodes = Vec::with_capacity(project.tree.len());
        let mut file_ids = Vec::new();
        for root in &project.tree {
            let (copy, pairs) = clone_with_fresh_ids(root, None);
            nodes.push(copy);
            file_ids.extend(pairs);
        }

        let mut written = Vec::new();
        for (old, new) in &file_ids {
            let Some(content) = contents.get(old.as_str()) else {
                continue;
            };
            if let Err(err) = self.contents.save(new, content) {
                self.discard_contents(&written);
                return Err(err.into());
            }
            written.push(new.clone());
        }

        let draft = ProjectDraft {
            name: project.name,
            description: project.description,
            language: project.language,
            project_type: project.project_type,
            initial_tree: Some(nodes),
        };
        match self.registry.create_project(draft) {
            Ok(imported) => {
                info!(project = %imported.id, files = written.len(), "project imported");
                Ok(imported)
            }
            Err(err) => {
                self.discard_contents(&written);
                Err(err)
            }
        }
    }

    /// Runs a tree mutation and, inside a project, mirrors the result into
    /// the registry. `guard` names a subtree whose file contents the
    /// mutation may delete; they are rewritten if the mirror fails.
    fn mutate_tree<T>(
        &mut self,
        guard: Option<Node>,
        op: impl FnOnce(&mut TreeStore, &mut ClipboardManager) -> Result<T, VfsError>,
    ) -> Result<T, VfsError> {
        if !self.tree.is_detached() {
            return op(&mut self.tree, &mut self.clipboard);
        }

        let before = self.tree.tree().clone();
        let slot = self.clipboard.peek().cloned();
        let saved = match &guard {
            Some(node) => self.snapshot_contents(node)?,
            None => Vec::new(),
        };
        let output = op(&mut self.tree, &mut self.clipboard)?;
        if self.tree.tree() == &before {
            return Ok(output);
        }

        let nodes = self.tree.nodes().to_vec();
        if let Err(err) = self.registry.update_current_project_files(nodes) {
            warn!(error = %err, "project update failed; restoring tree");
            if let Err(undo) = self.tree.restore(before) {
                warn!(error = %undo, "tree restore failed");
            }
            self.clipboard.restore(slot);
            for (id, content) in &saved {
                if let Err(undo) = self.contents.save(id, content) {
                    warn!(node = %id, error = %undo, "content restore failed");
                }
            }
            return Err(err);
        }
        Ok(output)
    }

    fn snapshot_contents(&self, node: &Node) -> Result<Vec<(NodeId, String)>, VfsError> {
        let mut saved = Vec::new();
        for file in node.walk().into_iter().filter(|n| n.kind == NodeKind::File) {
            if let Some(entry) = self.contents.entry(&file.id)? {
                saved.push((file.id.clone(), entry.content));
            }
        }
        Ok(saved)
    }

    fn discard_contents(&self, ids: &[NodeId]) {
        for id in ids {
            if let Err(err) = self.contents.delete(id) {
                warn!(node = %id, error = %err, "content cleanup failed; left for purge");
            }
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("tree", &self.tree)
            .field("clipboard", &self.clipboard)
            .field("registry", &self.registry)
            .field("config", &self.config)
            .finish()
    }
}
