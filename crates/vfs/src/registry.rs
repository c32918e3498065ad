use std::sync::Arc;

use tracing::{debug, info};

use crate::backend::{
    load_json, store_json, KeyValueBackend, CURRENT_PROJECT_KEY, PROJECTS_KEY,
    RECENT_PROJECTS_KEY,
};
use crate::error::VfsError;
use crate::project::{Project, ProjectDraft, ProjectId, ProjectPatch, RecentEntry, RecentProjects};
use crate::template::starter_tree;
use crate::tree::{validate_name, FileTree, Node};
use crate::util::current_timestamp_millis;

/// Manages the project list, the current-project pointer, and recent projects.
/// 管理專案清單、目前專案指標與最近開啟的專案。
///
/// Each mutation is staged on a copy, persisted, and only then made visible.
pub struct ProjectRegistry {
    backend: Arc<dyn KeyValueBackend>,
    projects: Vec<Project>,
    recent: RecentProjects,
    current: Option<ProjectId>,
}

impl ProjectRegistry {
    /// Loads registry state, keeping at most `recent_limit` recent entries.
    /// 載入專案登錄資料。
    pub fn load(backend: Arc<dyn KeyValueBackend>, recent_limit: usize) -> Result<Self, VfsError> {
        let projects: Vec<Project> =
            load_json(backend.as_ref(), PROJECTS_KEY)?.unwrap_or_default();
        let recent_entries: Vec<RecentEntry> =
            load_json(backend.as_ref(), RECENT_PROJECTS_KEY)?.unwrap_or_default();
        let current = load_json::<Project>(backend.as_ref(), CURRENT_PROJECT_KEY)?
            .map(|snapshot| snapshot.id)
            .filter(|id| projects.iter().any(|project| project.id == *id));

        debug!(
            projects = projects.len(),
            recent = recent_entries.len(),
            current = ?current,
            "registry loaded"
        );
        Ok(Self {
            backend,
            projects,
            recent: RecentProjects::with_entries(recent_limit, recent_entries),
            current,
        })
    }

    pub fn projects(&self) -> &[Project] {
        &self.projects
    }

    pub fn project(&self, id: &ProjectId) -> Option<&Project> {
        self.projects.iter().find(|project| project.id == *id)
    }

    pub fn recent_projects(&self) -> Vec<RecentEntry> {
        self.recent.to_vec()
    }

    /// The project the pointer names, read from the registry's own list.
    pub fn current_project(&self) -> Option<&Project> {
        self.current.as_ref().and_then(|id| self.project(id))
    }

    /// Creates a project, using the language template unless a tree is supplied.
    /// 建立專案；未提供初始樹時套用語言範本。
    pub fn create_project(&mut self, draft: ProjectDraft) -> Result<Project, VfsError> {
        validate_name(&draft.name)?;
        let tree = match draft.initial_tree {
            Some(nodes) => FileTree::from_nodes(nodes).into_nodes(),
            None => starter_tree(&draft.name, draft.language.as_deref()).nodes,
        };
        let now = current_timestamp_millis();
        let project = Project {
            id: ProjectId::new(),
            name: draft.name,
            description: draft.description,
            created_at: now,
            last_modified: now,
            tree,
            language: draft.language,
            project_type: draft.project_type,
        };

        let mut next = self.projects.clone();
        next.push(project.clone());
        self.commit_projects(next)?;
        info!(project = %project.id, name = %project.name, "project created");
        Ok(project)
    }

    /// Merges `patch` into a project and refreshes `lastModified`.
    /// 合併欄位更新並刷新最後修改時間。
    pub fn update_project(
        &mut self,
        id: &ProjectId,
        mut patch: ProjectPatch,
    ) -> Result<Project, VfsError> {
        if let Some(name) = &patch.name {
            validate_name(name)?;
        }
        patch.tree = patch
            .tree
            .map(|nodes| FileTree::from_nodes(nodes).into_nodes());
        let mut next = self.projects.clone();
        let project = next
            .iter_mut()
            .find(|project| project.id == *id)
            .ok_or_else(|| project_not_found(id))?;
        patch.apply(project);
        let updated = project.clone();
        self.commit_projects(next)?;

        if self.current.as_ref() == Some(id) {
            store_json(self.backend.as_ref(), CURRENT_PROJECT_KEY, &updated)?;
        }
        let mut recent = self.recent.clone();
        if recent.refresh(RecentEntry::from(&updated)) {
            self.commit_recent(recent)?;
        }
        debug!(project = %updated.id, "project updated");
        Ok(updated)
    }

    /// Removes a project from the list and from the recent projects.
    /// 刪除專案並自最近清單中移除。
    ///
    /// The current-project pointer is left alone; callers that delete the
    /// current project should close it themselves.
    pub fn delete_project(&mut self, id: &ProjectId) -> Result<Project, VfsError> {
        let mut next = self.projects.clone();
        let index = next
            .iter()
            .position(|project| project.id == *id)
            .ok_or_else(|| project_not_found(id))?;
        let removed = next.remove(index);
        self.commit_projects(next)?;

        let mut recent = self.recent.clone();
        if recent.remove(id) {
            self.commit_recent(recent)?;
        }
        info!(project = %removed.id, name = %removed.name, "project deleted");
        Ok(removed)
    }

    /// Makes a project current and moves it to the front of the recent list.
    /// 設定目前專案並將其移至最近清單頂端。
    pub fn open_project(&mut self, id: &ProjectId) -> Result<Project, VfsError> {
        let project = self
            .project(id)
            .cloned()
            .ok_or_else(|| project_not_found(id))?;
        store_json(self.backend.as_ref(), CURRENT_PROJECT_KEY, &project)?;
        self.current = Some(project.id.clone());

        let mut recent = self.recent.clone();
        recent.touch(RecentEntry::from(&project));
        self.commit_recent(recent)?;
        info!(project = %project.id, name = %project.name, "project opened");
        Ok(project)
    }

    /// Clears the current-project pointer.
    pub fn close_project(&mut self) -> Result<(), VfsError> {
        self.backend.remove(CURRENT_PROJECT_KEY)?;
        if let Some(id) = self.current.take() {
            info!(project = %id, "project closed");
        }
        Ok(())
    }

    /// Writes a tree snapshot into the current project.
    /// 將樹狀快照寫回目前專案。
    pub fn update_current_project_files(&mut self, nodes: Vec<Node>) -> Result<Project, VfsError> {
        let id = self
            .current
            .clone()
            .ok_or_else(|| VfsError::NotFound("current project".into()))?;
        self.update_project(
            &id,
            ProjectPatch {
                tree: Some(nodes),
                ..ProjectPatch::default()
            },
        )
    }

    /// Case-insensitive substring search over name, description, and language.
    /// An empty query returns every project.
    pub fn search_projects(&self, query: &str) -> Vec<&Project> {
        let needle = query.trim().to_lowercase();
        self.projects
            .iter()
            .filter(|project| needle.is_empty() || project.matches(&needle))
            .collect()
    }

    fn commit_projects(&mut self, next: Vec<Project>) -> Result<(), VfsError> {
        store_json(self.backend.as_ref(), PROJECTS_KEY, &next)?;
        self.projects = next;
        Ok(())
    }

    fn commit_recent(&mut self, next: RecentProjects) -> Result<(), VfsError> {
        store_json(self.backend.as_ref(), RECENT_PROJECTS_KEY, &next.to_vec())?;
        self.recent = next;
        Ok(())
    }
}

impl std::fmt::Debug for ProjectRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProjectRegistry")
            .field("projects", &self.projects.len())
            .field("recent", &self.recent)
            .field("current", &self.current)
            .finish()
    }
}

fn project_not_found(id: &ProjectId) -> VfsError {
    VfsError::NotFound(format!("project {id}"))
}
