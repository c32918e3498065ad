use std::collections::VecDeque;
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::tree::Node;
use crate::util::current_timestamp_millis;

/// Default number of entries kept in the recent-projects list.
pub const DEFAULT_RECENT_LIMIT: usize = 10;

/// Stable identifier for projects.
/// 專案的穩定代號。
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectId(String);

impl ProjectId {
    pub fn new() -> Self {
        let suffix = Uuid::new_v4().simple().to_string();
        Self(format!("project-{}-{}", current_timestamp_millis(), &suffix[..8]))
    }

    pub fn from_string(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ProjectId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A named project owning one file tree.
/// 擁有一棵檔案樹的具名專案。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: ProjectId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub created_at: i64,
    pub last_modified: i64,
    #[serde(default)]
    pub tree: Vec<Node>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub project_type: Option<String>,
}

impl Project {
    /// Case-insensitive match of `needle` (already lowercased) against name, description, language.
    pub(crate) fn matches(&self, needle: &str) -> bool {
        let hit = |value: &str| value.to_lowercase().contains(needle);
        hit(&self.name)
            || self.description.as_deref().is_some_and(hit)
            || self.language.as_deref().is_some_and(hit)
    }
}

/// Input for creating a project.
/// 建立專案所需的資料。
#[derive(Debug, Clone, Default)]
pub struct ProjectDraft {
    pub name: String,
    pub description: Option<String>,
    pub language: Option<String>,
    pub project_type: Option<String>,
    pub initial_tree: Option<Vec<Node>>,
}

impl ProjectDraft {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    pub fn with_type(mut self, project_type: impl Into<String>) -> Self {
        self.project_type = Some(project_type.into());
        self
    }

    pub fn with_tree(mut self, nodes: Vec<Node>) -> Self {
        self.initial_tree = Some(nodes);
        self
    }
}

/// Partial update merged into an existing project; `None` keeps the field.
#[derive(Debug, Clone, Default)]
pub struct ProjectPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub language: Option<String>,
    pub project_type: Option<String>,
    pub tree: Option<Vec<Node>>,
}

impl ProjectPatch {
    pub(crate) fn apply(self, project: &mut Project) {
        if let Some(name) = self.name {
            project.name = name;
        }
        if let Some(description) = self.description {
            project.description = Some(description);
        }
        if let Some(language) = self.language {
            project.language = Some(language);
        }
        if let Some(project_type) = self.project_type {
            project.project_type = Some(project_type);
        }
        if let Some(tree) = self.tree {
            project.tree = tree;
        }
        project.last_modified = current_timestamp_millis();
    }
}

/// Projection of a project kept in the recent list.
/// 最近專案清單中的專案摘要。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentEntry {
    pub id: ProjectId,
    pub name: String,
    pub last_modified: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

impl From<&Project> for RecentEntry {
    fn from(project: &Project) -> Self {
        Self {
            id: project.id.clone(),
            name: project.name.clone(),
            last_modified: project.last_modified,
            language: project.language.clone(),
        }
    }
}

/// Most-recently-opened list, deduplicated by project id.
/// 依最近開啟順序排列、以專案代號去重的清單。
#[derive(Debug, Clone)]
pub struct RecentProjects {
    capacity: usize,
    entries: VecDeque<RecentEntry>,
}

impl RecentProjects {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity),
        }
    }

    /// Restores the list from persisted entries, dropping duplicates and overflow.
    pub fn with_entries(capacity: usize, entries: Vec<RecentEntry>) -> Self {
        let mut recent = Self::new(capacity);
        for entry in entries {
            if recent.entries.len() >= recent.capacity {
                break;
            }
            if !recent.contains(&entry.id) {
                recent.entries.push_back(entry);
            }
        }
        recent
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Inserts or promotes an entry to the front of the list.
    /// 加入或提升項目至清單頂端。
    pub fn touch(&mut self, entry: RecentEntry) {
        self.entries.retain(|existing| existing.id != entry.id);
        self.entries.push_front(entry);
        while self.entries.len() > self.capacity {
            self.entries.pop_back();
        }
    }

    /// Replaces the projection for an id without moving it.
    pub fn refresh(&mut self, entry: RecentEntry) -> bool {
        match self.entries.iter_mut().find(|existing| existing.id == entry.id) {
            Some(existing) => {
                *existing = entry;
                true
            }
            None => false,
        }
    }

    pub fn remove(&mut self, id: &ProjectId) -> bool {
        let initial_len = self.entries.len();
        self.entries.retain(|existing| existing.id != *id);
        initial_len != self.entries.len()
    }

    pub fn contains(&self, id: &ProjectId) -> bool {
        self.entries.iter().any(|entry| entry.id == *id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &RecentEntry> {
        self.entries.iter()
    }

    pub fn to_vec(&self) -> Vec<RecentEntry> {
        self.entries.iter().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

impl Default for RecentProjects {
    fn default() -> Self {
        Self::new(DEFAULT_RECENT_LIMIT)
    }
}
