use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::VfsError;
use crate::util::current_timestamp_millis;

/// Unique identifier assigned to each node in the file tree.
/// 檔案樹中每個節點的唯一識別碼。
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    /// Generates `<unix-millis>-<random hex>`.
    pub fn new() -> Self {
        let suffix = Uuid::new_v4().simple().to_string();
        Self(format!("{}-{}", current_timestamp_millis(), &suffix[..12]))
    }

    pub fn from_string(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The kind of a tree node.
/// 節點類型。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    File,
    Folder,
}

/// A file or folder entry.
/// 檔案或資料夾節點。
///
/// `path` and `extension` are derived from the ancestor chain and `name`;
/// the tree recomputes them whenever a node is placed or renamed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: NodeKind,
    #[serde(default)]
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extension: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<Node>>,
    #[serde(default)]
    pub expanded: bool,
}

impl Node {
    /// Builds a detached root-level file with a fresh id.
    pub fn file(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            id: NodeId::new(),
            extension: extension_of(&name),
            path: name.clone(),
            name,
            kind: NodeKind::File,
            children: None,
            expanded: false,
        }
    }

    /// Builds a detached root-level folder with a fresh id.
    pub fn folder(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            id: NodeId::new(),
            path: name.clone(),
            name,
            kind: NodeKind::Folder,
            extension: None,
            children: Some(Vec::new()),
            expanded: false,
        }
    }

    pub fn new(kind: NodeKind, name: impl Into<String>) -> Self {
        match kind {
            NodeKind::File => Self::file(name),
            NodeKind::Folder => Self::folder(name),
        }
    }

    /// Appends `child` and returns `self`, for building subtrees by hand.
    pub fn with_child(mut self, child: Node) -> Self {
        if let Some(children) = self.children.as_mut() {
            children.push(child);
        }
        let parent = parent_path_of(&self.path).map(str::to_string);
        relocate(&mut self, parent.as_deref());
        self
    }

    pub fn is_folder(&self) -> bool {
        self.kind == NodeKind::Folder
    }

    /// Children in insertion order; empty for files.
    pub fn children(&self) -> &[Node] {
        self.children.as_deref().unwrap_or(&[])
    }

    /// Whether `id` names this node or one of its descendants.
    pub fn contains(&self, id: &NodeId) -> bool {
        self.id == *id || self.children().iter().any(|child| child.contains(id))
    }

    /// Depth-first, pre-order walk over this node and its descendants.
    pub fn walk(&self) -> Vec<&Node> {
        let mut out = Vec::new();
        collect_preorder(self, &mut out);
        out
    }

    pub fn subtree_ids(&self) -> Vec<NodeId> {
        self.walk().into_iter().map(|node| node.id.clone()).collect()
    }
}

/// Immutable root-level node list.
/// 不可變的根層級節點集合。
///
/// Mutations never touch `self`; they return a [`TreeChange`] holding the
/// next tree so callers can persist it before making it visible.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FileTree {
    revision: u64,
    nodes: Vec<Node>,
}

/// Result of a tree mutation: the next tree, the node it concerned, and a diff.
/// 樹狀變更的結果：新的樹、相關節點與差異。
#[derive(Debug, Clone)]
pub struct TreeChange {
    pub tree: FileTree,
    pub node: Node,
    pub diff: TreeDiff,
}

/// Captures differences after a tree mutation.
/// 紀錄樹狀結構變動後的差異。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TreeDiff {
    pub added: Vec<NodeId>,
    pub removed: Vec<NodeId>,
    pub updated: Vec<NodeId>,
}

impl TreeDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.updated.is_empty()
    }
}

impl FileTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adopts `nodes`, re-deriving paths and extensions and normalising children.
    /// 採用既有節點並重新推導路徑、副檔名與子節點欄位。
    pub fn from_nodes(mut nodes: Vec<Node>) -> Self {
        for node in &mut nodes {
            relocate(node, None);
        }
        Self { revision: 0, nodes }
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn into_nodes(self) -> Vec<Node> {
        self.nodes
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Total number of nodes at every depth.
    pub fn len(&self) -> usize {
        self.walk().len()
    }

    /// Finds a node by identifier.
    /// 依識別碼尋找節點。
    pub fn find(&self, id: &NodeId) -> Option<&Node> {
        self.nodes.iter().find_map(|node| find_recursive(node, id))
    }

    /// Finds the first node (depth-first) whose path equals `path`.
    /// 依完整路徑尋找節點。
    pub fn find_by_path(&self, path: &str) -> Option<&Node> {
        let path = normalize_path(path);
        self.walk().into_iter().find(|node| node.path == path)
    }

    fn find_folder_by_path(&self, path: &str) -> Option<&Node> {
        let path = normalize_path(path);
        self.walk()
            .into_iter()
            .find(|node| node.is_folder() && node.path == path)
    }

    /// Children of the folder at `parent_path`, or the root list for `None`.
    pub fn siblings(&self, parent_path: Option<&str>) -> Result<&[Node], VfsError> {
        match parent_path.map(normalize_path).filter(|path| !path.is_empty()) {
            None => Ok(&self.nodes),
            Some(path) => self
                .find_folder_by_path(path)
                .map(Node::children)
                .ok_or_else(|| VfsError::path_not_found(path)),
        }
    }

    pub fn walk(&self) -> Vec<&Node> {
        let mut out = Vec::new();
        for node in &self.nodes {
            collect_preorder(node, &mut out);
        }
        out
    }

    pub fn ids(&self) -> HashSet<NodeId> {
        self.walk().into_iter().map(|node| node.id.clone()).collect()
    }

    /// Case-insensitive substring match over node names, depth-first.
    /// 以不分大小寫的子字串比對節點名稱。
    pub fn search(&self, query: &str) -> Vec<&Node> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return Vec::new();
        }
        self.walk()
            .into_iter()
            .filter(|node| node.name.to_lowercase().contains(&needle))
            .collect()
    }

    /// Returns `base`, or `base (n)` for the first `n >= 2` free among the siblings.
    pub fn unique_sibling_name(
        &self,
        parent_path: Option<&str>,
        base: &str,
        kind: NodeKind,
    ) -> Result<String, VfsError> {
        let siblings = self.siblings(parent_path)?;
        let taken = |candidate: &str| {
            siblings
                .iter()
                .any(|node| node.kind == kind && node.name == candidate)
        };
        if !taken(base) {
            return Ok(base.to_string());
        }
        let mut counter = 2usize;
        loop {
            let candidate = format!("{base} ({counter})");
            if !taken(&candidate) {
                return Ok(candidate);
            }
            counter += 1;
        }
    }

    /// Places `node` (and its subtree) under the folder at `parent_path`.
    /// 在指定資料夾（或根層級）下新增節點。
    pub fn insert(&self, parent_path: Option<&str>, node: Node) -> Result<TreeChange, VfsError> {
        validate_name(&node.name)?;
        let parent_path = parent_path.map(normalize_path).filter(|path| !path.is_empty());
        let siblings = self.siblings(parent_path)?;
        ensure_unique(siblings, &node.name, node.kind, None)?;

        let existing = self.ids();
        if let Some(clash) = node.walk().into_iter().find(|n| existing.contains(&n.id)) {
            return Err(VfsError::InvalidName(format!(
                "node id {} already exists in the tree",
                clash.id
            )));
        }

        let mut node = node;
        relocate(&mut node, parent_path);

        let mut next = self.clone();
        let mut diff = TreeDiff {
            added: node.subtree_ids(),
            ..TreeDiff::default()
        };
        match parent_path {
            None => next.nodes.push(node.clone()),
            Some(path) => {
                let parent = find_folder_mut(&mut next.nodes, path)
                    .ok_or_else(|| VfsError::path_not_found(path))?;
                diff.updated.push(parent.id.clone());
                parent.children.get_or_insert_with(Vec::new).push(node.clone());
            }
        }
        next.revision = self.revision.wrapping_add(1);
        Ok(TreeChange {
            tree: next,
            node,
            diff,
        })
    }

    /// Renames a node and recomputes the path of its whole subtree.
    /// 重新命名節點並重新計算整個子樹的路徑。
    pub fn rename(&self, id: &NodeId, new_name: &str) -> Result<TreeChange, VfsError> {
        validate_name(new_name)?;
        let current = self.find(id).ok_or_else(|| VfsError::node_not_found(id))?;
        let parent_path = parent_path_of(&current.path).map(str::to_string);
        let siblings = self.siblings(parent_path.as_deref())?;
        ensure_unique(siblings, new_name, current.kind, Some(id))?;

        let mut next = self.clone();
        let node = find_mut(&mut next.nodes, id).ok_or_else(|| VfsError::node_not_found(id))?;
        node.name = new_name.to_string();
        relocate(node, parent_path.as_deref());
        let node = node.clone();

        next.revision = self.revision.wrapping_add(1);
        Ok(TreeChange {
            diff: TreeDiff {
                updated: node.subtree_ids(),
                ..TreeDiff::default()
            },
            tree: next,
            node,
        })
    }

    /// Detaches a node and its entire subtree.
    /// 移除節點及其整個子樹。
    pub fn remove(&self, id: &NodeId) -> Result<TreeChange, VfsError> {
        let mut next = self.clone();
        let (removed, parent) =
            remove_recursive(&mut next.nodes, id, None).ok_or_else(|| VfsError::node_not_found(id))?;
        next.revision = self.revision.wrapping_add(1);
        Ok(TreeChange {
            diff: TreeDiff {
                removed: removed.subtree_ids(),
                updated: parent.into_iter().collect(),
                ..TreeDiff::default()
            },
            tree: next,
            node: removed,
        })
    }

    /// Swaps `source` out for `node` under `parent_path` in a single revision.
    /// 以單一版本移除 `source` 並在目標資料夾下放入 `node`。
    pub fn transplant(
        &self,
        source: &NodeId,
        parent_path: Option<&str>,
        node: Node,
    ) -> Result<TreeChange, VfsError> {
        let detached = self.remove(source)?;
        let attached = detached.tree.insert(parent_path, node)?;
        let mut diff = attached.diff;
        diff.removed = detached.diff.removed;
        for id in detached.diff.updated {
            if !diff.updated.contains(&id) {
                diff.updated.push(id);
            }
        }
        let mut tree = attached.tree;
        tree.revision = self.revision.wrapping_add(1);
        Ok(TreeChange {
            tree,
            node: attached.node,
            diff,
        })
    }

    /// Flips `expanded` on a folder; files are left as they are.
    /// 切換資料夾的展開狀態；檔案不受影響。
    pub fn toggle_expanded(&self, id: &NodeId) -> Result<TreeChange, VfsError> {
        let current = self.find(id).ok_or_else(|| VfsError::node_not_found(id))?;
        if !current.is_folder() {
            return Ok(TreeChange {
                tree: self.clone(),
                node: current.clone(),
                diff: TreeDiff::default(),
            });
        }

        let mut next = self.clone();
        let node = find_mut(&mut next.nodes, id).ok_or_else(|| VfsError::node_not_found(id))?;
        node.expanded = !node.expanded;
        let node = node.clone();
        next.revision = self.revision.wrapping_add(1);
        Ok(TreeChange {
            diff: TreeDiff {
                updated: vec![node.id.clone()],
                ..TreeDiff::default()
            },
            tree: next,
            node,
        })
    }
}

/// Rejects empty names, names with `/`, and the `.`/`..` segments.
pub fn validate_name(name: &str) -> Result<(), VfsError> {
    if name.trim().is_empty() {
        return Err(VfsError::InvalidName("name cannot be empty".into()));
    }
    if name.contains('/') {
        return Err(VfsError::InvalidName(format!(
            "'{name}' cannot contain '/'"
        )));
    }
    if name == "." || name == ".." {
        return Err(VfsError::InvalidName(format!("'{name}' is reserved")));
    }
    Ok(())
}

fn ensure_unique(
    siblings: &[Node],
    name: &str,
    kind: NodeKind,
    ignore: Option<&NodeId>,
) -> Result<(), VfsError> {
    let clash = siblings
        .iter()
        .any(|node| node.kind == kind && node.name == name && Some(&node.id) != ignore);
    if clash {
        return Err(VfsError::InvalidName(format!(
            "a sibling named '{name}' already exists"
        )));
    }
    Ok(())
}

/// Substring after the last `.` of `name`; `None` without one.
pub fn extension_of(name: &str) -> Option<String> {
    name.rsplit_once('.')
        .map(|(_, ext)| ext)
        .filter(|ext| !ext.is_empty())
        .map(str::to_string)
}

/// Parent portion of a slash-separated path; `None` at the root level.
pub fn parent_path_of(path: &str) -> Option<&str> {
    path.rsplit_once('/').map(|(parent, _)| parent)
}

pub fn join_path(parent: Option<&str>, name: &str) -> String {
    match parent {
        Some(parent) if !parent.is_empty() => format!("{parent}/{name}"),
        _ => name.to_string(),
    }
}

fn normalize_path(path: &str) -> &str {
    path.trim_matches('/')
}

/// Re-derives `path`/`extension` for `node` under `parent_path`, recursively.
fn relocate(node: &mut Node, parent_path: Option<&str>) {
    node.path = join_path(parent_path, &node.name);
    match node.kind {
        NodeKind::File => {
            node.extension = extension_of(&node.name);
            node.children = None;
            node.expanded = false;
        }
        NodeKind::Folder => {
            node.extension = None;
            let path = node.path.clone();
            for child in node.children.get_or_insert_with(Vec::new) {
                relocate(child, Some(&path));
            }
        }
    }
}

fn collect_preorder<'a>(node: &'a Node, out: &mut Vec<&'a Node>) {
    out.push(node);
    for child in node.children() {
        collect_preorder(child, out);
    }
}

fn find_recursive<'a>(node: &'a Node, id: &NodeId) -> Option<&'a Node> {
    if node.id == *id {
        return Some(node);
    }
    node.children()
        .iter()
        .find_map(|child| find_recursive(child, id))
}

fn find_mut<'a>(nodes: &'a mut [Node], id: &NodeId) -> Option<&'a mut Node> {
    for node in nodes {
        if node.id == *id {
            return Some(node);
        }
        if let Some(children) = node.children.as_mut() {
            if let Some(found) = find_mut(children, id) {
                return Some(found);
            }
        }
    }
    None
}

fn find_folder_mut<'a>(nodes: &'a mut [Node], path: &str) -> Option<&'a mut Node> {
    for node in nodes {
        if node.is_folder() && node.path == path {
            return Some(node);
        }
        if let Some(children) = node.children.as_mut() {
            if let Some(found) = find_folder_mut(children, path) {
                return Some(found);
            }
        }
    }
    None
}

fn remove_recursive(
    nodes: &mut Vec<Node>,
    id: &NodeId,
    parent: Option<&NodeId>,
) -> Option<(Node, Option<NodeId>)> {
    if let Some(index) = nodes.iter().position(|node| node.id == *id) {
        return Some((nodes.remove(index), parent.cloned()));
    }
    for node in nodes.iter_mut() {
        let node_id = node.id.clone();
        if let Some(children) = node.children.as_mut() {
            if let Some(found) = remove_recursive(children, id, Some(&node_id)) {
                return Some(found);
            }
        }
    }
    None
}
