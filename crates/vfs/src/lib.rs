//! In-app virtual file system and project registry for codepad.
//! codepad 的應用程式內虛擬檔案系統與專案登錄模組。

mod util;

pub mod backend;
pub mod bundle;
pub mod clipboard;
pub mod config;
pub mod content;
pub mod error;
pub mod project;
pub mod registry;
pub mod session;
pub mod template;
pub mod tree;
pub mod tree_store;

pub use backend::{
    FileBackend, KeyValueBackend, MemoryBackend, CONTENT_KEY_PREFIX, CURRENT_PROJECT_KEY,
    FILES_STRUCTURE_KEY, PROJECTS_KEY, RECENT_PROJECTS_KEY,
};
pub use bundle::{ProjectBundle, BUNDLE_FORMAT_VERSION};
pub use clipboard::{
    clone_with_fresh_ids, ClipboardManager, ClipboardOperation, ClipboardSlot, COPY_SUFFIX,
};
pub use config::{ConfigError, ConfigStore, VfsConfig, CONFIG_FILE_NAME};
pub use content::{ContentEntry, ContentStore};
pub use error::{PersistenceError, VfsError};
pub use project::{
    Project, ProjectDraft, ProjectId, ProjectPatch, RecentEntry, RecentProjects,
    DEFAULT_RECENT_LIMIT,
};
pub use registry::ProjectRegistry;
pub use session::Session;
pub use template::{starter_tree, StarterTree, TemplateLanguage};
pub use tree::{FileTree, Node, NodeId, NodeKind, TreeChange, TreeDiff};
pub use tree_store::TreeStore;
