//! Portable export format for a project and its file contents.
//! 專案與其檔案內容的可攜匯出格式。

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::VfsError;
use crate::project::Project;
use crate::tree::NodeKind;

pub const BUNDLE_FORMAT_VERSION: u32 = 1;

/// A project snapshot plus the content of its files, keyed by node id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectBundle {
    pub format_version: u32,
    pub project: Project,
    #[serde(default)]
    pub contents: BTreeMap<String, String>,
}

impl ProjectBundle {
    pub fn new(project: Project, contents: BTreeMap<String, String>) -> Self {
        Self {
            format_version: BUNDLE_FORMAT_VERSION,
            project,
            contents,
        }
    }

    pub fn to_json(&self) -> Result<String, VfsError> {
        serde_json::to_string_pretty(self).map_err(|err| VfsError::InvalidBundle(err.to_string()))
    }

    /// Parses and validates a bundle.
    /// 解析並驗證匯入的專案包。
    pub fn from_json(payload: &str) -> Result<Self, VfsError> {
        let bundle: Self =
            serde_json::from_str(payload).map_err(|err| VfsError::InvalidBundle(err.to_string()))?;
        bundle.validate()?;
        Ok(bundle)
    }

    /// Rejects unknown versions, duplicate node ids, and content for ids that
    /// are not files of the project.
    pub fn validate(&self) -> Result<(), VfsError> {
        if self.format_version != BUNDLE_FORMAT_VERSION {
            return Err(VfsError::InvalidBundle(format!(
                "unsupported format version {}",
                self.format_version
            )));
        }
        let mut seen = HashSet::new();
        let mut files = HashSet::new();
        for node in self.project.tree.iter().flat_map(|root| root.walk()) {
            if !seen.insert(node.id.as_str()) {
                return Err(VfsError::InvalidBundle(format!(
                    "duplicate node id {}",
                    node.id
                )));
            }
            if node.kind == NodeKind::File {
                files.insert(node.id.as_str());
            }
        }
        if let Some(stray) = self.contents.keys().find(|id| !files.contains(id.as_str())) {
            return Err(VfsError::InvalidBundle(format!(
                "content for unknown file {stray}"
            )));
        }
        Ok(())
    }
}
