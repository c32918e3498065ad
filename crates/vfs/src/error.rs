use std::io;

use thiserror::Error;

use crate::tree::NodeId;

/// Failures raised by a [`KeyValueBackend`](crate::KeyValueBackend) or while encoding records for it.
/// 鍵值儲存層或序列化過程中發生的錯誤。
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("storage IO error for key {key}: {source}")]
    Io {
        key: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to serialize record {key}: {source}")]
    Serialize {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to parse record {key}: {source}")]
    Parse {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// Errors surfaced by tree, clipboard, and registry operations.
/// 樹狀結構、剪貼簿與專案登錄操作的錯誤類型。
#[derive(Debug, Error)]
pub enum VfsError {
    #[error("{0} not found")]
    NotFound(String),
    #[error("clipboard is empty")]
    EmptyClipboard,
    #[error("invalid name: {0}")]
    InvalidName(String),
    #[error("cannot move node {0} into its own subtree")]
    MoveIntoDescendant(NodeId),
    #[error("invalid project bundle: {0}")]
    InvalidBundle(String),
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

impl VfsError {
    pub(crate) fn node_not_found(id: &NodeId) -> Self {
        VfsError::NotFound(format!("node {id}"))
    }

    pub(crate) fn path_not_found(path: &str) -> Self {
        VfsError::NotFound(format!("folder '{path}'"))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, VfsError::NotFound(_))
    }
}
