use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::backend::{load_json, store_json, KeyValueBackend, CONTENT_KEY_PREFIX};
use crate::error::PersistenceError;
use crate::tree::NodeId;
use crate::util::current_timestamp_millis;

/// Text content of a single file, stored apart from the tree.
/// 單一檔案的文字內容，與樹狀結構分開儲存。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentEntry {
    pub id: NodeId,
    pub content: String,
    pub last_modified: i64,
}

/// Persists file contents keyed by node id.
/// 以節點識別碼為鍵保存檔案內容。
#[derive(Clone)]
pub struct ContentStore {
    backend: Arc<dyn KeyValueBackend>,
}

impl ContentStore {
    pub fn new(backend: Arc<dyn KeyValueBackend>) -> Self {
        Self { backend }
    }

    fn key(id: &NodeId) -> String {
        format!("{CONTENT_KEY_PREFIX}{}", id.as_str())
    }

    /// Upserts the content for `id`, refreshing its timestamp.
    /// 寫入或更新指定節點的內容並刷新時間戳記。
    pub fn save(&self, id: &NodeId, content: &str) -> Result<(), PersistenceError> {
        let entry = ContentEntry {
            id: id.clone(),
            content: content.to_string(),
            last_modified: current_timestamp_millis(),
        };
        store_json(self.backend.as_ref(), &Self::key(id), &entry)?;
        debug!(node = %id, bytes = content.len(), "content saved");
        Ok(())
    }

    /// Returns the stored content, or an empty string when nothing is stored.
    /// 取得內容；若尚未儲存則回傳空字串。
    pub fn load(&self, id: &NodeId) -> Result<String, PersistenceError> {
        Ok(self
            .entry(id)?
            .map(|entry| entry.content)
            .unwrap_or_default())
    }

    pub fn entry(&self, id: &NodeId) -> Result<Option<ContentEntry>, PersistenceError> {
        load_json(self.backend.as_ref(), &Self::key(id))
    }

    /// Deletes the content for `id`. Missing entries are not an error.
    pub fn delete(&self, id: &NodeId) -> Result<(), PersistenceError> {
        self.backend.remove(&Self::key(id))
    }

    /// Copies the content stored under `from` to `to`.
    pub fn duplicate(&self, from: &NodeId, to: &NodeId) -> Result<(), PersistenceError> {
        let content = self.load(from)?;
        self.save(to, &content)
    }

    /// Removes every content entry whose id is not in `valid_ids`, returning how many went.
    /// 清除所有不屬於 `valid_ids` 的孤立內容，回傳移除數量。
    pub fn purge_orphans(&self, valid_ids: &HashSet<NodeId>) -> Result<usize, PersistenceError> {
        let mut removed = 0;
        for key in self.backend.list_keys()? {
            let Some(raw_id) = key.strip_prefix(CONTENT_KEY_PREFIX) else {
                continue;
            };
            if valid_ids.contains(&NodeId::from_string(raw_id)) {
                continue;
            }
            self.backend.remove(&key)?;
            removed += 1;
        }
        if removed > 0 {
            info!(removed, "purged orphan content");
        }
        Ok(removed)
    }

    /// Ids of every stored content entry.
    pub fn stored_ids(&self) -> Result<Vec<NodeId>, PersistenceError> {
        Ok(self
            .backend
            .list_keys()?
            .into_iter()
            .filter_map(|key| {
                key.strip_prefix(CONTENT_KEY_PREFIX)
                    .map(NodeId::from_string)
            })
            .collect())
    }
}

impl std::fmt::Debug for ContentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentStore").finish_non_exhaustive()
    }
}
