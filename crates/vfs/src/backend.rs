//! Key/value persistence backends.
//! 鍵值持久化後端。

use std::collections::BTreeMap;
use std::fs;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::PersistenceError;
use crate::util::write_atomic;

/// Serialized Node[] of the tree used outside any project.
pub const FILES_STRUCTURE_KEY: &str = "files_structure";
/// Prefix of per-file content records, followed by the node id.
pub const CONTENT_KEY_PREFIX: &str = "file_content_";
pub const PROJECTS_KEY: &str = "app_projects";
pub const RECENT_PROJECTS_KEY: &str = "app_recent_projects";
pub const CURRENT_PROJECT_KEY: &str = "app_current_project";

const RECORD_EXTENSION: &str = "json";

/// Generic string key/value store the core persists into.
/// 核心模組使用的通用字串鍵值儲存介面。
pub trait KeyValueBackend: Send + Sync {
    /// Returns the stored value, or `None` when the key is absent.
    fn get(&self, key: &str) -> Result<Option<String>, PersistenceError>;

    /// Creates or overwrites the value for `key`.
    fn set(&self, key: &str, value: &str) -> Result<(), PersistenceError>;

    /// Removes `key`; removing an absent key succeeds.
    fn remove(&self, key: &str) -> Result<(), PersistenceError>;

    /// Lists every stored key.
    fn list_keys(&self) -> Result<Vec<String>, PersistenceError>;
}

/// Volatile backend kept entirely in memory.
/// 僅存在於記憶體中的後端。
#[derive(Debug, Default)]
pub struct MemoryBackend {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, String>>, PersistenceError> {
        self.entries
            .lock()
            .map_err(|_| PersistenceError::Unavailable("memory backend lock poisoned".into()))
    }
}

impl KeyValueBackend for MemoryBackend {
    fn get(&self, key: &str) -> Result<Option<String>, PersistenceError> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), PersistenceError> {
        self.lock()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), PersistenceError> {
        self.lock()?.remove(key);
        Ok(())
    }

    fn list_keys(&self) -> Result<Vec<String>, PersistenceError> {
        Ok(self.lock()?.keys().cloned().collect())
    }
}

/// Stores each key as `<root>/<key>.json`, written atomically.
/// 將每個鍵存為 `<root>/<key>.json`，並以原子方式寫入。
#[derive(Debug)]
pub struct FileBackend {
    root: PathBuf,
}

impl FileBackend {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Returns the directory holding the records.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn record_path(&self, key: &str) -> Result<PathBuf, PersistenceError> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '_' | '-' | '.'))
            && !key.starts_with('.');
        if !valid {
            return Err(PersistenceError::Io {
                key: key.to_string(),
                source: io::Error::new(ErrorKind::InvalidInput, "unsupported storage key"),
            });
        }
        Ok(self.root.join(format!("{key}.{RECORD_EXTENSION}")))
    }
}

impl KeyValueBackend for FileBackend {
    fn get(&self, key: &str) -> Result<Option<String>, PersistenceError> {
        let path = self.record_path(key)?;
        match fs::read_to_string(&path) {
            Ok(contents) => Ok(Some(contents)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(source) => Err(PersistenceError::Io {
                key: key.to_string(),
                source,
            }),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), PersistenceError> {
        let path = self.record_path(key)?;
        write_atomic(&path, value.as_bytes()).map_err(|source| PersistenceError::Io {
            key: key.to_string(),
            source,
        })
    }

    fn remove(&self, key: &str) -> Result<(), PersistenceError> {
        let path = self.record_path(key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(source) => Err(PersistenceError::Io {
                key: key.to_string(),
                source,
            }),
        }
    }

    fn list_keys(&self) -> Result<Vec<String>, PersistenceError> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(PersistenceError::Io {
                    key: self.root.display().to_string(),
                    source,
                })
            }
        };

        let mut keys = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| PersistenceError::Io {
                key: self.root.display().to_string(),
                source,
            })?;
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(RECORD_EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) {
                keys.push(stem.to_string());
            }
        }
        keys.sort();
        Ok(keys)
    }
}

/// Reads and decodes a JSON record; `Ok(None)` when the key is absent.
pub(crate) fn load_json<T: DeserializeOwned>(
    backend: &dyn KeyValueBackend,
    key: &str,
) -> Result<Option<T>, PersistenceError> {
    match backend.get(key)? {
        Some(raw) => serde_json::from_str(&raw)
            .map(Some)
            .map_err(|source| PersistenceError::Parse {
                key: key.to_string(),
                source,
            }),
        None => Ok(None),
    }
}

/// Encodes `value` as JSON and stores it under `key`.
pub(crate) fn store_json<T: Serialize + ?Sized>(
    backend: &dyn KeyValueBackend,
    key: &str,
    value: &T,
) -> Result<(), PersistenceError> {
    let payload = serde_json::to_string(value).map_err(|source| PersistenceError::Serialize {
        key: key.to_string(),
        source,
    })?;
    backend.set(key, &payload)
}
