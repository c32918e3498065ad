use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::project::DEFAULT_RECENT_LIMIT;
use crate::util::write_atomic;

/// File name of the config record inside a data directory.
pub const CONFIG_FILE_NAME: &str = "codepad.json";
const CONFIG_VERSION: u32 = 1;
const MAX_RECENT_LIMIT: usize = 50;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to serialize config {path}: {source}")]
    Serialize {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to write config {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to prepare directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Tunables for a session.
/// 工作階段的可調整設定。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VfsConfig {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default = "default_recent_limit")]
    pub recent_limit: usize,
    /// Sweep orphan content right after a folder delete.
    #[serde(default)]
    pub purge_on_delete: bool,
    /// Template language used when a project is created without one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_language: Option<String>,
}

fn default_version() -> u32 {
    CONFIG_VERSION
}

fn default_recent_limit() -> usize {
    DEFAULT_RECENT_LIMIT
}

impl Default for VfsConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            recent_limit: DEFAULT_RECENT_LIMIT,
            purge_on_delete: false,
            default_language: None,
        }
    }
}

impl VfsConfig {
    pub fn sanitize(&mut self) {
        if self.version == 0 {
            self.version = CONFIG_VERSION;
        }
        if self.recent_limit == 0 {
            self.recent_limit = DEFAULT_RECENT_LIMIT;
        }
        self.recent_limit = self.recent_limit.clamp(1, MAX_RECENT_LIMIT);
        if self
            .default_language
            .as_deref()
            .is_some_and(|language| language.trim().is_empty())
        {
            self.default_language = None;
        }
    }
}

/// Loads and saves [`VfsConfig`] as pretty JSON.
/// 以 JSON 檔案讀寫設定。
#[derive(Debug)]
pub struct ConfigStore {
    path: PathBuf,
    data: VfsConfig,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>, config: VfsConfig) -> Self {
        let mut data = config;
        data.sanitize();
        Self {
            path: path.into(),
            data,
        }
    }

    /// Reads the config at `path`; a missing file yields the defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            return Ok(Self::new(path, VfsConfig::default()));
        }

        let contents = fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        let mut data: VfsConfig =
            serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
                path: path.clone(),
                source,
            })?;
        data.sanitize();
        Ok(Self { path, data })
    }

    /// Loads `codepad.json` from a data directory.
    pub fn load_from_dir(dir: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::load(dir.as_ref().join(CONFIG_FILE_NAME))
    }

    pub fn config(&self) -> &VfsConfig {
        &self.data
    }

    pub fn update<F>(&mut self, op: F) -> Result<(), ConfigError>
    where
        F: FnOnce(&mut VfsConfig),
    {
        op(&mut self.data);
        self.data.sanitize();
        self.save()
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|source| ConfigError::CreateDir {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let payload =
            serde_json::to_string_pretty(&self.data).map_err(|source| ConfigError::Serialize {
                path: self.path.clone(),
                source,
            })?;

        write_atomic(&self.path, payload.as_bytes()).map_err(|source| ConfigError::Write {
            path: self.path.clone(),
            source,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
