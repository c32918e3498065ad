use std::sync::{Arc, Mutex};

use codepad_vfs::{KeyValueBackend, MemoryBackend, PersistenceError};

/// Memory backend that refuses writes to keys starting with a chosen prefix.
#[derive(Default)]
pub struct FlakyBackend {
    inner: MemoryBackend,
    failing_prefix: Mutex<Option<String>>,
}

impl FlakyBackend {
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_writes(&self, prefix: &str) {
        *self.failing_prefix.lock().unwrap() = Some(prefix.to_string());
    }

    pub fn heal(&self) {
        *self.failing_prefix.lock().unwrap() = None;
    }

    fn check(&self, key: &str) -> Result<(), PersistenceError> {
        match self.failing_prefix.lock().unwrap().as_deref() {
            Some(prefix) if key.starts_with(prefix) => Err(PersistenceError::Unavailable(
                format!("injected failure for {key}"),
            )),
            _ => Ok(()),
        }
    }
}

impl KeyValueBackend for FlakyBackend {
    fn get(&self, key: &str) -> Result<Option<String>, PersistenceError> {
        self.inner.get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), PersistenceError> {
        self.check(key)?;
        self.inner.set(key, value)
    }

    fn remove(&self, key: &str) -> Result<(), PersistenceError> {
        self.check(key)?;
        self.inner.remove(key)
    }

    fn list_keys(&self) -> Result<Vec<String>, PersistenceError> {
        self.inner.list_keys()
    }
}
