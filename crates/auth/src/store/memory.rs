//! In-process credential store

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use super::{CredentialStore, StorageKey, StoreError};

/// Credential store backed by a shared `HashMap`
///
/// Clones share the same map, so a test can keep a handle and inspect what the
/// session wrote.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Arc<Mutex<HashMap<StorageKey, String>>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Keys currently holding a value, sorted
    #[must_use]
    pub fn keys(&self) -> Vec<StorageKey> {
        let mut keys: Vec<StorageKey> = self.entries.lock().keys().copied().collect();
        keys.sort();
        keys
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl CredentialStore for MemoryStore {
    fn get(&self, key: StorageKey) -> Result<Option<String>, StoreError> {
        Ok(self.entries.lock().get(&key).cloned())
    }

    fn set(&self, key: StorageKey, value: &str) -> Result<(), StoreError> {
        self.entries.lock().insert(key, value.to_string());
        Ok(())
    }

    fn remove(&self, key: StorageKey) -> Result<(), StoreError> {
        self.entries.lock().remove(&key);
        Ok(())
    }
}
