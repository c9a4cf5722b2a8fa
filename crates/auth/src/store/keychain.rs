//! Platform keychain credential store
//!
//! Persists each [`StorageKey`] as a separate keychain entry under one service
//! name (macOS Keychain, Windows Credential Manager, Linux Secret Service).
//!
//! ```no_run
//! use keyflow_auth::store::{CredentialStore, KeychainStore, StorageKey};
//!
//! let store = KeychainStore::new("keyflow.demo");
//! store.set(StorageKey::OAuthState, "xyz")?;
//! assert_eq!(store.get(StorageKey::OAuthState)?.as_deref(), Some("xyz"));
//! # Ok::<(), keyflow_auth::store::StoreError>(())
//! ```

use keyring::Entry;
use tracing::debug;

use super::{CredentialStore, StorageKey, StoreError};

/// Credential store backed by the OS keychain
#[derive(Debug, Clone)]
pub struct KeychainStore {
    service_name: String,
}

impl KeychainStore {
    /// Create a store for a keychain service
    ///
    /// # Arguments
    /// * `service_name` - Service identifier (e.g., "keyflow.my-app")
    pub fn new(service_name: impl Into<String>) -> Self {
        Self { service_name: service_name.into() }
    }

    #[must_use]
    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    fn entry(&self, key: StorageKey) -> Result<Entry, StoreError> {
        Entry::new(&self.service_name, key.as_str()).map_err(|e| {
            StoreError::AccessFailed(format!("Failed to open keychain entry {key}: {e}"))
        })
    }
}

impl CredentialStore for KeychainStore {
    fn get(&self, key: StorageKey) -> Result<Option<String>, StoreError> {
        debug!(service = %self.service_name, key = %key, "Reading keychain entry");

        match self.entry(key)?.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => {
                Err(StoreError::AccessFailed(format!("Failed to retrieve secret for {key}: {e}")))
            }
        }
    }

    fn set(&self, key: StorageKey, value: &str) -> Result<(), StoreError> {
        debug!(service = %self.service_name, key = %key, "Writing keychain entry");

        self.entry(key)?
            .set_password(value)
            .map_err(|e| StoreError::AccessFailed(format!("Failed to store secret for {key}: {e}")))
    }

    fn remove(&self, key: StorageKey) -> Result<(), StoreError> {
        debug!(service = %self.service_name, key = %key, "Deleting keychain entry");

        match self.entry(key)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => {
                Err(StoreError::AccessFailed(format!("Failed to delete secret for {key}: {e}")))
            }
        }
    }
}
