//! Credential persistence
//!
//! A [`CredentialStore`] is a flat string key-value store holding the session
//! tokens, the cached user profile and the pending PKCE material. Values
//! survive restarts when the backing store does ([`KeychainStore`]); the
//! in-memory store is used for tests and ephemeral sessions.
//!
//! The store is only touched through [`crate::session::SessionState`], which
//! keeps reads and writes of the token triple coherent.

mod memory;

#[cfg(feature = "keychain")]
mod keychain;

#[cfg(feature = "keychain")]
pub use keychain::KeychainStore;
pub use memory::MemoryStore;
use thiserror::Error;

use crate::error::AuthError;

/// Fixed set of persisted entries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StorageKey {
    AccessToken,
    RefreshToken,
    IdToken,
    /// JSON-serialized claim map
    UserInfo,
    CodeVerifier,
    OAuthState,
}

impl StorageKey {
    /// Every key, in the order they are cleared
    pub const ALL: [Self; 6] = [
        Self::AccessToken,
        Self::RefreshToken,
        Self::IdToken,
        Self::UserInfo,
        Self::CodeVerifier,
        Self::OAuthState,
    ];

    /// Name of the entry in the backing store
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AccessToken => "keycloak_token",
            Self::RefreshToken => "keycloak_refresh_token",
            Self::IdToken => "keycloak_id_token",
            Self::UserInfo => "keycloak_user_info",
            Self::CodeVerifier => "pkce_code_verifier",
            Self::OAuthState => "oauth_state",
        }
    }
}

impl std::fmt::Display for StorageKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Credential store errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Credential store access failed: {0}")]
    AccessFailed(String),
}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        Self::Storage(err.to_string())
    }
}

/// Key-value persistence for session credentials
///
/// Implementations must be safe to share across tasks. Removing an absent key
/// is not an error.
pub trait CredentialStore: Send + Sync {
    /// Read an entry; `Ok(None)` when it was never written or was removed.
    ///
    /// # Errors
    /// Returns `StoreError::AccessFailed` if the backend cannot be read
    fn get(&self, key: StorageKey) -> Result<Option<String>, StoreError>;

    /// Write an entry, replacing any previous value.
    ///
    /// # Errors
    /// Returns `StoreError::AccessFailed` if the backend cannot be written
    fn set(&self, key: StorageKey, value: &str) -> Result<(), StoreError>;

    /// Remove an entry (idempotent).
    ///
    /// # Errors
    /// Returns `StoreError::AccessFailed` if the backend cannot be written
    fn remove(&self, key: StorageKey) -> Result<(), StoreError>;

    /// Remove every session entry.
    ///
    /// All keys are attempted even if one fails; the first failure is
    /// returned.
    ///
    /// # Errors
    /// Returns the first `StoreError` encountered
    fn clear(&self) -> Result<(), StoreError> {
        let mut first_error = None;
        for key in StorageKey::ALL {
            if let Err(e) = self.remove(key) {
                tracing::warn!(key = %key, error = %e, "Failed to remove credential");
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}
