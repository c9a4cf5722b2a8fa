//! Session state over a credential store
//!
//! [`SessionState`] is the only writer of the [`CredentialStore`]. It keeps a
//! write-through snapshot of the persisted entries so that readers always see
//! a whole token set: every multi-key update happens under one write lock and
//! is rolled back in the store if any write fails.

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::error::AuthError;
use crate::jwt::Claims;
use crate::store::{CredentialStore, StorageKey};
use crate::types::{PendingAuthRequest, TokenResponse, TokenSet};

#[derive(Debug, Clone, Default)]
struct SessionSnapshot {
    access_token: Option<String>,
    refresh_token: Option<String>,
    id_token: Option<String>,
    user_info: Option<Claims>,
    code_verifier: Option<String>,
    oauth_state: Option<String>,
}

impl SessionSnapshot {
    fn populated_keys(&self) -> Vec<StorageKey> {
        let present = [
            (StorageKey::AccessToken, self.access_token.is_some()),
            (StorageKey::RefreshToken, self.refresh_token.is_some()),
            (StorageKey::IdToken, self.id_token.is_some()),
            (StorageKey::UserInfo, self.user_info.is_some()),
            (StorageKey::CodeVerifier, self.code_verifier.is_some()),
            (StorageKey::OAuthState, self.oauth_state.is_some()),
        ];
        present.into_iter().filter_map(|(key, set)| set.then_some(key)).collect()
    }
}

/// Persisted session credentials plus pending PKCE material
pub struct SessionState {
    store: Arc<dyn CredentialStore>,
    snapshot: RwLock<SessionSnapshot>,
}

impl std::fmt::Debug for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionState")
            .field("populated_keys", &self.snapshot.read().populated_keys())
            .finish_non_exhaustive()
    }
}

impl SessionState {
    /// Wrap a store. Nothing is read until [`initialize`](Self::initialize).
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        Self { store, snapshot: RwLock::new(SessionSnapshot::default()) }
    }

    /// Load persisted entries into memory.
    ///
    /// A cached user profile that is not valid JSON is dropped with a warning.
    /// Returns whether an access token was found.
    ///
    /// # Errors
    /// Returns `AuthError::Storage` if the store cannot be read
    pub fn initialize(&self) -> Result<bool, AuthError> {
        let user_info = match self.store.get(StorageKey::UserInfo)? {
            Some(raw) => match serde_json::from_str::<Claims>(&raw) {
                Ok(claims) => Some(claims),
                Err(e) => {
                    warn!(error = %e, "Discarding unreadable cached user info");
                    None
                }
            },
            None => None,
        };

        let loaded = SessionSnapshot {
            access_token: self.store.get(StorageKey::AccessToken)?,
            refresh_token: self.store.get(StorageKey::RefreshToken)?,
            id_token: self.store.get(StorageKey::IdToken)?,
            user_info,
            code_verifier: self.store.get(StorageKey::CodeVerifier)?,
            oauth_state: self.store.get(StorageKey::OAuthState)?,
        };

        let has_access = loaded.access_token.is_some();
        debug!(keys = ?loaded.populated_keys(), "Session restored from store");
        *self.snapshot.write() = loaded;
        Ok(has_access)
    }

    #[must_use]
    pub fn access_token(&self) -> Option<String> {
        self.snapshot.read().access_token.clone()
    }

    #[must_use]
    pub fn refresh_token(&self) -> Option<String> {
        self.snapshot.read().refresh_token.clone()
    }

    #[must_use]
    pub fn id_token(&self) -> Option<String> {
        self.snapshot.read().id_token.clone()
    }

    #[must_use]
    pub fn user_info(&self) -> Option<Claims> {
        self.snapshot.read().user_info.clone()
    }

    /// Current tokens as one consistent set
    #[must_use]
    pub fn token_set(&self) -> Option<TokenSet> {
        let snapshot = self.snapshot.read();
        snapshot.access_token.as_ref().map(|access| TokenSet {
            access_token: access.clone(),
            refresh_token: snapshot.refresh_token.clone(),
            id_token: snapshot.id_token.clone(),
        })
    }

    /// Persisted state of an unfinished login
    ///
    /// `code_verifier` or `state` may be individually missing; the caller
    /// decides what that means.
    #[must_use]
    pub fn pending(&self) -> (Option<String>, Option<String>) {
        let snapshot = self.snapshot.read();
        (snapshot.code_verifier.clone(), snapshot.oauth_state.clone())
    }

    #[must_use]
    pub fn has_pending(&self) -> bool {
        let snapshot = self.snapshot.read();
        snapshot.code_verifier.is_some() || snapshot.oauth_state.is_some()
    }

    /// Keys that currently hold a value
    #[must_use]
    pub fn populated_keys(&self) -> Vec<StorageKey> {
        self.snapshot.read().populated_keys()
    }

    /// Persist verifier and state before redirecting to the provider.
    ///
    /// # Errors
    /// Returns `AuthError::Storage` if the store cannot be written
    pub fn begin_pending(&self, request: &PendingAuthRequest) -> Result<(), AuthError> {
        let mut snapshot = self.snapshot.write();
        self.store.set(StorageKey::CodeVerifier, &request.code_verifier)?;
        self.store.set(StorageKey::OAuthState, &request.state)?;
        snapshot.code_verifier = Some(request.code_verifier.clone());
        snapshot.oauth_state = Some(request.state.clone());
        Ok(())
    }

    /// Persist tokens from a successful code exchange and drop the pending
    /// request.
    ///
    /// Refresh and ID tokens are only written when present. Either every key
    /// is updated or, on a store failure, none is.
    ///
    /// # Errors
    /// Returns `AuthError::Storage` if the store cannot be written
    pub fn complete_exchange(&self, tokens: &TokenSet) -> Result<(), AuthError> {
        let mut snapshot = self.snapshot.write();
        let next = SessionSnapshot {
            access_token: Some(tokens.access_token.clone()),
            refresh_token: tokens.refresh_token.clone().or_else(|| snapshot.refresh_token.clone()),
            id_token: tokens.id_token.clone().or_else(|| snapshot.id_token.clone()),
            code_verifier: None,
            oauth_state: None,
            ..snapshot.clone()
        };
        self.commit(&mut snapshot, next)
    }

    /// Fold a refresh response into the session and return the new access
    /// token.
    ///
    /// # Errors
    /// Returns `AuthError::Storage` if the store cannot be written; the
    /// previous tokens stay in place
    pub fn apply_refresh(&self, response: TokenResponse) -> Result<String, AuthError> {
        let mut snapshot = self.snapshot.write();
        let current = TokenSet {
            access_token: String::new(),
            refresh_token: snapshot.refresh_token.clone(),
            id_token: snapshot.id_token.clone(),
        };
        let merged = current.merged_with(response);

        let next = SessionSnapshot {
            access_token: Some(merged.access_token.clone()),
            refresh_token: merged.refresh_token,
            id_token: merged.id_token,
            ..snapshot.clone()
        };
        self.commit(&mut snapshot, next)?;
        Ok(merged.access_token)
    }

    /// Write every token key that differs between `snapshot` and `next`, then
    /// swap the snapshot.
    ///
    /// On a failed write the keys already written are restored and the
    /// snapshot is left untouched.
    fn commit(
        &self,
        snapshot: &mut SessionSnapshot,
        next: SessionSnapshot,
    ) -> Result<(), AuthError> {
        let changes = [
            (StorageKey::AccessToken, &snapshot.access_token, &next.access_token),
            (StorageKey::RefreshToken, &snapshot.refresh_token, &next.refresh_token),
            (StorageKey::IdToken, &snapshot.id_token, &next.id_token),
            (StorageKey::CodeVerifier, &snapshot.code_verifier, &next.code_verifier),
            (StorageKey::OAuthState, &snapshot.oauth_state, &next.oauth_state),
        ];

        let mut written: Vec<(StorageKey, Option<&str>)> = Vec::new();
        for (key, previous, value) in changes {
            if previous == value {
                continue;
            }
            if let Err(e) = self.write_entry(key, value.as_deref()) {
                warn!(key = %key, error = %e, "Session write failed, restoring previous entries");
                for (key, previous) in written.into_iter().rev() {
                    if let Err(restore) = self.write_entry(key, previous) {
                        warn!(key = %key, error = %restore, "Could not restore session entry");
                    }
                }
                return Err(e);
            }
            written.push((key, previous.as_deref()));
        }

        *snapshot = next;
        Ok(())
    }

    fn write_entry(&self, key: StorageKey, value: Option<&str>) -> Result<(), AuthError> {
        match value {
            Some(value) => self.store.set(key, value)?,
            None => self.store.remove(key)?,
        }
        Ok(())
    }

    /// Cache the user profile.
    ///
    /// # Errors
    /// Returns `AuthError::Storage` if the profile cannot be serialized or
    /// written
    pub fn set_user_info(&self, claims: Claims) -> Result<(), AuthError> {
        let raw = serde_json::to_string(&claims).map_err(|e| AuthError::Storage(e.to_string()))?;
        let mut snapshot = self.snapshot.write();
        self.store.set(StorageKey::UserInfo, &raw)?;
        snapshot.user_info = Some(claims);
        Ok(())
    }

    /// Forget everything, in memory first and then in the store.
    ///
    /// The in-memory view is empty even when the store reports a failure.
    ///
    /// # Errors
    /// Returns `AuthError::Storage` with the first store failure
    pub fn clear(&self) -> Result<(), AuthError> {
        let mut snapshot = self.snapshot.write();
        *snapshot = SessionSnapshot::default();
        self.store.clear()?;
        Ok(())
    }
}
