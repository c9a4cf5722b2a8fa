//! Token lifecycle manager
//!
//! Owns the session's tokens from the authorization redirect to logout:
//! - PKCE authorization URL building (persists the pending request)
//! - Authorization code exchange with CSRF state validation
//! - Identity resolution (ID token claims, falling back to userinfo)
//! - Single-flight token refresh
//! - Logout through the provider's end-session endpoint
//!
//! The manager is cheap to clone; clones share the session, the provider
//! client and the in-flight refresh.

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::clock::{Clock, SystemClock};
use crate::config::AuthConfig;
use crate::error::AuthError;
use crate::jwt::{self, Claims};
use crate::navigation::{LogNavigator, Navigator};
use crate::pkce::{validate_state, PkceArtifact, CHALLENGE_METHOD};
use crate::provider::{HttpProviderClient, ProviderClient};
use crate::session::SessionState;
use crate::store::{CredentialStore, MemoryStore, StorageKey};
use crate::types::{PendingAuthRequest, SessionDiagnostics, SessionStatus, TokenSet};

type RefreshFuture = Shared<BoxFuture<'static, Result<String, AuthError>>>;

/// Token lifecycle manager for one OAuth client registration
#[derive(Clone)]
pub struct TokenLifecycleManager {
    config: Arc<AuthConfig>,
    provider: Arc<dyn ProviderClient>,
    session: Arc<SessionState>,
    navigator: Arc<dyn Navigator>,
    clock: Arc<dyn Clock>,
    in_flight_refresh: Arc<Mutex<Option<RefreshFuture>>>,
}

impl std::fmt::Debug for TokenLifecycleManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenLifecycleManager")
            .field("client_id", &self.config.client_id)
            .field("realm", &self.config.realm)
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}

/// Builder for [`TokenLifecycleManager`]
///
/// Unset parts default to the HTTP provider client, an in-memory store, a
/// logging navigator and the system clock.
pub struct TokenLifecycleManagerBuilder {
    config: AuthConfig,
    provider: Option<Arc<dyn ProviderClient>>,
    store: Option<Arc<dyn CredentialStore>>,
    navigator: Option<Arc<dyn Navigator>>,
    clock: Option<Arc<dyn Clock>>,
}

impl TokenLifecycleManagerBuilder {
    #[must_use]
    pub fn provider(mut self, provider: Arc<dyn ProviderClient>) -> Self {
        self.provider = Some(provider);
        self
    }

    #[must_use]
    pub fn store(mut self, store: Arc<dyn CredentialStore>) -> Self {
        self.store = Some(store);
        self
    }

    #[must_use]
    pub fn navigator(mut self, navigator: Arc<dyn Navigator>) -> Self {
        self.navigator = Some(navigator);
        self
    }

    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Validate the configuration and assemble the manager.
    ///
    /// Persisted state is not loaded; call
    /// [`TokenLifecycleManager::initialize`] afterwards.
    ///
    /// # Errors
    /// Returns `AuthError::Config` for an invalid configuration and
    /// `AuthError::Transport` if the default HTTP client cannot be built
    pub fn build(self) -> Result<TokenLifecycleManager, AuthError> {
        self.config.validate()?;

        let provider: Arc<dyn ProviderClient> = match self.provider {
            Some(provider) => provider,
            None => Arc::new(HttpProviderClient::new(self.config.clone())?),
        };
        let store: Arc<dyn CredentialStore> = match self.store {
            Some(store) => store,
            None => Arc::new(MemoryStore::new()),
        };
        let navigator: Arc<dyn Navigator> = match self.navigator {
            Some(navigator) => navigator,
            None => Arc::new(LogNavigator),
        };
        let clock: Arc<dyn Clock> = match self.clock {
            Some(clock) => clock,
            None => Arc::new(SystemClock),
        };

        Ok(TokenLifecycleManager {
            config: Arc::new(self.config),
            provider,
            session: Arc::new(SessionState::new(store)),
            navigator,
            clock,
            in_flight_refresh: Arc::new(Mutex::new(None)),
        })
    }
}

impl TokenLifecycleManager {
    /// Start building a manager for `config`
    #[must_use]
    pub fn builder(config: AuthConfig) -> TokenLifecycleManagerBuilder {
        TokenLifecycleManagerBuilder {
            config,
            provider: None,
            store: None,
            navigator: None,
            clock: None,
        }
    }

    /// Manager with every default part
    ///
    /// # Errors
    /// See [`TokenLifecycleManagerBuilder::build`]
    pub fn new(config: AuthConfig) -> Result<Self, AuthError> {
        Self::builder(config).build()
    }

    /// Load persisted session state.
    ///
    /// Should be called once on startup. Returns whether a token set was
    /// found (expired or not).
    ///
    /// # Errors
    /// Returns `AuthError::Storage` if the store cannot be read
    pub fn initialize(&self) -> Result<bool, AuthError> {
        let restored = self.session.initialize()?;
        if restored {
            info!(
                authenticated = self.is_authenticated(),
                "Token manager initialized with existing tokens"
            );
        } else {
            debug!("No existing tokens found in credential store");
        }
        Ok(restored)
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    #[must_use]
    pub fn navigator(&self) -> &Arc<dyn Navigator> {
        &self.navigator
    }

    /// Generate PKCE material, persist it and return the URL to send the
    /// browser to.
    ///
    /// Any earlier pending request is overwritten.
    ///
    /// # Errors
    /// Returns `AuthError::Entropy` if random generation fails,
    /// `AuthError::Storage` if the pending request cannot be persisted, or
    /// `AuthError::Config` if the endpoint is not a valid URL
    pub fn build_authorization_url(&self) -> Result<Url, AuthError> {
        let artifact = PkceArtifact::generate()?;

        self.session.begin_pending(&PendingAuthRequest {
            code_verifier: artifact.code_verifier.clone(),
            state: artifact.state.clone(),
        })?;

        let scope = self.config.scope_string();
        let url = Url::parse_with_params(
            &self.config.authorization_endpoint(),
            &[
                ("response_type", "code"),
                ("client_id", self.config.client_id.as_str()),
                ("redirect_uri", self.config.redirect_uri.as_str()),
                ("scope", scope.as_str()),
                ("code_challenge", artifact.code_challenge.as_str()),
                ("code_challenge_method", CHALLENGE_METHOD),
                ("state", artifact.state.as_str()),
            ],
        )
        .map_err(|e| AuthError::Config(format!("Invalid authorization endpoint: {e}")))?;

        info!(state_length = artifact.state.len(), "Authorization request prepared");
        Ok(url)
    }

    /// Exchange an authorization code for tokens.
    ///
    /// If a non-expired access token is already stored the call returns it
    /// without contacting the provider, so a repeated callback is harmless.
    ///
    /// # Arguments
    /// * `code` - Authorization code from the redirect
    /// * `state` - State from the redirect, checked against the pending
    ///   request
    ///
    /// # Errors
    /// - `AuthError::StateMismatch` if `state` differs from the persisted
    ///   state, or none is persisted
    /// - `AuthError::MissingVerifier` if no code verifier is persisted
    /// - `AuthError::TokenExchangeFailed` if the provider rejects the code; the
    ///   pending request is kept
    /// - `AuthError::Storage` if tokens cannot be persisted
    pub async fn exchange_code(&self, code: &str, state: &str) -> Result<TokenSet, AuthError> {
        if let Some(tokens) = self.session.token_set() {
            if !jwt::is_expired_at(&tokens.access_token, self.clock.now_unix()) {
                info!("Already authenticated, skipping code exchange");
                return Ok(tokens);
            }
        }

        let (code_verifier, expected_state) = self.session.pending();

        match expected_state {
            Some(expected) if validate_state(&expected, state) => {}
            Some(_) => {
                warn!("Callback state does not match pending authorization request");
                return Err(AuthError::StateMismatch);
            }
            None => {
                warn!("Callback received without a pending authorization request");
                return Err(AuthError::StateMismatch);
            }
        }

        let code_verifier = code_verifier.ok_or_else(|| {
            warn!("Pending authorization request has no code verifier");
            AuthError::MissingVerifier
        })?;

        debug!("Exchanging authorization code for tokens");
        let response = self.provider.exchange_code(code, &code_verifier).await.map_err(|e| {
            error!(error = %e, "Authorization code exchange failed");
            AuthError::TokenExchangeFailed(e.to_string())
        })?;

        let tokens = TokenSet::from(response);
        self.session.complete_exchange(&tokens)?;
        info!(
            access_token_length = tokens.access_token.len(),
            has_refresh_token = tokens.refresh_token.is_some(),
            has_id_token = tokens.id_token.is_some(),
            "Tokens stored successfully"
        );

        self.resolve_identity(&tokens).await;
        Ok(tokens)
    }

    /// Populate the cached user profile.
    ///
    /// ID token claims are used when they decode; otherwise userinfo is
    /// queried. Failure of both leaves the session authenticated without a
    /// profile.
    async fn resolve_identity(&self, tokens: &TokenSet) {
        let from_id_token = match tokens.id_token.as_deref().map(jwt::decode_claims) {
            Some(Ok(claims)) => Some(claims),
            Some(Err(e)) => {
                warn!(error = %e, "ID token could not be decoded, falling back to userinfo");
                None
            }
            None => None,
        };

        let claims = match from_id_token {
            Some(claims) => claims,
            None => match self.provider.user_info(&tokens.access_token).await {
                Ok(claims) => claims,
                Err(e) => {
                    warn!(error = %e, "User info unavailable, continuing without identity");
                    return;
                }
            },
        };

        if let Err(e) = self.session.set_user_info(claims) {
            warn!(error = %e, "Failed to cache user info");
        }
    }

    /// Whether a stored access token exists and its `exp` lies in the future.
    ///
    /// Never errors and never touches the network; malformed tokens count as
    /// unauthenticated.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.session
            .access_token()
            .is_some_and(|token| !jwt::is_expired_at(&token, self.clock.now_unix()))
    }

    #[must_use]
    pub fn status(&self) -> SessionStatus {
        match self.session.access_token() {
            Some(token) if jwt::is_expired_at(&token, self.clock.now_unix()) => {
                SessionStatus::Expired
            }
            Some(_) => SessionStatus::Authenticated,
            None if self.session.has_pending() => SessionStatus::PendingAuth,
            None => SessionStatus::Anonymous,
        }
    }

    /// Obtain a new access token with the stored refresh token.
    ///
    /// At most one refresh runs at a time: concurrent callers await the same
    /// request and receive the same result. A failed refresh leaves the
    /// session untouched and does not log out.
    ///
    /// # Errors
    /// - `AuthError::NoRefreshToken` if none is stored
    /// - `AuthError::RefreshFailed` if the provider rejects the refresh
    /// - `AuthError::Storage` if the new tokens cannot be persisted
    pub async fn refresh(&self) -> Result<String, AuthError> {
        let refresh = {
            let mut slot = self.in_flight_refresh.lock();
            if let Some(existing) = slot.as_ref() {
                debug!("Joining in-flight token refresh");
                existing.clone()
            } else {
                let manager = self.clone();
                let refresh = async move {
                    let result = manager.refresh_tokens().await;
                    manager.in_flight_refresh.lock().take();
                    result
                }
                .boxed()
                .shared();
                *slot = Some(refresh.clone());
                refresh
            }
        };

        refresh.await
    }

    async fn refresh_tokens(&self) -> Result<String, AuthError> {
        let Some(refresh_token) = self.session.refresh_token() else {
            warn!("Refresh requested without a stored refresh token");
            return Err(AuthError::NoRefreshToken);
        };

        info!("Refreshing access token");
        let response = self.provider.refresh(&refresh_token).await.map_err(|e| {
            error!(error = %e, "Token refresh failed");
            AuthError::RefreshFailed(e.to_string())
        })?;

        if self.session.refresh_token().as_deref() != Some(refresh_token.as_str()) {
            warn!("Session changed while refreshing, discarding new tokens");
            return Err(AuthError::RefreshFailed("session ended during refresh".to_string()));
        }

        let rotated = response.refresh_token.is_some();
        let access_token = self.session.apply_refresh(response)?;
        info!(
            access_token_length = access_token.len(),
            rotated_refresh_token = rotated,
            "Successfully refreshed access token"
        );
        Ok(access_token)
    }

    /// End the session and navigate away.
    ///
    /// Every persisted entry is cleared. With an ID token the browser goes to
    /// the provider's end-session endpoint (`id_token_hint`,
    /// `post_logout_redirect_uri`); otherwise, or if clearing failed, straight
    /// to the post-logout URI. Returns the navigation target.
    pub fn logout(&self) -> String {
        let id_token = self.session.id_token();

        let target = match self.session.clear() {
            Ok(()) => match id_token {
                Some(id_token) => self.end_session_url(&id_token),
                None => self.config.post_logout_redirect_uri.clone(),
            },
            Err(e) => {
                error!(error = %e, "Failed to clear session during logout");
                self.config.post_logout_redirect_uri.clone()
            }
        };

        info!(provider_logout = target != self.config.post_logout_redirect_uri, "Logged out");
        self.navigator.navigate(&target);
        target
    }

    fn end_session_url(&self, id_token: &str) -> String {
        let params = [
            ("id_token_hint", id_token),
            ("post_logout_redirect_uri", self.config.post_logout_redirect_uri.as_str()),
        ];
        match Url::parse_with_params(&self.config.end_session_endpoint(), &params) {
            Ok(url) => url.into(),
            Err(e) => {
                warn!(error = %e, "Invalid end-session endpoint, skipping provider logout");
                self.config.post_logout_redirect_uri.clone()
            }
        }
    }

    /// Clear every persisted entry without navigating.
    ///
    /// # Errors
    /// Returns `AuthError::Storage` with the first store failure
    pub fn clear_session(&self) -> Result<(), AuthError> {
        self.session.clear()?;
        info!("Session storage cleared");
        Ok(())
    }

    #[must_use]
    pub fn access_token(&self) -> Option<String> {
        self.session.access_token()
    }

    #[must_use]
    pub fn id_token(&self) -> Option<String> {
        self.session.id_token()
    }

    #[must_use]
    pub fn has_refresh_token(&self) -> bool {
        self.session.refresh_token().is_some()
    }

    #[must_use]
    pub fn user_info(&self) -> Option<Claims> {
        self.session.user_info()
    }

    #[must_use]
    pub fn token_set(&self) -> Option<TokenSet> {
        self.session.token_set()
    }

    /// State of the pending authorization request, if any
    #[must_use]
    pub fn pending_state(&self) -> Option<String> {
        self.session.pending().1
    }

    /// `Bearer <token>` while authenticated
    #[must_use]
    pub fn authorization_header(&self) -> Option<String> {
        if !self.is_authenticated() {
            return None;
        }
        self.session.access_token().map(|token| format!("Bearer {token}"))
    }

    /// Session snapshot without token values
    #[must_use]
    pub fn diagnostics(&self) -> SessionDiagnostics {
        let tokens = self.session.token_set();
        let user_info = self.session.user_info();

        SessionDiagnostics {
            status: self.status(),
            is_authenticated: self.is_authenticated(),
            has_access_token: tokens.is_some(),
            has_refresh_token: tokens.as_ref().is_some_and(|t| t.refresh_token.is_some()),
            has_id_token: tokens.as_ref().is_some_and(|t| t.id_token.is_some()),
            has_user_info: user_info.is_some(),
            access_token_length: tokens.as_ref().map_or(0, |t| t.access_token.len()),
            id_token_length: tokens
                .as_ref()
                .and_then(|t| t.id_token.as_ref())
                .map_or(0, String::len),
            access_token_expires_at: tokens
                .as_ref()
                .and_then(TokenSet::access_expires_at)
                .and_then(|exp| Utc.timestamp_opt(exp, 0).single()),
            user_info,
            populated_keys: self
                .session
                .populated_keys()
                .into_iter()
                .map(StorageKey::as_str)
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for token_manager.
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::testing::{
        jwt_expiring_at, jwt_with_claims, oauth_error, FailingStore, MockClock, MockProviderClient,
        RecordingNavigator,
    };
    use crate::types::TokenResponse;

    const NOW: i64 = 1_700_000_000;

    struct Harness {
        manager: TokenLifecycleManager,
        provider: Arc<MockProviderClient>,
        store: MemoryStore,
        navigator: Arc<RecordingNavigator>,
        clock: Arc<MockClock>,
    }

    fn config() -> AuthConfig {
        AuthConfig::new("https://idp.test", "demo", "app")
            .with_redirect_uri("https://app.test/callback")
            .with_post_logout_redirect_uri("https://app.test/")
    }

    fn harness() -> Harness {
        let provider = Arc::new(MockProviderClient::new());
        let store = MemoryStore::new();
        let navigator = Arc::new(RecordingNavigator::new());
        let clock = Arc::new(MockClock::new(NOW));

        let manager = TokenLifecycleManager::builder(config())
            .provider(provider.clone())
            .store(Arc::new(store.clone()))
            .navigator(navigator.clone())
            .clock(clock.clone())
            .build()
            .expect("manager");

        Harness { manager, provider, store, navigator, clock }
    }

    fn seed_pending(store: &MemoryStore, verifier: &str, state: &str) {
        store.set(StorageKey::CodeVerifier, verifier).expect("seed verifier");
        store.set(StorageKey::OAuthState, state).expect("seed state");
    }

    fn query_value(url: &Url, key: &str) -> Option<String> {
        url.query_pairs().find(|(k, _)| k == key).map(|(_, v)| v.into_owned())
    }

    #[test]
    fn test_authorization_url_carries_pkce_parameters() {
        let h = harness();
        let url = h.manager.build_authorization_url().expect("url");

        assert_eq!(url.path(), "/realms/demo/protocol/openid-connect/auth");
        assert_eq!(query_value(&url, "response_type").as_deref(), Some("code"));
        assert_eq!(query_value(&url, "client_id").as_deref(), Some("app"));
        assert_eq!(query_value(&url, "redirect_uri").as_deref(), Some("https://app.test/callback"));
        assert_eq!(query_value(&url, "scope").as_deref(), Some("openid profile email"));
        assert_eq!(query_value(&url, "code_challenge_method").as_deref(), Some("S256"));

        let verifier =
            h.store.get(StorageKey::CodeVerifier).expect("get").expect("verifier stored");
        let state = h.store.get(StorageKey::OAuthState).expect("get").expect("state stored");
        assert_eq!(query_value(&url, "state"), Some(state.clone()));
        assert_eq!(
            query_value(&url, "code_challenge"),
            Some(crate::pkce::generate_code_challenge(&verifier))
        );
        assert_eq!(h.manager.pending_state(), Some(state));
        assert_eq!(h.manager.status(), SessionStatus::PendingAuth);
    }

    #[test]
    fn test_new_authorization_request_overwrites_pending() {
        let h = harness();
        let first = h.manager.build_authorization_url().expect("first");
        let second = h.manager.build_authorization_url().expect("second");

        assert_ne!(query_value(&first, "state"), query_value(&second, "state"));
        assert_eq!(h.manager.pending_state(), query_value(&second, "state"));
    }

    #[tokio::test]
    async fn test_exchange_success_persists_tokens_and_identity() {
        let h = harness();
        seed_pending(&h.store, "verifier-1", "xyz");
        h.manager.initialize().expect("init");

        let id_token = jwt_with_claims(&json!({"sub": "u1", "preferred_username": "ada"}));
        h.provider.push_exchange(Ok(TokenResponse::new(jwt_expiring_at(NOW + 300))
            .with_refresh_token("R")
            .with_id_token(id_token.clone())));

        let tokens = h.manager.exchange_code("abc123", "xyz").await.expect("exchange");

        assert_eq!(tokens.id_token.as_deref(), Some(id_token.as_str()));
        assert!(h.manager.is_authenticated());
        assert_eq!(h.manager.status(), SessionStatus::Authenticated);
        assert!(h.manager.pending_state().is_none());
        assert_eq!(
            h.store.keys(),
            vec![
                StorageKey::AccessToken,
                StorageKey::RefreshToken,
                StorageKey::IdToken,
                StorageKey::UserInfo,
            ]
        );
        let username = h.manager.user_info().and_then(|c| c.get("preferred_username").cloned());
        assert_eq!(username, Some(json!("ada")));
        assert_eq!(h.provider.user_info_calls(), 0);
    }

    #[tokio::test]
    async fn test_exchange_falls_back_to_userinfo_without_id_token() {
        let h = harness();
        seed_pending(&h.store, "v", "s");
        h.manager.initialize().expect("init");

        h.provider.push_exchange(Ok(TokenResponse::new(jwt_expiring_at(NOW + 300))));
        let mut profile = Claims::new();
        profile.insert("email".into(), json!("ada@example.com"));
        h.provider.push_user_info(Ok(profile));

        h.manager.exchange_code("c", "s").await.expect("exchange");
        assert_eq!(h.provider.user_info_calls(), 1);
        let email = h.manager.user_info().and_then(|c| c.get("email").cloned());
        assert_eq!(email, Some(json!("ada@example.com")));
    }

    #[tokio::test]
    async fn test_exchange_survives_identity_failure() {
        let h = harness();
        seed_pending(&h.store, "v", "s");
        h.manager.initialize().expect("init");

        let response = TokenResponse::new(jwt_expiring_at(NOW + 300)).with_id_token("not-a-jwt");
        h.provider.push_exchange(Ok(response));
        h.provider.push_user_info(Err(oauth_error("invalid_token", None)));

        h.manager.exchange_code("c", "s").await.expect("exchange still succeeds");
        assert!(h.manager.is_authenticated());
        assert!(h.manager.user_info().is_none());
    }

    #[tokio::test]
    async fn test_exchange_rejects_state_mismatch_without_network() {
        let h = harness();
        seed_pending(&h.store, "v", "expected");
        h.manager.initialize().expect("init");

        let result = h.manager.exchange_code("c", "forged").await;
        assert_eq!(result, Err(AuthError::StateMismatch));
        assert_eq!(h.provider.exchange_calls(), 0);
        assert_eq!(h.manager.pending_state().as_deref(), Some("expected"));
    }

    #[tokio::test]
    async fn test_exchange_without_pending_state_is_mismatch() {
        let h = harness();
        let result = h.manager.exchange_code("c", "anything").await;
        assert_eq!(result, Err(AuthError::StateMismatch));
        assert_eq!(h.provider.exchange_calls(), 0);
    }

    #[tokio::test]
    async fn test_exchange_requires_verifier() {
        let h = harness();
        h.store.set(StorageKey::OAuthState, "s").expect("seed state");
        h.manager.initialize().expect("init");

        let result = h.manager.exchange_code("c", "s").await;
        assert_eq!(result, Err(AuthError::MissingVerifier));
        assert_eq!(h.provider.exchange_calls(), 0);
    }

    #[tokio::test]
    async fn test_exchange_failure_keeps_pending_request() {
        let h = harness();
        seed_pending(&h.store, "v", "s");
        h.manager.initialize().expect("init");
        h.provider.push_exchange(Err(oauth_error("invalid_grant", Some("Code not valid"))));

        let result = h.manager.exchange_code("c", "s").await;
        assert!(matches!(
            result,
            Err(AuthError::TokenExchangeFailed(msg)) if msg.contains("Code not valid")
        ));
        assert_eq!(h.manager.pending_state().as_deref(), Some("s"));
        assert!(h.store.get(StorageKey::AccessToken).expect("get").is_none());
    }

    #[tokio::test]
    async fn test_exchange_storage_failure_is_not_masked_on_retry() {
        let store = FailingStore::new();
        seed_pending(store.inner(), "v", "s");
        store.set_reject_key(Some(StorageKey::RefreshToken));
        let provider = Arc::new(MockProviderClient::new());

        let manager = TokenLifecycleManager::builder(config())
            .provider(provider.clone())
            .store(Arc::new(store.clone()))
            .clock(Arc::new(MockClock::new(NOW)))
            .build()
            .expect("manager");
        manager.initialize().expect("init");

        let access = jwt_expiring_at(NOW + 300);
        provider.push_exchange(Ok(TokenResponse::new(access.clone()).with_refresh_token("R")));
        let first = manager.exchange_code("c", "s").await;

        assert!(matches!(first, Err(AuthError::Storage(_))));
        assert!(!manager.is_authenticated());
        assert!(manager.token_set().is_none());
        assert_eq!(manager.pending_state().as_deref(), Some("s"));
        assert!(store.inner().get(StorageKey::AccessToken).expect("get").is_none());

        store.set_reject_key(None);
        provider.push_exchange(Ok(TokenResponse::new(access.clone()).with_refresh_token("R")));
        let retry = manager.exchange_code("c", "s").await.expect("retry");

        assert_eq!(retry, TokenSet::new(access).with_refresh_token("R"));
        assert_eq!(provider.exchange_calls(), 2);
        assert!(manager.is_authenticated());
    }

    #[tokio::test]
    async fn test_exchange_is_idempotent_while_authenticated() {
        let h = harness();
        let access = jwt_expiring_at(NOW + 300);
        h.store.set(StorageKey::AccessToken, &access).expect("seed");
        h.manager.initialize().expect("init");

        let tokens = h.manager.exchange_code("c", "whatever").await.expect("short-circuit");
        assert_eq!(tokens.access_token, access);
        assert_eq!(h.provider.exchange_calls(), 0);
    }

    #[test]
    fn test_is_authenticated_follows_clock() {
        let h = harness();
        h.store.set(StorageKey::AccessToken, &jwt_expiring_at(NOW + 10)).expect("seed");
        h.manager.initialize().expect("init");

        assert!(h.manager.is_authenticated());
        assert!(h.manager.authorization_header().is_some_and(|v| v.starts_with("Bearer ")));

        h.clock.advance(10);
        assert!(!h.manager.is_authenticated());
        assert_eq!(h.manager.status(), SessionStatus::Expired);
        assert!(h.manager.authorization_header().is_none());
    }

    #[test]
    fn test_malformed_access_token_is_not_authenticated() {
        let h = harness();
        h.store.set(StorageKey::AccessToken, "opaque").expect("seed");
        h.manager.initialize().expect("init");

        assert!(!h.manager.is_authenticated());
        assert_eq!(h.manager.status(), SessionStatus::Expired);
    }

    #[tokio::test]
    async fn test_refresh_without_token_leaves_store_untouched() {
        let h = harness();
        h.store.set(StorageKey::AccessToken, "A").expect("seed");
        h.manager.initialize().expect("init");

        assert_eq!(h.manager.refresh().await, Err(AuthError::NoRefreshToken));
        assert_eq!(h.store.keys(), vec![StorageKey::AccessToken]);
        assert_eq!(h.provider.refresh_calls(), 0);
    }

    #[tokio::test]
    async fn test_refresh_overwrites_access_and_keeps_omitted_tokens() {
        let h = harness();
        h.store.set(StorageKey::AccessToken, "A1").expect("seed");
        h.store.set(StorageKey::RefreshToken, "R1").expect("seed");
        h.store.set(StorageKey::IdToken, "I1").expect("seed");
        h.manager.initialize().expect("init");
        h.provider.push_refresh(Ok(TokenResponse::new("A2")));

        assert_eq!(h.manager.refresh().await.as_deref(), Ok("A2"));
        assert_eq!(h.store.get(StorageKey::AccessToken).expect("get").as_deref(), Some("A2"));
        assert_eq!(h.store.get(StorageKey::RefreshToken).expect("get").as_deref(), Some("R1"));
        assert_eq!(h.store.get(StorageKey::IdToken).expect("get").as_deref(), Some("I1"));
    }

    #[tokio::test]
    async fn test_refresh_failure_does_not_log_out() {
        let h = harness();
        h.store.set(StorageKey::AccessToken, "A1").expect("seed");
        h.store.set(StorageKey::RefreshToken, "R1").expect("seed");
        h.manager.initialize().expect("init");
        h.provider.push_refresh(Err(oauth_error("invalid_grant", None)));

        assert!(matches!(h.manager.refresh().await, Err(AuthError::RefreshFailed(_))));
        assert_eq!(h.manager.access_token().as_deref(), Some("A1"));
        assert!(h.navigator.targets().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_refreshes_share_one_request() {
        let h = harness();
        h.store.set(StorageKey::RefreshToken, "R1").expect("seed");
        h.manager.initialize().expect("init");
        h.provider.set_refresh_delay(Duration::from_millis(50));
        h.provider.push_refresh(Ok(TokenResponse::new("A2").with_refresh_token("R2")));

        let (first, second, third) =
            tokio::join!(h.manager.refresh(), h.manager.refresh(), h.manager.refresh());

        assert_eq!(first.as_deref(), Ok("A2"));
        assert_eq!(second.as_deref(), Ok("A2"));
        assert_eq!(third.as_deref(), Ok("A2"));
        assert_eq!(h.provider.refresh_calls(), 1);

        h.provider.push_refresh(Ok(TokenResponse::new("A3")));
        assert_eq!(h.manager.refresh().await.as_deref(), Ok("A3"));
        assert_eq!(h.provider.refresh_tokens_seen(), vec!["R1", "R2"]);
    }

    #[test]
    fn test_logout_with_id_token_goes_to_end_session() {
        let h = harness();
        h.store.set(StorageKey::AccessToken, "A").expect("seed");
        h.store.set(StorageKey::IdToken, "I").expect("seed");
        h.manager.initialize().expect("init");

        let target = h.manager.logout();

        let url = Url::parse(&target).expect("absolute target");
        assert_eq!(url.path(), "/realms/demo/protocol/openid-connect/logout");
        assert_eq!(query_value(&url, "id_token_hint").as_deref(), Some("I"));
        let post_logout = query_value(&url, "post_logout_redirect_uri");
        assert_eq!(post_logout.as_deref(), Some("https://app.test/"));
        assert!(h.store.is_empty());
        assert_eq!(h.navigator.targets(), vec![target]);
    }

    #[test]
    fn test_logout_without_id_token_goes_home() {
        let h = harness();
        h.store.set(StorageKey::AccessToken, "A").expect("seed");
        h.manager.initialize().expect("init");

        assert_eq!(h.manager.logout(), "https://app.test/");
        assert_eq!(h.navigator.last().as_deref(), Some("https://app.test/"));
        assert!(h.store.is_empty());
    }

    #[test]
    fn test_logout_survives_store_failure() {
        let store = FailingStore::new();
        store.set(StorageKey::IdToken, "I").expect("seed");
        store.set_fail_removes(true);
        let navigator = Arc::new(RecordingNavigator::new());

        let manager = TokenLifecycleManager::builder(config())
            .provider(Arc::new(MockProviderClient::new()))
            .store(Arc::new(store))
            .navigator(navigator.clone())
            .build()
            .expect("manager");
        manager.initialize().expect("init");

        assert_eq!(manager.logout(), "https://app.test/");
        assert_eq!(navigator.targets(), vec!["https://app.test/".to_string()]);
        assert!(manager.id_token().is_none());
    }

    #[test]
    fn test_diagnostics_hide_token_values() {
        let h = harness();
        let access = jwt_expiring_at(NOW + 60);
        h.store.set(StorageKey::AccessToken, &access).expect("seed");
        h.store.set(StorageKey::RefreshToken, "R").expect("seed");
        h.manager.initialize().expect("init");

        let diagnostics = h.manager.diagnostics();
        assert!(diagnostics.is_authenticated);
        assert!(diagnostics.has_refresh_token);
        assert!(!diagnostics.has_id_token);
        assert_eq!(diagnostics.access_token_length, access.len());
        assert_eq!(diagnostics.access_token_expires_at.map(|t| t.timestamp()), Some(NOW + 60));
        assert_eq!(diagnostics.populated_keys, vec!["keycloak_token", "keycloak_refresh_token"]);

        let rendered = serde_json::to_string(&diagnostics).expect("serialize");
        assert!(!rendered.contains(&access));
    }

    #[test]
    fn test_clear_session_does_not_navigate() {
        let h = harness();
        seed_pending(&h.store, "v", "s");
        h.manager.initialize().expect("init");

        h.manager.clear_session().expect("clear");
        assert!(h.store.is_empty());
        assert!(h.navigator.targets().is_empty());
        assert_eq!(h.manager.status(), SessionStatus::Anonymous);
    }

    #[test]
    fn test_build_rejects_invalid_config() {
        let result = TokenLifecycleManager::builder(AuthConfig::new("not a url", "demo", "app"))
            .provider(Arc::new(MockProviderClient::new()))
            .build();
        assert!(matches!(result, Err(AuthError::Config(_))));
    }
}
