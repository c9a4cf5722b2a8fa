//! One-shot OAuth callback handling
//!
//! The provider redirects back to the callback route with either `code` and
//! `state` or `error` and `error_description`. [`CallbackCoordinator`]
//! processes that URL exactly once per instance, drives the code exchange and
//! schedules the post-login navigation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::error::AuthError;
use crate::token_manager::TokenLifecycleManager;

/// Progress of the callback, for rendering
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackPhase {
    Processing,
    Exchanging,
    Success,
    /// Human-readable failure message
    Error(String),
}

/// One-shot entry guard
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CallbackGuard {
    NotStarted = 0,
    Running = 1,
    Done = 2,
}

impl CallbackGuard {
    const fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::NotStarted,
            1 => Self::Running,
            _ => Self::Done,
        }
    }
}

/// Where the coordinator sends the user afterwards
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackRoutes {
    /// Target after a successful login
    pub landing: String,
    /// Target of [`CallbackCoordinator::return_to_login`]
    pub login: String,
    /// Pause on the success screen before navigating to `landing`
    pub redirect_delay: Duration,
}

impl Default for CallbackRoutes {
    fn default() -> Self {
        Self {
            landing: "/profile".to_string(),
            login: "/".to_string(),
            redirect_delay: Duration::from_secs(2),
        }
    }
}

/// Processes one authorization callback
pub struct CallbackCoordinator {
    manager: TokenLifecycleManager,
    routes: CallbackRoutes,
    guard: AtomicU8,
    phase: Mutex<CallbackPhase>,
    last_error: Mutex<Option<AuthError>>,
    redirect: Mutex<Option<JoinHandle<()>>>,
}

impl CallbackCoordinator {
    #[must_use]
    pub fn new(manager: TokenLifecycleManager) -> Self {
        Self {
            manager,
            routes: CallbackRoutes::default(),
            guard: AtomicU8::new(CallbackGuard::NotStarted as u8),
            phase: Mutex::new(CallbackPhase::Processing),
            last_error: Mutex::new(None),
            redirect: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn with_routes(mut self, routes: CallbackRoutes) -> Self {
        self.routes = routes;
        self
    }

    #[must_use]
    pub fn phase(&self) -> CallbackPhase {
        self.phase.lock().clone()
    }

    #[must_use]
    pub fn guard(&self) -> CallbackGuard {
        CallbackGuard::from_u8(self.guard.load(Ordering::Acquire))
    }

    /// Error behind an `Error` phase
    #[must_use]
    pub fn last_error(&self) -> Option<AuthError> {
        self.last_error.lock().clone()
    }

    /// Handle the callback URL.
    ///
    /// Returns the final phase, or `None` when this coordinator has already
    /// been entered; duplicate entries do nothing.
    ///
    /// The delayed landing navigation runs as a Tokio task. Outside a Tokio
    /// runtime it happens immediately instead.
    pub async fn handle(&self, callback_url: &Url) -> Option<CallbackPhase> {
        let entered = self.guard.compare_exchange(
            CallbackGuard::NotStarted as u8,
            CallbackGuard::Running as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
        if entered.is_err() {
            debug!("Callback already handled, ignoring duplicate entry");
            return None;
        }

        let phase = self.process(callback_url).await;
        self.guard.store(CallbackGuard::Done as u8, Ordering::Release);
        Some(phase)
    }

    async fn process(&self, callback_url: &Url) -> CallbackPhase {
        self.set_phase(CallbackPhase::Processing);
        let params: HashMap<String, String> = callback_url.query_pairs().into_owned().collect();

        if let Some(error) = params.get("error") {
            return self.fail(AuthError::Provider {
                error: error.clone(),
                description: params.get("error_description").cloned(),
            });
        }

        let Some(code) = params.get("code") else {
            return self.fail(AuthError::MissingAuthorizationCode);
        };
        let state = params.get("state").map_or("", String::as_str);

        self.set_phase(CallbackPhase::Exchanging);
        match self.manager.exchange_code(code, state).await {
            Ok(_) => {
                info!("Authorization callback completed");
                self.set_phase(CallbackPhase::Success);
                self.schedule_redirect();
                CallbackPhase::Success
            }
            Err(e) => self.fail(e),
        }
    }

    fn fail(&self, err: AuthError) -> CallbackPhase {
        error!(error = %err, "Authorization callback failed");
        let phase = CallbackPhase::Error(err.to_string());
        *self.last_error.lock() = Some(err);
        self.set_phase(phase.clone());
        phase
    }

    fn set_phase(&self, phase: CallbackPhase) {
        *self.phase.lock() = phase;
    }

    fn schedule_redirect(&self) {
        let navigator = self.manager.navigator().clone();
        let landing = self.routes.landing.clone();
        let delay = self.routes.redirect_delay;

        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let handle = runtime.spawn(async move {
                    tokio::time::sleep(delay).await;
                    navigator.navigate(&landing);
                });
                *self.redirect.lock() = Some(handle);
            }
            Err(_) => {
                warn!("No Tokio runtime for the delayed redirect, navigating now");
                navigator.navigate(&landing);
            }
        }
    }

    /// Wait for the scheduled post-login navigation.
    ///
    /// Returns `false` when none was scheduled or the task did not finish.
    pub async fn wait_for_redirect(&self) -> bool {
        let handle = self.redirect.lock().take();
        match handle {
            Some(handle) => handle.await.is_ok(),
            None => false,
        }
    }

    /// Navigate back to the login route (the error screen's action)
    pub fn return_to_login(&self) {
        self.manager.navigator().navigate(&self.routes.login);
    }
}

impl Drop for CallbackCoordinator {
    fn drop(&mut self) {
        if let Some(handle) = self.redirect.get_mut().take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for callback.
    use std::sync::Arc;

    use super::*;
    use crate::config::AuthConfig;
    use crate::store::{CredentialStore, MemoryStore, StorageKey};
    use crate::testing::{fresh_access_token, oauth_error, MockProviderClient, RecordingNavigator};
    use crate::types::TokenResponse;

    struct Harness {
        coordinator: CallbackCoordinator,
        provider: Arc<MockProviderClient>,
        navigator: Arc<RecordingNavigator>,
    }

    fn harness() -> Harness {
        let provider = Arc::new(MockProviderClient::new());
        let navigator = Arc::new(RecordingNavigator::new());
        let store = MemoryStore::new();
        store.set(StorageKey::CodeVerifier, "verifier").expect("seed");
        store.set(StorageKey::OAuthState, "xyz").expect("seed");

        let config = AuthConfig::new("https://idp.test", "demo", "app");
        let manager = TokenLifecycleManager::builder(config)
            .provider(provider.clone())
            .store(Arc::new(store))
            .navigator(navigator.clone())
            .build()
            .expect("manager");
        manager.initialize().expect("init");

        let coordinator = CallbackCoordinator::new(manager).with_routes(CallbackRoutes {
            redirect_delay: Duration::from_millis(10),
            ..CallbackRoutes::default()
        });
        Harness { coordinator, provider, navigator }
    }

    fn callback(query: &str) -> Url {
        Url::parse(&format!("https://app.test/callback?{query}")).expect("callback url")
    }

    #[tokio::test]
    async fn test_success_schedules_landing_navigation() {
        let h = harness();
        h.provider.push_exchange(Ok(TokenResponse::new(fresh_access_token())));
        h.provider.push_user_info(Err(oauth_error("invalid_token", None)));

        let phase = h.coordinator.handle(&callback("code=abc123&state=xyz")).await;

        assert_eq!(phase, Some(CallbackPhase::Success));
        assert_eq!(h.coordinator.guard(), CallbackGuard::Done);
        assert!(h.navigator.targets().is_empty());
        assert!(h.coordinator.wait_for_redirect().await);
        assert_eq!(h.navigator.targets(), vec!["/profile".to_string()]);
    }

    #[tokio::test]
    async fn test_provider_error_uses_description() {
        let h = harness();
        let phase = h
            .coordinator
            .handle(&callback("error=access_denied&error_description=User+cancelled+login"))
            .await;

        assert_eq!(phase, Some(CallbackPhase::Error("User cancelled login".to_string())));
        assert_eq!(h.provider.exchange_calls(), 0);
        assert!(matches!(h.coordinator.last_error(), Some(AuthError::Provider { .. })));
        assert!(!h.coordinator.wait_for_redirect().await);
    }

    #[tokio::test]
    async fn test_provider_error_without_description_uses_code() {
        let h = harness();
        let phase = h.coordinator.handle(&callback("error=access_denied")).await;
        assert_eq!(phase, Some(CallbackPhase::Error("access_denied".to_string())));
    }

    #[tokio::test]
    async fn test_missing_code() {
        let h = harness();
        let phase = h.coordinator.handle(&callback("state=xyz")).await;

        let expected = CallbackPhase::Error("Authorization code not received".to_string());
        assert_eq!(phase, Some(expected));
        assert_eq!(h.coordinator.last_error(), Some(AuthError::MissingAuthorizationCode));
        assert_eq!(h.provider.exchange_calls(), 0);
    }

    #[tokio::test]
    async fn test_state_mismatch_surfaces_message() {
        let h = harness();
        let phase = h.coordinator.handle(&callback("code=abc&state=forged")).await;

        let expected = CallbackPhase::Error("Invalid state parameter".to_string());
        assert_eq!(phase, Some(expected.clone()));
        assert_eq!(h.coordinator.phase(), expected);

        h.coordinator.return_to_login();
        assert_eq!(h.navigator.last().as_deref(), Some("/"));
    }

    #[tokio::test]
    async fn test_duplicate_entry_is_ignored() {
        let h = harness();
        h.provider.push_exchange(Ok(TokenResponse::new(fresh_access_token())));
        h.provider.push_user_info(Err(oauth_error("invalid_token", None)));

        let url = callback("code=abc123&state=xyz");
        let (first, second) = tokio::join!(h.coordinator.handle(&url), h.coordinator.handle(&url));

        let entered = [first, second].iter().filter(|phase| phase.is_some()).count();
        assert_eq!(entered, 1);
        assert_eq!(h.coordinator.handle(&url).await, None);
        assert_eq!(h.provider.exchange_calls(), 1);
    }

    #[test]
    fn test_success_outside_runtime_navigates_immediately() {
        let h = harness();
        h.provider.push_exchange(Ok(TokenResponse::new(fresh_access_token())));
        h.provider.push_user_info(Err(oauth_error("invalid_token", None)));

        let url = callback("code=abc123&state=xyz");
        let phase = futures::executor::block_on(h.coordinator.handle(&url));

        assert_eq!(phase, Some(CallbackPhase::Success));
        assert_eq!(h.navigator.targets(), vec!["/profile".to_string()]);
        assert!(!futures::executor::block_on(h.coordinator.wait_for_redirect()));
    }
}
