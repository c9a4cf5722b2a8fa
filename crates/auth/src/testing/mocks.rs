//! Mock implementations of the crate's seams
//!
//! Each mock shares its state behind `Arc`s, so a test keeps one handle for
//! assertions and hands a clone to the code under test.

#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::clock::Clock;
use crate::jwt::Claims;
use crate::navigation::Navigator;
use crate::provider::{ProviderClient, ProviderError};
use crate::store::{CredentialStore, MemoryStore, StorageKey, StoreError};
use crate::types::{OAuthErrorBody, TokenResponse};

/// Scripted result of one provider call
pub type ScriptedOutcome<T> = Result<T, OAuthErrorBody>;

type OutcomeQueue<T> = Arc<Mutex<VecDeque<ScriptedOutcome<T>>>>;

fn next_outcome<T>(queue: &OutcomeQueue<T>, call: &str) -> Result<T, ProviderError> {
    match queue.lock().pop_front() {
        Some(Ok(value)) => Ok(value),
        Some(Err(body)) => Err(ProviderError::OAuth(body)),
        None => Err(ProviderError::Status {
            status: 500,
            body: format!("no scripted {call} response"),
        }),
    }
}

/// Build an OAuth error body for scripting failures
#[must_use]
pub fn oauth_error(error: &str, description: Option<&str>) -> OAuthErrorBody {
    OAuthErrorBody { error: error.to_string(), error_description: description.map(String::from) }
}

/// Provider client that replays queued outcomes and counts calls
///
/// An empty queue answers with HTTP 500.
///
/// # Examples
///
/// ```
/// # #[cfg(feature = "test-utils")]
/// # {
/// use keyflow_auth::testing::MockProviderClient;
/// use keyflow_auth::types::TokenResponse;
///
/// let provider = MockProviderClient::new();
/// provider.push_refresh(Ok(TokenResponse::new("A2")));
/// assert_eq!(provider.refresh_calls(), 0);
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct MockProviderClient {
    exchange_outcomes: OutcomeQueue<TokenResponse>,
    refresh_outcomes: OutcomeQueue<TokenResponse>,
    user_info_outcomes: OutcomeQueue<Claims>,
    exchange_calls: Arc<AtomicUsize>,
    refresh_calls: Arc<AtomicUsize>,
    user_info_calls: Arc<AtomicUsize>,
    refresh_tokens_seen: Arc<Mutex<Vec<String>>>,
    refresh_delay: Arc<Mutex<Option<Duration>>>,
}

impl MockProviderClient {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_exchange(&self, outcome: ScriptedOutcome<TokenResponse>) {
        self.exchange_outcomes.lock().push_back(outcome);
    }

    pub fn push_refresh(&self, outcome: ScriptedOutcome<TokenResponse>) {
        self.refresh_outcomes.lock().push_back(outcome);
    }

    pub fn push_user_info(&self, outcome: ScriptedOutcome<Claims>) {
        self.user_info_outcomes.lock().push_back(outcome);
    }

    /// Hold every refresh for `delay` before answering
    pub fn set_refresh_delay(&self, delay: Duration) {
        *self.refresh_delay.lock() = Some(delay);
    }

    #[must_use]
    pub fn exchange_calls(&self) -> usize {
        self.exchange_calls.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn user_info_calls(&self) -> usize {
        self.user_info_calls.load(Ordering::SeqCst)
    }

    /// Refresh tokens presented so far, in call order
    #[must_use]
    pub fn refresh_tokens_seen(&self) -> Vec<String> {
        self.refresh_tokens_seen.lock().clone()
    }
}

#[async_trait]
impl ProviderClient for MockProviderClient {
    async fn exchange_code(
        &self,
        _code: &str,
        _code_verifier: &str,
    ) -> Result<TokenResponse, ProviderError> {
        self.exchange_calls.fetch_add(1, Ordering::SeqCst);
        next_outcome(&self.exchange_outcomes, "exchange")
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse, ProviderError> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        self.refresh_tokens_seen.lock().push(refresh_token.to_string());

        let delay = *self.refresh_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        next_outcome(&self.refresh_outcomes, "refresh")
    }

    async fn user_info(&self, _access_token: &str) -> Result<Claims, ProviderError> {
        self.user_info_calls.fetch_add(1, Ordering::SeqCst);
        next_outcome(&self.user_info_outcomes, "userinfo")
    }
}

/// Navigator that records every target
#[derive(Debug, Clone, Default)]
pub struct RecordingNavigator {
    targets: Arc<Mutex<Vec<String>>>,
}

impl RecordingNavigator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn targets(&self) -> Vec<String> {
        self.targets.lock().clone()
    }

    #[must_use]
    pub fn last(&self) -> Option<String> {
        self.targets.lock().last().cloned()
    }
}

impl Navigator for RecordingNavigator {
    fn navigate(&self, target: &str) {
        self.targets.lock().push(target.to_string());
    }
}

/// Memory store with switchable write and remove failures
#[derive(Debug, Clone, Default)]
pub struct FailingStore {
    inner: MemoryStore,
    fail_writes: Arc<AtomicBool>,
    fail_removes: Arc<AtomicBool>,
    rejected_key: Arc<Mutex<Option<StorageKey>>>,
}

impl FailingStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Underlying store, for seeding and inspection
    #[must_use]
    pub fn inner(&self) -> &MemoryStore {
        &self.inner
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_removes(&self, fail: bool) {
        self.fail_removes.store(fail, Ordering::SeqCst);
    }

    /// Reject writes to one key only; `None` accepts every key again
    pub fn set_reject_key(&self, key: Option<StorageKey>) {
        *self.rejected_key.lock() = key;
    }
}

impl CredentialStore for FailingStore {
    fn get(&self, key: StorageKey) -> Result<Option<String>, StoreError> {
        self.inner.get(key)
    }

    fn set(&self, key: StorageKey, value: &str) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) || *self.rejected_key.lock() == Some(key) {
            return Err(StoreError::AccessFailed(format!("write to {key} rejected")));
        }
        self.inner.set(key, value)
    }

    fn remove(&self, key: StorageKey) -> Result<(), StoreError> {
        if self.fail_removes.load(Ordering::SeqCst) {
            return Err(StoreError::AccessFailed(format!("remove of {key} rejected")));
        }
        self.inner.remove(key)
    }
}

/// Clock that only moves when told to
#[derive(Debug, Default)]
pub struct MockClock {
    now: AtomicI64,
}

impl MockClock {
    #[must_use]
    pub fn new(now: i64) -> Self {
        Self { now: AtomicI64::new(now) }
    }

    pub fn set(&self, now: i64) {
        self.now.store(now, Ordering::SeqCst);
    }

    pub fn advance(&self, secs: i64) {
        self.now.fetch_add(secs, Ordering::SeqCst);
    }
}

impl Clock for MockClock {
    fn now_unix(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}
