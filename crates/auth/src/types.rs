//! OAuth 2.0 types and structures
//!
//! Token sets, provider responses and the session status reported by the
//! token lifecycle manager.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::jwt::{self, Claims};

/// Credentials obtained from the token endpoint
///
/// The access token is always present. Refresh and ID tokens are optional
/// because providers may omit them, notably on refresh responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSet {
    /// Bearer token (JWT) for API calls
    pub access_token: String,

    /// Opaque token used to obtain new access tokens
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    /// OpenID Connect ID token (JWT) carrying user claims
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
}

impl TokenSet {
    #[must_use]
    pub fn new(access_token: impl Into<String>) -> Self {
        Self { access_token: access_token.into(), refresh_token: None, id_token: None }
    }

    #[must_use]
    pub fn with_refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
        self.refresh_token = Some(refresh_token.into());
        self
    }

    #[must_use]
    pub fn with_id_token(mut self, id_token: impl Into<String>) -> Self {
        self.id_token = Some(id_token.into());
        self
    }

    /// Fold a refresh response into this set.
    ///
    /// The access token is always replaced; refresh and ID tokens only when
    /// the response carries them.
    #[must_use]
    pub fn merged_with(&self, response: TokenResponse) -> Self {
        Self {
            access_token: response.access_token,
            refresh_token: response.refresh_token.or_else(|| self.refresh_token.clone()),
            id_token: response.id_token.or_else(|| self.id_token.clone()),
        }
    }

    /// `exp` claim of the access token, if it decodes
    #[must_use]
    pub fn access_expires_at(&self) -> Option<i64> {
        jwt::expires_at(&self.access_token).ok()
    }
}

/// OAuth token response from the authorization server (RFC 6749 §5.1)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub id_token: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub scope: Option<String>,
}

impl TokenResponse {
    #[must_use]
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: None,
            id_token: None,
            token_type: Some("Bearer".to_string()),
            expires_in: None,
            scope: None,
        }
    }

    #[must_use]
    pub fn with_refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
        self.refresh_token = Some(refresh_token.into());
        self
    }

    #[must_use]
    pub fn with_id_token(mut self, id_token: impl Into<String>) -> Self {
        self.id_token = Some(id_token.into());
        self
    }
}

impl From<TokenResponse> for TokenSet {
    fn from(response: TokenResponse) -> Self {
        Self {
            access_token: response.access_token,
            refresh_token: response.refresh_token,
            id_token: response.id_token,
        }
    }
}

/// OAuth error response body (RFC 6749 §5.2)
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct OAuthErrorBody {
    pub error: String,
    pub error_description: Option<String>,
}

impl fmt::Display for OAuthErrorBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.error_description {
            Some(desc) => write!(f, "{}: {}", self.error, desc),
            None => write!(f, "{}", self.error),
        }
    }
}

/// Verifier and state of a login round-trip that has not completed yet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingAuthRequest {
    pub code_verifier: String,
    pub state: String,
}

/// Where the session stands, derived from persisted state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// No tokens and no login in flight
    Anonymous,
    /// Authorization redirect issued, waiting for the callback
    PendingAuth,
    /// Access token present and not expired
    Authenticated,
    /// Access token present but expired or undecodable
    Expired,
}

/// Snapshot of the session for debugging screens
///
/// Token values are never included; only presence flags and lengths.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionDiagnostics {
    pub status: SessionStatus,
    pub is_authenticated: bool,
    pub has_access_token: bool,
    pub has_refresh_token: bool,
    pub has_id_token: bool,
    pub has_user_info: bool,
    pub access_token_length: usize,
    pub id_token_length: usize,
    pub access_token_expires_at: Option<chrono::DateTime<chrono::Utc>>,
    pub user_info: Option<Claims>,
    pub populated_keys: Vec<&'static str>,
}
