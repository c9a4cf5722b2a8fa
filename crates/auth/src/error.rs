//! Error taxonomy for the PKCE session client
//!
//! Every failure that crosses the public API is an [`AuthError`]. Transport
//! and storage failures are wrapped at the boundary where they happen so that
//! callers never see raw `reqwest` or keychain errors.
//!
//! # Propagation policy
//!
//! | Variant | Raised by | Caller action |
//! |---------|-----------|---------------|
//! | `StateMismatch` | code exchange | restart login |
//! | `MissingVerifier` | code exchange | restart login |
//! | `MissingAuthorizationCode` / `Provider` | callback | restart login |
//! | `TokenExchangeFailed` | code exchange | retry or restart |
//! | `NoRefreshToken` / `RefreshFailed` | refresh | caller decides on logout |
//! | `InvalidJwt` | JWT decoding | treated as "not authenticated" |
//! | `Entropy` | PKCE generation | abort login |

use thiserror::Error;

/// Errors surfaced by the token lifecycle, interceptor and callback flows.
///
/// The enum is `Clone` so that a single refresh result can be shared between
/// concurrent waiters.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// Callback `state` did not match the persisted pending request (CSRF).
    #[error("Invalid state parameter")]
    StateMismatch,

    /// No code verifier was persisted for the pending login.
    #[error("Code verifier not found")]
    MissingVerifier,

    /// The redirect landed without an authorization code.
    #[error("Authorization code not received")]
    MissingAuthorizationCode,

    /// The identity provider redirected back with an `error` parameter.
    #[error("{}", provider_message(.error, .description))]
    Provider { error: String, description: Option<String> },

    /// The token endpoint rejected the authorization code or was unreachable.
    #[error("Failed to exchange authorization code for tokens: {0}")]
    TokenExchangeFailed(String),

    /// Refresh was requested but no refresh token is stored.
    #[error("No refresh token available")]
    NoRefreshToken,

    /// The token endpoint rejected the refresh token or was unreachable.
    #[error("Failed to refresh token: {0}")]
    RefreshFailed(String),

    /// A token could not be decoded as a JWT payload.
    #[error("Invalid JWT: {0}")]
    InvalidJwt(String),

    /// The operating system random source failed.
    #[error("Secure random source unavailable: {0}")]
    Entropy(String),

    /// The credential store could not be read or written.
    #[error("Credential storage error: {0}")]
    Storage(String),

    /// Configuration is missing or malformed.
    #[error("Configuration error: {0}")]
    Config(String),

    /// An HTTP request could not be built or sent.
    #[error("HTTP transport error: {0}")]
    Transport(String),
}

fn provider_message(error: &str, description: &Option<String>) -> String {
    description.clone().unwrap_or_else(|| error.to_string())
}

impl AuthError {
    /// Whether the current login attempt is unrecoverable and the user has to
    /// start over from the authorization redirect.
    #[must_use]
    pub fn requires_login(&self) -> bool {
        matches!(
            self,
            Self::StateMismatch
                | Self::MissingVerifier
                | Self::MissingAuthorizationCode
                | Self::Provider { .. }
                | Self::NoRefreshToken
        )
    }

    /// Whether repeating the same operation may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TokenExchangeFailed(_) | Self::RefreshFailed(_) | Self::Transport(_))
    }

    /// Generic notice for surfaces that must not show raw failure details.
    #[must_use]
    pub fn user_message(&self) -> &'static str {
        if self.requires_login() {
            "Your sign-in could not be completed. Please log in again."
        } else {
            "Something went wrong while talking to the sign-in service. Please try again."
        }
    }
}
