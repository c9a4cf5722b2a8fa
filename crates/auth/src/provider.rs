//! Identity provider HTTP client
//!
//! Talks to the realm's token and userinfo endpoints:
//! - authorization code exchange with the PKCE verifier
//! - refresh token grant
//! - userinfo lookup with a bearer token
//!
//! The client is public: no client secret is ever sent.

use async_trait::async_trait;
use reqwest::Client;
use thiserror::Error;
use tracing::debug;

use crate::config::AuthConfig;
use crate::error::AuthError;
use crate::jwt::Claims;
use crate::types::{OAuthErrorBody, TokenResponse};

/// Error type for provider calls
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The request could not be sent or the response not read
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    /// The provider answered with an OAuth error body
    #[error("OAuth error: {0}")]
    OAuth(OAuthErrorBody),

    /// Non-success status without a recognizable error body
    #[error("Provider returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// Success status but the body was not what we expected
    #[error("Parse error: {0}")]
    Parse(String),
}

/// Operations against the identity provider
///
/// Mocked in tests; [`HttpProviderClient`] is the real implementation.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    /// Exchange an authorization code and its PKCE verifier for tokens.
    async fn exchange_code(
        &self,
        code: &str,
        code_verifier: &str,
    ) -> Result<TokenResponse, ProviderError>;

    /// Obtain a new access token with a refresh token.
    async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse, ProviderError>;

    /// Fetch the user profile for an access token.
    async fn user_info(&self, access_token: &str) -> Result<Claims, ProviderError>;
}

/// `reqwest`-based provider client
#[derive(Debug, Clone)]
pub struct HttpProviderClient {
    config: AuthConfig,
    client: Client,
}

impl HttpProviderClient {
    /// Create a client with the configured request timeout
    ///
    /// # Errors
    /// Returns `AuthError::Transport` if the HTTP client cannot be built
    pub fn new(config: AuthConfig) -> Result<Self, AuthError> {
        let client = Client::builder()
            .timeout(config.http.timeout())
            .build()
            .map_err(|e| AuthError::Transport(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self { config, client })
    }

    /// Create a client around an existing `reqwest::Client`
    #[must_use]
    pub fn with_http_client(config: AuthConfig, client: Client) -> Self {
        Self { config, client }
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    async fn post_token_form(&self, form: &[(&str, &str)]) -> Result<TokenResponse, ProviderError> {
        let response = self.client.post(self.config.token_endpoint()).form(form).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(error_from_body(status.as_u16(), &response.text().await?));
        }

        response.json::<TokenResponse>().await.map_err(|e| ProviderError::Parse(e.to_string()))
    }
}

/// Prefer the RFC 6749 error body; fall back to the raw status and text.
fn error_from_body(status: u16, body: &str) -> ProviderError {
    match serde_json::from_str::<OAuthErrorBody>(body) {
        Ok(error) => ProviderError::OAuth(error),
        Err(_) => ProviderError::Status { status, body: body.to_string() },
    }
}

#[async_trait]
impl ProviderClient for HttpProviderClient {
    async fn exchange_code(
        &self,
        code: &str,
        code_verifier: &str,
    ) -> Result<TokenResponse, ProviderError> {
        debug!(endpoint = %self.config.token_endpoint(), "Exchanging authorization code");

        let form = [
            ("grant_type", "authorization_code"),
            ("client_id", self.config.client_id.as_str()),
            ("code", code),
            ("redirect_uri", self.config.redirect_uri.as_str()),
            ("code_verifier", code_verifier),
        ];
        self.post_token_form(&form).await
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse, ProviderError> {
        debug!(endpoint = %self.config.token_endpoint(), "Refreshing access token");

        let form = [
            ("grant_type", "refresh_token"),
            ("client_id", self.config.client_id.as_str()),
            ("refresh_token", refresh_token),
        ];
        self.post_token_form(&form).await
    }

    async fn user_info(&self, access_token: &str) -> Result<Claims, ProviderError> {
        let response = self
            .client
            .get(self.config.userinfo_endpoint())
            .bearer_auth(access_token)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(error_from_body(status.as_u16(), &response.text().await?));
        }

        response.json::<Claims>().await.map_err(|e| ProviderError::Parse(e.to_string()))
    }
}
