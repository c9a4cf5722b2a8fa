//! Authorized HTTP client with refresh-and-retry
//!
//! [`AuthorizedClient`] decorates a `reqwest::Client`:
//! - outbound requests get `Authorization: Bearer <access token>` while the
//!   session is authenticated
//! - a 401 triggers one refresh and one resend with the new token
//! - a failed refresh, or a second 401, ends the session
//!
//! Calls to the token endpoint itself are never decorated or retried.

use reqwest::header::{HeaderValue, AUTHORIZATION};
use reqwest::{Client, IntoUrl, Method, Request, RequestBuilder, Response, StatusCode};
use tracing::{debug, warn};
use url::Url;

use crate::error::AuthError;
use crate::token_manager::TokenLifecycleManager;

/// HTTP client that authenticates requests with the managed session
#[derive(Debug, Clone)]
pub struct AuthorizedClient {
    http: Client,
    manager: TokenLifecycleManager,
    token_endpoint: Url,
}

impl AuthorizedClient {
    /// Wrap a new `reqwest::Client` using the manager's timeout
    ///
    /// # Errors
    /// Returns `AuthError::Transport` if the client cannot be built, or
    /// `AuthError::Config` if the token endpoint is not a valid URL
    pub fn new(manager: TokenLifecycleManager) -> Result<Self, AuthError> {
        let http = Client::builder()
            .timeout(manager.config().http.timeout())
            .build()
            .map_err(|e| AuthError::Transport(format!("Failed to build HTTP client: {e}")))?;
        Self::with_http_client(manager, http)
    }

    /// Wrap an existing `reqwest::Client`
    ///
    /// # Errors
    /// Returns `AuthError::Config` if the token endpoint is not a valid URL
    pub fn with_http_client(
        manager: TokenLifecycleManager,
        http: Client,
    ) -> Result<Self, AuthError> {
        let token_endpoint = Url::parse(&manager.config().token_endpoint())
            .map_err(|e| AuthError::Config(format!("Invalid token endpoint: {e}")))?;
        Ok(Self { http, manager, token_endpoint })
    }

    #[must_use]
    pub fn manager(&self) -> &TokenLifecycleManager {
        &self.manager
    }

    /// Create a request builder on the underlying client; pass it to
    /// [`send`](Self::send).
    pub fn request<U: IntoUrl>(&self, method: Method, url: U) -> RequestBuilder {
        self.http.request(method, url)
    }

    pub fn get<U: IntoUrl>(&self, url: U) -> RequestBuilder {
        self.http.get(url)
    }

    pub fn post<U: IntoUrl>(&self, url: U) -> RequestBuilder {
        self.http.post(url)
    }

    /// Send a request with the session's bearer token.
    ///
    /// On 401 the session is refreshed and the request resent once. Requests
    /// whose body cannot be cloned are never resent: the session is still
    /// refreshed and the original 401 returned.
    ///
    /// # Errors
    /// - `AuthError::Transport` if a request cannot be built or sent
    /// - the refresh error (`NoRefreshToken` / `RefreshFailed`) after logging
    ///   out, when the 401 could not be recovered
    pub async fn send(&self, builder: RequestBuilder) -> Result<Response, AuthError> {
        let retry_builder = builder.try_clone();
        let mut request = builder.build().map_err(transport)?;

        let refresh_call = self.is_refresh_call(request.url());
        if !refresh_call {
            if let Some(header) = self.manager.authorization_header() {
                request.headers_mut().insert(AUTHORIZATION, bearer_value(&header)?);
            }
        }

        let response = self.execute(request).await?;
        if response.status() != StatusCode::UNAUTHORIZED || refresh_call {
            return Ok(response);
        }

        let Some(retry_builder) = retry_builder else {
            warn!("Unauthorized response for a request that cannot be resent");
            self.refresh_or_logout().await?;
            return Ok(response);
        };

        debug!("Unauthorized response, refreshing session and retrying once");
        let access_token = self.refresh_or_logout().await?;

        let mut retry = retry_builder.build().map_err(transport)?;
        retry.headers_mut().insert(AUTHORIZATION, bearer_value(&format!("Bearer {access_token}"))?);

        let retried = self.execute(retry).await?;
        if retried.status() == StatusCode::UNAUTHORIZED {
            warn!("Retried request still unauthorized, logging out");
            self.manager.logout();
        }
        Ok(retried)
    }

    async fn refresh_or_logout(&self) -> Result<String, AuthError> {
        match self.manager.refresh().await {
            Ok(access_token) => Ok(access_token),
            Err(e) => {
                warn!(error = %e, "Session refresh failed, logging out");
                self.manager.logout();
                Err(e)
            }
        }
    }

    async fn execute(&self, request: Request) -> Result<Response, AuthError> {
        let method = request.method().clone();
        let url = request.url().clone();
        debug!(%method, url = %without_query(&url), "sending HTTP request");

        let response = self.http.execute(request).await.map_err(transport)?;
        debug!(%method, status = %response.status(), "received HTTP response");
        Ok(response)
    }

    /// A refresh call targets the token endpoint (same origin and path).
    fn is_refresh_call(&self, url: &Url) -> bool {
        url.origin() == self.token_endpoint.origin()
            && url.path().trim_end_matches('/') == self.token_endpoint.path().trim_end_matches('/')
    }
}

fn transport(err: reqwest::Error) -> AuthError {
    AuthError::Transport(err.to_string())
}

fn bearer_value(header: &str) -> Result<HeaderValue, AuthError> {
    let mut value = HeaderValue::from_str(header)
        .map_err(|e| AuthError::Transport(format!("Invalid authorization header: {e}")))?;
    value.set_sensitive(true);
    Ok(value)
}

fn without_query(url: &Url) -> String {
    let mut shown = url.clone();
    shown.set_query(None);
    shown.to_string()
}
