//! # keyflow-auth
//!
//! OAuth 2.0 Authorization Code + PKCE session client for public clients
//! talking to a Keycloak-style identity provider.
//!
//! ## Modules
//! - [`pkce`]: verifier, challenge and state generation (RFC 7636)
//! - [`token_manager`]: authorization URL, code exchange, refresh, logout
//! - [`interceptor`]: HTTP client that attaches the bearer token and retries
//!   once after a refresh on 401
//! - [`callback`]: one-shot handling of the provider redirect
//! - [`store`]: credential persistence (memory, platform keychain)
//! - [`config`]: provider configuration and loading
//!
//! ## Usage
//!
//! ```no_run
//! use keyflow_auth::{AuthConfig, AuthorizedClient, CallbackCoordinator, TokenLifecycleManager};
//!
//! # async fn run() -> Result<(), keyflow_auth::AuthError> {
//! let config = AuthConfig::new("http://localhost:8081", "master", "react-pkce-client");
//! let manager = TokenLifecycleManager::new(config)?;
//! manager.initialize()?;
//!
//! // 1. Send the browser to the provider
//! let login_url = manager.build_authorization_url()?;
//! println!("open {login_url}");
//!
//! // 2. Handle the redirect back
//! let callback = CallbackCoordinator::new(manager.clone());
//! let redirect = url::Url::parse("http://localhost:3000/callback?code=abc&state=xyz")
//!     .map_err(|e| keyflow_auth::AuthError::Config(e.to_string()))?;
//! callback.handle(&redirect).await;
//!
//! // 3. Call APIs with the session
//! let client = AuthorizedClient::new(manager.clone())?;
//! let response = client.send(client.get("http://localhost:8080/api/me")).await?;
//! println!("{}", response.status());
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]

pub mod callback;
pub mod clock;
pub mod config;
pub mod error;
pub mod interceptor;
pub mod jwt;
pub mod navigation;
pub mod pkce;
pub mod provider;
pub mod session;
pub mod store;
pub mod telemetry;
pub mod token_manager;
pub mod types;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use callback::{CallbackCoordinator, CallbackGuard, CallbackPhase, CallbackRoutes};
pub use clock::{Clock, SystemClock};
pub use config::{AuthConfig, ConfigError, HttpSettings};
pub use error::AuthError;
pub use interceptor::AuthorizedClient;
pub use navigation::{ChannelNavigator, LogNavigator, Navigator};
pub use pkce::PkceArtifact;
pub use provider::{HttpProviderClient, ProviderClient, ProviderError};
pub use session::SessionState;
#[cfg(feature = "keychain")]
pub use store::KeychainStore;
pub use store::{CredentialStore, MemoryStore, StorageKey, StoreError};
pub use token_manager::{TokenLifecycleManager, TokenLifecycleManagerBuilder};
pub use types::{SessionDiagnostics, SessionStatus, TokenResponse, TokenSet};
