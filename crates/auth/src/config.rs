//! Identity provider configuration
//!
//! Static, process-wide settings for one OAuth client registration. Endpoint
//! URLs follow the Keycloak realm layout
//! (`{server_url}/realms/{realm}/protocol/openid-connect/...`).
//!
//! ## Loading Strategy
//! 1. Load a `.env` file if present (`dotenvy`)
//! 2. Attempt to build the config from environment variables
//! 3. If incomplete, fall back to a config file (TOML or JSON)
//!
//! ## Environment Variables
//! - `KEYFLOW_SERVER_URL`: Provider base URL (required)
//! - `KEYFLOW_REALM`: Realm / tenant identifier (required)
//! - `KEYFLOW_CLIENT_ID`: Public client identifier (required)
//! - `KEYFLOW_REDIRECT_URI`: Callback URI registered with the provider
//!   (required)
//! - `KEYFLOW_SCOPE`: Space-separated scopes (default `openid profile email`)
//! - `KEYFLOW_POST_LOGOUT_REDIRECT_URI`: Where the provider sends the user
//!   after logout
//! - `KEYFLOW_HTTP_TIMEOUT_SECS`: Provider request timeout in seconds

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::error::AuthError;

/// Configuration file names probed by [`load`] when no path is given.
const CONFIG_FILE_CANDIDATES: [&str; 4] =
    ["keyflow.toml", "keyflow.json", "config/keyflow.toml", "config/keyflow.json"];

/// Errors raised while loading or validating configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),

    #[error("Config file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML format: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid JSON format: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unsupported config format: {0}")]
    UnsupportedFormat(String),

    #[error("Invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl From<ConfigError> for AuthError {
    fn from(err: ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

/// HTTP settings for provider calls
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self { timeout_secs: 30 }
    }
}

impl HttpSettings {
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// OAuth client registration and provider location
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Provider base URL (e.g. `http://localhost:8081`)
    pub server_url: String,

    /// Realm or tenant identifier
    pub realm: String,

    /// Public client identifier (no secret is ever sent)
    pub client_id: String,

    /// Redirect URI the provider returns to with `code` and `state`
    pub redirect_uri: String,

    /// Requested scopes
    pub scopes: Vec<String>,

    /// Where the provider sends the browser after end-session
    pub post_logout_redirect_uri: String,

    /// Provider HTTP settings
    pub http: HttpSettings,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            server_url: "http://localhost:8081".to_string(),
            realm: "master".to_string(),
            client_id: "react-pkce-client".to_string(),
            redirect_uri: "http://localhost:3000/callback".to_string(),
            scopes: vec!["openid".to_string(), "profile".to_string(), "email".to_string()],
            post_logout_redirect_uri: "http://localhost:3000/".to_string(),
            http: HttpSettings::default(),
        }
    }
}

impl AuthConfig {
    /// Create a configuration for a provider, realm and client; the remaining
    /// fields keep their defaults.
    #[must_use]
    pub fn new(
        server_url: impl Into<String>,
        realm: impl Into<String>,
        client_id: impl Into<String>,
    ) -> Self {
        Self {
            server_url: server_url.into(),
            realm: realm.into(),
            client_id: client_id.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_redirect_uri(mut self, redirect_uri: impl Into<String>) -> Self {
        self.redirect_uri = redirect_uri.into();
        self
    }

    #[must_use]
    pub fn with_scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes = scopes.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_post_logout_redirect_uri(mut self, uri: impl Into<String>) -> Self {
        self.post_logout_redirect_uri = uri.into();
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.http.timeout_secs = timeout.as_secs();
        self
    }

    /// Base URL of the realm's OpenID Connect protocol endpoints
    #[must_use]
    pub fn protocol_base(&self) -> String {
        format!(
            "{}/realms/{}/protocol/openid-connect",
            self.server_url.trim_end_matches('/'),
            self.realm
        )
    }

    #[must_use]
    pub fn authorization_endpoint(&self) -> String {
        format!("{}/auth", self.protocol_base())
    }

    #[must_use]
    pub fn token_endpoint(&self) -> String {
        format!("{}/token", self.protocol_base())
    }

    #[must_use]
    pub fn userinfo_endpoint(&self) -> String {
        format!("{}/userinfo", self.protocol_base())
    }

    #[must_use]
    pub fn end_session_endpoint(&self) -> String {
        format!("{}/logout", self.protocol_base())
    }

    /// Scopes as the space-separated string sent to the provider
    #[must_use]
    pub fn scope_string(&self) -> String {
        self.scopes.join(" ")
    }

    /// Check that URLs parse and identifiers are present.
    ///
    /// # Errors
    /// Returns `ConfigError::Invalid` naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        parse_url("server_url", &self.server_url)?;
        parse_url("redirect_uri", &self.redirect_uri)?;
        parse_url("post_logout_redirect_uri", &self.post_logout_redirect_uri)?;

        if self.realm.trim().is_empty() {
            return Err(ConfigError::Invalid { field: "realm", reason: "must not be empty".into() });
        }
        if self.client_id.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "client_id",
                reason: "must not be empty".into(),
            });
        }
        if self.http.timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "http.timeout_secs",
                reason: "must be greater than zero".into(),
            });
        }
        Ok(())
    }

    /// Build a configuration from a variable lookup (environment by default).
    ///
    /// # Errors
    /// Returns `ConfigError::MissingVar` for absent required variables and
    /// `ConfigError::Invalid` for unparsable values.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required =
            |key: &str| lookup(key).ok_or_else(|| ConfigError::MissingVar(key.to_string()));

        let defaults = Self::default();
        let mut config = Self {
            server_url: required("KEYFLOW_SERVER_URL")?,
            realm: required("KEYFLOW_REALM")?,
            client_id: required("KEYFLOW_CLIENT_ID")?,
            redirect_uri: required("KEYFLOW_REDIRECT_URI")?,
            scopes: lookup("KEYFLOW_SCOPE")
                .map(|s| s.split_whitespace().map(ToOwned::to_owned).collect())
                .unwrap_or(defaults.scopes),
            post_logout_redirect_uri: lookup("KEYFLOW_POST_LOGOUT_REDIRECT_URI")
                .unwrap_or(defaults.post_logout_redirect_uri),
            http: defaults.http,
        };

        if let Some(raw) = lookup("KEYFLOW_HTTP_TIMEOUT_SECS") {
            config.http.timeout_secs = raw.parse().map_err(|e| ConfigError::Invalid {
                field: "KEYFLOW_HTTP_TIMEOUT_SECS",
                reason: format!("{e}"),
            })?;
        }

        config.validate()?;
        Ok(config)
    }
}

/// Load configuration with automatic fallback strategy
///
/// # Errors
/// Returns `ConfigError` if neither the environment nor any probed file
/// yields a valid configuration.
pub fn load() -> Result<AuthConfig, ConfigError> {
    if let Ok(path) = dotenvy::dotenv() {
        tracing::debug!(path = %path.display(), "Loaded .env file");
    }

    match load_from_env() {
        Ok(config) => {
            tracing::info!("Auth configuration loaded from environment variables");
            Ok(config)
        }
        Err(e) => {
            tracing::debug!(error = %e, "Failed to load auth config from environment, trying file");
            load_from_file(None)
        }
    }
}

/// Load configuration from `KEYFLOW_*` environment variables
///
/// # Errors
/// See [`AuthConfig::from_lookup`].
pub fn load_from_env() -> Result<AuthConfig, ConfigError> {
    AuthConfig::from_lookup(|key| std::env::var(key).ok())
}

/// Load configuration from a file, probing default locations when `path` is
/// `None`.
///
/// # Errors
/// Returns `ConfigError::NotFound` when no file exists, or a parse/validation
/// error for malformed content.
pub fn load_from_file(path: Option<PathBuf>) -> Result<AuthConfig, ConfigError> {
    let config_path = match path {
        Some(p) if p.exists() => p,
        Some(p) => return Err(ConfigError::NotFound(p)),
        None => CONFIG_FILE_CANDIDATES
            .iter()
            .map(PathBuf::from)
            .find(|candidate| candidate.exists())
            .ok_or_else(|| ConfigError::NotFound(PathBuf::from(CONFIG_FILE_CANDIDATES[0])))?,
    };

    tracing::info!(path = %config_path.display(), "Loading auth configuration from file");

    let contents = std::fs::read_to_string(&config_path)?;
    let config = parse_config(&contents, &config_path)?;
    config.validate()?;
    Ok(config)
}

/// Parse configuration content; the format is picked by file extension.
///
/// # Errors
/// Returns `ConfigError` if the format is unsupported or parsing fails.
pub fn parse_config(contents: &str, path: &Path) -> Result<AuthConfig, ConfigError> {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match extension {
        "toml" => Ok(toml::from_str(contents)?),
        "json" => Ok(serde_json::from_str(contents)?),
        other => Err(ConfigError::UnsupportedFormat(other.to_string())),
    }
}

fn parse_url(field: &'static str, value: &str) -> Result<Url, ConfigError> {
    Url::parse(value).map_err(|e| ConfigError::Invalid { field, reason: e.to_string() })
}
