//! Tracing subscriber setup for host applications and examples
//!
//! The library itself only emits `tracing` events; installing a subscriber is
//! the host's choice. [`init_tracing`] is a convenience for hosts that have
//! no subscriber of their own.

use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "keyflow_auth=info";

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Plain,
    Json,
}

impl LogFormat {
    /// `json` selects JSON output; anything else is plain text.
    #[must_use]
    pub fn from_env_value(value: &str) -> Self {
        if value.eq_ignore_ascii_case("json") {
            Self::Json
        } else {
            Self::Plain
        }
    }

    /// Format from `KEYFLOW_LOG_FORMAT`
    #[must_use]
    pub fn from_env() -> Self {
        std::env::var("KEYFLOW_LOG_FORMAT").map(|v| Self::from_env_value(&v)).unwrap_or_default()
    }
}

/// Install a global fmt subscriber filtered by `RUST_LOG`.
///
/// Returns `false` if a global subscriber was already set; the existing one
/// is left in place.
pub fn init_tracing(format: LogFormat) -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_FILTER.into());
    let registry = tracing_subscriber::registry().with(filter);

    let result = match format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).try_init(),
        LogFormat::Plain => registry.with(tracing_subscriber::fmt::layer()).try_init(),
    };
    result.is_ok()
}
