//! Testing utilities and helpers
//!
//! Available to this crate's tests and, with the `test-utils` feature, to
//! integration tests and downstream crates:
//! - **[`mocks`]**: scripted provider, recording navigator, failing store,
//!   controllable clock
//! - **[`fixtures`]**: unsigned JWT builders
//!
//! ## Usage
//!
//! ```rust
//! # #[cfg(feature = "test-utils")]
//! # {
//! use keyflow_auth::clock::Clock;
//! use keyflow_auth::jwt;
//! use keyflow_auth::testing::{jwt_expiring_at, MockClock};
//!
//! let clock = MockClock::new(1_000);
//! let token = jwt_expiring_at(1_060);
//! assert!(!jwt::is_expired_at(&token, clock.now_unix()));
//! clock.advance(60);
//! assert!(jwt::is_expired_at(&token, clock.now_unix()));
//! # }
//! ```

pub mod fixtures;
pub mod mocks;

pub use fixtures::{expired_access_token, fresh_access_token, jwt_expiring_at, jwt_with_claims};
pub use mocks::{oauth_error, FailingStore, MockClock, MockProviderClient, RecordingNavigator};
