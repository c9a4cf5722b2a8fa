//! JWT fixtures
//!
//! Tokens are structurally valid (`header.payload.signature`, base64url
//! without padding) but unsigned; this crate never verifies signatures.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use serde_json::{json, Value};

/// Build a token whose payload is `claims`
#[must_use]
pub fn jwt_with_claims(claims: &Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{header}.{payload}.unsigned")
}

/// Build a token for `user-1` expiring at `exp` (Unix seconds)
#[must_use]
pub fn jwt_expiring_at(exp: i64) -> String {
    jwt_with_claims(&json!({ "sub": "user-1", "exp": exp }))
}

/// Access token valid for another hour of wall-clock time
#[must_use]
pub fn fresh_access_token() -> String {
    jwt_expiring_at(Utc::now().timestamp() + 3_600)
}

/// Access token that expired long ago
#[must_use]
pub fn expired_access_token() -> String {
    jwt_expiring_at(1)
}
