//! Unverified JWT payload decoding
//!
//! Tokens are only inspected, never trusted for authorization decisions on
//! this side: the payload segment is base64url-decoded and parsed as a JSON
//! object. Signatures are not checked; integrity relies on the TLS channel to
//! the provider.

use base64::alphabet;
use base64::engine::general_purpose::GeneralPurposeConfig;
use base64::engine::{DecodePaddingMode, GeneralPurpose};
use base64::Engine;
use serde_json::{Map, Value};

use crate::error::AuthError;

/// Decoded JWT claim set
pub type Claims = Map<String, Value>;

/// base64url that tolerates both padded and unpadded segments.
const URL_SAFE_LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Decode the claims of a `header.payload.signature` token.
///
/// # Errors
/// Returns `AuthError::InvalidJwt` if the token does not have three segments,
/// the payload is not base64url, or it is not a JSON object.
pub fn decode_claims(token: &str) -> Result<Claims, AuthError> {
    let segments: Vec<&str> = token.split('.').collect();
    let [_, payload, _] = segments.as_slice() else {
        return Err(AuthError::InvalidJwt(format!("expected 3 segments, found {}", segments.len())));
    };
    if payload.is_empty() {
        return Err(AuthError::InvalidJwt("empty payload segment".to_string()));
    }

    let bytes = URL_SAFE_LENIENT
        .decode(payload)
        .map_err(|e| AuthError::InvalidJwt(format!("payload is not base64url: {e}")))?;

    match serde_json::from_slice::<Value>(&bytes) {
        Ok(Value::Object(claims)) => Ok(claims),
        Ok(_) => Err(AuthError::InvalidJwt("payload is not a JSON object".to_string())),
        Err(e) => Err(AuthError::InvalidJwt(format!("payload is not JSON: {e}"))),
    }
}

/// Raw `exp` claim; NumericDate may be fractional.
fn exp_claim(token: &str) -> Result<f64, AuthError> {
    let claims = decode_claims(token)?;
    claims
        .get("exp")
        .ok_or_else(|| AuthError::InvalidJwt("missing exp claim".into()))?
        .as_f64()
        .ok_or_else(|| AuthError::InvalidJwt("exp claim is not numeric".to_string()))
}

/// Read the `exp` claim as whole Unix seconds, rounded down.
///
/// Use [`is_expired_at`] for expiry decisions; it keeps fractional seconds.
///
/// # Errors
/// Returns `AuthError::InvalidJwt` if the token cannot be decoded or carries
/// no numeric `exp`.
pub fn expires_at(token: &str) -> Result<i64, AuthError> {
    exp_claim(token).map(|secs| secs.floor() as i64)
}

/// `true` unless the token decodes and its `exp` is strictly after `now`.
#[must_use]
pub fn is_expired_at(token: &str, now: i64) -> bool {
    match exp_claim(token) {
        Ok(exp) => exp <= now as f64,
        Err(_) => true,
    }
}
