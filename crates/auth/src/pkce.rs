//! PKCE (Proof Key for Code Exchange) implementation for OAuth 2.0
//!
//! Implements RFC 7636 for authorization without client secrets. Random
//! material comes from the operating system CSPRNG; if it is unavailable the
//! login attempt is aborted rather than falling back to a weaker source.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::error::AuthError;

const VERIFIER_BYTES: usize = 32;
const STATE_BYTES: usize = 16;

/// Only supported challenge method
pub const CHALLENGE_METHOD: &str = "S256";

fn random_url_safe(len: usize) -> Result<String, AuthError> {
    let mut bytes = vec![0u8; len];
    OsRng.try_fill_bytes(&mut bytes).map_err(|e| AuthError::Entropy(e.to_string()))?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}

/// Generate a cryptographically secure code verifier
///
/// Returns 32 random bytes as unpadded base64url (43 characters), within the
/// RFC 7636 43-128 limit.
///
/// # Errors
/// Returns `AuthError::Entropy` if the OS random source fails
pub fn generate_code_verifier() -> Result<String, AuthError> {
    random_url_safe(VERIFIER_BYTES)
}

/// Derive the code challenge: `BASE64URL(SHA256(ASCII(code_verifier)))`
#[must_use]
pub fn generate_code_challenge(verifier: &str) -> String {
    let hash = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hash)
}

/// Generate a random state token for CSRF binding
///
/// 16 random bytes as unpadded base64url (22 characters).
///
/// # Errors
/// Returns `AuthError::Entropy` if the OS random source fails
pub fn generate_state() -> Result<String, AuthError> {
    random_url_safe(STATE_BYTES)
}

/// Exact comparison of the state sent out with the state received back
#[must_use]
pub fn validate_state(expected: &str, actual: &str) -> bool {
    expected == actual
}

/// PKCE material for one login attempt
///
/// The verifier and state are persisted as the pending auth request; the
/// challenge is only sent once, in the authorization URL.
#[derive(Debug, Clone)]
pub struct PkceArtifact {
    /// Secret kept until token exchange
    pub code_verifier: String,

    /// SHA-256 of the verifier, sent in the authorization request
    pub code_challenge: String,

    /// CSRF token that must round-trip through the provider unchanged
    pub state: String,
}

impl PkceArtifact {
    /// Generate a fresh verifier, challenge and state
    ///
    /// # Examples
    /// ```
    /// use keyflow_auth::pkce::PkceArtifact;
    ///
    /// let artifact = PkceArtifact::generate().expect("OS entropy");
    /// assert_eq!(artifact.code_verifier.len(), 43);
    /// assert_eq!(artifact.challenge_method(), "S256");
    /// ```
    ///
    /// # Errors
    /// Returns `AuthError::Entropy` if the OS random source fails
    pub fn generate() -> Result<Self, AuthError> {
        let code_verifier = generate_code_verifier()?;
        let code_challenge = generate_code_challenge(&code_verifier);
        let state = generate_state()?;

        Ok(Self { code_verifier, code_challenge, state })
    }

    #[must_use]
    pub fn challenge_method(&self) -> &'static str {
        CHALLENGE_METHOD
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for pkce.
    use super::*;

    fn is_url_safe(value: &str) -> bool {
        value.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    }

    #[test]
    fn test_generate_artifact_lengths() {
        let artifact = PkceArtifact::generate().expect("Failed to generate artifact");

        assert_eq!(artifact.code_verifier.len(), 43);
        assert_eq!(artifact.code_challenge.len(), 43);
        assert_eq!(artifact.state.len(), 22);
    }

    #[test]
    fn test_unique_artifacts() {
        let first = PkceArtifact::generate().expect("Failed to generate artifact 1");
        let second = PkceArtifact::generate().expect("Failed to generate artifact 2");

        assert_ne!(first.code_verifier, second.code_verifier);
        assert_ne!(first.code_challenge, second.code_challenge);
        assert_ne!(first.state, second.state);
    }

    #[test]
    fn test_base64url_without_padding() {
        let artifact = PkceArtifact::generate().expect("Failed to generate artifact");

        for value in [&artifact.code_verifier, &artifact.code_challenge, &artifact.state] {
            assert!(!value.contains('='));
            assert!(is_url_safe(value), "{value} contains non url-safe characters");
        }
    }

    #[test]
    fn test_challenge_is_sha256_of_verifier() {
        let verifier = generate_code_verifier().expect("verifier");
        let challenge = generate_code_challenge(&verifier);

        let decoded = URL_SAFE_NO_PAD.decode(&challenge).expect("challenge decodes");
        assert_eq!(decoded.as_slice(), Sha256::digest(verifier.as_bytes()).as_slice());
        assert_eq!(challenge, generate_code_challenge(&verifier));
    }

    #[test]
    fn test_rfc7636_appendix_b_vector() {
        let verifier = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
        let expected = "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM";
        assert_eq!(generate_code_challenge(verifier), expected);
    }

    #[test]
    fn test_validate_state_exact_match() {
        assert!(validate_state("xyz", "xyz"));
        assert!(!validate_state("xyz", "XYZ"));
        assert!(!validate_state("xyz", ""));
    }
}
