//! PKCE (Proof Key for Code Exchange), RFC 7636
//!
//! Binds the authorization code to the client instance that requested it.
//! Only the S256 method is produced.

use crate::error::{OidcError, Result};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::{distributions::Alphanumeric, Rng};
use sha2::{Digest, Sha256};

const VERIFIER_LEN: usize = 64;
const VERIFIER_MIN_LEN: usize = 43;
const VERIFIER_MAX_LEN: usize = 128;

/// Verifier kept by the client, challenge sent in the authorization request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PkceParams {
    pub code_verifier: String,
    pub code_challenge: String,
}

impl PkceParams {
    /// Generate a fresh random verifier and its S256 challenge
    pub fn generate() -> Self {
        let code_verifier: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(VERIFIER_LEN)
            .map(char::from)
            .collect();

        let code_challenge = s256_challenge(&code_verifier);
        PkceParams {
            code_verifier,
            code_challenge,
        }
    }

    /// Rebuild parameters from a verifier persisted across the redirect
    pub fn from_verifier(code_verifier: impl Into<String>) -> Result<Self> {
        let code_verifier = code_verifier.into();

        let len_ok = (VERIFIER_MIN_LEN..=VERIFIER_MAX_LEN).contains(&code_verifier.len());
        let charset_ok = code_verifier
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_' | '~'));
        if !len_ok || !charset_ok {
            return Err(OidcError::Config(
                "PKCE code verifier must be 43-128 unreserved characters".to_string(),
            ));
        }

        let code_challenge = s256_challenge(&code_verifier);
        Ok(PkceParams {
            code_verifier,
            code_challenge,
        })
    }
}

/// BASE64URL(SHA256(verifier))
fn s256_challenge(code_verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(code_verifier.as_bytes()))
}
