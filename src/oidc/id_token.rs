//! ID token validation
//!
//! Verifies the ID token returned by the token endpoint: signature against the
//! provider's JWKS, then issuer, audience, expiry and nonce. Any failure is
//! terminal; there is no partially validated identity.

use super::{ClientConfig, DiscoveryDocument, ProviderKeys, TokenResponse};
use crate::error::{OidcError, Result};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::jwk::Jwk;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

const UNSIGNED_ALGORITHM: &str = "none";

/// `aud` is either a single string or an array of strings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Audience {
    Single(String),
    Multiple(Vec<String>),
}

impl Audience {
    pub fn contains(&self, value: &str) -> bool {
        match self {
            Audience::Single(s) => s == value,
            Audience::Multiple(v) => v.iter().any(|s| s == value),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Audience::Single(_) => 1,
            Audience::Multiple(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Claims carried by an ID token
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdTokenClaims {
    pub iss: String,
    pub sub: String,
    pub aud: Audience,
    pub exp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub azp: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// How the token's integrity was established
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignatureCheck {
    /// Signature verified with the JWK identified by `kid`
    Verified { kid: Option<String>, algorithm: String },
    /// Provider advertises `none` and the token carried no signature
    Unsigned,
}

/// Outcome of a successful validation
#[derive(Debug, Clone)]
pub struct ValidatedIdentity {
    pub claims: IdTokenClaims,
    pub token_response: TokenResponse,
    pub signature: SignatureCheck,
}

impl ValidatedIdentity {
    pub fn subject(&self) -> &str {
        &self.claims.sub
    }

    pub fn access_token(&self) -> &str {
        &self.token_response.access_token
    }
}

#[derive(Debug, Deserialize)]
struct JoseHeader {
    alg: String,
    #[serde(default)]
    kid: Option<String>,
}

/// Compact serialization split into its decoded parts
struct ParsedToken<'a> {
    header: JoseHeader,
    claims: IdTokenClaims,
    signature: &'a str,
}

fn decode_segment<T: DeserializeOwned>(segment: &str, what: &str) -> Result<T> {
    let bytes = URL_SAFE_NO_PAD
        .decode(segment.trim_end_matches('='))
        .map_err(|e| OidcError::MalformedToken(format!("Invalid {} encoding: {}", what, e)))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| OidcError::MalformedToken(format!("Invalid {}: {}", what, e)))
}

fn parse_token(token: &str) -> Result<ParsedToken<'_>> {
    let mut segments = token.split('.');
    let (Some(header), Some(claims), Some(signature), None) = (
        segments.next(),
        segments.next(),
        segments.next(),
        segments.next(),
    ) else {
        return Err(OidcError::MalformedToken(
            "ID token is not a compact JWS".to_string(),
        ));
    };

    Ok(ParsedToken {
        header: decode_segment(header, "header")?,
        claims: decode_segment(claims, "claims")?,
        signature,
    })
}

/// Pick the JWK that must have signed a token with header `kid`
///
/// An exact `kid` match always wins. Without one, a provider that published
/// exactly one key yields that key. An empty set, several published keys or a
/// `kid` naming a skipped entry never do.
pub fn resolve_signing_key<'a>(jwks: &'a ProviderKeys, kid: Option<&str>) -> Result<&'a Jwk> {
    if let Some(kid) = kid {
        if let Some(jwk) = jwks
            .keys
            .iter()
            .find(|k| k.common.key_id.as_deref() == Some(kid))
        {
            return Ok(jwk);
        }
    }

    match jwks.keys.as_slice() {
        [only] if jwks.is_single_key() => {
            tracing::debug!(
                "No JWK matches kid {:?}, using the provider's only key {:?}",
                kid,
                only.common.key_id
            );
            Ok(only)
        }
        _ => Err(OidcError::KeyNotFound {
            kid: kid.map(str::to_string),
        }),
    }
}

fn verify_signature(token: &str, header: &JoseHeader, jwk: &Jwk) -> Result<()> {
    let algorithm: Algorithm = header.alg.parse().map_err(|_| {
        OidcError::InvalidSignature(format!("Unsupported signing algorithm {}", header.alg))
    })?;

    // A key published for one algorithm must not verify another
    if let Some(key_alg) = jwk.common.key_algorithm.as_ref() {
        let key_alg = serde_json::to_value(key_alg)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default();
        if key_alg != header.alg {
            return Err(OidcError::InvalidSignature(format!(
                "Key {:?} is for {}, token is signed with {}",
                jwk.common.key_id, key_alg, header.alg
            )));
        }
    }

    let key = DecodingKey::from_jwk(jwk)
        .map_err(|e| OidcError::InvalidSignature(format!("Unusable signing key: {}", e)))?;

    // Claims are checked separately so each mismatch surfaces as its own error
    let mut validation = Validation::new(algorithm);
    validation.validate_exp = false;
    validation.validate_nbf = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();

    decode::<serde_json::Value>(token, &key, &validation)
        .map(|_| ())
        .map_err(|e| match e.kind() {
            ErrorKind::InvalidToken | ErrorKind::Base64(_) | ErrorKind::Json(_) | ErrorKind::Utf8(_) => {
                OidcError::MalformedToken(e.to_string())
            }
            _ => OidcError::InvalidSignature(e.to_string()),
        })
}

/// Accept an unsigned token; only for providers that declare they issue them
fn accept_unsigned(parsed: &ParsedToken<'_>, discovery: &DiscoveryDocument) -> Result<()> {
    if !discovery.allows_unsigned_id_tokens() {
        return Err(OidcError::InvalidSignature(format!(
            "Unsigned ID token from {}, which does not advertise alg none",
            discovery.issuer
        )));
    }

    if !parsed.signature.is_empty() {
        return Err(OidcError::InvalidSignature(
            "Token with alg none carries a signature".to_string(),
        ));
    }

    tracing::warn!(
        "Accepting unsigned ID token from {} without signature verification",
        discovery.issuer
    );
    Ok(())
}

fn validate_claims(
    claims: &IdTokenClaims,
    client: &ClientConfig,
    discovery: &DiscoveryDocument,
    expected_nonce: Option<&str>,
    now: i64,
    leeway: i64,
) -> Result<()> {
    if claims.iss != discovery.issuer {
        return Err(OidcError::IssuerMismatch {
            expected: discovery.issuer.clone(),
            actual: claims.iss.clone(),
        });
    }

    let audience_ok = claims.aud.contains(&client.id)
        && match claims.azp.as_deref() {
            Some(azp) => azp == client.id,
            None => claims.aud.len() == 1,
        };
    if !audience_ok {
        return Err(OidcError::AudienceMismatch {
            client_id: client.id.clone(),
        });
    }

    if now > claims.exp.saturating_add(leeway) {
        return Err(OidcError::TokenExpired { exp: claims.exp });
    }

    if let Some(expected) = expected_nonce {
        if claims.nonce.as_deref() != Some(expected) {
            return Err(OidcError::NonceMismatch);
        }
    }

    Ok(())
}

/// Validate the ID token in `token_response`
///
/// `leeway_secs` is the tolerated clock skew for the expiry check.
pub fn validate(
    token_response: TokenResponse,
    client: &ClientConfig,
    discovery: &DiscoveryDocument,
    jwks: &ProviderKeys,
    expected_nonce: Option<&str>,
    leeway_secs: i64,
) -> Result<ValidatedIdentity> {
    validate_at(
        token_response,
        client,
        discovery,
        jwks,
        expected_nonce,
        chrono::Utc::now().timestamp(),
        leeway_secs,
    )
}

pub(crate) fn validate_at(
    token_response: TokenResponse,
    client: &ClientConfig,
    discovery: &DiscoveryDocument,
    jwks: &ProviderKeys,
    expected_nonce: Option<&str>,
    now: i64,
    leeway_secs: i64,
) -> Result<ValidatedIdentity> {
    let token = token_response.id_token.as_str();
    let parsed = parse_token(token)?;

    let signature = if parsed.header.alg == UNSIGNED_ALGORITHM {
        accept_unsigned(&parsed, discovery)?;
        SignatureCheck::Unsigned
    } else {
        let kid = parsed.header.kid.as_deref();
        let jwk = resolve_signing_key(jwks, kid)?;
        verify_signature(token, &parsed.header, jwk)?;
        SignatureCheck::Verified {
            kid: jwk.common.key_id.clone(),
            algorithm: parsed.header.alg.clone(),
        }
    };

    validate_claims(
        &parsed.claims,
        client,
        discovery,
        expected_nonce,
        now,
        leeway_secs,
    )?;

    tracing::debug!("ID token validated for subject {}", parsed.claims.sub);
    let claims = parsed.claims;
    Ok(ValidatedIdentity {
        claims,
        token_response,
        signature,
    })
}
