//! OIDC provider discovery
//!
//! Fetches provider metadata from /.well-known/openid-configuration and the
//! provider's JWKS, caching both under keys derived from the provider URI.

use crate::cache::Cache;
use crate::error::{OidcError, Result};
use crate::transport::{self, Transport};
use jsonwebtoken::jwk::Jwk;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

const WELL_KNOWN_PATH: &str = "/.well-known/openid-configuration";

/// Provider metadata
///
/// `issuer`, `authorization_endpoint`, `token_endpoint` and `jwks_uri` are
/// required; a document without them never leaves this module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryDocument {
    pub issuer: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub jwks_uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub userinfo_endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registration_endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scopes_supported: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub response_types_supported: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub id_token_signing_alg_values_supported: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub token_endpoint_auth_methods_supported: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub claims_supported: Vec<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl DiscoveryDocument {
    /// Parse and validate a discovery document body
    pub fn from_json(body: &[u8]) -> Result<Self> {
        let document: DiscoveryDocument = serde_json::from_slice(body)
            .map_err(|e| OidcError::MalformedDocument(e.to_string()))?;

        // Present-but-empty is as useless as absent
        for (field, value) in [
            ("issuer", &document.issuer),
            ("authorization_endpoint", &document.authorization_endpoint),
            ("token_endpoint", &document.token_endpoint),
            ("jwks_uri", &document.jwks_uri),
        ] {
            if value.is_empty() {
                return Err(OidcError::MalformedDocument(format!(
                    "OIDC configuration has empty {}",
                    field
                )));
            }
        }

        Ok(document)
    }

    /// Whether the provider declares it issues unsigned ID tokens
    pub fn allows_unsigned_id_tokens(&self) -> bool {
        self.id_token_signing_alg_values_supported
            .iter()
            .any(|alg| alg == "none")
    }
}

/// A provider's signing keys
///
/// `keys` holds the entries this client can use. `published` counts every
/// entry the provider listed, including the skipped ones, so a set that only
/// looks like a single key is never mistaken for one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderKeys {
    pub keys: Vec<Jwk>,
    pub published: usize,
}

impl ProviderKeys {
    /// Whether the provider published exactly one key and it is usable
    pub fn is_single_key(&self) -> bool {
        self.published == 1 && self.keys.len() == 1
    }
}

/// Parse a JWKS body, skipping keys this client cannot use
pub fn parse_jwks(body: &[u8]) -> Result<ProviderKeys> {
    #[derive(Deserialize)]
    struct RawJwkSet {
        keys: Vec<serde_json::Value>,
    }

    let raw: RawJwkSet = serde_json::from_slice(body)
        .map_err(|e| OidcError::MalformedDocument(format!("Invalid JWKS: {}", e)))?;

    let published = raw.keys.len();
    let keys = raw
        .keys
        .into_iter()
        .filter_map(|value| match serde_json::from_value::<Jwk>(value) {
            Ok(jwk) => Some(jwk),
            Err(e) => {
                tracing::warn!("Skipping unsupported JWKS entry: {}", e);
                None
            }
        })
        .collect();

    Ok(ProviderKeys { keys, published })
}

/// Well-known discovery URL for a provider URI
pub fn discovery_url(provider_uri: &str) -> String {
    let base = provider_uri.trim_end_matches('/');
    if base.ends_with(WELL_KNOWN_PATH) {
        base.to_string()
    } else {
        format!("{}{}", base, WELL_KNOWN_PATH)
    }
}

fn discovery_cache_key(provider_uri: &str) -> String {
    format!("oidc:discovery:{}", provider_uri.trim_end_matches('/'))
}

fn jwks_cache_key(provider_uri: &str) -> String {
    format!("oidc:jwks:{}", provider_uri.trim_end_matches('/'))
}

/// Cache-then-fetch resolver for discovery documents and JWKS
#[derive(Clone)]
pub struct DiscoveryResolver {
    transport: Arc<dyn Transport>,
    cache: Arc<dyn Cache>,
    request_timeout: Duration,
}

impl DiscoveryResolver {
    pub fn new(
        transport: Arc<dyn Transport>,
        cache: Arc<dyn Cache>,
        request_timeout: Duration,
    ) -> Self {
        Self {
            transport,
            cache,
            request_timeout,
        }
    }

    /// Discover provider metadata, served from cache when present
    pub async fn discover(&self, provider_uri: &str) -> Result<DiscoveryDocument> {
        let key = discovery_cache_key(provider_uri);
        if let Some(document) = self.cached::<DiscoveryDocument>(&key).await {
            tracing::debug!("Discovery cache hit for {}", provider_uri);
            return Ok(document);
        }

        tracing::debug!("Discovery cache miss for {}", provider_uri);
        let document = self.fetch_discovery(provider_uri).await?;
        self.store(&key, &document).await;
        Ok(document)
    }

    /// Resolve the provider's signing keys, served from cache when present
    pub async fn jwks(&self, provider_uri: &str) -> Result<ProviderKeys> {
        let key = jwks_cache_key(provider_uri);
        if let Some(jwks) = self.cached::<ProviderKeys>(&key).await {
            tracing::debug!("JWKS cache hit for {}", provider_uri);
            return Ok(jwks);
        }

        tracing::debug!("JWKS cache miss for {}", provider_uri);
        let document = self.discover(provider_uri).await?;
        let jwks = self.fetch_jwks(&document.jwks_uri).await?;
        self.store(&key, &jwks).await;
        Ok(jwks)
    }

    /// Re-fetch discovery and JWKS, overwriting whatever is cached
    ///
    /// Use after a provider key rotation or endpoint change.
    pub async fn refresh(&self, provider_uri: &str) -> Result<(DiscoveryDocument, ProviderKeys)> {
        tracing::info!("Refreshing provider metadata for {}", provider_uri);

        let document = self.fetch_discovery(provider_uri).await?;
        let jwks = self.fetch_jwks(&document.jwks_uri).await?;

        self.store(&discovery_cache_key(provider_uri), &document)
            .await;
        self.store(&jwks_cache_key(provider_uri), &jwks).await;

        Ok((document, jwks))
    }

    async fn fetch_discovery(&self, provider_uri: &str) -> Result<DiscoveryDocument> {
        let url = discovery_url(provider_uri);
        let response = transport::send_with_deadline(
            self.transport.as_ref(),
            transport::get_json(&url)?,
            self.request_timeout,
        )
        .await?;

        if !response.status().is_success() {
            return Err(transport::status_error(&url, &response));
        }

        let document = DiscoveryDocument::from_json(response.body())?;
        tracing::info!("Discovered OIDC provider {}", document.issuer);
        Ok(document)
    }

    async fn fetch_jwks(&self, jwks_uri: &str) -> Result<ProviderKeys> {
        let response = transport::send_with_deadline(
            self.transport.as_ref(),
            transport::get_json(jwks_uri)?,
            self.request_timeout,
        )
        .await?;

        if !response.status().is_success() {
            return Err(transport::status_error(jwks_uri, &response));
        }

        let jwks = parse_jwks(response.body())?;
        tracing::debug!(
            "Fetched {} of {} signing keys from {}",
            jwks.keys.len(),
            jwks.published,
            jwks_uri
        );
        Ok(jwks)
    }

    async fn cached<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        match self.cache.get(key).await {
            Ok(Some(value)) => match serde_json::from_str(&value) {
                Ok(parsed) => Some(parsed),
                Err(e) => {
                    tracing::warn!("Ignoring undecodable cache entry {}: {}", key, e);
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                tracing::warn!("Cache read failed for {}: {}", key, e);
                None
            }
        }
    }

    async fn store<T: Serialize>(&self, key: &str, value: &T) {
        let serialized = match serde_json::to_string(value) {
            Ok(serialized) => serialized,
            Err(e) => {
                tracing::warn!("Failed to serialize cache entry {}: {}", key, e);
                return;
            }
        };

        if let Err(e) = self.cache.put(key, serialized).await {
            tracing::warn!("Cache write failed for {}: {}", key, e);
        }
    }
}
