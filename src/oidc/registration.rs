//! Client configuration and OAuth 2.0 dynamic client registration (RFC 7591)

use super::DiscoveryDocument;
use crate::error::{OidcError, Result};
use crate::transport::{self, Transport};
use http::{header, HeaderValue, Method, Request};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const AUTH_METHOD_CLIENT_SECRET_POST: &str = "client_secret_post";
pub const AUTH_METHOD_CLIENT_SECRET_BASIC: &str = "client_secret_basic";
pub const AUTH_METHOD_NONE: &str = "none";

/// Effective client registration used for the whole flow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
    pub response_types: Vec<String>,
    pub grant_types: Vec<String>,
    pub redirect_uris: Vec<String>,
    pub token_endpoint_auth_method: String,
}

impl ClientConfig {
    /// Confidential client authenticating with `client_secret_post`
    pub fn new(
        id: impl Into<String>,
        secret: impl Into<String>,
        redirect_uri: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            secret: Some(secret.into()),
            response_types: vec!["code".to_string()],
            grant_types: vec!["authorization_code".to_string()],
            redirect_uris: vec![redirect_uri.into()],
            token_endpoint_auth_method: AUTH_METHOD_CLIENT_SECRET_POST.to_string(),
        }
    }

    /// Public client that sends no secret to the token endpoint
    ///
    /// Secret-less exchanges have to be asked for by name; a confidential
    /// client without a secret is rejected instead of guessing one.
    pub fn public(id: impl Into<String>, redirect_uri: impl Into<String>) -> Self {
        Self {
            secret: None,
            token_endpoint_auth_method: AUTH_METHOD_NONE.to_string(),
            ..Self::new(id, String::new(), redirect_uri)
        }
    }

    /// Redirect URI used for authorization requests and code exchange
    pub fn redirect_uri(&self) -> Result<&str> {
        self.redirect_uris
            .first()
            .map(String::as_str)
            .ok_or_else(|| OidcError::Config("Client has no redirect URI".to_string()))
    }

    pub fn validate(&self) -> Result<()> {
        if self.id.is_empty() {
            return Err(OidcError::Config("Client ID is required".to_string()));
        }

        for uri in &self.redirect_uris {
            url::Url::parse(uri)
                .map_err(|e| OidcError::Config(format!("Invalid redirect URI {}: {}", uri, e)))?;
        }
        self.redirect_uri()?;

        match self.token_endpoint_auth_method.as_str() {
            AUTH_METHOD_NONE => Ok(()),
            AUTH_METHOD_CLIENT_SECRET_POST | AUTH_METHOD_CLIENT_SECRET_BASIC => {
                match self.secret.as_deref() {
                    Some(secret) if !secret.is_empty() => Ok(()),
                    _ => Err(OidcError::Config(format!(
                        "Client secret is required for {}",
                        self.token_endpoint_auth_method
                    ))),
                }
            }
            other => Err(OidcError::Config(format!(
                "Unsupported token endpoint auth method: {}",
                other
            ))),
        }
    }
}

/// Client metadata submitted for dynamic registration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientMeta {
    pub redirect_uris: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub response_types: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub grant_types: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_endpoint_auth_method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub contacts: Vec<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ClientMeta {
    pub fn new(redirect_uri: impl Into<String>) -> Self {
        Self {
            redirect_uris: vec![redirect_uri.into()],
            response_types: vec!["code".to_string()],
            grant_types: vec!["authorization_code".to_string()],
            token_endpoint_auth_method: None,
            client_name: None,
            contacts: Vec::new(),
            extra: serde_json::Map::new(),
        }
    }

    pub fn with_client_name(mut self, name: impl Into<String>) -> Self {
        self.client_name = Some(name.into());
        self
    }
}

/// Where the client registration comes from
///
/// Resolved exactly once when the client is built.
#[derive(Debug, Clone)]
pub enum ClientSource {
    Static(ClientConfig),
    PendingRegistration(ClientMeta),
}

/// Fields the registration endpoint may assign or override
#[derive(Debug, Deserialize)]
struct RegistrationResponse {
    client_id: String,
    #[serde(default)]
    client_secret: Option<String>,
    #[serde(default)]
    redirect_uris: Option<Vec<String>>,
    #[serde(default)]
    response_types: Option<Vec<String>>,
    #[serde(default)]
    grant_types: Option<Vec<String>>,
    #[serde(default)]
    token_endpoint_auth_method: Option<String>,
}

impl RegistrationResponse {
    /// Server-assigned values win over what was requested
    fn merge(self, meta: &ClientMeta) -> ClientConfig {
        let or_requested = |assigned: Option<Vec<String>>, requested: &Vec<String>, default: &str| {
            assigned
                .filter(|v| !v.is_empty())
                .or_else(|| Some(requested.clone()).filter(|v| !v.is_empty()))
                .unwrap_or_else(|| vec![default.to_string()])
        };

        ClientConfig {
            id: self.client_id,
            secret: self.client_secret,
            response_types: or_requested(self.response_types, &meta.response_types, "code"),
            grant_types: or_requested(
                self.grant_types,
                &meta.grant_types,
                "authorization_code",
            ),
            redirect_uris: self
                .redirect_uris
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| meta.redirect_uris.clone()),
            // RFC 7591 default when neither side names one
            token_endpoint_auth_method: self
                .token_endpoint_auth_method
                .or_else(|| meta.token_endpoint_auth_method.clone())
                .unwrap_or_else(|| AUTH_METHOD_CLIENT_SECRET_BASIC.to_string()),
        }
    }
}

/// Register a new client at the provider's registration endpoint
pub async fn register(
    transport: &dyn Transport,
    meta: &ClientMeta,
    discovery: &DiscoveryDocument,
    request_timeout: Duration,
) -> Result<ClientConfig> {
    let endpoint = discovery.registration_endpoint.as_deref().ok_or_else(|| {
        OidcError::Config(format!(
            "Provider {} does not support dynamic client registration",
            discovery.issuer
        ))
    })?;

    let body = serde_json::to_vec(meta)
        .map_err(|e| OidcError::Config(format!("Failed to encode client metadata: {}", e)))?;

    let request = Request::builder()
        .method(Method::POST)
        .uri(endpoint)
        .header(header::CONTENT_TYPE, HeaderValue::from_static("application/json"))
        .header(header::ACCEPT, HeaderValue::from_static("application/json"))
        .body(body)
        .map_err(|e| OidcError::Config(format!("Invalid registration endpoint: {}", e)))?;

    tracing::info!("Registering client at {}", endpoint);
    let response = transport::send_with_deadline(transport, request, request_timeout).await?;

    if !response.status().is_success() {
        return Err(OidcError::Registration {
            status: response.status().as_u16(),
            body: transport::body_text(&response),
        });
    }

    let registered: RegistrationResponse = transport::parse_json(&response).map_err(|e| {
        OidcError::MalformedResponse(format!("Invalid registration response: {}", e))
    })?;

    let config = registered.merge(meta);
    tracing::info!("Registered client {}", config.id);
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_client_needs_no_secret() {
        let config = ClientConfig::public("app", "http://localhost:8080/callback");
        assert_eq!(config.secret, None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_confidential_client_without_secret_is_rejected() {
        let mut config = ClientConfig::new("app", "s3cret", "http://localhost:8080/callback");
        assert!(config.validate().is_ok());

        config.secret = None;
        assert!(matches!(config.validate(), Err(OidcError::Config(_))));
    }

    #[test]
    fn test_client_without_redirect_uri_is_rejected() {
        let mut config = ClientConfig::new("app", "s3cret", "http://localhost:8080/callback");
        config.redirect_uris.clear();
        assert!(matches!(config.validate(), Err(OidcError::Config(_))));
    }

    #[test]
    fn test_merge_prefers_server_assigned_fields() {
        let meta = ClientMeta {
            token_endpoint_auth_method: Some(AUTH_METHOD_CLIENT_SECRET_POST.to_string()),
            ..ClientMeta::new("http://localhost:8080/callback")
        };
        let response: RegistrationResponse = serde_json::from_str(
            r#"{
                "client_id": "assigned-id",
                "client_secret": "assigned-secret",
                "grant_types": ["authorization_code", "refresh_token"],
                "client_id_issued_at": 1700000000
            }"#,
        )
        .unwrap();

        let config = response.merge(&meta);
        assert_eq!(config.id, "assigned-id");
        assert_eq!(config.secret.as_deref(), Some("assigned-secret"));
        assert_eq!(config.grant_types, vec!["authorization_code", "refresh_token"]);
        assert_eq!(config.response_types, vec!["code"]);
        assert_eq!(config.redirect_uris, vec!["http://localhost:8080/callback"]);
        assert_eq!(config.token_endpoint_auth_method, AUTH_METHOD_CLIENT_SECRET_POST);
    }

    #[test]
    fn test_merge_defaults_auth_method() {
        let meta = ClientMeta::new("http://localhost:8080/callback");
        let response: RegistrationResponse =
            serde_json::from_str(r#"{"client_id": "assigned-id"}"#).unwrap();

        let config = response.merge(&meta);
        assert_eq!(config.secret, None);
        assert_eq!(config.token_endpoint_auth_method, AUTH_METHOD_CLIENT_SECRET_BASIC);
    }

    #[test]
    fn test_meta_serialization_omits_empty_fields() {
        let meta = ClientMeta::new("http://localhost:8080/callback").with_client_name("demo");
        let value = serde_json::to_value(&meta).unwrap();
        assert_eq!(value["client_name"], "demo");
        assert!(value.get("contacts").is_none());
        assert!(value.get("token_endpoint_auth_method").is_none());
    }
}
