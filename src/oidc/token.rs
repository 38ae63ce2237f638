//! Authorization code exchange
//!
//! Redeems the code received on the redirect for tokens at the provider's
//! token endpoint.

use super::registration::{
    AUTH_METHOD_CLIENT_SECRET_BASIC, AUTH_METHOD_CLIENT_SECRET_POST, AUTH_METHOD_NONE,
};
use super::{ClientConfig, DiscoveryDocument};
use crate::error::{OidcError, Result};
use crate::transport::{self, Transport};
use base64::{engine::general_purpose::STANDARD, Engine};
use http::{header, HeaderValue, Method, Request};
use serde::{Deserialize, Deserializer, Serialize};
use std::time::Duration;

/// Token response from OIDC provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub id_token: String,
    #[serde(default)]
    pub token_type: String,
    #[serde(
        default,
        deserialize_with = "lenient_seconds",
        skip_serializing_if = "Option::is_none"
    )]
    pub expires_in: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl TokenResponse {
    pub fn from_json(body: &[u8]) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_slice(body)
            .map_err(|e| OidcError::MalformedResponse(format!("Invalid token response: {}", e)))?;

        if !value.get("id_token").map_or(false, |v| v.is_string()) {
            return Err(OidcError::MalformedResponse(
                "Token response has no id_token".to_string(),
            ));
        }

        serde_json::from_value(value)
            .map_err(|e| OidcError::MalformedResponse(format!("Invalid token response: {}", e)))
    }
}

/// Some providers send `expires_in` as a numeric string
fn lenient_seconds<'de, D>(deserializer: D) -> std::result::Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Seconds {
        Number(u64),
        Text(String),
    }

    match Option::<Seconds>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Seconds::Number(secs)) => Ok(Some(secs)),
        Some(Seconds::Text(text)) => text
            .trim()
            .parse()
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}

/// Exchange authorization code for tokens
pub async fn exchange_code(
    transport: &dyn Transport,
    code: &str,
    client: &ClientConfig,
    redirect_uri: &str,
    discovery: &DiscoveryDocument,
    code_verifier: Option<&str>,
    request_timeout: Duration,
) -> Result<TokenResponse> {
    let request = build_token_request(code, client, redirect_uri, discovery, code_verifier)?;

    tracing::debug!("Exchanging authorization code at {}", discovery.token_endpoint);
    let response = transport::send_with_deadline(transport, request, request_timeout).await?;

    if !response.status().is_success() {
        let status = response.status();
        let body = transport::body_text(&response);
        tracing::warn!("Token exchange failed with status {}", status);
        return Err(OidcError::TokenEndpoint {
            status: status.as_u16(),
            body,
        });
    }

    TokenResponse::from_json(response.body())
}

fn build_token_request(
    code: &str,
    client: &ClientConfig,
    redirect_uri: &str,
    discovery: &DiscoveryDocument,
    code_verifier: Option<&str>,
) -> Result<Request<Vec<u8>>> {
    let mut form = url::form_urlencoded::Serializer::new(String::new());
    form.append_pair("grant_type", "authorization_code")
        .append_pair("scope", "openid")
        .append_pair("code", code)
        .append_pair("client_id", &client.id)
        .append_pair("redirect_uri", redirect_uri);

    if let Some(verifier) = code_verifier {
        form.append_pair("code_verifier", verifier);
    }

    let mut basic_auth = None;
    match (client.token_endpoint_auth_method.as_str(), client.secret.as_deref()) {
        (AUTH_METHOD_NONE, _) => {}
        (AUTH_METHOD_CLIENT_SECRET_POST, Some(secret)) => {
            form.append_pair("client_secret", secret);
        }
        (AUTH_METHOD_CLIENT_SECRET_BASIC, Some(secret)) => {
            basic_auth = Some(basic_credentials(&client.id, secret));
        }
        (method, None) => {
            return Err(OidcError::Config(format!(
                "Client secret is required for {}",
                method
            )))
        }
        (method, Some(_)) => {
            return Err(OidcError::Config(format!(
                "Unsupported token endpoint auth method: {}",
                method
            )))
        }
    }

    let mut builder = Request::builder()
        .method(Method::POST)
        .uri(&discovery.token_endpoint)
        .header(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/x-www-form-urlencoded"),
        )
        .header(header::ACCEPT, HeaderValue::from_static("application/json"));

    if let Some(credentials) = basic_auth {
        builder = builder.header(header::AUTHORIZATION, credentials);
    }

    builder
        .body(form.finish().into_bytes())
        .map_err(|e| OidcError::Config(format!("Invalid token endpoint: {}", e)))
}

/// HTTP Basic credentials per RFC 6749 section 2.3.1
fn basic_credentials(client_id: &str, secret: &str) -> String {
    let encode = |s: &str| url::form_urlencoded::byte_serialize(s.as_bytes()).collect::<String>();
    format!(
        "Basic {}",
        STANDARD.encode(format!("{}:{}", encode(client_id), encode(secret)))
    )
}
