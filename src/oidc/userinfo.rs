//! UserInfo retrieval
//!
//! Fetches claims from the userinfo endpoint and binds them to the validated
//! ID token through the `sub` claim.

use super::{DiscoveryDocument, ValidatedIdentity};
use crate::error::{OidcError, Result};
use crate::transport::{self, Transport};
use http::{header, HeaderValue, Method, Request};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Claims returned by the userinfo endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserInfoClaims {
    pub sub: String,
    #[serde(flatten)]
    pub claims: serde_json::Map<String, serde_json::Value>,
}

impl UserInfoClaims {
    pub fn get(&self, name: &str) -> Option<&serde_json::Value> {
        self.claims.get(name)
    }

    pub fn email(&self) -> Option<&str> {
        self.get("email").and_then(|v| v.as_str())
    }
}

/// Fetch userinfo and check it describes the ID token's subject
pub async fn get_user_info(
    transport: &dyn Transport,
    access_token: &str,
    identity: &ValidatedIdentity,
    discovery: &DiscoveryDocument,
    request_timeout: Duration,
) -> Result<UserInfoClaims> {
    let endpoint = discovery.userinfo_endpoint.as_deref().ok_or_else(|| {
        OidcError::MalformedDocument(format!(
            "Provider {} does not advertise a userinfo_endpoint",
            discovery.issuer
        ))
    })?;

    let request = Request::builder()
        .method(Method::GET)
        .uri(endpoint)
        .header(header::AUTHORIZATION, format!("Bearer {}", access_token))
        .header(header::ACCEPT, HeaderValue::from_static("application/json"))
        .body(Vec::new())
        .map_err(|e| OidcError::Config(format!("Invalid userinfo request: {}", e)))?;

    let response = transport::send_with_deadline(transport, request, request_timeout).await?;

    if !response.status().is_success() {
        return Err(OidcError::UserInfoEndpoint {
            status: response.status().as_u16(),
            body: transport::body_text(&response),
        });
    }

    let user_info: UserInfoClaims = transport::parse_json(&response)
        .map_err(|e| OidcError::MalformedResponse(format!("Invalid userinfo response: {}", e)))?;

    check_subject(user_info, identity)
}

fn check_subject(user_info: UserInfoClaims, identity: &ValidatedIdentity) -> Result<UserInfoClaims> {
    if user_info.sub != identity.subject() {
        tracing::warn!(
            "UserInfo subject {} does not match ID token subject {}",
            user_info.sub,
            identity.subject()
        );
        return Err(OidcError::SubjectMismatch {
            expected: identity.subject().to_string(),
            actual: user_info.sub,
        });
    }

    Ok(user_info)
}
