//! Authorization request construction
//!
//! Serializes the authentication request parameters onto the provider's
//! authorization endpoint. Pure: no I/O happens here.

use super::{ClientConfig, DiscoveryDocument, PkceParams};
use crate::error::{OidcError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use url::Url;

const OPENID_SCOPE: &str = "openid";

/// Request for an individual claim (OIDC Core 5.5.1)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClaimRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub essential: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values: Option<Vec<serde_json::Value>>,
}

/// The `claims` authorization request parameter
///
/// A claim mapped to `None` is requested voluntarily and serializes as JSON
/// `null`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClaimsRequest {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub userinfo: BTreeMap<String, Option<ClaimRequest>>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub id_token: BTreeMap<String, Option<ClaimRequest>>,
}

fn claim_entry(essential: bool) -> Option<ClaimRequest> {
    essential.then(|| ClaimRequest {
        essential: Some(true),
        ..Default::default()
    })
}

fn essential_names(claims: &BTreeMap<String, Option<ClaimRequest>>) -> Vec<&str> {
    claims
        .iter()
        .filter(|(_, request)| {
            request
                .as_ref()
                .and_then(|r| r.essential)
                .unwrap_or(false)
        })
        .map(|(name, _)| name.as_str())
        .collect()
}

impl ClaimsRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn userinfo_claim(mut self, name: impl Into<String>, essential: bool) -> Self {
        self.userinfo.insert(name.into(), claim_entry(essential));
        self
    }

    pub fn id_token_claim(mut self, name: impl Into<String>, essential: bool) -> Self {
        self.id_token.insert(name.into(), claim_entry(essential));
        self
    }

    pub fn essential_userinfo_claims(&self) -> Vec<&str> {
        essential_names(&self.userinfo)
    }

    pub fn essential_id_token_claims(&self) -> Vec<&str> {
        essential_names(&self.id_token)
    }

    pub fn is_empty(&self) -> bool {
        self.userinfo.is_empty() && self.id_token.is_empty()
    }
}

/// Authentication request parameters
#[derive(Debug, Clone)]
pub struct AuthRequest {
    pub client_id: String,
    pub redirect_uri: String,
    pub response_type: String,
    pub scope: Vec<String>,
    pub state: String,
    pub nonce: String,
    pub claims: Option<ClaimsRequest>,
    pub code_challenge: Option<String>,
}

impl AuthRequest {
    pub fn new(
        client: &ClientConfig,
        redirect_uri: impl Into<String>,
        nonce: impl Into<String>,
        state: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client.id.clone(),
            redirect_uri: redirect_uri.into(),
            response_type: client
                .response_types
                .first()
                .cloned()
                .unwrap_or_else(|| "code".to_string()),
            scope: vec![OPENID_SCOPE.to_string()],
            state: state.into(),
            nonce: nonce.into(),
            claims: None,
            code_challenge: None,
        }
    }

    /// Space-delimited scope list; `openid` is always included
    pub fn with_scope(mut self, scope: &str) -> Self {
        let mut scopes: Vec<String> = scope.split_whitespace().map(String::from).collect();
        if !scopes.iter().any(|s| s == OPENID_SCOPE) {
            scopes.insert(0, OPENID_SCOPE.to_string());
        }
        self.scope = scopes;
        self
    }

    pub fn with_claims(mut self, claims: ClaimsRequest) -> Self {
        self.claims = Some(claims).filter(|c| !c.is_empty());
        self
    }

    pub fn with_pkce(mut self, pkce: &PkceParams) -> Self {
        self.code_challenge = Some(pkce.code_challenge.clone());
        self
    }
}

/// Build the authorization URL on the provider's authorization endpoint
pub fn build_auth_url(discovery: &DiscoveryDocument, request: &AuthRequest) -> Result<Url> {
    let mut url = Url::parse(&discovery.authorization_endpoint)?;

    let claims = request
        .claims
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .map_err(|e| OidcError::Config(format!("Failed to encode claims request: {}", e)))?;

    {
        let mut query = url.query_pairs_mut();
        query
            .append_pair("client_id", &request.client_id)
            .append_pair("redirect_uri", &request.redirect_uri)
            .append_pair("response_type", &request.response_type)
            .append_pair("scope", &request.scope.join(" "))
            .append_pair("state", &request.state)
            .append_pair("nonce", &request.nonce);

        if let Some(ref claims) = claims {
            query.append_pair("claims", claims);
        }

        if let Some(ref challenge) = request.code_challenge {
            query
                .append_pair("code_challenge", challenge)
                .append_pair("code_challenge_method", "S256");
        }
    }

    Ok(url)
}
