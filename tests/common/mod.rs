//! Shared fixtures for integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use mockito::{Mock, ServerGuard};
use oidc_rp::{
    Client, ClientConfig, ClientSettings, ClientSource, MemoryCache, ReqwestTransport, Transport,
    TransportError,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub const ISSUER: &str = "https://idp.example";
pub const CLIENT_ID: &str = "test-client";
pub const CLIENT_SECRET: &str = "test-secret";
pub const REDIRECT_URI: &str = "http://localhost:8080/auth/callback";
pub const SUBJECT: &str = "user-123";
pub const NONCE: &str = "nonce-abc";
pub const STATE: &str = "state-xyz";
pub const KEY_ID: &str = "test-key-1";

pub const SIGNING_KEY_PEM: &str = include_str!("../fixtures/signing_key.pem");
pub const JWKS: &str = include_str!("../fixtures/jwks.json");

/// JWKS holding the fixture key plus a decoy that verifies nothing
pub fn jwks_with_decoy() -> String {
    let mut jwks: Value = serde_json::from_str(JWKS).unwrap();
    jwks["keys"].as_array_mut().unwrap().insert(
        0,
        json!({"kty": "RSA", "kid": "decoy", "alg": "RS256", "n": "AQAB", "e": "AQAB"}),
    );
    jwks.to_string()
}

/// JWKS holding the fixture key plus an entry this client cannot parse
pub fn jwks_with_unusable_key() -> String {
    let mut jwks: Value = serde_json::from_str(JWKS).unwrap();
    jwks["keys"].as_array_mut().unwrap().push(json!({
        "kty": "EC",
        "kid": "secp-key",
        "crv": "secp256k1",
        "x": "AQAB",
        "y": "AQAB",
    }));
    jwks.to_string()
}

pub fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

pub fn id_token_claims() -> Value {
    json!({
        "iss": ISSUER,
        "sub": SUBJECT,
        "aud": CLIENT_ID,
        "exp": now() + 600,
        "iat": now(),
        "nonce": NONCE,
        "name": "Test User",
    })
}

/// RS256-sign `claims` with the fixture key
pub fn sign_id_token(claims: &Value, kid: Option<&str>) -> String {
    let mut header = Header::new(Algorithm::RS256);
    header.kid = kid.map(str::to_string);
    let key = EncodingKey::from_rsa_pem(SIGNING_KEY_PEM.as_bytes()).unwrap();
    encode(&header, claims, &key).unwrap()
}

pub fn token_response(id_token: &str) -> Value {
    json!({
        "access_token": "access-token-1",
        "token_type": "Bearer",
        "expires_in": 3600,
        "id_token": id_token,
    })
}

pub fn discovery_document(base_url: &str) -> Value {
    json!({
        "issuer": ISSUER,
        "authorization_endpoint": format!("{}/authorize", base_url),
        "token_endpoint": format!("{}/token", base_url),
        "userinfo_endpoint": format!("{}/userinfo", base_url),
        "registration_endpoint": format!("{}/register", base_url),
        "jwks_uri": format!("{}/jwks", base_url),
        "response_types_supported": ["code"],
        "id_token_signing_alg_values_supported": ["RS256"],
    })
}

pub fn callback_uri(code: &str, state: &str) -> String {
    format!("{}?code={}&state={}", REDIRECT_URI, code, state)
}

pub async fn mock_discovery(server: &mut ServerGuard) -> Mock {
    let body = discovery_document(&server.url()).to_string();
    mock_json(server, "GET", "/.well-known/openid-configuration", 200, &body).await
}

pub async fn mock_jwks(server: &mut ServerGuard, jwks: &str) -> Mock {
    mock_json(server, "GET", "/jwks", 200, jwks).await
}

pub async fn mock_token(server: &mut ServerGuard, id_token: &str) -> Mock {
    let body = token_response(id_token).to_string();
    mock_json(server, "POST", "/token", 200, &body).await
}

pub async fn mock_json(
    server: &mut ServerGuard,
    method: &str,
    path: &str,
    status: usize,
    body: &str,
) -> Mock {
    server
        .mock(method, path)
        .with_status(status)
        .with_header("content-type", "application/json")
        .with_body(body)
        .create_async()
        .await
}

pub fn static_config() -> ClientConfig {
    ClientConfig::new(CLIENT_ID, CLIENT_SECRET, REDIRECT_URI)
}

/// Client against a mock provider, over real HTTP
pub async fn static_client(server: &ServerGuard) -> Client {
    let settings = ClientSettings::new(server.url(), ClientSource::Static(static_config()));
    Client::new(
        settings,
        Arc::new(ReqwestTransport::new()),
        Arc::new(MemoryCache::new()),
    )
    .await
    .unwrap()
}

/// In-process transport answering from a fixed table and counting calls
#[derive(Default)]
pub struct ScriptedTransport {
    calls: AtomicUsize,
    routes: Mutex<HashMap<String, (u16, String)>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(self, url: &str, status: u16, body: impl Into<String>) -> Self {
        self.routes
            .lock()
            .unwrap()
            .insert(url.to_string(), (status, body.into()));
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(
        &self,
        request: http::Request<Vec<u8>>,
    ) -> Result<http::Response<Vec<u8>>, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let route = self
            .routes
            .lock()
            .unwrap()
            .get(&request.uri().to_string())
            .cloned();

        match route {
            Some((status, body)) => Ok(http::Response::builder()
                .status(status)
                .body(body.into_bytes())
                .unwrap()),
            None => Err(TransportError::new(
                format!("connection refused: {}", request.uri()),
                true,
            )),
        }
    }
}
