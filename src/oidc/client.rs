//! OIDC client implementation
//!
//! Composes discovery, registration, code exchange, ID token validation and
//! userinfo retrieval into the authorization code flow. One `Client` serves
//! any number of concurrent authentication attempts; each attempt carries its
//! own state and nonce.

use super::registration::{self, ClientMeta, ClientSource};
use super::{
    auth_request, id_token, token, userinfo, AuthRequest, ClaimsRequest, ClientConfig,
    DiscoveryDocument, DiscoveryResolver, PkceParams, ProviderPreset, UserInfoClaims,
    ValidatedIdentity,
};
use crate::cache::Cache;
use crate::error::{OidcError, Result};
use crate::transport::Transport;
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;
const DEFAULT_CLOCK_LEEWAY_SECS: u64 = 60;
const RANDOM_VALUE_LEN: usize = 32;

/// Tunables shared by every call a client makes
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Deadline for each individual provider request
    pub request_timeout: Duration,
    /// Tolerated clock skew when checking ID token expiry
    pub clock_leeway: Duration,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            clock_leeway: Duration::from_secs(DEFAULT_CLOCK_LEEWAY_SECS),
        }
    }
}

/// Everything needed to build a [`Client`]
#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub provider_uri: String,
    pub source: ClientSource,
    pub options: ClientOptions,
}

impl ClientSettings {
    pub fn new(provider_uri: impl Into<String>, source: ClientSource) -> Self {
        Self {
            provider_uri: provider_uri.into(),
            source,
            options: ClientOptions::default(),
        }
    }

    pub fn from_preset(preset: ProviderPreset) -> Self {
        Self::new(preset.provider_uri, ClientSource::Static(preset.client))
    }

    pub fn with_options(mut self, options: ClientOptions) -> Self {
        self.options = options;
        self
    }
}

/// Per-attempt secrets that must survive the redirect round-trip
#[derive(Debug, Clone)]
pub struct AuthSession {
    pub state: String,
    pub nonce: String,
    pub pkce: Option<PkceParams>,
}

impl AuthSession {
    /// Fresh random state and nonce, with PKCE
    pub fn new() -> Self {
        Self {
            state: generate_state(),
            nonce: generate_nonce(),
            pkce: Some(PkceParams::generate()),
        }
    }

    /// For providers that reject unknown PKCE parameters
    pub fn without_pkce() -> Self {
        Self {
            pkce: None,
            ..Self::new()
        }
    }
}

impl Default for AuthSession {
    fn default() -> Self {
        Self::new()
    }
}

/// OIDC relying-party client bound to one provider and one client registration
pub struct Client {
    provider_uri: String,
    config: ClientConfig,
    options: ClientOptions,
    transport: Arc<dyn Transport>,
    resolver: DiscoveryResolver,
}

impl Client {
    /// Create a new OIDC client
    ///
    /// A pending registration is performed here, once; the resulting
    /// configuration is fixed for the life of the client. Static clients make
    /// no network calls until first used.
    pub async fn new(
        settings: ClientSettings,
        transport: Arc<dyn Transport>,
        cache: Arc<dyn Cache>,
    ) -> Result<Self> {
        let ClientSettings {
            provider_uri,
            source,
            options,
        } = settings;

        url::Url::parse(&provider_uri)
            .map_err(|e| OidcError::Config(format!("Invalid provider URI: {}", e)))?;

        let resolver = DiscoveryResolver::new(
            transport.clone(),
            cache,
            options.request_timeout,
        );

        let config = match source {
            ClientSource::Static(config) => config,
            ClientSource::PendingRegistration(meta) => {
                let discovery = resolver.discover(&provider_uri).await?;
                registration::register(
                    transport.as_ref(),
                    &meta,
                    &discovery,
                    options.request_timeout,
                )
                .await?
            }
        };
        config.validate()?;

        tracing::info!("OIDC client {} ready for {}", config.id, provider_uri);

        Ok(Self {
            provider_uri,
            config,
            options,
            transport,
            resolver,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn provider_uri(&self) -> &str {
        &self.provider_uri
    }

    fn redirect_uri(&self) -> Result<&str> {
        self.config.redirect_uri()
    }

    fn leeway_secs(&self) -> i64 {
        i64::try_from(self.options.clock_leeway.as_secs()).unwrap_or(i64::MAX)
    }

    /// Provider metadata, from cache when available
    pub async fn discovery(&self) -> Result<DiscoveryDocument> {
        self.resolver.discover(&self.provider_uri).await
    }

    /// Drop cached metadata and keys in favour of a fresh fetch
    pub async fn refresh_provider_metadata(&self) -> Result<()> {
        self.resolver.refresh(&self.provider_uri).await.map(|_| ())
    }

    /// Authorization URL for the given nonce and state
    pub async fn get_auth_url(
        &self,
        nonce: &str,
        state: &str,
        scope: Option<&str>,
        claims: Option<ClaimsRequest>,
    ) -> Result<String> {
        self.auth_url(nonce, state, scope, claims, None).await
    }

    async fn auth_url(
        &self,
        nonce: &str,
        state: &str,
        scope: Option<&str>,
        claims: Option<ClaimsRequest>,
        pkce: Option<&PkceParams>,
    ) -> Result<String> {
        let discovery = self.discovery().await?;

        let mut request = AuthRequest::new(&self.config, self.redirect_uri()?, nonce, state);
        if let Some(scope) = scope {
            request = request.with_scope(scope);
        }
        if let Some(claims) = claims {
            request = request.with_claims(claims);
        }
        if let Some(pkce) = pkce {
            request = request.with_pkce(pkce);
        }

        Ok(auth_request::build_auth_url(&discovery, &request)?.to_string())
    }

    /// Start an attempt: fresh session plus the URL to send the user to
    pub async fn begin_auth(
        &self,
        scope: Option<&str>,
        claims: Option<ClaimsRequest>,
    ) -> Result<(String, AuthSession)> {
        let session = AuthSession::new();
        let url = self.auth_url_for(&session, scope, claims).await?;
        Ok((url, session))
    }

    /// Authorization URL carrying the state, nonce and PKCE challenge of `session`
    pub async fn auth_url_for(
        &self,
        session: &AuthSession,
        scope: Option<&str>,
        claims: Option<ClaimsRequest>,
    ) -> Result<String> {
        self.auth_url(
            &session.nonce,
            &session.state,
            scope,
            claims,
            session.pkce.as_ref(),
        )
        .await
    }

    /// Finish an attempt started with [`Client::begin_auth`]
    pub async fn complete_auth(
        &self,
        callback_uri: &str,
        session: &AuthSession,
    ) -> Result<ValidatedIdentity> {
        self.callback(
            callback_uri,
            &session.state,
            Some(&session.nonce),
            session.pkce.as_ref().map(|p| p.code_verifier.as_str()),
        )
        .await
    }

    /// Validate the redirect back from the provider and redeem its code
    ///
    /// `state` and `code` are checked before any network call is made.
    pub async fn handle_callback(
        &self,
        callback_uri: &str,
        expected_state: &str,
        expected_nonce: Option<&str>,
    ) -> Result<ValidatedIdentity> {
        self.callback(callback_uri, expected_state, expected_nonce, None)
            .await
    }

    async fn callback(
        &self,
        callback_uri: &str,
        expected_state: &str,
        expected_nonce: Option<&str>,
        code_verifier: Option<&str>,
    ) -> Result<ValidatedIdentity> {
        let code = authorization_code(callback_uri, expected_state)?;

        let discovery = self.discovery().await?;
        let tokens = token::exchange_code(
            self.transport.as_ref(),
            &code,
            &self.config,
            self.redirect_uri()?,
            &discovery,
            code_verifier,
            self.options.request_timeout,
        )
        .await?;

        let jwks = self.resolver.jwks(&self.provider_uri).await?;
        let identity = id_token::validate(
            tokens,
            &self.config,
            &discovery,
            &jwks,
            expected_nonce,
            self.leeway_secs(),
        )?;

        tracing::info!("Authenticated subject {}", identity.subject());
        Ok(identity)
    }

    /// Userinfo claims for an identity this client validated
    pub async fn get_user_info(
        &self,
        identity: &ValidatedIdentity,
        access_token: &str,
    ) -> Result<UserInfoClaims> {
        let discovery = self.discovery().await?;
        userinfo::get_user_info(
            self.transport.as_ref(),
            access_token,
            identity,
            &discovery,
            self.options.request_timeout,
        )
        .await
    }

    /// Register another client at this client's provider
    pub async fn register_client(&self, meta: &ClientMeta) -> Result<ClientConfig> {
        let discovery = self.discovery().await?;
        registration::register(
            self.transport.as_ref(),
            meta,
            &discovery,
            self.options.request_timeout,
        )
        .await
    }
}

/// Extract the authorization code from a callback URI
///
/// Only the query string is inspected. The state gate runs first so that an
/// unsolicited redirect is rejected whatever else it carries.
fn authorization_code(callback_uri: &str, expected_state: &str) -> Result<String> {
    let query = callback_uri
        .split_once('?')
        .map(|(_, query)| query)
        .unwrap_or_default();
    let query = query.split_once('#').map_or(query, |(query, _)| query);

    let mut code = None;
    let mut state = None;
    let mut error = None;
    let mut error_description = None;
    for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
        match key.as_ref() {
            "code" => code = Some(value.into_owned()),
            "state" => state = Some(value.into_owned()),
            "error" => error = Some(value.into_owned()),
            "error_description" => error_description = Some(value.into_owned()),
            _ => {}
        }
    }

    let state = state.ok_or(OidcError::MissingState)?;
    if state != expected_state {
        return Err(OidcError::StateMismatch);
    }

    if let Some(error) = error {
        return Err(OidcError::AuthorizationDenied {
            error,
            description: error_description
                .unwrap_or_else(|| "No description provided".to_string()),
        });
    }

    code.filter(|c| !c.is_empty()).ok_or(OidcError::MissingCode)
}

fn random_value() -> String {
    use rand::distributions::Alphanumeric;
    use rand::Rng;

    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(RANDOM_VALUE_LEN)
        .map(char::from)
        .collect()
}

/// Generate a random state parameter for CSRF protection
pub fn generate_state() -> String {
    random_value()
}

/// Generate a random nonce to bind the ID token to this attempt
pub fn generate_nonce() -> String {
    random_value()
}
