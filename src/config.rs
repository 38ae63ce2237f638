//! Command-line configuration parsing and validation

use crate::error::{OidcError, Result};
use crate::oidc::registration::AUTH_METHOD_NONE;
use crate::oidc::{
    ClaimsRequest, ClientConfig, ClientMeta, ClientOptions, ClientSettings, ClientSource,
    ProviderPreset,
};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_SCOPES: &str = "openid profile email";
const DEFAULT_REDIRECT_URL: &str = "http://localhost:8080/auth/callback";
const DEFAULT_CLIENT_NAME: &str = "oidc-rp";

#[derive(Parser, Debug, Clone)]
#[command(
    name = "oidc-rp",
    version,
    about = "OpenID Connect relying-party login",
    long_about = "Runs an OpenID Connect authorization code login against a provider and prints the validated ID token claims as JSON"
)]
pub struct Config {
    /// Provider URI serving /.well-known/openid-configuration
    #[arg(long, env = "OIDC_PROVIDER_URI", conflicts_with = "microsoft_tenant")]
    pub provider_uri: Option<String>,

    /// Use the Microsoft identity platform v2.0 endpoint for this tenant
    #[arg(long, env = "OIDC_MICROSOFT_TENANT")]
    pub microsoft_tenant: Option<String>,

    /// OAuth client ID
    #[arg(long, env = "OIDC_CLIENT_ID")]
    pub client_id: Option<String>,

    /// OAuth client secret
    #[arg(long, env = "OIDC_CLIENT_SECRET")]
    pub client_secret: Option<String>,

    /// Register as a public client that sends no secret to the token endpoint
    #[arg(long, conflicts_with = "client_secret")]
    pub public_client: bool,

    /// Register a new client dynamically instead of using --client-id
    #[arg(long, conflicts_with_all = ["client_id", "microsoft_tenant"])]
    pub register: bool,

    /// Client name sent with dynamic registration
    #[arg(long, env = "OIDC_CLIENT_NAME")]
    pub client_name: Option<String>,

    /// Space-separated OAuth scopes (default: "openid profile email")
    #[arg(long, env = "OIDC_SCOPES")]
    pub scopes: Option<String>,

    /// Claims request parameter as JSON, e.g. '{"userinfo":{"email":{"essential":true}}}'
    #[arg(long, env = "OIDC_CLAIMS")]
    pub claims: Option<String>,

    /// Localhost URL for OAuth redirect (default: http://localhost:8080/auth/callback)
    #[arg(long, env = "OIDC_REDIRECT_URL")]
    pub redirect_url: Option<String>,

    /// Also fetch and print userinfo claims
    #[arg(long)]
    pub userinfo: bool,

    /// Print the authorization URL instead of opening a browser
    #[arg(long)]
    pub no_browser: bool,

    /// Do not send PKCE parameters
    #[arg(long)]
    pub no_pkce: bool,

    /// Directory for cached discovery documents and keys
    #[arg(long, env = "OIDC_CACHE_DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Keep provider metadata in memory only
    #[arg(long, conflicts_with = "cache_dir")]
    pub no_cache: bool,

    /// Per-request timeout in seconds
    #[arg(long, env = "OIDC_TIMEOUT", default_value_t = 10)]
    pub timeout: u64,

    /// Show only error messages
    #[arg(long, conflicts_with = "debug")]
    pub silent: bool,

    /// Enable debug logging
    #[arg(long, env = "OIDC_DEBUG")]
    pub debug: bool,
}

impl Config {
    /// Parse configuration from CLI arguments and environment variables
    pub fn parse_args() -> Self {
        Config::parse()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.provider_uri.is_none() && self.microsoft_tenant.is_none() {
            return Err(OidcError::Config(
                "Either --provider-uri or --microsoft-tenant is required".to_string(),
            ));
        }

        if let Some(ref provider_uri) = self.provider_uri {
            url::Url::parse(provider_uri)
                .map_err(|e| OidcError::Config(format!("Invalid provider URI: {}", e)))?;
        }

        if !self.register {
            if self.client_id.as_deref().map_or(true, str::is_empty) {
                return Err(OidcError::Config(
                    "OIDC client ID is required unless --register is given".to_string(),
                ));
            }
            if self.client_secret.is_none() && !self.public_client {
                return Err(OidcError::Config(
                    "OIDC client secret is required; pass --public-client for a client without one"
                        .to_string(),
                ));
            }
        }

        if self.microsoft_tenant.is_some() && self.public_client {
            return Err(OidcError::Config(
                "The Microsoft preset requires a client secret".to_string(),
            ));
        }

        url::Url::parse(&self.redirect_url())
            .map_err(|e| OidcError::Config(format!("Invalid redirect URL: {}", e)))?;

        self.claims_request()?;

        if self.timeout == 0 {
            return Err(OidcError::Config("Timeout must be at least 1 second".to_string()));
        }

        Ok(())
    }

    /// Get OAuth scopes (with defaults)
    pub fn scopes(&self) -> String {
        self.scopes
            .clone()
            .unwrap_or_else(|| DEFAULT_SCOPES.to_string())
    }

    /// Get redirect URL (with default)
    pub fn redirect_url(&self) -> String {
        self.redirect_url
            .clone()
            .unwrap_or_else(|| DEFAULT_REDIRECT_URL.to_string())
    }

    pub fn claims_request(&self) -> Result<Option<ClaimsRequest>> {
        self.claims
            .as_deref()
            .map(serde_json::from_str)
            .transpose()
            .map_err(|e| OidcError::Config(format!("Invalid claims request: {}", e)))
    }

    pub fn options(&self) -> ClientOptions {
        ClientOptions {
            request_timeout: Duration::from_secs(self.timeout),
            ..ClientOptions::default()
        }
    }

    /// Provider and client source described by the flags
    pub fn client_settings(&self) -> Result<ClientSettings> {
        let redirect_url = self.redirect_url();

        let settings = if let Some(ref tenant) = self.microsoft_tenant {
            ClientSettings::from_preset(ProviderPreset::microsoft(
                tenant,
                self.client_id.clone().unwrap_or_default(),
                self.client_secret.clone().unwrap_or_default(),
                redirect_url,
            ))
        } else {
            let provider_uri = self.provider_uri.clone().ok_or_else(|| {
                OidcError::Config("OIDC provider URI is required".to_string())
            })?;

            let source = if self.register {
                let mut meta = ClientMeta::new(redirect_url).with_client_name(
                    self.client_name
                        .clone()
                        .unwrap_or_else(|| DEFAULT_CLIENT_NAME.to_string()),
                );
                if self.public_client {
                    meta.token_endpoint_auth_method = Some(AUTH_METHOD_NONE.to_string());
                }
                ClientSource::PendingRegistration(meta)
            } else {
                let client_id = self.client_id.clone().unwrap_or_default();
                ClientSource::Static(match self.client_secret {
                    Some(ref secret) => ClientConfig::new(client_id, secret.clone(), redirect_url),
                    None => ClientConfig::public(client_id, redirect_url),
                })
            };

            ClientSettings::new(provider_uri, source)
        };

        Ok(settings.with_options(self.options()))
    }

    /// Get log level based on flags
    pub fn log_level(&self) -> tracing::Level {
        if self.silent {
            tracing::Level::ERROR
        } else if self.debug {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Config {
        Config::try_parse_from(std::iter::once("oidc-rp").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_static_client_settings() {
        let config = parse(&[
            "--provider-uri",
            "https://idp.example",
            "--client-id",
            "app",
            "--client-secret",
            "s3cret",
        ]);
        config.validate().unwrap();
        assert_eq!(config.redirect_url(), DEFAULT_REDIRECT_URL);
        assert_eq!(config.scopes(), DEFAULT_SCOPES);

        let settings = config.client_settings().unwrap();
        assert_eq!(settings.provider_uri, "https://idp.example");
        match settings.source {
            ClientSource::Static(client) => {
                assert_eq!(client.id, "app");
                assert_eq!(client.secret.as_deref(), Some("s3cret"));
                assert_eq!(client.redirect_uris, vec![DEFAULT_REDIRECT_URL]);
            }
            other => panic!("unexpected source: {:?}", other),
        }
    }

    #[test]
    fn test_missing_secret_requires_public_flag() {
        let config = parse(&["--provider-uri", "https://idp.example", "--client-id", "app"]);
        assert!(matches!(config.validate(), Err(OidcError::Config(_))));

        let config = parse(&[
            "--provider-uri",
            "https://idp.example",
            "--client-id",
            "app",
            "--public-client",
        ]);
        config.validate().unwrap();
        match config.client_settings().unwrap().source {
            ClientSource::Static(client) => {
                assert_eq!(client.token_endpoint_auth_method, AUTH_METHOD_NONE)
            }
            other => panic!("unexpected source: {:?}", other),
        }
    }

    #[test]
    fn test_dynamic_registration_settings() {
        let config = parse(&[
            "--provider-uri",
            "https://idp.example",
            "--register",
            "--client-name",
            "demo",
            "--redirect-url",
            "http://localhost:9000/cb",
        ]);
        config.validate().unwrap();

        match config.client_settings().unwrap().source {
            ClientSource::PendingRegistration(meta) => {
                assert_eq!(meta.client_name.as_deref(), Some("demo"));
                assert_eq!(meta.redirect_uris, vec!["http://localhost:9000/cb"]);
            }
            other => panic!("unexpected source: {:?}", other),
        }
    }

    #[test]
    fn test_microsoft_tenant_settings() {
        let config = parse(&[
            "--microsoft-tenant",
            "contoso.onmicrosoft.com",
            "--client-id",
            "app",
            "--client-secret",
            "s3cret",
            "--timeout",
            "3",
        ]);
        config.validate().unwrap();

        let settings = config.client_settings().unwrap();
        assert_eq!(
            settings.provider_uri,
            "https://login.microsoftonline.com/contoso.onmicrosoft.com/v2.0"
        );
        assert_eq!(settings.options.request_timeout, Duration::from_secs(3));
    }

    #[test]
    fn test_provider_is_required() {
        let config = parse(&["--client-id", "app", "--client-secret", "s3cret"]);
        assert!(matches!(config.validate(), Err(OidcError::Config(_))));
    }

    #[test]
    fn test_invalid_claims_json() {
        let config = parse(&[
            "--provider-uri",
            "https://idp.example",
            "--client-id",
            "app",
            "--client-secret",
            "s3cret",
            "--claims",
            "{not json",
        ]);
        assert!(matches!(config.validate(), Err(OidcError::Config(_))));
    }
}
