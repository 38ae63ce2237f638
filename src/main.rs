//! OIDC RP - command-line login
//!
//! Runs an OpenID Connect authorization code login in the browser, receives
//! the redirect on a loopback server, validates the ID token and prints the
//! resulting claims as JSON on stdout.

use oidc_rp::config::Config;
use oidc_rp::error::{OidcError, Result};
use oidc_rp::oidc::callback;
use oidc_rp::{AuthSession, Cache, Client, FileCache, MemoryCache, ReqwestTransport};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use url::Url;

fn setup_logging(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{}", config.log_level())));

    // Logs go to stderr; stdout carries only the JSON result
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() {
    let config = Config::parse_args();

    setup_logging(&config);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(2);
    }

    if let Err(e) = run_login(config).await {
        if e.is_security_failure() {
            error!("Login rejected: {}", e);
        } else {
            error!("Login failed: {}", e);
        }
        std::process::exit(1);
    }
}

fn open_cache(config: &Config) -> Result<Arc<dyn Cache>> {
    if config.no_cache {
        return Ok(Arc::new(MemoryCache::new()));
    }

    let dir = match config.cache_dir {
        Some(ref dir) => dir.clone(),
        None => FileCache::default_dir()?,
    };
    Ok(Arc::new(FileCache::new(dir)?))
}

async fn run_login(config: Config) -> Result<()> {
    let settings = config.client_settings()?;
    let cache = open_cache(&config)?;
    let transport = Arc::new(ReqwestTransport::new());

    info!("Initializing OIDC client for {}", settings.provider_uri);
    let client = Client::new(settings, transport, cache).await?;

    if config.register {
        // Reuse across runs with --client-id/--client-secret
        info!("Registered client ID: {}", client.config().id);
    }

    let session = if config.no_pkce {
        AuthSession::without_pkce()
    } else {
        AuthSession::new()
    };

    let auth_url = client
        .auth_url_for(&session, Some(&config.scopes()), config.claims_request()?)
        .await?;

    let redirect_url = Url::parse(&config.redirect_url())?;
    let port = redirect_url.port_or_known_default().unwrap_or(8080);
    let path = redirect_url.path().to_string();

    // Fail on a busy port before the user is sent to the provider
    let listener = callback::bind_callback(port).await?;
    let waiting = tokio::spawn(async move {
        callback::serve_until_callback(listener, &path, callback::CALLBACK_TIMEOUT).await
    });

    if config.no_browser {
        eprintln!("\nOpen this URL in your browser:\n\n{}\n", auth_url);
    } else {
        info!("Opening browser for authorization");
        if let Err(e) = webbrowser::open(&auth_url) {
            warn!("Failed to open browser: {}", e);
            eprintln!("\nCould not open browser automatically.");
            eprintln!("Please open this URL in your browser:\n\n{}\n", auth_url);
        }
    }

    let callback_uri = waiting
        .await
        .map_err(|e| OidcError::Config(format!("Callback task failed: {}", e)))??;

    let identity = client.complete_auth(&callback_uri, &session).await?;

    let mut output = serde_json::json!({
        "signature": format!("{:?}", identity.signature),
        "id_token_claims": identity.claims,
    });

    if config.userinfo {
        let user_info = client
            .get_user_info(&identity, identity.access_token())
            .await?;
        output["userinfo"] = serde_json::json!(user_info);
    }

    let rendered = serde_json::to_string_pretty(&output)
        .map_err(|e| OidcError::Config(format!("Failed to render claims: {}", e)))?;
    println!("{}", rendered);

    info!("Login completed successfully");
    Ok(())
}
