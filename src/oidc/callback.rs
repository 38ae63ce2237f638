//! Loopback redirect receiver
//!
//! Temporary HTTP server on localhost that captures the redirect back from
//! the provider. It only hands the raw callback URI over; all checks on
//! `state`, `code` and `error` happen in the client.

use crate::error::{OidcError, Result};
use axum::{
    http::Uri,
    response::{Html, IntoResponse},
    routing::get,
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Mutex};

pub const CALLBACK_TIMEOUT: Duration = Duration::from_secs(300);

type UriSender = Arc<Mutex<Option<oneshot::Sender<String>>>>;

const DONE_PAGE: &str = r#"
<html>
    <head><title>Sign-in received</title></head>
    <body>
        <h1>Sign-in received</h1>
        <p>You can close this window and return to your terminal.</p>
    </body>
</html>
"#;

/// Claim 127.0.0.1:`port` for the redirect listener
pub async fn bind_callback(port: u16) -> Result<tokio::net::TcpListener> {
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    tokio::net::TcpListener::bind(addr).await.map_err(|e| {
        OidcError::Config(format!("Cannot listen for the redirect on {}: {}", addr, e))
    })
}

/// Serve `path` on a bound listener until one redirect arrives
///
/// Returns the request URI (path and query) of that redirect.
pub async fn serve_until_callback(
    listener: tokio::net::TcpListener,
    path: &str,
    timeout: Duration,
) -> Result<String> {
    if let Ok(addr) = listener.local_addr() {
        tracing::info!("Waiting for OAuth redirect on http://{}{}", addr, path);
    }

    let (tx, rx) = oneshot::channel::<String>();
    let tx: UriSender = Arc::new(Mutex::new(Some(tx)));

    let app = Router::new().route(
        path,
        get({
            let tx = tx.clone();
            move |uri: Uri| async move { capture(uri, tx).await }
        }),
    );

    let server = axum::serve(listener, app);

    tokio::select! {
        result = rx => {
            result.map_err(|_| OidcError::Config("Callback channel closed".to_string()))
        }
        _ = tokio::time::sleep(timeout) => {
            Err(OidcError::network(
                format!("No OAuth redirect received within {:?}", timeout),
                true,
            ))
        }
        server_result = server => {
            server_result?;
            Err(OidcError::Config("Callback server stopped unexpectedly".to_string()))
        }
    }
}

async fn capture(uri: Uri, tx: UriSender) -> impl IntoResponse {
    if let Some(sender) = tx.lock().await.take() {
        let _ = sender.send(uri.to_string());
    }
    Html(DONE_PAGE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_captures_redirect_uri() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            serve_until_callback(listener, "/auth/callback", Duration::from_secs(5)).await
        });

        let body = reqwest::get(format!(
            "http://{}/auth/callback?code=abc&state=s1",
            addr
        ))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
        assert!(body.contains("Sign-in received"));

        let uri = server.await.unwrap().unwrap();
        assert_eq!(uri, "/auth/callback?code=abc&state=s1");
    }

    #[tokio::test]
    async fn test_bind_reports_port_in_use() {
        let taken = bind_callback(0).await.unwrap();
        let port = taken.local_addr().unwrap().port();

        let err = bind_callback(port).await.unwrap_err();
        assert!(matches!(err, OidcError::Config(ref msg) if msg.contains(&port.to_string())));
    }

    #[tokio::test]
    async fn test_times_out_as_retryable() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let err = serve_until_callback(listener, "/auth/callback", Duration::from_millis(20))
            .await
            .unwrap_err();
        assert!(err.is_retryable());
    }
}
