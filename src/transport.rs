//! HTTP transport used for every provider round-trip
//!
//! The OIDC core only talks to providers through [`Transport`], so tests can
//! substitute an in-process fake and applications can bring their own client.

use crate::error::{OidcError, Result};
use crate::middleware::TracingMiddleware;
use async_trait::async_trait;
use http::{header, HeaderValue, Method, Request, Response};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use serde::de::DeserializeOwned;
use std::time::Duration;
use thiserror::Error;

/// Failure below the HTTP layer (DNS, connect, TLS, reset, ...)
#[derive(Error, Debug)]
#[error("{message}")]
pub struct TransportError {
    pub message: String,
    pub retryable: bool,
}

impl TransportError {
    pub fn new(message: impl Into<String>, retryable: bool) -> Self {
        Self {
            message: message.into(),
            retryable,
        }
    }
}

impl From<TransportError> for OidcError {
    fn from(err: TransportError) -> Self {
        OidcError::Network {
            message: err.message,
            retryable: err.retryable,
        }
    }
}

/// Sends a single HTTP request and returns the full response
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(
        &self,
        request: Request<Vec<u8>>,
    ) -> std::result::Result<Response<Vec<u8>>, TransportError>;
}

/// Transport backed by reqwest with the request tracing middleware
#[derive(Clone)]
pub struct ReqwestTransport {
    client: ClientWithMiddleware,
}

impl ReqwestTransport {
    pub fn new() -> Self {
        Self::with_client(reqwest::Client::new())
    }

    /// Wrap a preconfigured reqwest client (proxies, root certificates, ...)
    pub fn with_client(client: reqwest::Client) -> Self {
        let client = ClientBuilder::new(client).with(TracingMiddleware).build();
        Self { client }
    }
}

impl Default for ReqwestTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(
        &self,
        request: Request<Vec<u8>>,
    ) -> std::result::Result<Response<Vec<u8>>, TransportError> {
        let request = reqwest::Request::try_from(request)
            .map_err(|e| TransportError::new(format!("Invalid request: {}", e), false))?;

        let response = self.client.execute(request).await.map_err(|e| match e {
            reqwest_middleware::Error::Reqwest(e) => {
                let retryable = e.is_timeout() || e.is_connect() || e.is_request();
                TransportError::new(e.to_string(), retryable)
            }
            reqwest_middleware::Error::Middleware(e) => TransportError::new(e.to_string(), false),
        })?;

        let mut builder = Response::builder().status(response.status());
        for (name, value) in response.headers() {
            builder = builder.header(name, value);
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| TransportError::new(format!("Failed to read body: {}", e), true))?;

        builder
            .body(body.to_vec())
            .map_err(|e| TransportError::new(format!("Invalid response: {}", e), false))
    }
}

/// Send a request, failing with a retryable network error once `deadline` elapses
pub(crate) async fn send_with_deadline(
    transport: &dyn Transport,
    request: Request<Vec<u8>>,
    deadline: Duration,
) -> Result<Response<Vec<u8>>> {
    let method = request.method().clone();
    let uri = request.uri().to_string();

    match tokio::time::timeout(deadline, transport.send(request)).await {
        Ok(result) => Ok(result?),
        Err(_) => {
            tracing::warn!("{} {} timed out after {:?}", method, uri, deadline);
            Err(OidcError::network(
                format!("{} {} timed out after {:?}", method, uri, deadline),
                true,
            ))
        }
    }
}

/// Build a GET request that expects a JSON body
pub(crate) fn get_json(url: &str) -> Result<Request<Vec<u8>>> {
    Request::builder()
        .method(Method::GET)
        .uri(url)
        .header(header::ACCEPT, HeaderValue::from_static("application/json"))
        .body(Vec::new())
        .map_err(|e| OidcError::Config(format!("Invalid request URL {}: {}", url, e)))
}

/// Map a non-2xx status on a metadata fetch to a network error
///
/// Server-side failures and throttling are worth retrying; everything else
/// needs the caller to fix something first.
pub(crate) fn status_error(url: &str, response: &Response<Vec<u8>>) -> OidcError {
    let status = response.status();
    OidcError::network(
        format!("GET {} failed with status {}", url, status),
        status.is_server_error() || status == http::StatusCode::TOO_MANY_REQUESTS,
    )
}

pub(crate) fn body_text(response: &Response<Vec<u8>>) -> String {
    String::from_utf8_lossy(response.body()).into_owned()
}

pub(crate) fn parse_json<T: DeserializeOwned>(
    response: &Response<Vec<u8>>,
) -> std::result::Result<T, serde_json::Error> {
    serde_json::from_slice(response.body())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StalledTransport;

    #[async_trait]
    impl Transport for StalledTransport {
        async fn send(
            &self,
            _request: Request<Vec<u8>>,
        ) -> std::result::Result<Response<Vec<u8>>, TransportError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Err(TransportError::new("unreachable", false))
        }
    }

    struct RefusingTransport;

    #[async_trait]
    impl Transport for RefusingTransport {
        async fn send(
            &self,
            _request: Request<Vec<u8>>,
        ) -> std::result::Result<Response<Vec<u8>>, TransportError> {
            Err(TransportError::new("connection refused", true))
        }
    }

    #[tokio::test]
    async fn test_deadline_elapses_as_retryable_network_error() {
        let request = get_json("https://idp.example/.well-known/openid-configuration").unwrap();
        let err = send_with_deadline(&StalledTransport, request, Duration::from_millis(20))
            .await
            .unwrap_err();

        assert!(matches!(err, OidcError::Network { .. }));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_transport_error_becomes_network_error() {
        let request = get_json("https://idp.example/jwks").unwrap();
        let err = send_with_deadline(&RefusingTransport, request, Duration::from_secs(1))
            .await
            .unwrap_err();

        match err {
            OidcError::Network { message, retryable } => {
                assert_eq!(message, "connection refused");
                assert!(retryable);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_status_error_retryability() {
        let server_error = Response::builder().status(503).body(Vec::new()).unwrap();
        assert!(status_error("https://idp.example", &server_error).is_retryable());

        let not_found = Response::builder().status(404).body(Vec::new()).unwrap();
        assert!(!status_error("https://idp.example", &not_found).is_retryable());
    }
}
