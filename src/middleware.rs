//! HTTP middleware for outbound provider requests
//!
//! Implements `reqwest-middleware::Middleware` to log every request the client
//! makes to the identity provider, without leaking credentials.

use async_trait::async_trait;
use http::Extensions;
use reqwest::{Request, Response};
use reqwest_middleware::{Middleware, Next, Result as MiddlewareResult};
use std::time::Instant;
use tracing::{debug, warn};

/// Middleware that traces method, URL, status and latency of provider calls
pub struct TracingMiddleware;

#[async_trait]
impl Middleware for TracingMiddleware {
    async fn handle(
        &self,
        req: Request,
        extensions: &mut Extensions,
        next: Next<'_>,
    ) -> MiddlewareResult<Response> {
        let method = req.method().clone();
        let url = redact_query(req.url());
        let started = Instant::now();

        debug!("Sending {} {}", method, url);

        let result = next.run(req, extensions).await;

        match &result {
            Ok(response) => {
                let status = response.status();
                let elapsed = started.elapsed();
                if status.is_success() {
                    debug!("{} {} -> {} in {:?}", method, url, status, elapsed);
                } else {
                    warn!("{} {} -> {} in {:?}", method, url, status, elapsed);
                }
            }
            Err(e) => warn!("{} {} failed: {}", method, url, e),
        }

        result
    }
}

/// Drop the query string so codes and tokens never reach the logs
fn redact_query(url: &url::Url) -> String {
    let mut url = url.clone();
    if url.query().is_some() {
        url.set_query(Some("redacted"));
    }
    url.to_string()
}
