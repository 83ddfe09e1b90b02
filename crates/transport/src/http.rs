//! reqwest-backed transport.
//!
//! Joins the request path onto the configured base URL, stamps the request id
//! header, enforces the per-request timeout, and reads the full body. Status
//! codes are never interpreted here: a 401 or 500 comes back as an
//! `ApiResponse` like any other.

use crate::{ApiRequest, ApiResponse, SendFuture, Transport, TransportError};
use reqwest::header::{HeaderName, HeaderValue};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Header carrying the per-request correlation id.
pub const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

/// HTTP transport bound to one API base URL.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl HttpTransport {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            timeout,
        }
    }

    /// Absolute URL for an API path.
    pub fn url(&self, path: &str) -> String {
        join_url(&self.base_url, path)
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl Transport for HttpTransport {
    fn send<'a>(&'a self, request: &'a ApiRequest) -> SendFuture<'a> {
        Box::pin(async move {
            let url = self.url(request.path());
            let mut headers = request.headers().clone();
            if let Ok(value) = HeaderValue::from_str(&request.id().to_string()) {
                headers.insert(REQUEST_ID_HEADER, value);
            }

            let mut builder = self
                .client
                .request(request.method().clone(), &url)
                .headers(headers)
                .timeout(self.timeout);
            if let Some(body) = request.body_bytes() {
                builder = builder.body(body.clone());
            }

            let started = Instant::now();
            let response = builder.send().await.map_err(|e| {
                warn!(
                    request_id = %request.id(),
                    method = %request.method(),
                    path = request.path(),
                    error = %e,
                    "request failed before a response arrived"
                );
                classify_reqwest_error(&e, self.timeout)
            })?;

            let status = response.status();
            let headers = response.headers().clone();
            let body = response
                .bytes()
                .await
                .map_err(|e| classify_reqwest_error(&e, self.timeout))?;

            debug!(
                request_id = %request.id(),
                method = %request.method(),
                path = request.path(),
                status = status.as_u16(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "response received"
            );

            Ok(ApiResponse {
                status,
                headers,
                body,
            })
        })
    }
}

fn classify_reqwest_error(e: &reqwest::Error, timeout: Duration) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout(format!("no response within {}s: {e}", timeout.as_secs_f64()))
    } else if e.is_connect() {
        TransportError::Connect(e.to_string())
    } else {
        TransportError::Http(e.to_string())
    }
}

fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}
