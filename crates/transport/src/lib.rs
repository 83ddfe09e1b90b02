//! Transport abstraction for Circuit Analyzer API calls
//!
//! Defines the `Transport` trait that decouples the session layer from the
//! HTTP stack, plus the request descriptor and response types that flow
//! through it. `HttpTransport` is the reqwest-backed implementation; tests in
//! the session layer substitute scripted fakes.

pub mod http;

pub use http::HttpTransport;

use bytes::Bytes;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::pin::Pin;
use uuid::Uuid;

/// Which dispatch of a request this descriptor represents.
///
/// A descriptor starts as `First`. After a successful credential renewal it is
/// re-issued exactly once as `Retry`; a retry is never renewed again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attempt {
    First,
    Retry,
}

/// An outbound API request: method, target path, headers, and body.
///
/// The descriptor is cheap to clone (the body is reference-counted). The
/// attempt marker can only change through [`ApiRequest::into_retry`], which
/// consumes the descriptor, so a request that was already retried cannot be
/// aliased back into a first attempt.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    id: Uuid,
    method: Method,
    path: String,
    headers: HeaderMap,
    body: Option<Bytes>,
    attempt: Attempt,
}

impl ApiRequest {
    /// Create a request for `path`, relative to the transport's base URL.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            method,
            path: path.into(),
            headers: HeaderMap::new(),
            body: None,
            attempt: Attempt::First,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Serialize `value` as the JSON body and set `content-type`.
    pub fn json<T: Serialize + ?Sized>(mut self, value: &T) -> Result<Self> {
        let body = serde_json::to_vec(value)
            .map_err(|e| TransportError::InvalidRequest(format!("serializing body: {e}")))?;
        self.headers
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        self.body = Some(Bytes::from(body));
        Ok(self)
    }

    /// Set a raw body without touching headers.
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Add or replace a header.
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Mark this descriptor as the single automatic retry of itself.
    ///
    /// The request id is preserved so both dispatches correlate in logs.
    pub fn into_retry(self) -> Self {
        Self {
            attempt: Attempt::Retry,
            ..self
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    pub fn body_bytes(&self) -> Option<&Bytes> {
        self.body.as_ref()
    }

    pub fn attempt(&self) -> Attempt {
        self.attempt
    }

    pub fn is_retry(&self) -> bool {
        self.attempt == Attempt::Retry
    }
}

/// A fully-read response from the remote service.
///
/// Error statuses are still responses: only failures to obtain a response at
/// all surface as [`TransportError`].
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl ApiResponse {
    pub fn new(status: StatusCode, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Decode the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.body).map_err(|e| {
            TransportError::Decode(format!("invalid JSON in {} response: {e}", self.status))
        })
    }

    /// Body as UTF-8 text, lossily converted.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Failures to obtain a response at all.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("response decode failed: {0}")]
    Decode(String),
}

/// Result alias for transport operations.
pub type Result<T> = std::result::Result<T, TransportError>;

/// Future returned by [`Transport::send`].
pub type SendFuture<'a> = Pin<Box<dyn Future<Output = Result<ApiResponse>> + Send + 'a>>;

/// Abstraction over how a request reaches the remote service.
///
/// Uses `Pin<Box<dyn Future>>` return types for dyn-compatibility
/// (`Arc<dyn Transport>`). Implementations send the request exactly as given:
/// authorization is the caller's concern.
pub trait Transport: Send + Sync {
    /// Dispatch `request` and read the full response.
    fn send<'a>(&'a self, request: &'a ApiRequest) -> SendFuture<'a>;
}
