//! Scripted collaborators shared by the unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use reqwest::StatusCode;
use reqwest::header::AUTHORIZATION;
use session_auth::CredentialPair;
use tokio::sync::Notify;
use transport::{ApiRequest, ApiResponse, Attempt, SendFuture, Transport, TransportError};

use crate::coordinator::{RenewFuture, RenewalExchange};
use crate::teardown::{EndReason, SessionObserver};

#[derive(Clone, Copy)]
pub(crate) enum ExchangeMode {
    Issue,
    Reject,
    Panic,
}

/// Scripted exchange: issues `at_{n}` / `rt_{n}` for the n-th call, or
/// fails, optionally holding each call until released.
pub(crate) struct FakeExchange {
    calls: AtomicUsize,
    received: Mutex<Vec<String>>,
    mode: ExchangeMode,
    gate: Option<Arc<Notify>>,
}

impl FakeExchange {
    pub(crate) fn new(mode: ExchangeMode) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            received: Mutex::new(Vec::new()),
            mode,
            gate: None,
        }
    }

    pub(crate) fn gated(mode: ExchangeMode, gate: Arc<Notify>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::new(mode)
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn received(&self) -> Vec<String> {
        self.received.lock().unwrap().clone()
    }
}

impl RenewalExchange for FakeExchange {
    fn renew<'a>(&'a self, renewal_token: &'a str) -> RenewFuture<'a> {
        Box::pin(async move {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            self.received
                .lock()
                .unwrap()
                .push(renewal_token.to_string());
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            match self.mode {
                ExchangeMode::Issue => Ok(CredentialPair::new(
                    format!("at_{n}"),
                    format!("rt_{n}"),
                )),
                ExchangeMode::Reject => Err(session_auth::Error::InvalidCredentials(
                    "/api/auth/refresh rejected (401 Unauthorized): Invalid token".into(),
                )),
                ExchangeMode::Panic => panic!("exchange blew up"),
            }
        })
    }
}

/// Observer that records every reason it is handed.
#[derive(Default)]
pub(crate) struct RecordingObserver {
    reasons: Mutex<Vec<EndReason>>,
}

impl RecordingObserver {
    pub(crate) fn reasons(&self) -> Vec<EndReason> {
        self.reasons.lock().unwrap().clone()
    }
}

impl SessionObserver for RecordingObserver {
    fn session_ended(&self, reason: &EndReason) {
        self.reasons.lock().unwrap().push(reason.clone());
    }
}

/// One request as the fake API saw it.
#[derive(Debug, Clone)]
pub(crate) struct SeenRequest {
    pub(crate) path: String,
    pub(crate) bearer: Option<String>,
    pub(crate) attempt: Attempt,
}

/// In-process stand-in for the API.
///
/// Ordinary paths answer 200 (echoing the path) only for the currently valid
/// access token and 401 otherwise. A few fixed paths misbehave on purpose:
/// - `/api/health`: 200 without credentials
/// - `/api/boom`: 500
/// - `/api/down`: connection failure
/// - `/api/always-401`: 401 whatever the token
/// - `/api/auth/refresh`: 401 (the endpoint rejecting its own token)
/// - `/api/slow`: held until the `holding` gate is notified, then answered
///   like an ordinary path
pub(crate) struct FakeApi {
    valid: String,
    seen: Mutex<Vec<SeenRequest>>,
    hold: Option<Arc<Notify>>,
}

impl FakeApi {
    pub(crate) fn accepting(token: &str) -> Self {
        Self {
            valid: token.to_string(),
            seen: Mutex::new(Vec::new()),
            hold: None,
        }
    }

    pub(crate) fn holding(self, hold: Arc<Notify>) -> Self {
        Self {
            hold: Some(hold),
            ..self
        }
    }

    pub(crate) fn seen(&self) -> Vec<SeenRequest> {
        self.seen.lock().unwrap().clone()
    }

    fn respond(&self, request: &ApiRequest, bearer: Option<&str>) -> transport::Result<ApiResponse> {
        let unauthorized = || {
            ApiResponse::new(
                StatusCode::UNAUTHORIZED,
                r#"{"detail":"Could not validate credentials"}"#,
            )
        };
        match request.path() {
            "/api/health" => Ok(ApiResponse::new(StatusCode::OK, r#"{"status":"ok"}"#)),
            "/api/boom" => Ok(ApiResponse::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                r#"{"detail":"analysis failed"}"#,
            )),
            "/api/down" => Err(TransportError::Connect("connection refused".into())),
            "/api/always-401" | "/api/auth/refresh" => Ok(unauthorized()),
            path => {
                if bearer == Some(self.valid.as_str()) {
                    Ok(ApiResponse::new(
                        StatusCode::OK,
                        serde_json::json!({ "path": path }).to_string(),
                    ))
                } else {
                    Ok(unauthorized())
                }
            }
        }
    }
}

impl Transport for FakeApi {
    fn send<'a>(&'a self, request: &'a ApiRequest) -> SendFuture<'a> {
        Box::pin(async move {
            let bearer = request
                .headers()
                .get(AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.strip_prefix("Bearer "))
                .map(String::from);
            self.seen.lock().unwrap().push(SeenRequest {
                path: request.path().to_string(),
                bearer: bearer.clone(),
                attempt: request.attempt(),
            });
            if let Some(hold) = self.hold.as_ref().filter(|_| request.path() == "/api/slow") {
                hold.notified().await;
            }
            tokio::task::yield_now().await;
            self.respond(request, bearer.as_deref())
        })
    }
}
