//! Session-aware API client
//!
//! Every call runs the same pipeline:
//! 1. Decorate a copy of the request with the stored access token
//! 2. Dispatch it through the transport
//! 3. Classify the outcome; anything but a first-attempt 401 is returned as-is
//! 4. On a first-attempt 401, park on the coordinator until the episode's
//!    single renewal settles, then retry once with the new token
//!
//! Callers never see the intermediate 401: they get the retried response, a
//! pass-through failure, or `Error::AuthExpired`.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use session_auth::{AuthClient, CredentialStore, TokenResponse, error_detail};
use tracing::{debug, info};
use transport::{ApiRequest, ApiResponse, HttpTransport, Transport};

use crate::classify::{Classification, classify};
use crate::coordinator::RenewalCoordinator;
use crate::decorate::decorate;
use crate::error::{Error, Result};
use crate::metrics;
use crate::retry::redispatch;
use crate::teardown::{EndReason, SessionObserver};

/// Client for one API deployment, sharing a single session.
///
/// Cheap to clone; clones share the transport and the coordinator.
#[derive(Clone)]
pub struct SessionClient {
    transport: Arc<dyn Transport>,
    auth: AuthClient,
    coordinator: Arc<RenewalCoordinator>,
}

impl SessionClient {
    pub fn new(
        transport: Arc<dyn Transport>,
        auth: AuthClient,
        coordinator: Arc<RenewalCoordinator>,
    ) -> Self {
        Self {
            transport,
            auth,
            coordinator,
        }
    }

    /// Wire up HTTP transport, auth client, and coordinator for `base_url`.
    ///
    /// With a `credentials_path` the session survives restarts; without one
    /// it lives in memory only.
    pub async fn connect(
        base_url: &str,
        timeout: Duration,
        credentials_path: Option<PathBuf>,
        observer: Arc<dyn SessionObserver>,
    ) -> Result<Self> {
        let client = reqwest::Client::new();
        let store = match credentials_path {
            Some(path) => CredentialStore::load(path).await?,
            None => CredentialStore::in_memory(),
        };
        let auth = AuthClient::new(client.clone(), base_url, timeout);
        let coordinator =
            RenewalCoordinator::new(Arc::new(store), Arc::new(auth.clone()), observer);
        let transport = Arc::new(HttpTransport::new(client, base_url, timeout));
        Ok(Self::new(transport, auth, coordinator))
    }

    pub fn coordinator(&self) -> &Arc<RenewalCoordinator> {
        &self.coordinator
    }

    pub async fn is_signed_in(&self) -> bool {
        self.coordinator.credentials().await.is_some()
    }

    /// Sign in with email and password.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<()> {
        let tokens = self.auth.login(email, password).await?;
        self.start_session(tokens).await
    }

    /// Create an account and sign in to it.
    pub async fn sign_up(&self, email: &str, name: &str, password: &str) -> Result<()> {
        let tokens = self.auth.signup(email, name, password).await?;
        self.start_session(tokens).await
    }

    /// Sign in with a Google ID token.
    pub async fn sign_in_google(&self, id_token: &str) -> Result<()> {
        let tokens = self.auth.google(id_token).await?;
        self.start_session(tokens).await
    }

    pub async fn sign_out(&self) {
        self.coordinator.sign_out().await;
    }

    async fn start_session(&self, tokens: TokenResponse) -> Result<()> {
        self.coordinator.establish(tokens.into_pair()).await?;
        Ok(())
    }

    /// Send `request` with session handling.
    ///
    /// Non-success statuses other than a renewable 401 come back as `Ok`
    /// responses; transport failures come back as `Error::Transport`.
    pub async fn send(&self, request: ApiRequest) -> Result<ApiResponse> {
        let result = self.dispatch(request).await;
        metrics::record_request(outcome_label(&result));
        result
    }

    async fn dispatch(&self, request: ApiRequest) -> Result<ApiResponse> {
        let credentials = self.coordinator.credentials().await;
        let dispatch = decorate(&request, credentials.as_ref())?;
        debug!(
            request_id = %request.id(),
            method = %request.method(),
            path = request.path(),
            authorized = dispatch.access.is_some(),
            "dispatching request"
        );
        let outcome = self.transport.send(&dispatch.request).await;

        match classify(&dispatch.request, &outcome) {
            Classification::PassThrough => Ok(outcome?),
            Classification::Expired => {
                if let Some(access) = &dispatch.access {
                    self.coordinator.expire_rejected(access).await;
                }
                Err(Error::AuthExpired(EndReason::RetryRejected))
            }
            Classification::Renew => {
                let retry = request.into_retry();
                let access = self
                    .coordinator
                    .renew(retry.id(), dispatch.access.as_ref())
                    .await
                    .map_err(Error::AuthExpired)?;
                info!(request_id = %retry.id(), path = retry.path(), "retrying with renewed token");
                redispatch(self.transport.as_ref(), &self.coordinator, &retry, &access).await
            }
        }
    }

    /// GET `path` and decode a JSON body.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self.send(ApiRequest::get(path)).await?;
        decode(&response)
    }

    /// POST `body` as JSON to `path` and decode a JSON body.
    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self.send(ApiRequest::post(path).json(body)?).await?;
        decode(&response)
    }
}

fn decode<T: DeserializeOwned>(response: &ApiResponse) -> Result<T> {
    if !response.is_success() {
        return Err(Error::Api {
            status: response.status().as_u16(),
            detail: error_detail(&response.text()),
        });
    }
    Ok(response.json()?)
}

fn outcome_label(result: &Result<ApiResponse>) -> &'static str {
    match result {
        Ok(response) if response.is_success() => "success",
        Ok(_) => "error_status",
        Err(Error::AuthExpired(_)) => "auth_expired",
        Err(Error::Transport(_)) => "transport_error",
        Err(_) => "error",
    }
}
