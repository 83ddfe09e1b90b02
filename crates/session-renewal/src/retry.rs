//! Retry dispatch
//!
//! Re-issues a rejected request once, with the access token the renewal
//! episode produced. The descriptor is already marked as a retry, so a second
//! 401 classifies as terminal instead of starting another episode.

use common::Secret;
use tracing::{debug, warn};
use transport::{ApiRequest, ApiResponse, Transport};

use crate::classify::{Classification, classify};
use crate::coordinator::RenewalCoordinator;
use crate::decorate::with_bearer;
use crate::error::{Error, Result};
use crate::teardown::EndReason;

/// Send `request` (a retry) with `access` through the same transport as the
/// first attempt.
///
/// Any outcome other than a 401 goes back to the caller as-is. A 401 ends the
/// session (once per rejected token) and surfaces as `AuthExpired`.
pub async fn redispatch(
    transport: &dyn Transport,
    coordinator: &RenewalCoordinator,
    request: &ApiRequest,
    access: &Secret<String>,
) -> Result<ApiResponse> {
    debug_assert!(request.is_retry(), "redispatch takes retry descriptors only");

    let authorized = with_bearer(request, access)?;
    let outcome = transport.send(&authorized).await;

    match classify(&authorized, &outcome) {
        Classification::Expired => {
            warn!(request_id = %request.id(), path = request.path(), "renewed token rejected on retry");
            coordinator.expire_rejected(access).await;
            Err(Error::AuthExpired(EndReason::RetryRejected))
        }
        Classification::PassThrough | Classification::Renew => {
            debug!(request_id = %request.id(), "retry completed");
            Ok(outcome?)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ExchangeMode, FakeApi, FakeExchange, RecordingObserver};
    use reqwest::StatusCode;
    use session_auth::{CredentialPair, CredentialStore};
    use std::sync::Arc;

    async fn coordinator(
        observer: Arc<RecordingObserver>,
    ) -> (Arc<RenewalCoordinator>, Arc<CredentialStore>) {
        let store = Arc::new(CredentialStore::in_memory());
        store.set(CredentialPair::new("at_1", "rt_1")).await.unwrap();
        let coordinator = RenewalCoordinator::new(
            store.clone(),
            Arc::new(FakeExchange::new(ExchangeMode::Issue)),
            observer,
        );
        (coordinator, store)
    }

    #[tokio::test]
    async fn retry_carries_renewed_token() {
        let api = FakeApi::accepting("at_1");
        let (coordinator, _) = coordinator(Arc::default()).await;
        let request = ApiRequest::get("/api/history").into_retry();

        let response = redispatch(&api, &coordinator, &request, &Secret::from("at_1"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(api.seen()[0].bearer.as_deref(), Some("at_1"));
    }

    #[tokio::test]
    async fn non_auth_failure_on_retry_is_delivered_as_is() {
        let api = FakeApi::accepting("at_1");
        let observer = Arc::new(RecordingObserver::default());
        let (coordinator, store) = coordinator(observer.clone()).await;
        let request = ApiRequest::get("/api/boom").into_retry();

        let response = redispatch(&api, &coordinator, &request, &Secret::from("at_1"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!store.is_empty().await);
        assert!(observer.reasons().is_empty());
    }

    #[tokio::test]
    async fn second_rejection_expires_the_session() {
        let api = FakeApi::accepting("at_other");
        let observer = Arc::new(RecordingObserver::default());
        let (coordinator, store) = coordinator(observer.clone()).await;
        let request = ApiRequest::get("/api/history").into_retry();

        let err = redispatch(&api, &coordinator, &request, &Secret::from("at_1"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::AuthExpired(EndReason::RetryRejected)));
        assert!(store.is_empty().await);
        assert_eq!(observer.reasons(), vec![EndReason::RetryRejected]);
    }
}
