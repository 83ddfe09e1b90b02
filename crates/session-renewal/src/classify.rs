//! Failure classification
//!
//! Decides, for a finished dispatch, whether the session layer should step
//! in. Only a 401 qualifies, and only when it is the request's first attempt
//! against an ordinary endpoint. Everything else, successes, other statuses,
//! and transport errors alike, goes back to the caller untouched.

use reqwest::StatusCode;
use session_auth::is_auth_exchange;
use transport::{ApiRequest, ApiResponse, TransportError};

/// What the session layer does with a finished dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// Deliver the outcome to the caller unchanged.
    PassThrough,
    /// Renew the credential, then retry the request once.
    Renew,
    /// The retry was rejected too; the session is over.
    Expired,
}

/// Classify the outcome of dispatching `request`.
pub fn classify(
    request: &ApiRequest,
    outcome: &Result<ApiResponse, TransportError>,
) -> Classification {
    let unauthorized = matches!(outcome, Ok(response) if response.status() == StatusCode::UNAUTHORIZED);
    if !unauthorized || is_auth_exchange(request.path()) {
        return Classification::PassThrough;
    }
    if request.is_retry() {
        Classification::Expired
    } else {
        Classification::Renew
    }
}
