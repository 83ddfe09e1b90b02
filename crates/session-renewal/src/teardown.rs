//! Session teardown
//!
//! Ends a session by clearing the credential store and telling the hosting
//! application, which owns the re-authentication UI. Teardown cannot fail:
//! the in-memory pair is always dropped, and a failure to remove the
//! credential file is logged rather than returned.

use std::fmt;

use session_auth::CredentialStore;
use tracing::{info, warn};

use crate::metrics;

/// Why a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndReason {
    /// A request was rejected and no refresh token was stored.
    MissingRenewalToken,
    /// The renewal exchange itself failed.
    RenewalRejected(String),
    /// A request retried with a freshly renewed token was rejected again.
    RetryRejected,
    /// The renewal task stopped without a verdict (runtime shutdown or a
    /// panic inside the exchange). The store is left as it was.
    Interrupted,
    /// The user signed out.
    SignedOut,
}

impl EndReason {
    /// Short label for logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            EndReason::MissingRenewalToken => "missing_renewal_token",
            EndReason::RenewalRejected(_) => "renewal_rejected",
            EndReason::RetryRejected => "retry_rejected",
            EndReason::Interrupted => "interrupted",
            EndReason::SignedOut => "signed_out",
        }
    }
}

impl fmt::Display for EndReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EndReason::MissingRenewalToken => write!(f, "no refresh token stored"),
            EndReason::RenewalRejected(detail) => write!(f, "token renewal failed: {detail}"),
            EndReason::RetryRejected => write!(f, "renewed token was rejected"),
            EndReason::Interrupted => write!(f, "token renewal was interrupted"),
            EndReason::SignedOut => write!(f, "signed out"),
        }
    }
}

/// Hook through which the hosting application learns a session ended.
///
/// Called once per ended session, after the store is empty and every
/// waiting request has been rejected. Implementations must not block.
pub trait SessionObserver: Send + Sync {
    fn session_ended(&self, reason: &EndReason);
}

impl<F> SessionObserver for F
where
    F: Fn(&EndReason) + Send + Sync,
{
    fn session_ended(&self, reason: &EndReason) {
        self(reason)
    }
}

/// Observer that only logs. Used when the host has no sign-in screen to show.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogObserver;

impl SessionObserver for LogObserver {
    fn session_ended(&self, reason: &EndReason) {
        warn!(reason = %reason, "session ended, sign in again to continue");
    }
}

/// Drop the stored pair unconditionally.
pub(crate) async fn clear_store(store: &CredentialStore) {
    if let Err(e) = store.clear().await {
        warn!(error = %e, "failed to remove persisted credentials, session cleared in memory");
    }
}

/// Drop the stored pair only if it still carries `access`.
///
/// Returns whether this call ended the session. The store clears its
/// in-memory pair before touching the file, so a file error still counts.
pub(crate) async fn clear_store_if_current(store: &CredentialStore, access: &str) -> bool {
    match store.clear_if_access(access).await {
        Ok(cleared) => cleared,
        Err(e) => {
            warn!(error = %e, "failed to remove persisted credentials, session cleared in memory");
            true
        }
    }
}

/// Tell the host the session is over.
pub(crate) fn signal(observer: &dyn SessionObserver, reason: &EndReason) {
    info!(reason = reason.label(), "session torn down");
    metrics::record_teardown(reason);
    observer.session_ended(reason);
}
