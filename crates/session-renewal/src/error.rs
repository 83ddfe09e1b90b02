//! Error types for session-layer requests

use crate::teardown::EndReason;

/// Errors surfaced to callers of `SessionClient`.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Terminal authentication failure; the session has been torn down (or
    /// was never established).
    #[error("session expired: {0}")]
    AuthExpired(EndReason),

    /// No response was obtained. Passed through unchanged, never retried.
    #[error(transparent)]
    Transport(#[from] transport::TransportError),

    /// Sign-in, sign-up, or credential storage failed.
    #[error(transparent)]
    Auth(#[from] session_auth::Error),

    /// The stored access token cannot be carried in an HTTP header.
    #[error("invalid credential: {0}")]
    InvalidCredential(String),

    /// The API answered with a non-success status where a typed body was
    /// expected (JSON helpers only; `send` returns such responses as-is).
    #[error("API returned {status}: {detail}")]
    Api { status: u16, detail: String },
}

impl Error {
    /// Whether the caller should send the user back to sign-in.
    pub fn is_auth_expired(&self) -> bool {
        matches!(self, Error::AuthExpired(_))
    }
}

/// Result alias for session operations.
pub type Result<T> = std::result::Result<T, Error>;
