//! Circuit Analyzer authentication library
//!
//! Provides the token endpoint client and the durable credential store. The
//! session layer (`session-renewal`) builds request decoration and
//! single-flight renewal on top of these pieces.
//!
//! Credential flow:
//! 1. `token::AuthClient::login()` (or `signup()` / `google()`) returns a pair
//! 2. Pair stored via `credentials::CredentialStore::set()`
//! 3. On a 401, the session layer calls `token::AuthClient::refresh()` once
//! 4. The renewed pair replaces the old one, or the store is cleared

pub mod constants;
pub mod credentials;
pub mod error;
pub mod token;

pub use constants::*;
pub use credentials::{CredentialPair, CredentialStore};
pub use error::{Error, Result};
pub use token::{AuthClient, TokenResponse, error_detail};
