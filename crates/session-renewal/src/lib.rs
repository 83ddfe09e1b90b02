//! Session layer for the Circuit Analyzer API client
//!
//! Attaches the signed-in user's access token to outgoing requests and
//! recovers from its expiry without the caller noticing. When any number of
//! requests are rejected with a 401 at about the same time, exactly one
//! refresh exchange runs; every rejected request waits for it and is then
//! retried once with the new token, or fails with `Error::AuthExpired`.
//!
//! Request lifecycle:
//! 1. `decorate` attaches `Authorization: Bearer <access>` (never on auth endpoints)
//! 2. The transport dispatches the request
//! 3. `classify` picks pass-through, renew, or expired
//! 4. `RenewalCoordinator::renew` parks the request behind the episode's exchange
//! 5. `retry::redispatch` re-sends it once with the renewed token
//! 6. Terminal failures clear the store and notify the `SessionObserver` once

pub mod classify;
pub mod client;
pub mod coordinator;
pub mod decorate;
pub mod error;
pub mod metrics;
pub mod retry;
pub mod teardown;

#[cfg(test)]
mod testing;

pub use classify::{Classification, classify};
pub use client::SessionClient;
pub use coordinator::{RenewFuture, Renewal, RenewalCoordinator, RenewalExchange};
pub use decorate::{Dispatch, decorate, with_bearer};
pub use error::{Error, Result};
pub use teardown::{EndReason, LogObserver, SessionObserver};
