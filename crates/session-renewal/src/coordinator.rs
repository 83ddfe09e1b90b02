//! Single-flight renewal coordinator
//!
//! Owns the credential store and the renewal state. When a request is
//! rejected with a 401, its task calls [`RenewalCoordinator::renew`] and
//! parks on a completion handle. The first caller of an episode also spawns
//! the one renewal task for that episode; later callers only queue.
//!
//! State transitions (pure, see [`admit`] and [`drain`]):
//! - Idle → InFlight (first rejected request; exchange task spawned)
//! - InFlight → InFlight (further rejected requests queue behind it)
//! - InFlight → Idle (exchange settled; every waiter resolved in queue order)
//!
//! The state lives behind a `std::sync::Mutex` that is never held across an
//! await, so queueing and draining are atomic with respect to each other.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use common::Secret;
use session_auth::{AuthClient, CredentialPair, CredentialStore};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::metrics;
use crate::teardown::{self, EndReason, SessionObserver};

/// Outcome handed to every waiter of an episode: the access token to retry
/// with, or the reason the session ended.
pub type Renewal = std::result::Result<Secret<String>, EndReason>;

/// Future returned by [`RenewalExchange::renew`].
pub type RenewFuture<'a> =
    Pin<Box<dyn Future<Output = session_auth::Result<CredentialPair>> + Send + 'a>>;

/// The remote exchange that trades a refresh token for a fresh pair.
///
/// Uses `Pin<Box<dyn Future>>` return types for dyn-compatibility
/// (`Arc<dyn RenewalExchange>`).
pub trait RenewalExchange: Send + Sync {
    fn renew<'a>(&'a self, renewal_token: &'a str) -> RenewFuture<'a>;
}

impl RenewalExchange for AuthClient {
    fn renew<'a>(&'a self, renewal_token: &'a str) -> RenewFuture<'a> {
        Box::pin(async move {
            self.refresh(renewal_token)
                .await
                .map(|tokens| tokens.into_pair())
        })
    }
}

/// A request parked until the current episode settles.
#[derive(Debug)]
pub(crate) struct Waiter {
    request_id: Uuid,
    completion: oneshot::Sender<Renewal>,
}

/// Renewal state.
///
/// Invariant: `waiters` is non-empty exactly while `InFlight`; leaving
/// `InFlight` hands every waiter to the caller of [`drain`].
#[derive(Debug, Default)]
pub(crate) enum RenewalState {
    #[default]
    Idle,
    InFlight { waiters: Vec<Waiter> },
}

/// How a rejected request joined the episode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Admission {
    /// First of its episode: must start the exchange.
    Leader,
    /// Queued behind an exchange already in flight, at this position.
    Queued { position: usize },
}

/// Admit a waiter. Pure function: no I/O.
pub(crate) fn admit(state: RenewalState, waiter: Waiter) -> (RenewalState, Admission) {
    match state {
        RenewalState::Idle => (
            RenewalState::InFlight {
                waiters: vec![waiter],
            },
            Admission::Leader,
        ),
        RenewalState::InFlight { mut waiters } => {
            waiters.push(waiter);
            let position = waiters.len() - 1;
            (
                RenewalState::InFlight { waiters },
                Admission::Queued { position },
            )
        }
    }
}

/// Settle the episode: back to Idle, returning waiters in arrival order.
pub(crate) fn drain(state: RenewalState) -> (RenewalState, Vec<Waiter>) {
    match state {
        RenewalState::Idle => (RenewalState::Idle, Vec::new()),
        RenewalState::InFlight { waiters } => (RenewalState::Idle, waiters),
    }
}

/// Process-wide owner of the session credentials and the renewal state.
///
/// Construct once with [`RenewalCoordinator::new`] and share the returned
/// `Arc` with every request path. The coordinator is the only writer of the
/// credential store.
pub struct RenewalCoordinator {
    store: Arc<CredentialStore>,
    exchange: Arc<dyn RenewalExchange>,
    observer: Arc<dyn SessionObserver>,
    state: Mutex<RenewalState>,
}

impl RenewalCoordinator {
    pub fn new(
        store: Arc<CredentialStore>,
        exchange: Arc<dyn RenewalExchange>,
        observer: Arc<dyn SessionObserver>,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            exchange,
            observer,
            state: Mutex::new(RenewalState::Idle),
        })
    }

    /// Current pair, if signed in.
    pub async fn credentials(&self) -> Option<CredentialPair> {
        self.store.get().await
    }

    /// Whether a renewal episode is in flight.
    pub fn is_renewing(&self) -> bool {
        matches!(*self.lock_state(), RenewalState::InFlight { .. })
    }

    /// Requests parked behind the current episode (0 when idle).
    pub fn pending(&self) -> usize {
        match &*self.lock_state() {
            RenewalState::Idle => 0,
            RenewalState::InFlight { waiters } => waiters.len(),
        }
    }

    /// Obtain a replacement for a rejected access token.
    ///
    /// `rejected` is the token the failing request carried (`None` if it was
    /// sent without one). Every caller whose request failed during the same
    /// episode receives the same outcome, in the order they arrived, and
    /// only after the single exchange has settled.
    pub async fn renew(
        self: &Arc<Self>,
        request_id: Uuid,
        rejected: Option<&Secret<String>>,
    ) -> Renewal {
        let (completion, outcome) = oneshot::channel();
        let admission = {
            let mut state = self.lock_state();
            let (next, admission) = admit(
                std::mem::take(&mut *state),
                Waiter {
                    request_id,
                    completion,
                },
            );
            *state = next;
            admission
        };
        metrics::record_waiter();

        match admission {
            Admission::Leader => {
                info!(request_id = %request_id, "access token rejected, starting renewal");
                let coordinator = Arc::clone(self);
                let rejected = rejected.cloned();
                tokio::spawn(async move { coordinator.run_episode(rejected).await });
            }
            Admission::Queued { position } => {
                debug!(request_id = %request_id, position, "renewal in flight, queued");
            }
        }

        outcome.await.unwrap_or(Err(EndReason::Interrupted))
    }

    /// Store a pair obtained by signing in.
    pub async fn establish(&self, pair: CredentialPair) -> session_auth::Result<()> {
        self.store.set(pair).await?;
        info!("session established");
        Ok(())
    }

    /// End the session at the user's request.
    pub async fn sign_out(&self) {
        teardown::clear_store(&self.store).await;
        teardown::signal(self.observer.as_ref(), &EndReason::SignedOut);
    }

    /// End the session because the freshly renewed `access` was rejected.
    ///
    /// Only the first rejection of a given token tears the session down; a
    /// pair stored since then is left alone.
    pub async fn expire_rejected(&self, access: &Secret<String>) {
        if teardown::clear_store_if_current(&self.store, access.as_str()).await {
            teardown::signal(self.observer.as_ref(), &EndReason::RetryRejected);
        }
    }

    /// Body of the spawned renewal task: one per episode.
    async fn run_episode(&self, rejected: Option<Secret<String>>) {
        let guard = SettleGuard {
            coordinator: self,
            settled: false,
        };

        match self.obtain(rejected.as_ref()).await {
            Ok(pair) => {
                let waiters = guard.settle(Ok(pair.access));
                info!(waiters, "renewal settled, retrying rejected requests");
            }
            Err(reason) => {
                // A request that carried a token found the store empty: the
                // session was already ended (and signalled) since it was sent.
                let already_ended =
                    reason == EndReason::MissingRenewalToken && rejected.is_some();
                if !already_ended {
                    teardown::clear_store(&self.store).await;
                }
                let waiters = guard.settle(Err(reason.clone()));
                warn!(waiters, reason = %reason, "renewal failed, rejecting queued requests");
                metrics::record_episode("failed");
                if already_ended {
                    debug!("session already ended, not signalling again");
                } else {
                    teardown::signal(self.observer.as_ref(), &reason);
                }
            }
        }
    }

    /// Produce the pair waiters should retry with.
    ///
    /// If the store already holds a different access token than the rejected
    /// one, an earlier episode (or a sign-in) has replaced it while the
    /// failing request was on the wire; that pair is reused without another
    /// exchange.
    async fn obtain(
        &self,
        rejected: Option<&Secret<String>>,
    ) -> std::result::Result<CredentialPair, EndReason> {
        let Some(current) = self.store.get().await else {
            warn!("no refresh token stored, cannot renew");
            return Err(EndReason::MissingRenewalToken);
        };

        if rejected != Some(&current.access) {
            debug!("stored access token already replaced, reusing it");
            metrics::record_episode("reused");
            return Ok(current);
        }

        metrics::record_exchange();
        match self.exchange.renew(current.renewal.as_str()).await {
            Ok(pair) => {
                if let Err(e) = self.store.set(pair.clone()).await {
                    warn!(error = %e, "failed to persist renewed credentials, keeping them in memory");
                }
                metrics::record_episode("renewed");
                Ok(pair)
            }
            Err(e) => Err(EndReason::RenewalRejected(e.to_string())),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, RenewalState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Move to Idle and deliver `outcome` to every waiter, in arrival order.
    fn settle_waiters(&self, outcome: &Renewal) -> usize {
        let mut state = self.lock_state();
        let (next, waiters) = drain(std::mem::take(&mut *state));
        let count = waiters.len();
        for waiter in waiters {
            if waiter.completion.send(outcome.clone()).is_err() {
                debug!(request_id = %waiter.request_id, "waiter dropped before renewal settled");
            }
        }
        *state = next;
        count
    }
}

/// Guarantees the episode's waiters are released even if the renewal task
/// never reaches a verdict (panic, runtime shutdown).
struct SettleGuard<'a> {
    coordinator: &'a RenewalCoordinator,
    settled: bool,
}

impl SettleGuard<'_> {
    fn settle(mut self, outcome: Renewal) -> usize {
        self.settled = true;
        self.coordinator.settle_waiters(&outcome)
    }
}

impl Drop for SettleGuard<'_> {
    fn drop(&mut self) {
        if !self.settled {
            let waiters = self
                .coordinator
                .settle_waiters(&Err(EndReason::Interrupted));
            warn!(waiters, "renewal task ended without a result");
            metrics::record_episode("interrupted");
        }
    }
}
