//! Session-layer metrics
//!
//! Emitted through the `metrics` facade; the host decides whether a recorder
//! is installed.
//!
//! - `client_requests_total` (counter): label `outcome`
//! - `session_renewal_episodes_total` (counter): label `outcome`
//! - `session_renewal_exchanges_total` (counter)
//! - `session_renewal_waiters_total` (counter)
//! - `session_teardowns_total` (counter): label `reason`

use crate::teardown::EndReason;

/// Record how a `SessionClient::send` call finished.
pub fn record_request(outcome: &'static str) {
    metrics::counter!("client_requests_total", "outcome" => outcome).increment(1);
}

/// Record how a renewal episode settled.
pub fn record_episode(outcome: &'static str) {
    metrics::counter!("session_renewal_episodes_total", "outcome" => outcome).increment(1);
}

/// Record one call to the remote renewal exchange.
pub fn record_exchange() {
    metrics::counter!("session_renewal_exchanges_total").increment(1);
}

/// Record a request parked behind a renewal episode.
pub fn record_waiter() {
    metrics::counter!("session_renewal_waiters_total").increment(1);
}

/// Record a session teardown.
pub fn record_teardown(reason: &EndReason) {
    metrics::counter!("session_teardowns_total", "reason" => reason.label()).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;
    use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle, PrometheusRecorder};

    #[test]
    fn record_functions_do_not_panic_without_recorder() {
        record_request("ok");
        record_episode("renewed");
        record_exchange();
        record_waiter();
        record_teardown(&EndReason::SignedOut);
    }

    /// Isolated recorder; `install_recorder()` would claim the process-wide
    /// slot and fail for every test after the first.
    fn isolated_recorder() -> (PrometheusRecorder, PrometheusHandle) {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        (recorder, handle)
    }

    #[test]
    fn counters_render_with_labels() {
        let (recorder, handle) = isolated_recorder();
        let _guard = metrics::set_default_local_recorder(&recorder);

        record_request("renewed");
        record_episode("failed");
        record_exchange();
        record_waiter();
        record_waiter();
        record_teardown(&EndReason::RenewalRejected("401".into()));

        let output = handle.render();
        assert!(output.contains("client_requests_total{outcome=\"renewed\"} 1"));
        assert!(output.contains("session_renewal_episodes_total{outcome=\"failed\"} 1"));
        assert!(output.contains("session_renewal_exchanges_total 1"));
        assert!(output.contains("session_renewal_waiters_total 2"));
        assert!(output.contains("session_teardowns_total{reason=\"renewal_rejected\"} 1"));
    }
}
