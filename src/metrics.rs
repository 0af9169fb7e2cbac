//! Metrics emitted through the `metrics` facade
//!
//! Nothing is recorded unless the host process installs a recorder.

/// Label values
pub mod labels {
    /// Outcome: success
    pub const OUTCOME_OK: &str = "ok";
    /// Outcome: failure
    pub const OUTCOME_ERROR: &str = "error";
}

/// Counters
pub mod counters {
    /// A session was established
    pub fn connection_opened(protocol: &'static str) {
        metrics::counter!("omnisci_fixture_connections_total", "protocol" => protocol).increment(1);
    }

    /// A connection attempt failed
    pub fn connection_failed(protocol: &'static str, category: &'static str) {
        metrics::counter!(
            "omnisci_fixture_connection_errors_total",
            "protocol" => protocol,
            "category" => category
        )
        .increment(1);
    }

    /// A service call completed
    pub fn call_completed(method: &str, outcome: &'static str) {
        metrics::counter!(
            "omnisci_fixture_calls_total",
            "method" => method.to_string(),
            "outcome" => outcome
        )
        .increment(1);
    }

    /// A verification check finished
    pub fn check_completed(check: &'static str, outcome: &'static str) {
        metrics::counter!(
            "omnisci_fixture_checks_total",
            "check" => check,
            "outcome" => outcome
        )
        .increment(1);
    }
}

/// Histograms
pub mod histograms {
    /// Time from transport open to authenticated session
    pub fn connect_duration(protocol: &'static str, millis: u64) {
        metrics::histogram!("omnisci_fixture_connect_duration_ms", "protocol" => protocol)
            .record(millis as f64);
    }

    /// Round-trip time of one service call
    pub fn call_duration(method: &str, millis: u64) {
        metrics::histogram!(
            "omnisci_fixture_call_duration_ms",
            "method" => method.to_string()
        )
        .record(millis as f64);
    }
}
