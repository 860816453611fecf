//! Prometheus metrics (spec §6): a counter by state for reconciled
//! requests, a counter by (plugin-operation, outcome) for plugin calls,
//! and the HTTP request counters the out-of-scope HTTP layer is expected
//! to populate. Modeled on the teacher's `ControllerMetrics::new(tag)`
//! pattern — one struct per process, registered once at startup.

#![cfg(feature = "metrics")]

use prometheus::{register_counter_vec, register_histogram_vec, CounterVec, HistogramVec};

pub struct ControllerMetrics {
    /// Reconciliations by the resulting `requestState`.
    pub reconcile_state_counter: CounterVec,

    /// Plugin calls by (operation, outcome), where operation is
    /// `grant`/`revoke` and outcome is `granted`/`pending`/`denied`/
    /// `revoked`/`error`.
    pub plugin_call_counter: CounterVec,

    /// HTTP requests served by the out-of-scope HTTP layer, by
    /// (method, path).
    pub http_request_counter: CounterVec,

    /// HTTP request latency, by (method, path).
    pub http_request_histogram: HistogramVec,
}

impl ControllerMetrics {
    pub fn new(tag: &str) -> Self {
        let pre = format!("{}_{}", prefix(), tag);
        let reconcile_state_counter = register_counter_vec!(
            format!("{pre}_reconcile_state_counter"),
            "Number of reconciles by resulting request state.",
            &["state"]
        )
        .unwrap();
        let plugin_call_counter = register_counter_vec!(
            format!("{pre}_plugin_call_counter"),
            "Number of plugin calls by operation and outcome.",
            &["operation", "outcome"]
        )
        .unwrap();
        let http_request_counter = register_counter_vec!(
            format!("{pre}_http_requests_total"),
            "Number of HTTP requests served.",
            &["method", "path"]
        )
        .unwrap();
        let http_request_histogram = register_histogram_vec!(
            format!("{pre}_http_request_duration_seconds"),
            "HTTP request latency in seconds.",
            &["method", "path"]
        )
        .unwrap();
        ControllerMetrics {
            reconcile_state_counter,
            plugin_call_counter,
            http_request_counter,
            http_request_histogram,
        }
    }
}

/// Metrics prefix, overridable with `METRICS_PREFIX` (spec's ambient
/// configuration surface, same convention as the teacher).
pub fn prefix() -> String {
    std::env::var("METRICS_PREFIX").unwrap_or_else(|_| "access_controller".to_string())
}
