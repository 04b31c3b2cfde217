//! Directory request metrics.

use metrics::{counter, histogram};

/// Metric name constants for consistency.
pub mod names {
    /// Total directory requests by outcome.
    pub const REQUESTS_TOTAL: &str = "vst_requests_total";

    /// Directory request latency in seconds.
    pub const LATENCY_SECONDS: &str = "vst_latency_seconds";
}

/// Record metrics for a completed directory request.
pub fn record_request(outcome: &'static str, latency_ms: f64) {
    counter!(names::REQUESTS_TOTAL, "outcome" => outcome).increment(1);
    histogram!(names::LATENCY_SECONDS).record(latency_ms / 1000.0);
}
