//! Supervisor metrics.

use metrics::{counter, gauge};

use crate::supervisor::SupervisorState;

/// Metric names as constants for consistency.
pub mod names {
    pub const PIPELINE_BUILDS_TOTAL: &str = "ptz_pipeline_builds_total";
    pub const PIPELINE_RECONNECTS_TOTAL: &str = "ptz_pipeline_reconnects_total";
    pub const PIPELINE_RUNTIME_ERRORS_TOTAL: &str = "ptz_pipeline_runtime_errors_total";
    pub const PIPELINE_STATE: &str = "ptz_pipeline_state";
}

/// Record a build attempt and its outcome ("ok", "build_failed", "play_failed").
pub fn record_build(session: &str, outcome: &'static str) {
    let labels = [("session", session.to_string()), ("outcome", outcome.to_string())];
    counter!(names::PIPELINE_BUILDS_TOTAL, &labels).increment(1);
}

/// Record a scheduled reconnection attempt.
pub fn record_reconnect(session: &str) {
    let labels = [("session", session.to_string())];
    counter!(names::PIPELINE_RECONNECTS_TOTAL, &labels).increment(1);
}

/// Record an error notification received from a running pipeline.
pub fn record_runtime_error(session: &str) {
    let labels = [("session", session.to_string())];
    counter!(names::PIPELINE_RUNTIME_ERRORS_TOTAL, &labels).increment(1);
}

/// Publish the current supervisor state as a numeric gauge.
pub fn set_state(session: &str, state: SupervisorState) {
    let labels = [("session", session.to_string())];
    gauge!(names::PIPELINE_STATE, &labels).set(state.as_index() as f64);
}
