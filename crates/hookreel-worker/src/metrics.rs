//! Pipeline metrics.
//!
//! Recorded through the `metrics` facade; without an installed recorder the
//! calls are no-ops.

use metrics::{counter, histogram};

use hookreel_models::ResourceKind;

/// Metric names as constants for consistency.
pub mod names {
    pub const RUNS_TOTAL: &str = "hookreel_runs_total";
    pub const RENDER_DURATION_SECONDS: &str = "hookreel_render_duration_seconds";
    pub const SLOWMO_APPLIED_TOTAL: &str = "hookreel_slowmo_applied_total";
    pub const THUMBNAIL_FALLBACK_TOTAL: &str = "hookreel_thumbnail_fallback_total";
    pub const UPLOAD_ATTEMPTS_TOTAL: &str = "hookreel_upload_attempts_total";
    pub const UPLOAD_DURATION_SECONDS: &str = "hookreel_upload_duration_seconds";
}

/// Record a finished run. `outcome` is `"success"` or the failing stage.
pub fn record_run(outcome: &str) {
    let labels = [("outcome", outcome.to_string())];
    counter!(names::RUNS_TOTAL, &labels).increment(1);
}

/// Record an FFmpeg render. `stage` is `"slowmo"`, `"assembly"` or `"thumbnail"`.
pub fn record_render_duration(stage: &str, duration_secs: f64) {
    let labels = [("stage", stage.to_string())];
    histogram!(names::RENDER_DURATION_SECONDS, &labels).record(duration_secs);
}

pub fn record_slowmo_applied() {
    counter!(names::SLOWMO_APPLIED_TOTAL).increment(1);
}

pub fn record_thumbnail_fallback() {
    counter!(names::THUMBNAIL_FALLBACK_TOTAL).increment(1);
}

/// Record one upload attempt and whether it succeeded.
pub fn record_upload_attempt(kind: ResourceKind, success: bool) {
    let labels = [
        ("kind", kind.to_string()),
        ("outcome", if success { "success" } else { "failure" }.to_string()),
    ];
    counter!(names::UPLOAD_ATTEMPTS_TOTAL, &labels).increment(1);
}

pub fn record_upload_duration(kind: ResourceKind, duration_secs: f64) {
    let labels = [("kind", kind.to_string())];
    histogram!(names::UPLOAD_DURATION_SECONDS, &labels).record(duration_secs);
}
