//! Prometheus metrics for the interception layer.
//!
//! This module provides:
//! - HTTP request metrics (count, latency) for every request
//! - Interception metrics (outcome per rule, handler latency)
//! - Upstream pass-through metrics

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use std::time::Duration;

/// Global Prometheus handle for rendering metrics.
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Metric names as constants for consistency.
pub mod names {
    // HTTP metrics
    pub const HTTP_REQUESTS_TOTAL: &str = "http_requests_total";
    pub const HTTP_REQUEST_DURATION_SECONDS: &str = "http_request_duration_seconds";

    // Interception metrics
    pub const INTERCEPT_OUTCOMES_TOTAL: &str = "intercept_outcomes_total";
    pub const INTERCEPT_HANDLER_DURATION_SECONDS: &str = "intercept_handler_duration_seconds";

    // Upstream metrics
    pub const UPSTREAM_REQUESTS_TOTAL: &str = "upstream_requests_total";
}

/// Initialize the Prometheus metrics exporter.
///
/// This should be called once at server startup.
/// Returns `true` if initialization succeeded, `false` if already initialized.
pub fn init_metrics() -> bool {
    if PROMETHEUS_HANDLE.get().is_some() {
        tracing::debug!("Prometheus metrics already initialized");
        return false;
    }

    // Pull-based: /metrics is served by the app itself
    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            if PROMETHEUS_HANDLE.set(handle).is_err() {
                tracing::warn!("Failed to store Prometheus handle (already set)");
                return false;
            }

            tracing::info!("Prometheus metrics initialized");
            true
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to install Prometheus recorder");
            false
        }
    }
}

/// Render all metrics in Prometheus text format.
///
/// Returns `None` if metrics were not initialized.
pub fn render_metrics() -> Option<String> {
    PROMETHEUS_HANDLE.get().map(|handle| handle.render())
}

// =============================================================================
// HTTP Metrics
// =============================================================================

/// Record an HTTP request.
pub fn record_http_request(method: &str, status: u16, duration: Duration) {
    let status_class = match status {
        200..=299 => "2xx",
        300..=399 => "3xx",
        400..=499 => "4xx",
        500..=599 => "5xx",
        _ => "other",
    };

    counter!(
        names::HTTP_REQUESTS_TOTAL,
        "method" => method.to_string(),
        "status" => status.to_string(),
        "status_class" => status_class.to_string()
    )
    .increment(1);

    histogram!(
        names::HTTP_REQUEST_DURATION_SECONDS,
        "method" => method.to_string()
    )
    .record(duration.as_secs_f64());
}

// =============================================================================
// Interception Metrics
// =============================================================================

/// Record the terminal outcome of one intercepted request.
pub fn record_intercept_outcome(rule: &str, outcome: &'static str) {
    counter!(
        names::INTERCEPT_OUTCOMES_TOTAL,
        "rule" => rule.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

/// Record how long a delegated handler took.
pub fn record_handler_duration(rule: &str, handler: &str, duration: Duration) {
    histogram!(
        names::INTERCEPT_HANDLER_DURATION_SECONDS,
        "rule" => rule.to_string(),
        "handler" => handler.to_string()
    )
    .record(duration.as_secs_f64());
}

// =============================================================================
// Upstream Metrics
// =============================================================================

/// Record a request passed through to the upstream resource server.
pub fn record_upstream_request(status: Option<u16>) {
    let status = status.map_or_else(|| "error".to_string(), |s| s.to_string());
    counter!(names::UPSTREAM_REQUESTS_TOTAL, "status" => status).increment(1);
}
