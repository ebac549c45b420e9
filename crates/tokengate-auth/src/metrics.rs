//! Prometheus metrics for the authentication pipeline.
//!
//! This module provides:
//! - Outcome counters labeled by outcome kind
//! - End-to-end and provider-call duration histograms
//! - Cache entry gauges
//!
//! Metrics are observability outputs only; no behavior depends on them.

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use std::time::Duration;

use crate::types::AuthOutcome;

/// Global Prometheus handle for rendering metrics.
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Metric names as constants for consistency.
pub mod names {
    pub const AUTH_OUTCOMES_TOTAL: &str = "auth_outcomes_total";
    pub const AUTHENTICATE_DURATION_SECONDS: &str = "authenticate_duration_seconds";
    pub const PROVIDER_CALL_DURATION_SECONDS: &str = "provider_call_duration_seconds";
    pub const AUTH_CACHE_ENTRIES: &str = "auth_cache_entries";
    pub const RATE_LIMIT_TRACKED_KEYS: &str = "rate_limit_tracked_keys";
}

/// Initialize the Prometheus metrics exporter.
///
/// Should be called once at service startup. Returns `true` if
/// initialization succeeded, `false` if already initialized.
pub fn init_metrics() -> bool {
    if PROMETHEUS_HANDLE.get().is_some() {
        tracing::debug!("Prometheus metrics already initialized");
        return false;
    }

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

/// Record the outcome of one authentication attempt and its end-to-end
/// duration.
pub fn record_outcome(outcome: AuthOutcome, duration: Duration) {
    counter!(names::AUTH_OUTCOMES_TOTAL, "outcome" => outcome.as_str()).increment(1);
    histogram!(names::AUTHENTICATE_DURATION_SECONDS, "outcome" => outcome.as_str())
        .record(duration.as_secs_f64());
}

/// Record the duration of one identity provider round trip.
pub fn record_provider_call(duration: Duration) {
    histogram!(names::PROVIDER_CALL_DURATION_SECONDS).record(duration.as_secs_f64());
}

/// Set the number of entries in the identity cache.
pub fn set_cache_entries(count: usize) {
    gauge!(names::AUTH_CACHE_ENTRIES).set(count as f64);
}

/// Set the number of client keys tracked by the rate limiter.
pub fn set_rate_limit_tracked_keys(count: usize) {
    gauge!(names::RATE_LIMIT_TRACKED_KEYS).set(count as f64);
}
