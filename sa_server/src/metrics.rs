//! Prometheus metrics for the authentication service.
//!
//! Counters are recorded through the `metrics` facade and are no-ops until
//! [`init_metrics`] installs the exporter, so handlers record unconditionally.
//!
//! # Example Usage
//!
//! ```rust,no_run
//! use sa_server::metrics;
//! use std::net::SocketAddr;
//!
//! let addr: SocketAddr = "127.0.0.1:9090".parse().unwrap();
//! metrics::init_metrics(addr).unwrap();
//!
//! metrics::http_requests_total("POST", "/api/auth/signin", 200);
//! metrics::signins_total("success");
//! ```

use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;

/// Initialize Prometheus metrics exporter.
///
/// Metrics will be available at `http://<addr>/metrics`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), String> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| format!("Failed to install Prometheus exporter: {}", e))
}

// ============================================================================
// HTTP Metrics
// ============================================================================

/// Increments the total HTTP request counter with method, path, and status labels.
pub fn http_requests_total(method: &str, path: &str, status: u16) {
    metrics::counter!("http_requests_total",
        "method" => method.to_string(),
        "path" => path.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record HTTP request duration in milliseconds.
pub fn http_request_duration_ms(method: &str, path: &str, duration_ms: f64) {
    metrics::histogram!("http_request_duration_ms",
        "method" => method.to_string(),
        "path" => path.to_string()
    )
    .record(duration_ms);
}

// ============================================================================
// Auth Metrics
// ============================================================================

/// Increment accepted signups.
pub fn signups_total() {
    metrics::counter!("auth_signups_total").increment(1);
}

/// Increment sign-in attempts; `outcome` is `success` or the rejection code.
pub fn signins_total(outcome: &str) {
    metrics::counter!("auth_signins_total",
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Increment refresh attempts; `outcome` is `success` or the rejection code.
pub fn refresh_total(outcome: &str) {
    metrics::counter!("auth_refresh_total",
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Set rows removed by the last expiry sweep.
pub fn cleanup_purged(count: u64) {
    metrics::gauge!("auth_cleanup_purged").set(count as f64);
}
