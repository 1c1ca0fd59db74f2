//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_requests_total` (counter): requests by version, status
//! - `gateway_request_duration_seconds` (histogram): end-to-end latency by version
//! - `gateway_backend_calls_total` (counter): backend calls by version, outcome
//! - `gateway_backend_duration_seconds` (histogram): backend latency by version
//! - `gateway_backend_errors_total` (counter): backend statuses >= 400 by version, status
//! - `gateway_persistence_failures_total` (counter)
//! - `gateway_cleanup_failures_total` (counter)
//! - `gateway_rows_failed_total` (counter)
//!
//! Recording is a no-op until [`init_metrics`] installs a recorder.

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(version: &str, status: u16, start: Instant) {
    ::metrics::counter!(
        "gateway_requests_total",
        "version" => version.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    ::metrics::histogram!(
        "gateway_request_duration_seconds",
        "version" => version.to_string()
    )
    .record(start.elapsed().as_secs_f64());
}

/// `outcome` is the HTTP status as text, or `transport_error`.
pub fn record_backend_call(version: &str, outcome: &str, start: Instant) {
    ::metrics::counter!(
        "gateway_backend_calls_total",
        "version" => version.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
    ::metrics::histogram!(
        "gateway_backend_duration_seconds",
        "version" => version.to_string()
    )
    .record(start.elapsed().as_secs_f64());
}

pub fn record_backend_error(version: &str, status: u16) {
    ::metrics::counter!(
        "gateway_backend_errors_total",
        "version" => version.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

pub fn record_persistence_failure() {
    ::metrics::counter!("gateway_persistence_failures_total").increment(1);
}

pub fn record_cleanup_failure() {
    ::metrics::counter!("gateway_cleanup_failures_total").increment(1);
}

pub fn record_row_failure() {
    ::metrics::counter!("gateway_rows_failed_total").increment(1);
}
