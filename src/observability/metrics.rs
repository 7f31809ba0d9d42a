//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Record one counter sample and one latency sample per finalized request
//! - Expose a Prometheus scrape endpoint when enabled
//!
//! # Metrics
//! - `switchyard_requests_total` (counter): requests by method, status, outcome
//! - `switchyard_request_duration_seconds` (histogram): dispatch latency
//!
//! # Design Decisions
//! - Without an installed recorder the macros are no-ops, so tests need no setup
//! - Labels stay low-cardinality: no paths, only method, status and outcome

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

pub const REQUESTS_TOTAL: &str = "switchyard_requests_total";
pub const REQUEST_DURATION: &str = "switchyard_request_duration_seconds";

/// Install the Prometheus recorder with an HTTP listener on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install Prometheus metrics exporter"),
    }
}

/// Record a finalized request.
pub fn record_request(method: &str, status: u16, outcome: &'static str, start: Instant) {
    metrics::counter!(
        REQUESTS_TOTAL,
        "method" => method.to_string(),
        "status" => status.to_string(),
        "outcome" => outcome
    )
    .increment(1);
    metrics::histogram!(REQUEST_DURATION, "method" => method.to_string())
        .record(start.elapsed().as_secs_f64());
}
