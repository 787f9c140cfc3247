//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define dispatch metrics (request count, latency, cache hits)
//! - Expose Prometheus-compatible metrics endpoint
//!
//! # Metrics
//! - `velox_requests_total` (counter): requests by method, status
//! - `velox_request_duration_seconds` (histogram): latency by method
//! - `velox_cache_hits_total` (counter): responses served from cache
//! - `velox_unhandled_errors_total` (counter): errors rendered as 500
//!
//! # Design Decisions
//! - Recording is a no-op until a recorder is installed
//! - Labels stay low-cardinality (no paths)

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its scrape endpoint.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

/// Record one dispatched request.
pub fn record_request(method: &str, status: u16, start: Instant) {
    metrics::counter!(
        "velox_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    metrics::histogram!("velox_request_duration_seconds", "method" => method.to_string())
        .record(start.elapsed().as_secs_f64());
}

/// Record a response served from the shared cache.
pub fn record_cache_hit() {
    metrics::counter!("velox_cache_hits_total").increment(1);
}

/// Record an error that reached the generic failure path.
pub fn record_unhandled_error() {
    metrics::counter!("velox_unhandled_errors_total").increment(1);
}
