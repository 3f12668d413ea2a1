//! Metrics collection and exposition.
//!
//! # Metrics
//! - `dispatch_requests_total` (counter): HTTP requests by endpoint, status
//! - `dispatch_request_duration_seconds` (histogram): latency by endpoint
//! - `dispatch_batches_total` (counter): batches by path, outcome
//! - `dispatch_sub_query_errors_total` (counter): failed sub-queries inside successful batches
//! - `dispatch_datasource_cache_total` (counter): cache lookups by result

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};
use std::net::SocketAddr;
use std::time::Instant;

/// Install the Prometheus exporter and its scrape listener.
///
/// Must be called from inside a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

pub fn record_request(endpoint: &'static str, status: u16, start: Instant) {
    metrics::counter!(
        "dispatch_requests_total",
        "endpoint" => endpoint,
        "status" => status.to_string()
    )
    .increment(1);
    metrics::histogram!("dispatch_request_duration_seconds", "endpoint" => endpoint)
        .record(start.elapsed().as_secs_f64());
}

/// `path` is the route taken ("direct", "expression", or "unclassified" when the
/// batch failed before routing); `outcome` is "completed" or "failed".
pub fn record_batch(path: &'static str, outcome: &'static str) {
    metrics::counter!("dispatch_batches_total", "path" => path, "outcome" => outcome).increment(1);
}

pub fn record_sub_query_errors(count: usize) {
    if count > 0 {
        metrics::counter!("dispatch_sub_query_errors_total").increment(count as u64);
    }
}

pub fn record_datasource_cache(result: &'static str) {
    metrics::counter!("dispatch_datasource_cache_total", "result" => result).increment(1);
}
