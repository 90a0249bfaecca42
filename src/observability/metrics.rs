//! Metrics collection and exposition.
//!
//! # Metrics
//! - `proxy_connections_accepted_total` (counter)
//! - `proxy_active_connections` (gauge): client + upstream sockets
//! - `proxy_upstream_connects_total` (counter): by `result`
//! - `proxy_requests_total` (counter): by `kind`
//! - `proxy_bytes_relayed_total` (counter): by `direction`
//!
//! Recording goes through the `metrics` facade and is a no-op until an
//! exporter is installed.

use std::net::SocketAddr;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter with its own HTTP listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_accepted() {
    metrics::counter!("proxy_connections_accepted_total").increment(1);
}

pub fn record_active_connections(count: usize) {
    metrics::gauge!("proxy_active_connections").set(count as f64);
}

pub fn record_upstream_connect(result: &'static str) {
    metrics::counter!("proxy_upstream_connects_total", "result" => result).increment(1);
}

pub fn record_request(kind: &'static str) {
    metrics::counter!("proxy_requests_total", "kind" => kind).increment(1);
}

pub fn record_bytes_relayed(direction: &'static str, bytes: usize) {
    metrics::counter!("proxy_bytes_relayed_total", "direction" => direction).increment(bytes as u64);
}
