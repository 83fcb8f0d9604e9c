//! Metrics collection and exposition.
//!
//! # Metrics
//! - `uniserve_requests_total` (counter): requests by engine, status
//! - `uniserve_request_duration_seconds` (histogram): handler latency by engine
//! - `uniserve_active_connections` (gauge): live TCP connections by engine
//! - `uniserve_open_sockets` (gauge): open WebSockets by engine
//! - `uniserve_body_aborts_total` (counter): response streams that failed mid-flight
//!
//! # Design Decisions
//! - Labels are low cardinality: engine name and status code only
//! - The Prometheus endpoint is opt-in via [`init_metrics`]

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

use crate::runtime::Runtime;

/// Install the Prometheus recorder and its scrape endpoint.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(engine: Runtime, status: u16, start: Instant) {
    ::metrics::counter!(
        "uniserve_requests_total",
        "engine" => engine.as_str(),
        "status" => status.to_string()
    )
    .increment(1);
    ::metrics::histogram!("uniserve_request_duration_seconds", "engine" => engine.as_str())
        .record(start.elapsed().as_secs_f64());
}

pub fn record_connection_opened(engine: Runtime) {
    ::metrics::gauge!("uniserve_active_connections", "engine" => engine.as_str()).increment(1.0);
}

pub fn record_connection_closed(engine: Runtime) {
    ::metrics::gauge!("uniserve_active_connections", "engine" => engine.as_str()).decrement(1.0);
}

pub fn record_socket_opened(engine: Runtime) {
    ::metrics::gauge!("uniserve_open_sockets", "engine" => engine.as_str()).increment(1.0);
}

pub fn record_socket_closed(engine: Runtime) {
    ::metrics::gauge!("uniserve_open_sockets", "engine" => engine.as_str()).decrement(1.0);
}

pub fn record_body_abort(engine: Runtime) {
    ::metrics::counter!("uniserve_body_aborts_total", "engine" => engine.as_str()).increment(1);
}
