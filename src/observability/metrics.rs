//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define proxy metrics (behaviors enacted, upstream errors, WebSocket latency)
//! - Expose Prometheus-compatible metrics endpoint
//!
//! # Metrics
//! - `chaos_proxy_behaviors_total` (counter): behaviors by transport, behavior
//! - `chaos_proxy_upstream_errors_total` (counter): failed upstream calls by transport
//! - `chaos_proxy_ws_dropped_frames_total` (counter): frames dropped by direction
//! - `chaos_proxy_ws_response_latency_seconds` (histogram): correlated response latency
//! - `chaos_proxy_ws_connections` (gauge): open WebSocket bridges
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; with no recorder installed
//!   every call is a no-op, so tests need no setup

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Duration;

use crate::chaos::behavior::BehaviorKind;

/// Which bridge recorded an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Http,
    WebSocket,
}

impl Transport {
    pub fn as_str(&self) -> &'static str {
        match self {
            Transport::Http => "http",
            Transport::WebSocket => "ws",
        }
    }
}

/// Install the Prometheus exporter on `addr`. Must run inside a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_behavior(transport: Transport, behavior: BehaviorKind) {
    counter!(
        "chaos_proxy_behaviors_total",
        "transport" => transport.as_str(),
        "behavior" => behavior.as_str()
    )
    .increment(1);
}

pub fn record_upstream_error(transport: Transport) {
    counter!("chaos_proxy_upstream_errors_total", "transport" => transport.as_str()).increment(1);
}

pub fn record_dropped_frame(direction: &'static str) {
    counter!("chaos_proxy_ws_dropped_frames_total", "direction" => direction).increment(1);
}

pub fn record_ws_latency(method: &str, elapsed: Duration) {
    histogram!("chaos_proxy_ws_response_latency_seconds", "method" => method.to_string())
        .record(elapsed.as_secs_f64());
}

pub fn ws_connection_opened() {
    gauge!("chaos_proxy_ws_connections").increment(1.0);
}

pub fn ws_connection_closed() {
    gauge!("chaos_proxy_ws_connections").decrement(1.0);
}
