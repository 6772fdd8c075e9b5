//! Metrics collection and exposition.
//!
//! # Metrics
//! - `switchyard_requests_total` (counter): requests by method, status
//! - `switchyard_request_duration_seconds` (histogram): dispatch latency by method
//! - `switchyard_active_connections` (gauge): open client sockets
//! - `switchyard_ws_members` (gauge): WebSocket peers across all groups
//! - `switchyard_ws_frames_relayed_total` (counter): frames delivered to peers
//! - `switchyard_ws_pruned_total` (counter): closed peers removed from groups
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an installed
//!   recorder every call is a no-op
//! - The Prometheus exporter is optional and never fatal

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

pub const REQUESTS_TOTAL: &str = "switchyard_requests_total";
pub const REQUEST_DURATION_SECONDS: &str = "switchyard_request_duration_seconds";
pub const ACTIVE_CONNECTIONS: &str = "switchyard_active_connections";
pub const WS_MEMBERS: &str = "switchyard_ws_members";
pub const WS_FRAMES_RELAYED_TOTAL: &str = "switchyard_ws_frames_relayed_total";
pub const WS_PRUNED_TOTAL: &str = "switchyard_ws_pruned_total";

/// Install the Prometheus recorder with an HTTP scrape listener on `addr`.
///
/// Must be called from within a tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Prometheus exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

/// Record one completed HTTP exchange.
pub fn record_request(method: &str, status: u16, start: Instant) {
    metrics::counter!(
        REQUESTS_TOTAL,
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    metrics::histogram!(REQUEST_DURATION_SECONDS, "method" => method.to_string())
        .record(start.elapsed().as_secs_f64());
}

pub fn connection_opened() {
    metrics::gauge!(ACTIVE_CONNECTIONS).increment(1.0);
}

pub fn connection_closed() {
    metrics::gauge!(ACTIVE_CONNECTIONS).decrement(1.0);
}

pub fn ws_member_joined() {
    metrics::gauge!(WS_MEMBERS).increment(1.0);
}

pub fn record_ws_pruned(count: usize) {
    if count == 0 {
        return;
    }
    metrics::counter!(WS_PRUNED_TOTAL).increment(count as u64);
    metrics::gauge!(WS_MEMBERS).decrement(count as f64);
}

/// Members dropped by teardown; not counted as pruned.
pub fn ws_members_left(count: usize) {
    metrics::gauge!(WS_MEMBERS).decrement(count as f64);
}

pub fn record_ws_relayed(count: usize) {
    metrics::counter!(WS_FRAMES_RELAYED_TOTAL).increment(count as u64);
}
