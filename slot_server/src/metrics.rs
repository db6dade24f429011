//! Prometheus metrics for the slot server.
//!
//! Metrics are exposed in Prometheus text format on a separate listener when
//! `METRICS_BIND` is set. Without an installed recorder every call here is a
//! no-op.
//!
//! # Metrics Categories
//!
//! - **HTTP Metrics**: Request counts and duration
//! - **WebSocket Metrics**: Connections, messages, online users
//! - **Game Metrics**: Sessions, spins, jackpot wins
//!
//! # Example Usage
//!
//! ```rust,no_run
//! use slot_server::metrics;
//! use std::net::SocketAddr;
//!
//! let addr: SocketAddr = "127.0.0.1:9090".parse().unwrap();
//! metrics::init_metrics(addr).unwrap();
//!
//! metrics::spins_total(1);
//! ```

use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;

/// Install the Prometheus exporter listening on `addr`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), String> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| format!("Failed to install Prometheus exporter: {}", e))
}

// ============================================================================
// HTTP Metrics
// ============================================================================

pub fn http_requests_total(method: &str, path: &str, status: u16) {
    metrics::counter!("http_requests_total",
        "method" => method.to_string(),
        "path" => path.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

pub fn http_request_duration_ms(method: &str, path: &str, duration_ms: f64) {
    metrics::histogram!("http_request_duration_ms",
        "method" => method.to_string(),
        "path" => path.to_string()
    )
    .record(duration_ms);
}

// ============================================================================
// WebSocket Metrics
// ============================================================================

pub fn websocket_connections_active(count: u64) {
    metrics::gauge!("websocket_connections_active").set(count as f64);
}

pub fn websocket_connections_total() {
    metrics::counter!("websocket_connections_total").increment(1);
}

pub fn websocket_messages_sent() {
    metrics::counter!("websocket_messages_sent").increment(1);
}

pub fn websocket_messages_received() {
    metrics::counter!("websocket_messages_received").increment(1);
}

/// Distinct users with at least one connection
pub fn online_users(count: usize) {
    metrics::gauge!("online_users").set(count as f64);
}

pub fn rate_limit_hits_total(endpoint: &str) {
    metrics::counter!("rate_limit_hits_total",
        "endpoint" => endpoint.to_string()
    )
    .increment(1);
}

// ============================================================================
// Game Metrics
// ============================================================================

pub fn active_sessions(count: usize) {
    metrics::gauge!("active_sessions").set(count as f64);
}

pub fn sessions_started_total() {
    metrics::counter!("sessions_started_total").increment(1);
}

pub fn spins_total(count: u64) {
    metrics::counter!("spins_total").increment(count);
}

pub fn jackpot_wins_total() {
    metrics::counter!("jackpot_wins_total").increment(1);
}
