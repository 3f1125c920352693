//! Metrics collection and exposition.
//!
//! # Metrics
//! - `bridge_sessions_total` (counter): upgraded sessions started
//! - `bridge_active_sessions` (gauge): sessions currently bridging
//! - `bridge_dial_failures_total` (counter): failed dials, by target
//! - `bridge_handshake_failures_total` (counter): refused upgrades, by reason
//! - `bridge_ping_failures_total` (counter): pings that could not be queued
//!
//! Without an installed recorder every call is a no-op.

use std::net::SocketAddr;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its scrape endpoint.
///
/// Must be called from inside a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_session_opened() {
    metrics::counter!("bridge_sessions_total").increment(1);
    metrics::gauge!("bridge_active_sessions").increment(1.0);
}

pub fn record_session_closed() {
    metrics::gauge!("bridge_active_sessions").decrement(1.0);
}

/// `target` is `"backend"` for server-side TCP dials, `"upstream"` for forwarder dials.
pub fn record_dial_failure(target: &'static str) {
    metrics::counter!("bridge_dial_failures_total", "target" => target).increment(1);
}

pub fn record_handshake_failure(reason: &'static str) {
    metrics::counter!("bridge_handshake_failures_total", "reason" => reason).increment(1);
}

pub fn record_ping_failure() {
    metrics::counter!("bridge_ping_failures_total").increment(1);
}
