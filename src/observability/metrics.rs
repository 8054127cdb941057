//! Metrics collection and exposition.

use std::net::SocketAddr;

use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Initialize the Prometheus exporter and its scrape listener.
pub fn init_metrics(addr: SocketAddr) {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .expect("failed to install Prometheus recorder");

    tracing::info!(address = %addr, "metrics listener started");
}

/// Record a request forwarded to a backend.
pub fn record_forward(external: &str, status: u16) {
    let labels = [
        ("host", external.to_string()),
        ("status", status.to_string()),
    ];
    counter!("gateway_forwarded_requests_total", &labels).increment(1);
}

/// Record a redirect to the login flow.
pub fn record_auth_redirect() {
    counter!("gateway_auth_redirects_total").increment(1);
}

/// Record an allow-list denial.
pub fn record_auth_denied() {
    counter!("gateway_auth_denials_total").increment(1);
}

/// Track live WebSocket tunnels (+1 on open, -1 on close).
pub fn record_tunnel(delta: i64) {
    gauge!("gateway_websocket_tunnels").increment(delta as f64);
}
