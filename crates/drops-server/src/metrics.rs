//! Metrics collection and export.
//!
//! Uses the `metrics` crate for instrumentation and exports
//! to Prometheus format.

use anyhow::{Context, Result};
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::info;

/// Metric names.
pub mod names {
    pub const CONNECTIONS_TOTAL: &str = "drops_connections_total";
    pub const CONNECTIONS_ACTIVE: &str = "drops_connections_active";
    pub const COMMANDS_TOTAL: &str = "drops_commands_total";
    pub const COMMAND_LATENCY_SECONDS: &str = "drops_command_latency_seconds";
    pub const STATIONS_ACTIVE: &str = "drops_stations_active";
    pub const PENDING_RUNS: &str = "drops_pending_runs";
    pub const DELIVERY_FAILURES_TOTAL: &str = "drops_delivery_failures_total";
    pub const ERRORS_TOTAL: &str = "drops_errors_total";
}

/// Initialize the metrics system.
pub fn init_metrics() {
    metrics::describe_counter!(
        names::CONNECTIONS_TOTAL,
        "Total number of connections since server start"
    );
    metrics::describe_gauge!(
        names::CONNECTIONS_ACTIVE,
        "Current number of active connections"
    );
    metrics::describe_counter!(
        names::COMMANDS_TOTAL,
        "Commands processed, by command and outcome"
    );
    metrics::describe_histogram!(
        names::COMMAND_LATENCY_SECONDS,
        "Command handling latency in seconds"
    );
    metrics::describe_gauge!(names::STATIONS_ACTIVE, "Currently registered stations");
    metrics::describe_gauge!(names::PENDING_RUNS, "Runs forwarded and not yet completed");
    metrics::describe_counter!(
        names::DELIVERY_FAILURES_TOTAL,
        "Lines that could not be written to a peer in time"
    );
    metrics::describe_counter!(names::ERRORS_TOTAL, "Command errors, by kind");

    info!("Metrics initialized");
}

/// Start the Prometheus metrics server.
///
/// # Errors
///
/// Returns an error if the exporter cannot be installed.
pub fn start_metrics_server(port: u16) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .context("Failed to install Prometheus exporter")?;

    info!("Metrics server listening on {}", addr);
    Ok(())
}

/// Record a new connection.
pub fn record_connection() {
    counter!(names::CONNECTIONS_TOTAL).increment(1);
    gauge!(names::CONNECTIONS_ACTIVE).increment(1.0);
}

/// Record a disconnection.
pub fn record_disconnection() {
    gauge!(names::CONNECTIONS_ACTIVE).decrement(1.0);
}

/// Record a handled command.
pub fn record_command(command: &'static str, outcome: &'static str, seconds: f64) {
    counter!(names::COMMANDS_TOTAL, "command" => command, "outcome" => outcome).increment(1);
    histogram!(names::COMMAND_LATENCY_SECONDS, "command" => command).record(seconds);
}

/// Update registry gauges.
pub fn set_registry_state(stations: usize, pending_runs: usize) {
    gauge!(names::STATIONS_ACTIVE).set(stations as f64);
    gauge!(names::PENDING_RUNS).set(pending_runs as f64);
}

/// Record a failed peer write.
pub fn record_delivery_failure() {
    counter!(names::DELIVERY_FAILURES_TOTAL).increment(1);
}

/// Record a command error.
pub fn record_error(kind: &'static str) {
    counter!(names::ERRORS_TOTAL, "kind" => kind).increment(1);
}

/// Metrics guard that records disconnection on drop.
pub struct ConnectionMetricsGuard;

impl ConnectionMetricsGuard {
    /// Create a new metrics guard, recording a connection.
    #[must_use]
    pub fn new() -> Self {
        record_connection();
        Self
    }
}

impl Default for ConnectionMetricsGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ConnectionMetricsGuard {
    fn drop(&mut self) {
        record_disconnection();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_without_exporter() {
        // No recorder installed: every call is a no-op and must not panic.
        let _guard = ConnectionMetricsGuard::new();
        record_command("LIST", "ok", 0.001);
        record_error("lookup");
        record_delivery_failure();
        set_registry_state(2, 1);
    }
}
