//! # drops-server
//!
//! Relay server for home-automation stations. Stations register over a
//! line protocol, report telemetry and answer `RUN` requests that clients
//! route through the server.

/// Configuration loading and validation.
pub mod config;
/// Per-connection read and write tasks.
pub mod handlers;
/// Prometheus metrics.
pub mod metrics;
/// Accept loop and shared server state.
pub mod server;

pub use server::{run_with_shutdown, ServerState};
