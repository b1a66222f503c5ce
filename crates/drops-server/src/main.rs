//! # drops
//!
//! Station relay server.
//!
//! ## Usage
//!
//! ```bash
//! # Run with default settings (0.0.0.0:19406)
//! drops
//!
//! # Run with a specific config file
//! DROPS_CONFIG=/path/to/drops.toml drops
//!
//! # Override single settings from the environment
//! DROPS_PORT=19500 DROPS_LIMITS__MAX_METRIC_POINTS=500 drops
//! ```

use anyhow::{Context, Result};
use drops_server::config::Config;
use drops_server::{metrics, run_with_shutdown, ServerState};
use drops_transport::TcpTransport;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "drops=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load()?;
    let addr = config.bind_addr()?;

    info!("Starting drops server on {}", addr);

    metrics::init_metrics();
    if config.metrics.enabled {
        if let Err(e) = metrics::start_metrics_server(config.metrics.port) {
            error!("Failed to start metrics server: {:#}", e);
        }
    }

    let transport = TcpTransport::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    let state = Arc::new(ServerState::new(config));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let server = tokio::spawn(run_with_shutdown(transport, state, shutdown_rx));

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("Received shutdown signal");
    let _ = shutdown_tx.send(true);

    server.await.context("Server task panicked")??;
    Ok(())
}
