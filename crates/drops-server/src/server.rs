//! Accept loop and shared server state.

use crate::config::Config;
use crate::handlers::handle_connection;
use drops_core::{Clock, Dispatcher, Registry, SystemClock};
use drops_transport::{Transport, TransportError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Notify};
use tracing::{error, info, warn};

/// Bound on waiting for open connections after shutdown.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// State shared by every connection task.
#[derive(Debug)]
pub struct ServerState {
    /// Command dispatcher over the station registry.
    pub dispatcher: Dispatcher,
    /// Server configuration.
    pub config: Config,
}

impl ServerState {
    /// Build server state with the wall clock.
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Build server state with an explicit metric clock.
    #[must_use]
    pub fn with_clock(config: Config, clock: Arc<dyn Clock>) -> Self {
        let registry = Arc::new(Registry::with_config(config.registry_config(), clock));
        Self {
            dispatcher: Dispatcher::new(registry, config.router_config()),
            config,
        }
    }

    /// The station registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<Registry> {
        self.dispatcher.registry()
    }
}

/// Run the accept loop with an externally controlled shutdown signal.
///
/// Sending `true` on the paired sender stops accepting, tells every open
/// connection to close and waits up to 30 s for them to finish.
///
/// # Errors
///
/// Currently infallible; accept failures are logged and the loop continues.
pub async fn run_with_shutdown(
    transport: impl Transport,
    state: Arc<ServerState>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), TransportError> {
    match transport.local_addr() {
        Some(addr) => info!("drops listening on {} ({})", addr, transport.name()),
        None => info!("drops listening on {} transport", transport.name()),
    }

    let active = Arc::new(AtomicUsize::new(0));
    let finished = Arc::new(Notify::new());
    let conn_shutdown = shutdown.clone();

    loop {
        tokio::select! {
            result = transport.accept() => {
                match result {
                    Ok(conn) => {
                        let state = Arc::clone(&state);
                        let active = Arc::clone(&active);
                        let finished = Arc::clone(&finished);
                        let shutdown = conn_shutdown.clone();
                        active.fetch_add(1, Ordering::SeqCst);
                        tokio::spawn(async move {
                            handle_connection(conn, state, shutdown).await;
                            active.fetch_sub(1, Ordering::SeqCst);
                            finished.notify_one();
                        });
                    }
                    Err(TransportError::ConnectionClosed) => {
                        info!("Transport closed, no more connections");
                        break;
                    }
                    Err(e) => {
                        error!("Failed to accept connection: {}", e);
                    }
                }
            }
            _ = shutdown.changed() => {
                info!(
                    "Shutdown signal received, draining {} connections",
                    active.load(Ordering::SeqCst)
                );
                break;
            }
        }
    }

    let deadline = tokio::time::Instant::now() + DRAIN_TIMEOUT;
    while active.load(Ordering::SeqCst) > 0 {
        if tokio::time::timeout_at(deadline, finished.notified())
            .await
            .is_err()
        {
            warn!(
                "Drain timeout reached with {} connections still active",
                active.load(Ordering::SeqCst)
            );
            break;
        }
    }

    info!("Server shut down gracefully");
    Ok(())
}
