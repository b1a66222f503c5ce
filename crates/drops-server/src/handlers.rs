//! Connection handlers.
//!
//! Each accepted connection runs two tasks: the read loop below, which owns
//! the [`Session`] and answers commands in arrival order, and a writer task
//! that drains the connection's outbound queue. Replies to this connection
//! and lines forwarded from other connections share that queue.

use crate::metrics::{self, ConnectionMetricsGuard};
use crate::server::ServerState;
use drops_core::{ErrorKind, PeerHandle, Session};
use drops_protocol::{Command, Response};
use drops_transport::{BoxedWriter, Connection, ConnectionId, LineReader, LineWriter};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};

/// Serve one connection until it closes, errors or the server shuts down.
pub async fn handle_connection(
    conn: Box<dyn Connection>,
    state: Arc<ServerState>,
    mut shutdown: watch::Receiver<bool>,
) {
    let _metrics_guard = ConnectionMetricsGuard::new();

    let id = conn.id().clone();
    let remote = conn.remote_addr().unwrap_or_else(|| "-".to_string());
    info!(connection = %id, remote = %remote, "Connection opened");

    let (reader, writer) = conn.into_split();
    let write_timeout = state.config.write_timeout();
    let (peer, outbound) =
        PeerHandle::channel(id.clone(), state.config.limits.outbound_queue, write_timeout);

    let (stop_tx, stop_rx) = oneshot::channel();
    let writer_task = tokio::spawn(write_loop(
        id.clone(),
        LineWriter::new(writer, write_timeout),
        outbound,
        stop_rx,
    ));

    let mut lines = LineReader::new(reader, state.config.limits.max_line_length);
    let mut session = Session::new(peer.clone());

    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line {
                    Ok(Some(line)) => {
                        let response = process_line(&state, &mut session, &line).await;
                        if let Err(e) = peer.deliver(&response).await {
                            warn!(connection = %id, error = %e, "Failed to queue reply");
                            metrics::record_delivery_failure();
                            break;
                        }
                    }
                    Ok(None) => {
                        debug!(connection = %id, "Connection closed by peer");
                        break;
                    }
                    Err(e) => {
                        warn!(connection = %id, error = %e, "Read failed");
                        break;
                    }
                }
            }
            _ = peer.closed() => {
                debug!(connection = %id, "Writer stopped");
                break;
            }
            _ = shutdown.changed() => {
                debug!(connection = %id, "Closing for shutdown");
                break;
            }
        }
    }

    let failed = state.dispatcher.disconnect(&mut session).await;
    let stats = state.registry().stats();
    metrics::set_registry_state(stats.station_count, stats.pending_runs);

    // Flush what is already queued, then close the write half.
    if stop_tx.send(()).is_err() {
        debug!(connection = %id, "Writer already stopped");
    }
    drop(session);
    drop(peer);
    if let Err(e) = writer_task.await {
        warn!(connection = %id, error = %e, "Writer task failed");
    }

    info!(connection = %id, failed_runs = failed, "Connection closed");
}

/// Parse and dispatch one line, always producing a reply.
async fn process_line(state: &ServerState, session: &mut Session, line: &str) -> Response {
    let started = Instant::now();

    let (command, result) = match Command::parse(line) {
        Ok(command) => {
            let name = command.name();
            (name, state.dispatcher.dispatch(session, command).await)
        }
        Err(e) => ("INVALID", Err(e.into())),
    };

    let (outcome, response) = match result {
        Ok(response) => {
            debug!(connection = %session.id(), command, "Command handled");
            ("ok", response)
        }
        Err(e) => {
            let kind = e.kind();
            warn!(
                connection = %session.id(),
                command,
                kind = %kind,
                error = %e,
                "Command failed"
            );
            if kind == ErrorKind::Delivery {
                metrics::record_delivery_failure();
            }
            metrics::record_error(kind.as_str());
            ("error", e.response())
        }
    };

    metrics::record_command(command, outcome, started.elapsed().as_secs_f64());
    if matches!(command, "REGISTER" | "RUN" | "DONE" | "ERR") {
        let stats = state.registry().stats();
        metrics::set_registry_state(stats.station_count, stats.pending_runs);
    }

    response
}

/// Drain `outbound` onto the socket until stopped or a write fails.
///
/// On stop, the queue is closed so no new lines are accepted and whatever is
/// already buffered is written out before the write half shuts down.
async fn write_loop(
    id: ConnectionId,
    mut writer: LineWriter<BoxedWriter>,
    mut outbound: mpsc::Receiver<String>,
    mut stop: oneshot::Receiver<()>,
) {
    loop {
        tokio::select! {
            line = outbound.recv() => {
                let Some(line) = line else { break };
                if let Err(e) = writer.write_line(&line).await {
                    warn!(connection = %id, error = %e, "Write failed, dropping connection");
                    metrics::record_delivery_failure();
                    return;
                }
            }
            _ = &mut stop => {
                outbound.close();
                while let Some(line) = outbound.recv().await {
                    if let Err(e) = writer.write_line(&line).await {
                        debug!(connection = %id, error = %e, "Write failed while draining");
                        return;
                    }
                }
                break;
            }
        }
    }

    if let Err(e) = writer.shutdown().await {
        debug!(connection = %id, error = %e, "Write shutdown failed");
    }
}
