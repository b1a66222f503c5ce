//! Handles for writing to a connection from any task.
//!
//! Each connection's write half is owned by one writer task fed through a
//! bounded queue. A [`PeerHandle`] is the cloneable sending side; stations and
//! pending runs hold one to reach their connection without owning it.

use drops_transport::ConnectionId;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::SendTimeoutError;

/// Default bound on enqueueing a line for another connection.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// Failure to hand a line to a peer's writer.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// The peer's queue stayed full past the write deadline.
    #[error("Delivery to {0} timed out")]
    Timeout(ConnectionId),

    /// The peer's writer has shut down.
    #[error("Peer {0} is closed")]
    Closed(ConnectionId),
}

/// Sending side of a connection's outbound queue.
#[derive(Clone)]
pub struct PeerHandle {
    id: ConnectionId,
    tx: mpsc::Sender<String>,
    write_timeout: Duration,
}

impl PeerHandle {
    /// Create a handle and the receiver its writer task drains.
    #[must_use]
    pub fn channel(
        id: ConnectionId,
        capacity: usize,
        write_timeout: Duration,
    ) -> (Self, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            Self {
                id,
                tx,
                write_timeout,
            },
            rx,
        )
    }

    /// Connection this handle writes to.
    #[must_use]
    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    /// Enqueue one line, waiting at most the write deadline for room.
    ///
    /// # Errors
    ///
    /// Returns [`DeliveryError::Timeout`] if the queue stays full and
    /// [`DeliveryError::Closed`] if the writer is gone.
    pub async fn deliver(&self, line: &impl fmt::Display) -> Result<(), DeliveryError> {
        match self
            .tx
            .send_timeout(line.to_string(), self.write_timeout)
            .await
        {
            Ok(()) => Ok(()),
            Err(SendTimeoutError::Timeout(_)) => Err(DeliveryError::Timeout(self.id.clone())),
            Err(SendTimeoutError::Closed(_)) => Err(DeliveryError::Closed(self.id.clone())),
        }
    }

    /// Returns `true` once the writer has stopped accepting lines.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Completes once the writer has stopped accepting lines.
    pub async fn closed(&self) {
        self.tx.closed().await;
    }
}

impl fmt::Debug for PeerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeerHandle")
            .field("id", &self.id)
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_deliver_in_order() {
        let (peer, mut rx) = PeerHandle::channel("conn-1".into(), 4, DEFAULT_WRITE_TIMEOUT);

        peer.deliver(&"RUN test n1").await.unwrap();
        peer.deliver(&"RUN test n2").await.unwrap();

        assert_eq!(rx.recv().await.unwrap(), "RUN test n1");
        assert_eq!(rx.recv().await.unwrap(), "RUN test n2");
    }

    #[tokio::test]
    async fn test_deliver_times_out_on_full_queue() {
        let (peer, _rx) = PeerHandle::channel("conn-1".into(), 1, Duration::from_millis(20));

        peer.deliver(&"first").await.unwrap();
        assert!(matches!(
            peer.deliver(&"second").await,
            Err(DeliveryError::Timeout(id)) if id.as_str() == "conn-1"
        ));
    }

    #[tokio::test]
    async fn test_deliver_to_closed_peer() {
        let (peer, rx) = PeerHandle::channel("conn-1".into(), 1, DEFAULT_WRITE_TIMEOUT);
        drop(rx);

        assert!(peer.is_closed());
        peer.closed().await;
        assert!(matches!(
            peer.deliver(&"RUN test n1").await,
            Err(DeliveryError::Closed(_))
        ));
    }
}
