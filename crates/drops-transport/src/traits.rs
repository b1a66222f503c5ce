//! Transport abstraction traits for drops.
//!
//! These traits define the interface that all transport implementations must
//! provide, allowing the server to be transport-agnostic.

use async_trait::async_trait;
use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};

/// Counter backing [`ConnectionId::generate`].
static CONNECTION_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub String);

impl ConnectionId {
    /// Create a new connection ID.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a process-unique connection ID.
    #[must_use]
    pub fn generate() -> Self {
        let n = CONNECTION_COUNTER.fetch_add(1, Ordering::Relaxed);
        Self(format!("conn_{n:x}"))
    }

    /// Get the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ConnectionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ConnectionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection was closed.
    #[error("Connection closed")]
    ConnectionClosed,

    /// A read or write did not finish before its deadline.
    #[error("Connection timed out")]
    Timeout,

    /// Protocol error.
    #[error("Protocol error: {0}")]
    Protocol(#[from] drops_protocol::ProtocolError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Read half of an accepted stream.
pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;

/// Write half of an accepted stream.
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// A transport that can accept connections.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Accept a new connection.
    ///
    /// This method waits until a new connection is available or an error occurs.
    async fn accept(&self) -> Result<Box<dyn Connection>, TransportError>;

    /// Get the transport name (e.g., "tcp", "memory").
    fn name(&self) -> &'static str;

    /// Get the local address, if the transport is bound to one.
    fn local_addr(&self) -> Option<SocketAddr> {
        None
    }
}

/// An accepted, already authenticated duplex stream.
///
/// The server splits it once: the read half feeds the command loop, the write
/// half is owned by a single writer task.
pub trait Connection: Send {
    /// Get the connection's unique identifier.
    fn id(&self) -> &ConnectionId;

    /// Get the remote address of the connection, if available.
    fn remote_addr(&self) -> Option<String> {
        None
    }

    /// Split into independently owned read and write halves.
    fn into_split(self: Box<Self>) -> (BoxedReader, BoxedWriter);
}
