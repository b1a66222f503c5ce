//! In-process transport backed by `tokio::io::duplex` pipes.
//!
//! Used by tests to drive the server without sockets.

use async_trait::async_trait;
use tokio::io::DuplexStream;
use tokio::sync::{mpsc, Mutex};

use crate::traits::{BoxedReader, BoxedWriter, Connection, ConnectionId, Transport, TransportError};

/// Pipe capacity per direction.
const PIPE_CAPACITY: usize = 64 * 1024;

/// Accept side of an in-memory transport.
pub struct MemoryTransport {
    incoming: Mutex<mpsc::Receiver<DuplexStream>>,
}

/// Dial side of an in-memory transport.
#[derive(Clone)]
pub struct MemoryConnector {
    tx: mpsc::Sender<DuplexStream>,
}

impl MemoryTransport {
    /// Create a transport and the connector that dials it.
    #[must_use]
    pub fn pair() -> (Self, MemoryConnector) {
        let (tx, rx) = mpsc::channel(16);
        (
            Self {
                incoming: Mutex::new(rx),
            },
            MemoryConnector { tx },
        )
    }
}

impl MemoryConnector {
    /// Open a new connection, returning the client end.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::ConnectionClosed`] if the transport is gone.
    pub async fn connect(&self) -> Result<DuplexStream, TransportError> {
        let (client, server) = tokio::io::duplex(PIPE_CAPACITY);
        self.tx
            .send(server)
            .await
            .map_err(|_| TransportError::ConnectionClosed)?;
        Ok(client)
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn accept(&self) -> Result<Box<dyn Connection>, TransportError> {
        let stream = self
            .incoming
            .lock()
            .await
            .recv()
            .await
            .ok_or(TransportError::ConnectionClosed)?;

        Ok(Box::new(MemoryConnection {
            id: ConnectionId::generate(),
            stream,
        }))
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

/// Server end of an in-memory connection.
pub struct MemoryConnection {
    id: ConnectionId,
    stream: DuplexStream,
}

impl Connection for MemoryConnection {
    fn id(&self) -> &ConnectionId {
        &self.id
    }

    fn into_split(self: Box<Self>) -> (BoxedReader, BoxedWriter) {
        let (reader, writer) = tokio::io::split(self.stream);
        (Box::new(reader), Box::new(writer))
    }
}
