//! Plain TCP transport.

use async_trait::async_trait;
use std::net::SocketAddr;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info};

use crate::traits::{BoxedReader, BoxedWriter, Connection, ConnectionId, Transport, TransportError};

/// TCP transport.
pub struct TcpTransport {
    listener: TcpListener,
}

impl TcpTransport {
    /// Bind a new TCP transport.
    ///
    /// # Errors
    ///
    /// Returns an error if binding to the address fails.
    pub async fn bind(addr: SocketAddr) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr).await?;
        info!("TCP transport listening on {}", listener.local_addr()?);
        Ok(Self { listener })
    }

    /// Wrap an already bound listener.
    #[must_use]
    pub fn from_listener(listener: TcpListener) -> Self {
        Self { listener }
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn accept(&self) -> Result<Box<dyn Connection>, TransportError> {
        let (stream, addr) = self.listener.accept().await?;
        debug!("Accepted TCP connection from {}", addr);

        if let Err(e) = stream.set_nodelay(true) {
            debug!(remote = %addr, error = %e, "Failed to set TCP_NODELAY");
        }

        Ok(Box::new(TcpConnection {
            id: ConnectionId::generate(),
            stream,
            remote_addr: addr,
        }))
    }

    fn name(&self) -> &'static str {
        "tcp"
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.local_addr().ok()
    }
}

/// An accepted TCP connection.
pub struct TcpConnection {
    id: ConnectionId,
    stream: TcpStream,
    remote_addr: SocketAddr,
}

impl Connection for TcpConnection {
    fn id(&self) -> &ConnectionId {
        &self.id
    }

    fn remote_addr(&self) -> Option<String> {
        Some(self.remote_addr.to_string())
    }

    fn into_split(self: Box<Self>) -> (BoxedReader, BoxedWriter) {
        let (reader, writer) = self.stream.into_split();
        (Box::new(reader), Box::new(writer))
    }
}
