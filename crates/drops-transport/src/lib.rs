//! # drops-transport
//!
//! Transport abstraction layer for the drops station relay.
//!
//! The relay core only needs an ordered, reliable byte stream per peer. This
//! crate hides where that stream comes from:
//!
//! - **TCP** - plain sockets, the default listener
//! - **Memory** - in-process duplex pipes for tests
//!
//! A TLS transport with mutual certificate verification wraps its accepted
//! streams and implements the same [`Transport`] trait; the handshake never
//! reaches the core.
//!
//! ```rust,ignore
//! use drops_transport::{LineReader, Transport};
//!
//! let conn = transport.accept().await?;
//! let (reader, writer) = conn.into_split();
//! let mut lines = LineReader::new(reader, drops_protocol::MAX_LINE_LENGTH);
//! while let Some(line) = lines.next_line().await? {
//!     // Dispatch line
//! }
//! ```

pub mod lines;
pub mod memory;
pub mod tcp;
pub mod traits;

pub use lines::{LineReader, LineWriter};
pub use memory::{MemoryConnector, MemoryTransport};
pub use tcp::TcpTransport;
pub use traits::{BoxedReader, BoxedWriter, Connection, ConnectionId, Transport, TransportError};
