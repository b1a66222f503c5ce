//! # drops-protocol
//!
//! Wire protocol definitions for the drops station relay.
//!
//! The protocol is line oriented: every message is a single `\n`-terminated
//! line of space-separated tokens, led by an upper-case command literal.
//!
//! ## Message Types
//!
//! - [`Command`] - Lines sent by stations and clients to the server
//! - [`Response`] - The synchronous single-line reply to a command
//! - [`Forward`] - Lines the server pushes to a *different* connection
//!   (`RUN` to a station, `DONE`/`ERR` back to the requester)
//!
//! ## Example
//!
//! ```rust
//! use drops_protocol::{codec, Command, Response};
//!
//! let command: Command = "REGISTER water source".parse().unwrap();
//! assert_eq!(command.name(), "REGISTER");
//!
//! let line = codec::encode_line(&Response::Ack);
//! assert_eq!(line, "ACK\n");
//! ```

pub mod codec;
pub mod command;
pub mod response;

pub use codec::{decode_line, encode_line, ProtocolError, MAX_LINE_LENGTH};
pub use command::Command;
pub use response::{Forward, MetricPoint, Response, StationEntry};
