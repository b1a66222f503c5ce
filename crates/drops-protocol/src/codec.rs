//! Line codec for the drops protocol.
//!
//! Lines are newline delimited. A trailing carriage return is tolerated and
//! stripped, and tokens are separated by single spaces.

use std::borrow::Cow;
use std::fmt;
use std::num::ParseFloatError;
use thiserror::Error;

/// Default maximum line length in bytes (64 KiB), excluding the terminator.
pub const MAX_LINE_LENGTH: usize = 64 * 1024;

/// Line terminator.
pub const LINE_TERMINATOR: u8 = b'\n';

/// Protocol errors that can occur while decoding or parsing a line.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Line exceeds the configured maximum.
    #[error("Line length {0} exceeds maximum {1}")]
    LineTooLong(usize, usize),

    /// Leading token does not name a known command.
    #[error("Unrecognized command: {0:?}")]
    Unrecognized(String),

    /// Wrong number of arguments for a known command.
    #[error("Bad argument count for {command}: got {got}")]
    BadArity {
        /// Command literal.
        command: &'static str,
        /// Number of arguments received.
        got: usize,
    },

    /// An argument could not be parsed as a number.
    #[error("Invalid numeric value {value:?}: {source}")]
    InvalidValue {
        /// The offending token.
        value: String,
        /// Underlying parse failure.
        #[source]
        source: ParseFloatError,
    },
}

impl ProtocolError {
    /// Returns `true` if the error concerns the command token itself rather
    /// than its arguments.
    #[must_use]
    pub fn is_unrecognized(&self) -> bool {
        matches!(self, Self::Unrecognized(_))
    }
}

/// Decode a raw line into text.
///
/// Strips the trailing `\n` and an optional `\r` before it, the same way a
/// line scanner would. Tokens are opaque bytes, so invalid UTF-8 sequences
/// are replaced with U+FFFD instead of failing the line.
///
/// # Errors
///
/// Returns an error if the line is longer than `max_len`.
pub fn decode_line(raw: &[u8], max_len: usize) -> Result<Cow<'_, str>, ProtocolError> {
    let mut end = raw.len();
    if end > 0 && raw[end - 1] == LINE_TERMINATOR {
        end -= 1;
    }
    if end > 0 && raw[end - 1] == b'\r' {
        end -= 1;
    }

    if end > max_len {
        return Err(ProtocolError::LineTooLong(end, max_len));
    }

    Ok(String::from_utf8_lossy(&raw[..end]))
}

/// Encode a message as a terminated line.
pub fn encode_line(message: &impl fmt::Display) -> String {
    format!("{message}\n")
}

/// Split a line into its leading token and remaining arguments.
///
/// Consecutive spaces produce empty tokens; they are not collapsed.
#[must_use]
pub fn tokenize(line: &str) -> (&str, Vec<&str>) {
    let mut parts = line.split(' ');
    let head = parts.next().unwrap_or_default();
    (head, parts.collect())
}
