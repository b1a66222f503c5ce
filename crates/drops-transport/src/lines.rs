//! Line-oriented reading and writing over raw byte streams.

use crate::traits::TransportError;
use drops_protocol::codec::{self, ProtocolError, LINE_TERMINATOR};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};

/// Reads newline-delimited lines with a length cap.
pub struct LineReader<R> {
    inner: BufReader<R>,
    buf: Vec<u8>,
    max_len: usize,
}

impl<R: AsyncRead + Unpin> LineReader<R> {
    /// Wrap a reader. Lines longer than `max_len` bytes are rejected.
    pub fn new(reader: R, max_len: usize) -> Self {
        Self {
            inner: BufReader::new(reader),
            buf: Vec::with_capacity(256),
            max_len,
        }
    }

    /// Read the next line, without its terminator.
    ///
    /// Returns `Ok(None)` on a clean end of stream. A final line without a
    /// terminator is still returned.
    ///
    /// # Errors
    ///
    /// Returns an error if the stream fails or the line exceeds the length
    /// cap. The stream is unusable after an oversize line. Invalid UTF-8 is
    /// replaced, not rejected.
    pub async fn next_line(&mut self) -> Result<Option<String>, TransportError> {
        self.buf.clear();

        // Room for the payload plus "\r\n".
        let limit = self.max_len as u64 + 2;
        let read = (&mut self.inner)
            .take(limit)
            .read_until(LINE_TERMINATOR, &mut self.buf)
            .await?;

        if read == 0 {
            return Ok(None);
        }

        if self.buf.last() != Some(&LINE_TERMINATOR) && read as u64 == limit {
            return Err(ProtocolError::LineTooLong(read, self.max_len).into());
        }

        let line = codec::decode_line(&self.buf, self.max_len)?;
        Ok(Some(line.into_owned()))
    }
}

/// Writes lines, each bounded by a deadline.
pub struct LineWriter<W> {
    inner: W,
    timeout: Duration,
}

impl<W: AsyncWrite + Unpin> LineWriter<W> {
    /// Wrap a writer with a per-line write deadline.
    pub fn new(writer: W, timeout: Duration) -> Self {
        Self {
            inner: writer,
            timeout,
        }
    }

    /// Write one line and flush it.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Timeout`] if the peer does not drain the
    /// line in time, or the underlying I/O error.
    pub async fn write_line(&mut self, line: &str) -> Result<(), TransportError> {
        let encoded = codec::encode_line(&line);
        let write = async {
            self.inner.write_all(encoded.as_bytes()).await?;
            self.inner.flush().await
        };

        match tokio::time::timeout(self.timeout, write).await {
            Ok(result) => result.map_err(TransportError::Io),
            Err(_) => Err(TransportError::Timeout),
        }
    }

    /// Shut down the write side.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error.
    pub async fn shutdown(&mut self) -> Result<(), TransportError> {
        self.inner.shutdown().await?;
        Ok(())
    }
}
