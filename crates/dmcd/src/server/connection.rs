//! Connection handling for one-shot command exchanges.
//!
//! Each accepted connection carries exactly one command line and receives
//! exactly one reply, then the connection closes. A peer that closes
//! without sending any bytes gets no reply. Failures end the connection
//! and are logged; nothing here ever stops the accept loop.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::UnixStream;
use tokio::time::timeout;
use tracing::{debug, warn};

use dmc_protocol::{FrameError, Reply};

use crate::dispatch::CommandRegistry;

/// Maximum accepted command line length, terminator included (64 KiB)
const MAX_LINE_BYTES: usize = 65_536;

/// Timeout for receiving the command line (10 seconds)
const READ_TIMEOUT: Duration = Duration::from_secs(10);

/// Timeout for writing the reply (10 seconds)
const WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// Handler for a single client connection.
///
/// Reads bytes until a newline, the peer closes, or the size cap is hit;
/// decodes them as UTF-8 with replacement; dispatches the line; writes
/// the reply; closes.
pub struct ConnectionHandler {
    /// Buffered reader for the command line
    reader: BufReader<OwnedReadHalf>,

    /// Buffered writer for the reply
    writer: BufWriter<OwnedWriteHalf>,

    /// Command lookup table shared with the server
    commands: Arc<CommandRegistry>,

    /// Connection number for log correlation
    connection_number: u64,
}

impl ConnectionHandler {
    /// Creates a handler owning both halves of the stream.
    pub fn new(stream: UnixStream, commands: Arc<CommandRegistry>, connection_number: u64) -> Self {
        let (reader, writer) = stream.into_split();
        Self {
            reader: BufReader::new(reader),
            writer: BufWriter::new(writer),
            commands,
            connection_number,
        }
    }

    /// Services the connection: one command line in, one reply out.
    pub async fn run(mut self) {
        debug!(connection = self.connection_number, "Client connected");

        let line = match self.read_command_line().await {
            Ok(Some(line)) => line,
            Ok(None) => {
                // Peer closed without sending anything; no reply owed.
                debug!(connection = self.connection_number, "Client sent no data");
                return;
            }
            Err(e) => {
                warn!(
                    connection = self.connection_number,
                    error = %e,
                    "Failed to read command"
                );
                if let Some(reply) = e.protocol_reply() {
                    let _ = self.write_reply(&reply).await;
                }
                return;
            }
        };

        let reply = self.commands.dispatch(&line);

        if let Err(e) = self.write_reply(&reply).await {
            warn!(
                connection = self.connection_number,
                error = %e,
                "Failed to write reply"
            );
            return;
        }

        debug!(connection = self.connection_number, "Connection closed");
    }

    /// Reads one command line: bytes until a newline or the peer closes.
    ///
    /// Returns `Ok(None)` when the peer closed before sending any bytes.
    /// Bytes received before an unterminated close still count as a
    /// command line. Invalid UTF-8 is replaced, never fatal.
    async fn read_command_line(&mut self) -> Result<Option<String>, ConnectionError> {
        let mut buf = Vec::new();
        // The extra byte past the cap distinguishes "line exactly at the
        // cap" from "line still going".
        let mut limited = (&mut self.reader).take(MAX_LINE_BYTES as u64 + 1);

        let bytes_read = match timeout(READ_TIMEOUT, limited.read_until(b'\n', &mut buf)).await {
            Ok(Ok(n)) => n,
            Ok(Err(e)) => return Err(ConnectionError::Io(e.to_string())),
            Err(_) => return Err(ConnectionError::ReadTimeout),
        };

        if bytes_read == 0 {
            return Ok(None);
        }

        if buf.len() > MAX_LINE_BYTES {
            return Err(ConnectionError::LineTooLong {
                max: MAX_LINE_BYTES,
            });
        }

        Ok(Some(String::from_utf8_lossy(&buf).into_owned()))
    }

    /// Writes the encoded reply and flushes.
    async fn write_reply(&mut self, reply: &Reply) -> Result<(), ConnectionError> {
        let bytes = reply.encode()?;

        let write = async {
            self.writer.write_all(&bytes).await?;
            self.writer.flush().await?;
            Ok::<(), std::io::Error>(())
        };

        match timeout(WRITE_TIMEOUT, write).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(ConnectionError::Io(e.to_string())),
            Err(_) => Err(ConnectionError::WriteTimeout),
        }
    }
}

/// Errors that can occur during connection handling.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("I/O error: {0}")]
    Io(String),

    #[error("command line exceeds {max} bytes")]
    LineTooLong { max: usize },

    #[error("Read timeout")]
    ReadTimeout,

    #[error("Write timeout")]
    WriteTimeout,

    #[error("Reply framing failed: {0}")]
    Frame(#[from] FrameError),
}

impl ConnectionError {
    /// The `ERROR:` reply owed to the client for this failure, if any.
    ///
    /// Only oversized input earns a reply; a hung or broken peer does
    /// not.
    fn protocol_reply(&self) -> Option<Reply> {
        match self {
            ConnectionError::LineTooLong { .. } => Some(Reply::error(self)),
            _ => None,
        }
    }
}
