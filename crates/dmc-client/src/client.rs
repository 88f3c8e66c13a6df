//! One-shot client for the daemon's Unix control socket.
//!
//! The daemon serves exactly one command per connection, so the client
//! opens a fresh [`UnixStream`] for every call. There is no connection
//! pooling or retry loop; a failed exchange is reported to the caller
//! and the next call starts clean.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tokio::time::timeout;
use tracing::debug;

use dmc_core::SessionStatus;
use dmc_protocol::{DEFAULT_SOCKET_PATH, ERROR_PREFIX};

use crate::error::ClientError;

// ==================== Configuration ====================

/// Timeout for one full connect/send/reply exchange (5 seconds)
const EXCHANGE_TIMEOUT: Duration = Duration::from_secs(5);

// ==================== Control Client ====================

/// Client for the dmcd control socket.
///
/// Cheap to construct and to clone; holds only the socket path.
#[derive(Debug, Clone)]
pub struct ControlClient {
    socket_path: PathBuf,
}

impl Default for ControlClient {
    fn default() -> Self {
        Self {
            socket_path: PathBuf::from(DEFAULT_SOCKET_PATH),
        }
    }
}

impl ControlClient {
    /// Creates a client that talks to the socket at `socket_path`.
    ///
    /// # Arguments
    ///
    /// * `socket_path` - Path to the daemon's Unix socket
    #[must_use]
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
        }
    }

    /// Returns the socket path this client connects to.
    #[must_use]
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Queries the daemon's session status.
    pub async fn status(&self) -> Result<SessionStatus, ClientError> {
        let reply = self.request("status").await?;
        Ok(serde_json::from_str(&reply)?)
    }

    /// Claims the mirroring session, optionally naming a device id.
    pub async fn connect(&self, device: Option<&str>) -> Result<(), ClientError> {
        let line = match device {
            Some(id) => format!("connect {id}"),
            None => "connect".to_string(),
        };
        self.request(&line).await.map(|_| ())
    }

    /// Releases the mirroring session.
    pub async fn disconnect(&self) -> Result<(), ClientError> {
        self.request("disconnect").await.map(|_| ())
    }

    /// Asks the daemon to shut down.
    pub async fn quit(&self) -> Result<(), ClientError> {
        self.request("quit").await.map(|_| ())
    }

    /// Sends a command line and returns the reply payload.
    ///
    /// `ERROR:` replies are converted into [`ClientError::ErrorReply`]
    /// with the prefix stripped. Use [`Self::send_raw`] to see the
    /// reply exactly as the daemon wrote it.
    ///
    /// # Arguments
    ///
    /// * `line` - Command line without a trailing newline
    pub async fn request(&self, line: &str) -> Result<String, ClientError> {
        let reply = self.send_raw(line).await?;
        classify_reply(reply)
    }

    /// Sends a command line and returns the reply line verbatim,
    /// without its trailing newline.
    ///
    /// Error replies come back as `Ok` strings starting with `ERROR:`;
    /// only transport failures produce an `Err`.
    pub async fn send_raw(&self, line: &str) -> Result<String, ClientError> {
        debug!(
            command = %line,
            socket = %self.socket_path.display(),
            "Sending command"
        );

        let exchange = async {
            let mut stream = self.connect_socket().await?;
            stream.write_all(line.as_bytes()).await?;
            stream.write_all(b"\n").await?;

            let mut reader = BufReader::new(stream);
            let mut reply = String::new();
            let bytes_read = reader.read_line(&mut reply).await?;
            if bytes_read == 0 {
                return Err(ClientError::ConnectionClosed);
            }
            Ok(reply.trim_end_matches('\n').to_string())
        };

        match timeout(EXCHANGE_TIMEOUT, exchange).await {
            Ok(result) => result,
            Err(_) => Err(ClientError::Timeout),
        }
    }

    /// Sends a command whose handler replies with the length-prefixed
    /// binary framing and returns the decoded payload.
    ///
    /// Only valid for commands known to reply in binary. The built-in
    /// commands all reply with text lines; calling this against a text
    /// reply misreads the first four bytes as a length and fails.
    pub async fn request_binary(&self, line: &str) -> Result<Vec<u8>, ClientError> {
        debug!(
            command = %line,
            socket = %self.socket_path.display(),
            "Sending command expecting binary reply"
        );

        let exchange = async {
            let mut stream = self.connect_socket().await?;
            stream.write_all(line.as_bytes()).await?;
            stream.write_all(b"\n").await?;

            let mut len_buf = [0u8; 4];
            stream.read_exact(&mut len_buf).await?;
            let len = u32::from_be_bytes(len_buf) as usize;

            let mut payload = vec![0u8; len];
            stream.read_exact(&mut payload).await?;
            Ok(payload)
        };

        match timeout(EXCHANGE_TIMEOUT, exchange).await {
            Ok(result) => result,
            Err(_) => Err(ClientError::Timeout),
        }
    }

    async fn connect_socket(&self) -> Result<UnixStream, ClientError> {
        UnixStream::connect(&self.socket_path)
            .await
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound | ErrorKind::ConnectionRefused => ClientError::NotRunning {
                    path: self.socket_path.clone(),
                },
                _ => ClientError::Io(e),
            })
    }
}

/// Splits reply lines into payloads and daemon-reported errors.
fn classify_reply(reply: String) -> Result<String, ClientError> {
    match reply.strip_prefix(ERROR_PREFIX) {
        Some(message) => Err(ClientError::ErrorReply {
            message: message.to_string(),
        }),
        None => Ok(reply),
    }
}

// ==================== Tests ====================
