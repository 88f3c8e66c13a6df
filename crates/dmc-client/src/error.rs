//! Error types for the control socket client.

use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced while talking to the daemon.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The socket file is missing or nothing is listening on it.
    #[error("Daemon is not running at {}", .path.display())]
    NotRunning { path: PathBuf },

    /// The daemon answered with an `ERROR:` reply line.
    #[error("Daemon replied with an error: {message}")]
    ErrorReply { message: String },

    /// The daemon closed the connection before sending a reply.
    #[error("Connection closed before a reply arrived")]
    ConnectionClosed,

    /// The exchange did not complete within the client timeout.
    #[error("Timed out waiting for the daemon")]
    Timeout,

    /// A status reply that did not parse as the expected JSON shape.
    #[error("Malformed status reply: {0}")]
    MalformedStatus(#[from] serde_json::Error),

    /// Any other I/O failure on the socket.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
