//! Reply framing for the control socket.

use std::fmt;
use thiserror::Error;

/// Prefix of every error reply line.
pub const ERROR_PREFIX: &str = "ERROR: ";

/// Errors from encoding a reply for the wire.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// Binary payload too large for the 4-byte length prefix
    #[error("binary payload of {len} bytes exceeds the u32 length prefix")]
    PayloadTooLarge { len: usize },
}

/// A command reply.
///
/// Most commands answer with a single text line. Handlers that return
/// opaque binary data (e.g. a future screenshot command) opt into the
/// length-prefixed binary framing instead; built-in commands never do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Newline-terminated text
    Line(String),
    /// Length-prefixed binary: big-endian `u32` payload length, then payload
    Binary(Vec<u8>),
}

impl Reply {
    /// The canonical success reply, `OK`.
    pub fn ok() -> Self {
        Reply::Line("OK".to_string())
    }

    /// A text reply.
    pub fn line(text: impl Into<String>) -> Self {
        Reply::Line(text.into())
    }

    /// An error reply: `ERROR: <message>`.
    pub fn error(message: impl fmt::Display) -> Self {
        Reply::Line(format!("{ERROR_PREFIX}{message}"))
    }

    /// A binary reply.
    pub fn binary(payload: impl Into<Vec<u8>>) -> Self {
        Reply::Binary(payload.into())
    }

    /// Whether this is an `ERROR:` line.
    #[must_use]
    pub fn is_error(&self) -> bool {
        matches!(self, Reply::Line(text) if text.starts_with(ERROR_PREFIX))
    }

    /// Encodes the reply for the wire.
    ///
    /// Text ends with exactly one `\n`: trailing newline or carriage-return
    /// characters the handler included are stripped first, then one `\n` is
    /// appended. Binary payloads are framed as a big-endian `u32` length
    /// followed by the raw bytes.
    pub fn encode(&self) -> Result<Vec<u8>, FrameError> {
        match self {
            Reply::Line(text) => {
                let trimmed = text.trim_end_matches(['\r', '\n']);
                let mut bytes = Vec::with_capacity(trimmed.len() + 1);
                bytes.extend_from_slice(trimmed.as_bytes());
                bytes.push(b'\n');
                Ok(bytes)
            }
            Reply::Binary(payload) => {
                let len = u32::try_from(payload.len())
                    .map_err(|_| FrameError::PayloadTooLarge { len: payload.len() })?;
                let mut bytes = Vec::with_capacity(payload.len() + 4);
                bytes.extend_from_slice(&len.to_be_bytes());
                bytes.extend_from_slice(payload);
                Ok(bytes)
            }
        }
    }
}
