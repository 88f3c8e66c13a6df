//! dmc Protocol - Wire protocol for control socket communication
//!
//! This crate defines the line protocol spoken over the dmcd control
//! socket: request parsing on the daemon side, reply framing shared with
//! clients, and the socket-path defaults both sides resolve.
//!
//! A connection carries exactly one exchange. The request is a
//! newline-terminated UTF-8 line, `<command> [args...]`. The reply is
//! either a newline-terminated line or, when a handler opts in, a binary
//! frame of 4-byte big-endian payload length followed by the payload.

pub mod message;
pub mod parse;

pub use message::{FrameError, Reply, ERROR_PREFIX};
pub use parse::{ParseError, Request};

/// Default filesystem path of the control socket.
pub const DEFAULT_SOCKET_PATH: &str = "/tmp/dmcd.sock";

/// Environment variable that overrides [`DEFAULT_SOCKET_PATH`].
///
/// A `--socket` flag takes precedence over both.
pub const SOCKET_ENV_VAR: &str = "DMC_SOCKET";
