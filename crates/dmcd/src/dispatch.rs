//! Command registration and dispatch.
//!
//! The registry is the daemon's lookup table from command name to
//! handler. Built-in commands are installed at server construction;
//! additional commands may be registered at any time, including while
//! the server is accepting connections.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use dmc_core::{DeviceId, DeviceSession, SessionError};
use dmc_protocol::{Reply, Request};

/// Errors a command handler can return.
///
/// Rendered as an `ERROR: <message>` reply at the dispatch boundary; a
/// handler failure never crashes the server.
#[derive(Error, Debug)]
pub enum CommandError {
    /// Device-session backend failure
    #[error("{0}")]
    Session(#[from] SessionError),

    /// Ad-hoc handler failure
    #[error("{0}")]
    Failed(String),

    /// Reply payload could not be serialized
    #[error("status serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl CommandError {
    /// A handler failure carrying the given message.
    pub fn failed(message: impl Into<String>) -> Self {
        CommandError::Failed(message.into())
    }
}

/// A registered command handler: argument list in, reply or error out.
///
/// Handlers run on the connection task and should be quick; the protocol
/// is one short exchange per connection.
pub type CommandHandler = Arc<dyn Fn(&[String]) -> Result<Reply, CommandError> + Send + Sync>;

/// Name-to-handler lookup table for the control protocol.
///
/// Names are stored lowercased and matched case-insensitively.
/// Registering a name that already exists replaces the previous handler:
/// last registration wins, with no error.
pub struct CommandRegistry {
    handlers: RwLock<HashMap<String, CommandHandler>>,
}

impl CommandRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            handlers: RwLock::new(HashMap::new()),
        }
    }

    /// Registers a handler under `name`, replacing any existing one.
    pub fn register<F>(&self, name: &str, handler: F)
    where
        F: Fn(&[String]) -> Result<Reply, CommandError> + Send + Sync + 'static,
    {
        let name = name.to_lowercase();
        let mut handlers = self.handlers.write().unwrap_or_else(|e| e.into_inner());
        if handlers.insert(name.clone(), Arc::new(handler)).is_some() {
            debug!(command = %name, "Replaced command handler");
        } else {
            debug!(command = %name, "Registered command handler");
        }
    }

    /// Dispatches one decoded command line.
    ///
    /// Never fails: parse failures, unknown commands, and handler errors
    /// all come back as `ERROR:` replies for the client, with the detail
    /// logged on the side.
    pub fn dispatch(&self, line: &str) -> Reply {
        let request = match Request::parse(line) {
            Ok(request) => request,
            Err(error) => {
                debug!(error = %error, "Rejected command line");
                return Reply::error(error);
            }
        };

        // Clone the handler out so a long-running handler never holds the
        // table lock against concurrent registrations.
        let handler = {
            let handlers = self.handlers.read().unwrap_or_else(|e| e.into_inner());
            handlers.get(request.name()).cloned()
        };

        match handler {
            Some(handler) => match handler(request.args()) {
                Ok(reply) => reply,
                Err(error) => {
                    warn!(command = %request.name(), error = %error, "Command handler failed");
                    Reply::error(error)
                }
            },
            None => {
                debug!(command = %request.name(), "Unknown command");
                Reply::error(format!("unknown command '{}'", request.name()))
            }
        }
    }
}

impl Default for CommandRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Installs the built-in commands against a session and a shutdown token.
///
/// | command      | effect                                   | reply            |
/// |--------------|------------------------------------------|------------------|
/// | `status`     | snapshot the session                     | JSON status line |
/// | `connect`    | claim the device (optional id argument)  | `OK`             |
/// | `disconnect` | release the device                       | `OK`             |
/// | `quit`       | request daemon shutdown                  | `OK`             |
pub(crate) fn register_builtins(
    registry: &CommandRegistry,
    session: Arc<dyn DeviceSession>,
    shutdown: CancellationToken,
) {
    let status_session = Arc::clone(&session);
    registry.register("status", move |_args| {
        let status = status_session.describe();
        Ok(Reply::line(serde_json::to_string(&status)?))
    });

    let connect_session = Arc::clone(&session);
    registry.register("connect", move |args| {
        let device = args.first().map(|id| DeviceId::new(id.clone()));
        connect_session.claim(device)?;
        Ok(Reply::ok())
    });

    let disconnect_session = Arc::clone(&session);
    registry.register("disconnect", move |_args| {
        disconnect_session.release()?;
        Ok(Reply::ok())
    });

    registry.register("quit", move |_args| {
        debug!("Shutdown requested via quit command");
        shutdown.cancel();
        Ok(Reply::ok())
    });
}
