//! Unix socket server for the dmc daemon.
//!
//! The server:
//! - Reconciles a leftover socket file before binding (stale files are
//!   removed, a live listener aborts startup)
//! - Listens on the socket and spawns a ConnectionHandler per client
//! - Dispatches through the shared CommandRegistry
//! - Supports graceful shutdown via CancellationToken
//! - Unlinks the socket file on the way out, however the loop ended
//!
//! # Panic-Free Guarantees
//!
//! No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`;
//! accept and per-connection errors are logged and never stop the loop.

mod connection;

pub use connection::{ConnectionError, ConnectionHandler};

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{UnixListener, UnixStream};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use dmc_core::DeviceSession;
use dmc_protocol::Reply;

use crate::dispatch::{register_builtins, CommandError, CommandRegistry};

/// Timeout for probing whether an existing socket file has a live
/// listener behind it.
const PROBE_TIMEOUT: Duration = Duration::from_secs(1);

/// Unix socket server for the dmc daemon.
///
/// Owns the socket path and the command registry; the listening socket
/// exists only inside [`run`](ControlServer::run). Construction has no
/// side effects.
pub struct ControlServer {
    /// Path to the Unix socket
    socket_path: PathBuf,

    /// Command lookup table shared with connection tasks
    commands: Arc<CommandRegistry>,

    /// Cancellation token for graceful shutdown
    cancel_token: CancellationToken,

    /// Connection counter for log correlation
    connection_counter: AtomicU64,
}

impl ControlServer {
    /// Creates a server with the built-in commands registered.
    ///
    /// # Arguments
    ///
    /// * `socket_path` - Path where the Unix socket will be created
    /// * `session` - Device session the built-in commands operate on
    /// * `cancel_token` - Token for graceful shutdown; `quit` cancels it
    pub fn new(
        socket_path: impl Into<PathBuf>,
        session: Arc<dyn DeviceSession>,
        cancel_token: CancellationToken,
    ) -> Self {
        let commands = Arc::new(CommandRegistry::new());
        register_builtins(&commands, session, cancel_token.clone());

        Self {
            socket_path: socket_path.into(),
            commands,
            cancel_token,
            connection_counter: AtomicU64::new(0),
        }
    }

    /// Creates a server on [`dmc_protocol::DEFAULT_SOCKET_PATH`].
    pub fn with_default_path(
        session: Arc<dyn DeviceSession>,
        cancel_token: CancellationToken,
    ) -> Self {
        Self::new(dmc_protocol::DEFAULT_SOCKET_PATH, session, cancel_token)
    }

    /// Returns the socket path.
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Registers an additional command, replacing any handler already
    /// using the name.
    ///
    /// Safe to call before or while the server is running; connections
    /// accepted after the call see the new handler.
    pub fn register<F>(&self, name: &str, handler: F)
    where
        F: Fn(&[String]) -> Result<Reply, CommandError> + Send + Sync + 'static,
    {
        self.commands.register(name, handler);
    }

    /// Runs the server until the cancellation token fires.
    ///
    /// Reconciles any leftover socket file, binds, and accepts
    /// connections. Returns only after shutdown; the socket file is
    /// removed no matter how the accept loop ended.
    pub async fn run(&self) -> Result<(), ServerError> {
        self.reconcile_stale_socket().await?;

        // Create parent directory if needed
        if let Some(parent) = self.socket_path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| ServerError::SocketSetup {
                    path: self.socket_path.clone(),
                    error: e.to_string(),
                })?;
            }
        }

        let listener =
            UnixListener::bind(&self.socket_path).map_err(|e| ServerError::SocketSetup {
                path: self.socket_path.clone(),
                error: e.to_string(),
            })?;

        info!(
            socket = %self.socket_path.display(),
            "Control server listening"
        );

        // Accept connections until cancelled
        loop {
            tokio::select! {
                _ = self.cancel_token.cancelled() => {
                    info!("Server shutdown requested");
                    break;
                }

                result = listener.accept() => {
                    match result {
                        Ok((stream, _addr)) => {
                            let conn_num = self.connection_counter.fetch_add(1, Ordering::Relaxed);
                            self.handle_connection(stream, conn_num);
                        }
                        Err(e) => {
                            error!(error = %e, "Failed to accept connection");
                            // Continue accepting other connections
                        }
                    }
                }
            }
        }

        self.cleanup();
        Ok(())
    }

    /// Decides what an existing file at the socket path means.
    ///
    /// Probes it with a short client connection. Refusal (or a vanished
    /// file) means nothing is listening: the stale file is removed. A
    /// successful connection means another instance owns the path and
    /// startup must fail. A probe timeout is treated the same as
    /// refusal: a listener too slow to accept within [`PROBE_TIMEOUT`]
    /// is indistinguishable from a dead one here and will be evicted,
    /// a known false positive of this scheme.
    async fn reconcile_stale_socket(&self) -> Result<(), ServerError> {
        if !self.socket_path.exists() {
            return Ok(());
        }

        match timeout(PROBE_TIMEOUT, UnixStream::connect(&self.socket_path)).await {
            Ok(Ok(_stream)) => Err(ServerError::AlreadyRunning {
                path: self.socket_path.clone(),
            }),
            Ok(Err(e)) if indicates_dead_listener(&e) => {
                warn!(
                    socket = %self.socket_path.display(),
                    "Removing stale socket file"
                );
                self.remove_stale_file()
            }
            Ok(Err(e)) => Err(ServerError::SocketSetup {
                path: self.socket_path.clone(),
                error: e.to_string(),
            }),
            Err(_elapsed) => {
                warn!(
                    socket = %self.socket_path.display(),
                    "Socket probe timed out, treating listener as dead"
                );
                self.remove_stale_file()
            }
        }
    }

    /// Removes the stale socket file before a fresh bind.
    fn remove_stale_file(&self) -> Result<(), ServerError> {
        match std::fs::remove_file(&self.socket_path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ServerError::SocketSetup {
                path: self.socket_path.clone(),
                error: e.to_string(),
            }),
        }
    }

    /// Hands an accepted connection to its own handler task.
    fn handle_connection(&self, stream: UnixStream, connection_number: u64) {
        let commands = Arc::clone(&self.commands);

        tokio::spawn(async move {
            ConnectionHandler::new(stream, commands, connection_number)
                .run()
                .await;
        });
    }

    /// Performs cleanup on shutdown.
    ///
    /// Idempotent: a socket file that is already gone is not an error.
    fn cleanup(&self) {
        if self.socket_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.socket_path) {
                warn!(
                    socket = %self.socket_path.display(),
                    error = %e,
                    "Failed to remove socket file"
                );
            }
        }

        info!("Server cleanup complete");
    }
}

/// Whether a failed probe connection means no live listener owns the
/// socket file.
fn indicates_dead_listener(error: &std::io::Error) -> bool {
    matches!(
        error.kind(),
        std::io::ErrorKind::ConnectionRefused | std::io::ErrorKind::NotFound
    )
}

/// Errors that can occur in server operations.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Server already running at {}", .path.display())]
    AlreadyRunning { path: PathBuf },

    #[error("Failed to setup socket at {}: {}", .path.display(), .error)]
    SocketSetup { path: PathBuf, error: String },
}
