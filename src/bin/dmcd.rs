//! dmcd - Device mirror control daemon
//!
//! Runs in the foreground, owns a Unix control socket, and serves
//! one-shot command connections until told to stop. The socket file is
//! the daemon's only on-disk artifact; there is no PID file.
//!
//! # Usage
//!
//! ```bash
//! # Listen on the default socket (/tmp/dmcd.sock)
//! dmcd
//!
//! # Listen on an explicit socket path
//! dmcd --socket /run/user/1000/dmcd.sock
//!
//! # The DMC_SOCKET environment variable works too
//! DMC_SOCKET=/tmp/custom.sock dmcd
//! ```
//!
//! # Signal Handling
//!
//! SIGTERM and SIGINT both trigger a graceful shutdown: the signal
//! task only cancels the server's token, and the accept loop drains,
//! removes the socket file, and exits with status 0. Startup failures
//! (socket in use, bind errors) exit non-zero.

use std::env;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use dmc_core::MirrorSession;
use dmc_protocol::{DEFAULT_SOCKET_PATH, SOCKET_ENV_VAR};
use dmcd::ControlServer;

/// dmcd - device mirror control daemon
#[derive(Parser, Debug)]
#[command(name = "dmcd", version, about)]
struct Args {
    /// Path to the control socket (overrides DMC_SOCKET)
    #[arg(long)]
    socket: Option<PathBuf>,
}

fn resolve_socket_path(flag: Option<PathBuf>) -> PathBuf {
    flag.or_else(|| env::var(SOCKET_ENV_VAR).ok().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_SOCKET_PATH))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("dmcd=info".parse()?)
                .add_directive("dmc_core=info".parse()?)
                .add_directive("dmc_protocol=info".parse()?),
        )
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        pid = process::id(),
        "dmcd starting"
    );

    let socket_path = resolve_socket_path(args.socket);
    let cancel_token = CancellationToken::new();

    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        if let Err(e) = wait_for_shutdown_signal().await {
            error!(error = %e, "Error waiting for shutdown signal");
        }
        info!("Shutdown signal received");
        shutdown_token.cancel();
    });

    let session = Arc::new(MirrorSession::new());
    let server = ControlServer::new(socket_path, session, cancel_token);

    if let Err(e) = server.run().await {
        error!(error = %e, "Server error");
        return Err(e.into());
    }

    info!("dmcd stopped");
    Ok(())
}

async fn wait_for_shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("Received Ctrl+C");
    }

    Ok(())
}
