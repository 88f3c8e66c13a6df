//! dmc - Command-line client for the dmcd control socket
//!
//! Thin wrapper over the daemon's line protocol: each invocation opens
//! one connection, sends one command, prints the reply payload to
//! stdout, and exits. Logging goes to stderr so stdout stays
//! script-friendly.
//!
//! # Usage
//!
//! ```bash
//! dmc status                    # {"connected":false,"device":null}
//! dmc connect emulator-5554     # OK
//! dmc disconnect                # OK
//! dmc quit                      # OK (daemon shuts down)
//! dmc send screenshot png       # raw command passthrough
//! ```
//!
//! Daemon `ERROR:` replies and transport failures exit with status 1.

use std::env;
use std::path::PathBuf;
use std::process;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use dmc_client::ControlClient;
use dmc_protocol::{DEFAULT_SOCKET_PATH, ERROR_PREFIX, SOCKET_ENV_VAR};

// ============================================================================
// CLI Arguments
// ============================================================================

/// dmc - control a running dmcd daemon
#[derive(Parser, Debug)]
#[command(name = "dmc")]
#[command(about = "Send commands to the device mirror control daemon")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Path to the control socket (overrides DMC_SOCKET)
    #[arg(long, global = true)]
    socket: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show session status as JSON
    Status,
    /// Claim the mirroring session, optionally naming a device id
    Connect {
        /// Device id to claim (daemon default when omitted)
        device: Option<String>,
    },
    /// Release the mirroring session
    Disconnect,
    /// Shut down the daemon
    Quit,
    /// Send a raw command line and print the reply verbatim
    Send {
        /// Command name followed by its arguments
        #[arg(required = true)]
        line: Vec<String>,
    },
}

fn resolve_socket_path(flag: Option<PathBuf>) -> PathBuf {
    flag.or_else(|| env::var(SOCKET_ENV_VAR).ok().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_SOCKET_PATH))
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let client = ControlClient::new(resolve_socket_path(args.socket));

    match args.command {
        Command::Status => {
            let reply = client.request("status").await?;
            println!("{reply}");
        }
        Command::Connect { device } => {
            let line = match device {
                Some(ref id) => format!("connect {id}"),
                None => "connect".to_string(),
            };
            let reply = client.request(&line).await?;
            println!("{reply}");
        }
        Command::Disconnect => {
            let reply = client.request("disconnect").await?;
            println!("{reply}");
        }
        Command::Quit => {
            let reply = client.request("quit").await?;
            println!("{reply}");
        }
        Command::Send { line } => {
            let reply = client.send_raw(&line.join(" ")).await?;
            println!("{reply}");
            if reply.starts_with(ERROR_PREFIX) {
                process::exit(1);
            }
        }
    }

    Ok(())
}
