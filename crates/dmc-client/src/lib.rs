//! dmc Client - One-shot client for the dmcd control socket
//!
//! Wraps the line protocol spoken by the daemon: connect to the Unix
//! socket, send a single command line, read a single reply, close.
//! Each call to [`ControlClient`] opens a fresh connection, mirroring
//! the daemon's one-shot connection handling.
//!
//! # Example
//!
//! ```no_run
//! use dmc_client::ControlClient;
//!
//! # async fn example() -> Result<(), dmc_client::ClientError> {
//! let client = ControlClient::default();
//! let status = client.status().await?;
//! println!("connected: {}", status.connected);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod error;

pub use client::ControlClient;
pub use error::ClientError;
