//! dmcd - Control daemon for a local device-mirroring session
//!
//! This crate provides the daemon's core infrastructure:
//! - `dispatch` - Command registry mapping protocol commands to handlers
//! - `server` - Unix socket server with stale-socket recovery and
//!   graceful shutdown
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                     dmcd daemon                         │
//! ├─────────────────────────────────────────────────────────┤
//! │                                                         │
//! │  ┌─────────────────┐      ┌──────────────────────────┐  │
//! │  │  ControlServer  │─────▶│     CommandRegistry      │  │
//! │  │ (Unix Socket)   │      │  (name -> handler table) │  │
//! │  └────────┬────────┘      └────────────┬─────────────┘  │
//! │           │ accept()                   │                │
//! │           ▼                            ▼                │
//! │  ┌─────────────────┐      ┌──────────────────────────┐  │
//! │  │ConnectionHandler│      │   dyn DeviceSession      │  │
//! │  │ (one exchange)  │      │  (claim/release state)   │  │
//! │  └─────────────────┘      └──────────────────────────┘  │
//! │                                                         │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! Each connection carries exactly one command line and one reply. The
//! socket file is the daemon's only on-disk artifact: its presence plus a
//! live listener behind it is what "running" means, and a leftover file
//! with no listener is reclaimed at startup.
//!
//! # Panic-Free Guarantees
//!
//! All production code in this crate avoids `.unwrap()`, `.expect()`,
//! `panic!()`, `unreachable!()`, and `todo!()`; fallible operations
//! return `Result` or are logged and isolated to the one connection that
//! caused them.

pub mod dispatch;
pub mod server;

pub use dispatch::{CommandError, CommandRegistry};
pub use server::{ControlServer, ServerError};
