//! dmc Core - Shared types for device mirror control
//!
//! This crate provides the domain types shared between the daemon (dmcd)
//! and the client (dmc): the device-session capability interface, its
//! default in-process implementation, and the status snapshot reported
//! by the `status` command.
//!
//! All code follows the panic-free policy: no `.unwrap()`, `.expect()`,
//! `panic!()`, `unreachable!()`, `todo!()`, or direct indexing `[i]`.

pub mod error;
pub mod session;

// Re-exports for convenience
pub use error::{SessionError, SessionResult};
pub use session::{DeviceId, DeviceSession, MirrorSession, SessionStatus};
