//! Session error types following panic-free policy.

use thiserror::Error;

/// Errors a device-session backend can raise on claim or release.
///
/// The in-process [`MirrorSession`](crate::session::MirrorSession) never
/// fails; backends that drive a real mirroring process surface their
/// failures through these variants.
#[derive(Error, Debug, Clone)]
pub enum SessionError {
    /// The requested device cannot be claimed
    #[error("device '{device}' is unavailable: {reason}")]
    DeviceUnavailable { device: String, reason: String },

    /// Backend failure not tied to a specific device
    #[error("session backend error: {reason}")]
    Backend { reason: String },
}

/// Result type for session operations.
pub type SessionResult<T> = Result<T, SessionError>;
