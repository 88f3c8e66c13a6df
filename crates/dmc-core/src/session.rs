//! Device session state and the capability interface the dispatch layer uses.

use crate::error::SessionResult;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Mutex, MutexGuard};
use tracing::info;

// ============================================================================
// Type-Safe Identifiers
// ============================================================================

/// Identifier of a mirrorable device (e.g. an adb serial like
/// "emulator-5554" or "R5CT30XXXXX").
///
/// Opaque to the server: it is recorded on claim and echoed back by
/// `status`, never interpreted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
    /// Creates a new DeviceId from a string.
    ///
    /// Note: This does not validate the serial format. The device id comes
    /// from the client, so we record it as given.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the underlying string reference.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for DeviceId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for DeviceId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl AsRef<str> for DeviceId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// ============================================================================
// Session Status
// ============================================================================

/// Snapshot of the session as reported by the `status` command.
///
/// Serializes as `{"connected": bool, "device": string or null}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStatus {
    /// Whether a device resource is currently claimed.
    pub connected: bool,
    /// Identifier of the claimed device, if one was named at claim time.
    pub device: Option<DeviceId>,
}

impl SessionStatus {
    /// Status of a session with no active claim.
    #[must_use]
    pub fn idle() -> Self {
        Self {
            connected: false,
            device: None,
        }
    }
}

impl Default for SessionStatus {
    fn default() -> Self {
        Self::idle()
    }
}

// ============================================================================
// Capability Interface
// ============================================================================

/// Capability interface for the managed device resource.
///
/// Command handlers depend on this abstractly, so a backend that drives a
/// real mirroring process can be substituted without touching the server.
/// Implementations must keep `connected` and `device` consistent: a
/// [`describe`](DeviceSession::describe) snapshot never mixes the fields of
/// two different transitions.
pub trait DeviceSession: Send + Sync {
    /// Claims the device resource, replacing any previous claim.
    fn claim(&self, device: Option<DeviceId>) -> SessionResult<()>;

    /// Releases the current claim. Releasing an idle session is not an error.
    fn release(&self) -> SessionResult<()>;

    /// Returns a consistent snapshot of the session.
    fn describe(&self) -> SessionStatus;
}

/// Interior session state.
///
/// Both fields are only ever written together under the lock.
#[derive(Debug, Default)]
struct SessionState {
    connected: bool,
    device: Option<DeviceId>,
}

/// Default [`DeviceSession`] implementation.
///
/// Records claims without driving a real mirroring backend; the mirroring
/// process itself is an external collaborator out of scope here.
#[derive(Debug, Default)]
pub struct MirrorSession {
    state: Mutex<SessionState>,
}

impl MirrorSession {
    /// Creates an idle session.
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl DeviceSession for MirrorSession {
    fn claim(&self, device: Option<DeviceId>) -> SessionResult<()> {
        let mut state = self.state();
        state.connected = true;
        state.device = device;
        let label = state.device.as_ref().map(DeviceId::as_str).unwrap_or("default");
        info!(device = label, "Device claimed");
        Ok(())
    }

    fn release(&self) -> SessionResult<()> {
        let mut state = self.state();
        state.connected = false;
        state.device = None;
        info!("Device released");
        Ok(())
    }

    fn describe(&self) -> SessionStatus {
        let state = self.state();
        SessionStatus {
            connected: state.connected,
            device: state.device.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_claim_release_round_trip() {
        let session = MirrorSession::new();
        assert_eq!(session.describe(), SessionStatus::idle());

        session.claim(Some(DeviceId::new("emulator-5554"))).unwrap();
        let status = session.describe();
        assert!(status.connected);
        assert_eq!(status.device, Some(DeviceId::new("emulator-5554")));

        session.release().unwrap();
        assert_eq!(session.describe(), SessionStatus::idle());
    }

    #[test]
    fn test_claim_without_device() {
        let session = MirrorSession::new();
        session.claim(None).unwrap();
        let status = session.describe();
        assert!(status.connected);
        assert_eq!(status.device, None);
    }

    #[test]
    fn test_reclaim_replaces_device() {
        let session = MirrorSession::new();
        session.claim(Some(DeviceId::new("device-a"))).unwrap();
        session.claim(Some(DeviceId::new("device-b"))).unwrap();
        assert_eq!(session.describe().device, Some(DeviceId::new("device-b")));
    }

    #[test]
    fn test_release_idle_session_is_ok() {
        let session = MirrorSession::new();
        assert!(session.release().is_ok());
        assert_eq!(session.describe(), SessionStatus::idle());
    }

    #[test]
    fn test_status_json_shape() {
        let status = SessionStatus {
            connected: true,
            device: Some(DeviceId::new("emulator-5554")),
        };
        let json = serde_json::to_string(&status).unwrap();
        assert_eq!(json, r#"{"connected":true,"device":"emulator-5554"}"#);

        let idle = serde_json::to_string(&SessionStatus::idle()).unwrap();
        assert_eq!(idle, r#"{"connected":false,"device":null}"#);
    }

    #[test]
    fn test_status_round_trips_through_json() {
        let status = SessionStatus {
            connected: true,
            device: Some(DeviceId::new("R5CT30XXXXX")),
        };
        let json = serde_json::to_string(&status).unwrap();
        let back: SessionStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(back, status);
    }

    /// Transitions are atomic pairs: with every claim carrying a device id,
    /// no snapshot may mix `connected` from one transition with `device`
    /// from another.
    #[test]
    fn test_concurrent_transitions_stay_paired() {
        let session = Arc::new(MirrorSession::new());
        let mut handles = Vec::new();

        for worker in 0..8 {
            let session = Arc::clone(&session);
            handles.push(thread::spawn(move || {
                let id = DeviceId::new(format!("device-{worker}"));
                for _ in 0..200 {
                    session.claim(Some(id.clone())).unwrap();
                    let status = session.describe();
                    assert_eq!(status.connected, status.device.is_some());
                    session.release().unwrap();
                    let status = session.describe();
                    assert_eq!(status.connected, status.device.is_some());
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }
    }
}
