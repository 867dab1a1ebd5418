//! Camera Capture Library for the Plate Scanner
//!
//! Provides camera access for live plate detection:
//! - Capture device contract (permission query, open, frame read)
//! - Directory replay device for recorded footage
//! - `CameraSession` owning the device handle exclusively, driven by a
//!   pure `Idle/Starting/Active/Error` state machine

pub mod device;
pub mod frame;
pub mod session;
pub mod state;

pub use device::{CaptureConstraints, CaptureDevice, DeviceHandle, DirectoryDevice, PermissionState};
pub use frame::VideoFrame;
pub use session::CameraSession;
pub use state::{CameraEvent, CameraState};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Why a camera could not be started
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnavailableReason {
    /// The user or platform refused camera access
    PermissionDenied,
    /// No capture device exists at the configured location
    NoDevice,
    /// The device is held by another session or application
    Busy,
    /// Capture is not supported on this platform
    Unsupported,
    /// The device did not become ready in time
    Timeout,
}

impl fmt::Display for UnavailableReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            UnavailableReason::PermissionDenied => "permission denied",
            UnavailableReason::NoDevice => "no device",
            UnavailableReason::Busy => "device busy",
            UnavailableReason::Unsupported => "not supported",
            UnavailableReason::Timeout => "start timed out",
        };
        f.write_str(text)
    }
}

/// Camera error types
#[derive(Error, Debug)]
pub enum CameraError {
    #[error("Camera unavailable ({reason}): {detail}")]
    Unavailable {
        reason: UnavailableReason,
        detail: String,
    },

    #[error("Invalid format: {0}")]
    Format(String),

    #[error("Streaming error: {0}")]
    Stream(String),

    #[error("Camera session already started")]
    AlreadyStarted,

    #[error("Camera start was cancelled by stop")]
    Cancelled,

    #[error("Camera start was abandoned before the device opened")]
    Abandoned,
}

impl CameraError {
    /// Build an `Unavailable` error
    pub fn unavailable(reason: UnavailableReason, detail: impl Into<String>) -> Self {
        CameraError::Unavailable {
            reason,
            detail: detail.into(),
        }
    }

    /// Whether the caller should offer a permission request before retrying
    pub fn needs_permission(&self) -> bool {
        matches!(
            self,
            CameraError::Unavailable {
                reason: UnavailableReason::PermissionDenied,
                ..
            }
        )
    }

    /// Reason code when the camera is unavailable
    pub fn unavailable_reason(&self) -> Option<UnavailableReason> {
        match self {
            CameraError::Unavailable { reason, .. } => Some(*reason),
            _ => None,
        }
    }
}

/// Camera configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Device location (a directory of frames for the replay device)
    pub device: String,
    /// Preferred capture width
    pub width: u32,
    /// Preferred capture height
    pub height: u32,
    /// Preferred frame rate
    pub fps: u32,
    /// Upper bound on device start-up (milliseconds)
    pub start_timeout_ms: u64,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            device: "frames".to_string(),
            width: 1280,
            height: 720,
            fps: 30,
            start_timeout_ms: 10_000,
        }
    }
}

impl CameraConfig {
    /// Start-up timeout as a `Duration`
    pub fn start_timeout(&self) -> Duration {
        Duration::from_millis(self.start_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permission_denied_needs_prompt() {
        let err = CameraError::unavailable(UnavailableReason::PermissionDenied, "blocked");
        assert!(err.needs_permission());
        assert_eq!(err.unavailable_reason(), Some(UnavailableReason::PermissionDenied));

        let busy = CameraError::unavailable(UnavailableReason::Busy, "in use");
        assert!(!busy.needs_permission());
        assert!(!CameraError::AlreadyStarted.needs_permission());
    }

    #[test]
    fn test_default_config() {
        let config = CameraConfig::default();
        assert_eq!((config.width, config.height, config.fps), (1280, 720, 30));
        assert_eq!(config.start_timeout(), Duration::from_secs(10));
    }
}
