//! Plate Scanning Pipeline
//!
//! Ties a camera session, a tiered detector chain and the vehicle registry
//! into a periodic scanning loop:
//! - at most one detection attempt in flight; busy ticks are dropped
//! - raw detections pass a per-tier confidence gate
//! - accepted plates are resolved against the registry
//! - disarming discards whatever is still in flight

pub mod attempt;
pub mod config;
pub mod detection_loop;
pub mod evidence;
pub mod gate;
pub mod lookup;
pub mod metrics;
pub mod scanner;
pub mod state;

pub use attempt::{AttemptLog, AttemptOutcome, AttemptSummary, DetectionAttempt};
pub use config::{ScannerConfig, TierThresholdOverrides};
pub use detection_loop::{DetectionLoop, LoopSnapshot};
pub use evidence::{Evidence, EvidenceRecorder};
pub use gate::{DetectionResult, GateDecision, ResultGate};
pub use lookup::{LookupCoordinator, LookupStatus, PlateLookupRecord};
pub use scanner::{DetectorFactory, ScanStatus, Scanner};
pub use state::{LoopState, ScannerEvent, ScannerState};

use camera_capture::CameraError;
use plate_detector::ChainError;
use thiserror::Error;
use vehicle_registry::RegistryError;

/// Scanning error types
#[derive(Error, Debug)]
pub enum ScanError {
    #[error(transparent)]
    Camera(#[from] CameraError),

    #[error("Camera is not active")]
    CameraNotActive,

    #[error("No active camera")]
    NoActiveCamera,

    #[error(transparent)]
    Detectors(#[from] ChainError),

    #[error("Invalid plate: {0:?}")]
    InvalidPlate(String),

    #[error("Evidence encoding failed: {0}")]
    Evidence(String),

    #[error("Violation submission is not configured")]
    SubmissionUnavailable,

    #[error("Violation submission failed: {0}")]
    Submission(#[from] RegistryError),
}
