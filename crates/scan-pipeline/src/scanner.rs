//! Scanner facade: one camera session + detection loop per scan

use camera_capture::{CameraConfig, CameraEvent, CameraSession, CameraState, CaptureDevice, PermissionState};
use plate_detector::{plate::normalize_plate, Detector, DetectorChain, DetectorConfig};
use serde::Serialize;
use std::sync::{Arc, Mutex};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{info, warn};
use vehicle_registry::{SubmissionReceipt, VehicleRegistry, ViolationReport, ViolationSubmitter};

use crate::attempt::{AttemptSummary, DetectionAttempt};
use crate::config::ScannerConfig;
use crate::detection_loop::{DetectionLoop, LoopSnapshot};
use crate::evidence::{Evidence, EvidenceRecorder};
use crate::lookup::{LookupCoordinator, PlateLookupRecord};
use crate::state::{LoopState, ScannerState};
use crate::ScanError;

/// Builds fresh detector backends for each scanning session
pub trait DetectorFactory: Send + Sync {
    fn build(&self) -> Vec<Box<dyn Detector>>;
}

impl DetectorFactory for DetectorConfig {
    fn build(&self) -> Vec<Box<dyn Detector>> {
        self.build_tiers()
    }
}

/// Everything a caller needs to render the scanner
#[derive(Debug, Clone, Serialize)]
pub struct ScanStatus {
    pub state: ScannerState,
    pub device: String,
    /// Intrinsic frame size, once known
    pub frame_dimensions: Option<(u32, u32)>,
    #[serde(flatten)]
    pub detection: LoopSnapshot,
}

struct ScanSession {
    camera: Arc<CameraSession>,
    detection: DetectionLoop,
}

/// Owns the scanning lifecycle.
///
/// `start_scan` acquires the camera and arms the loop; `pause_scan` only
/// disarms; `stop_scan` disarms, tears the detector chain down and releases
/// the camera.
pub struct Scanner {
    device: Arc<dyn CaptureDevice>,
    camera_config: CameraConfig,
    config: ScannerConfig,
    detectors: Arc<dyn DetectorFactory>,
    lookup: LookupCoordinator,
    submitter: Option<Arc<dyn ViolationSubmitter>>,
    session: AsyncMutex<Option<ScanSession>>,
    /// Why the last start failed, with the camera state it left behind
    last_failure: Mutex<Option<(CameraState, String)>>,
}

impl Scanner {
    pub fn new(
        device: Arc<dyn CaptureDevice>,
        camera_config: CameraConfig,
        config: ScannerConfig,
        detectors: Arc<dyn DetectorFactory>,
        registry: Arc<dyn VehicleRegistry>,
    ) -> Self {
        Self {
            device,
            camera_config,
            config,
            detectors,
            lookup: LookupCoordinator::new(registry),
            submitter: None,
            session: AsyncMutex::new(None),
            last_failure: Mutex::new(None),
        }
    }

    pub fn with_submitter(mut self, submitter: Arc<dyn ViolationSubmitter>) -> Self {
        self.submitter = Some(submitter);
        self
    }

    fn set_last_failure(&self, failure: Option<(CameraState, String)>) {
        *self.last_failure.lock().unwrap_or_else(|p| p.into_inner()) = failure;
    }

    fn last_failure(&self) -> Option<(CameraState, String)> {
        self.last_failure.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    /// Start the camera if needed and arm the detection loop
    pub async fn start_scan(&self) -> Result<(), ScanError> {
        let mut slot = self.session.lock().await;

        if slot.is_none() {
            let camera = Arc::new(CameraSession::new(self.device.clone(), self.camera_config.clone()));
            if let Err(e) = camera.start().await {
                self.set_last_failure(Some((camera.state(), e.to_string())));
                return Err(e.into());
            }

            let chain = DetectorChain::new(self.detectors.build(), self.config.chain_options());
            let detection = DetectionLoop::new(camera.clone(), chain, self.lookup.clone(), &self.config);
            *slot = Some(ScanSession { camera, detection });
        }

        let Some(session) = slot.as_ref() else {
            return Err(ScanError::NoActiveCamera);
        };
        let armed = session.detection.arm().await;
        match armed {
            Ok(()) => {
                self.set_last_failure(None);
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Scan could not start");
                self.set_last_failure(Some((CameraState::Idle, e.to_string())));
                if let Some(session) = slot.take() {
                    Self::teardown(session);
                }
                Err(e)
            }
        }
    }

    /// Disarm the loop, keeping the camera live
    pub async fn pause_scan(&self) {
        if let Some(session) = self.session.lock().await.as_ref() {
            session.detection.disarm();
        }
    }

    /// Disarm, tear down detectors and release the camera
    pub async fn stop_scan(&self) {
        let session = self.session.lock().await.take();
        if let Some(session) = session {
            Self::teardown(session);
            info!("Scan stopped");
        }
    }

    /// Release the camera first so a hung detector cannot keep it open
    fn teardown(session: ScanSession) {
        session.detection.on_camera_event(CameraEvent::StopRequested);
        session.camera.stop();
        session.detection.shutdown();
    }

    pub async fn status(&self) -> ScanStatus {
        let slot = self.session.lock().await;
        match slot.as_ref() {
            Some(session) => {
                let detection = session.detection.snapshot();
                ScanStatus {
                    state: session.detection.scanner_state(),
                    device: session.camera.device_name().to_string(),
                    frame_dimensions: session.camera.frame_dimensions(),
                    detection,
                }
            }
            None => {
                let (camera, last_error) = match self.last_failure() {
                    Some((camera, message)) => (camera, Some(message)),
                    None => (CameraState::Idle, None),
                };
                ScanStatus {
                    state: ScannerState::new(camera, LoopState::Disarmed),
                    device: self.device.name().to_string(),
                    frame_dimensions: None,
                    detection: LoopSnapshot {
                        last_error,
                        ..LoopSnapshot::default()
                    },
                }
            }
        }
    }

    /// Recent attempts of the current session
    pub async fn attempts(&self) -> (Vec<DetectionAttempt>, AttemptSummary) {
        match self.session.lock().await.as_ref() {
            Some(session) => session.detection.attempts(),
            None => (Vec::new(), AttemptSummary::default()),
        }
    }

    pub async fn permission(&self) -> PermissionState {
        self.device.permission().await
    }

    pub async fn request_permission(&self) -> PermissionState {
        self.device.request_permission().await
    }

    /// Resolve a typed plate through the same coordinator as the loop
    pub async fn manual_lookup(&self, plate: &str) -> Result<PlateLookupRecord, ScanError> {
        let cleaned = plate_detector::plate::clean_plate_text(plate);
        if cleaned.is_empty() {
            return Err(ScanError::InvalidPlate(plate.to_string()));
        }
        let plate_text = normalize_plate(&cleaned).unwrap_or(cleaned);
        Ok(self.lookup.resolve(&plate_text).await)
    }

    /// Still frame from the live camera, independent of the loop
    pub async fn capture_evidence(&self, plate_text: Option<String>) -> Result<Evidence, ScanError> {
        let camera = self
            .session
            .lock()
            .await
            .as_ref()
            .map(|session| session.camera.clone())
            .ok_or(ScanError::NoActiveCamera)?;
        EvidenceRecorder::new(camera).capture_evidence(plate_text).await
    }

    /// Capture a still and file `report` against it.
    ///
    /// Only a failed capture is an error. A rejected submission comes back
    /// next to the evidence so the still is never lost.
    pub async fn capture_violation(
        &self,
        mut report: ViolationReport,
    ) -> Result<(Evidence, Result<SubmissionReceipt, ScanError>), ScanError> {
        let evidence = self.capture_evidence(Some(report.plate_number.clone())).await?;
        report.evidence_refs.push(evidence.reference());

        let submitted = self.submit_violation(&report).await;
        if let Err(e) = &submitted {
            warn!(id = %evidence.id, error = %e, "Violation submission failed, evidence kept");
        }
        Ok((evidence, submitted))
    }

    pub async fn submit_violation(&self, report: &ViolationReport) -> Result<SubmissionReceipt, ScanError> {
        let submitter = self.submitter.as_ref().ok_or(ScanError::SubmissionUnavailable)?;
        Ok(submitter.submit_violation(report).await?)
    }
}
