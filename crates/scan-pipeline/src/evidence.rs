//! Evidence stills taken from the live camera

use camera_capture::{CameraSession, VideoFrame};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::ScanError;

/// A frame captured as evidence
#[derive(Debug, Clone)]
pub struct Evidence {
    pub id: Uuid,
    pub captured_at: DateTime<Utc>,
    pub plate_text: Option<String>,
    pub frame: VideoFrame,
}

impl Evidence {
    /// Identifier used when referencing this still from a violation report
    pub fn reference(&self) -> String {
        format!("evidence-{}", self.id)
    }

    pub fn encode_jpeg(&self) -> Result<Vec<u8>, ScanError> {
        self.frame
            .encode_jpeg()
            .map_err(|e| ScanError::Evidence(e.to_string()))
    }
}

/// Grabs stills through the camera session; never touches the hardware itself
pub struct EvidenceRecorder {
    camera: Arc<CameraSession>,
}

impl EvidenceRecorder {
    pub fn new(camera: Arc<CameraSession>) -> Self {
        Self { camera }
    }

    pub async fn capture_evidence(&self, plate_text: Option<String>) -> Result<Evidence, ScanError> {
        let frame = self.camera.capture_frame().await.ok_or(ScanError::NoActiveCamera)?;
        let evidence = Evidence {
            id: Uuid::new_v4(),
            captured_at: Utc::now(),
            plate_text,
            frame,
        };
        info!(id = %evidence.id, plate = ?evidence.plate_text, "Evidence captured");
        Ok(evidence)
    }
}
