//! Secondary tier: general-purpose detector on tract

use async_trait::async_trait;
use camera_capture::VideoFrame;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

use crate::decode;
use crate::recognizer::{load_plan, run_plan, TractPlan, TractRecognizer};
use crate::tensor;
use crate::{plate, Detector, DetectorError, RawDetection, Tier};

struct SecondaryModels {
    detector: TractPlan,
    recognizer: TractRecognizer,
}

impl SecondaryModels {
    fn infer(&self, frame: &VideoFrame) -> Result<Option<RawDetection>, DetectorError> {
        let (shape, data) = run_plan(&self.detector, tensor::detector_input(frame)?)?;
        let Some(candidate) = decode::best_box(&shape, &data, decode::MIN_BOX_SCORE)? else {
            return Ok(None);
        };

        let bbox = candidate.to_pixels(frame.width, frame.height);
        plate::read_candidate(frame, bbox, candidate.score, |crop| self.recognizer.read(crop))
    }
}

/// Pure-Rust model tier; no native runtime required
pub struct SecondaryDetector {
    model_path: Option<PathBuf>,
    recognizer_path: Option<PathBuf>,
    models: Option<Arc<SecondaryModels>>,
}

impl SecondaryDetector {
    pub fn new(model_path: Option<PathBuf>, recognizer_path: Option<PathBuf>) -> Self {
        Self {
            model_path,
            recognizer_path,
            models: None,
        }
    }
}

#[async_trait]
impl Detector for SecondaryDetector {
    fn tier(&self) -> Tier {
        Tier::Secondary
    }

    async fn initialize(&mut self) -> Result<(), DetectorError> {
        if self.models.is_some() {
            return Ok(());
        }
        let (Some(model_path), Some(recognizer_path)) = (self.model_path.clone(), self.recognizer_path.clone())
        else {
            return Err(DetectorError::ModelLoad("secondary models not configured".into()));
        };

        info!("Loading tract detector from {}", model_path.display());
        let models = tokio::task::spawn_blocking(move || -> Result<SecondaryModels, DetectorError> {
            Ok(SecondaryModels {
                detector: load_plan(&model_path, tensor::detector_shape())?,
                recognizer: TractRecognizer::load(&recognizer_path)?,
            })
        })
        .await
        .map_err(|e| DetectorError::ModelLoad(format!("model loading task failed: {}", e)))??;

        self.models = Some(Arc::new(models));
        Ok(())
    }

    async fn detect(&self, frame: &VideoFrame) -> Result<Option<RawDetection>, DetectorError> {
        let models = self.models.clone().ok_or(DetectorError::NotInitialized)?;
        let frame = frame.clone();

        tokio::task::spawn_blocking(move || models.infer(&frame))
            .await
            .map_err(|e| DetectorError::Inference(format!("inference task failed: {}", e)))?
    }

    fn cleanup(&mut self) {
        if self.models.take().is_some() {
            debug!("Secondary detector models released");
        }
    }
}
