//! Primary tier: ONNX Runtime plate detector + recognizer

use async_trait::async_trait;
use camera_capture::VideoFrame;
use ort::session::{builder::GraphOptimizationLevel, Session};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use crate::decode::{self, RecognizedText};
use crate::tensor::{self, InputTensor};
use crate::{plate, Detector, DetectorError, RawDetection, Tier};

fn load_session(path: &Path) -> Result<Session, DetectorError> {
    info!("Loading ONNX Runtime model from {}", path.display());
    Session::builder()
        .and_then(|builder| builder.with_optimization_level(GraphOptimizationLevel::Level3))
        .and_then(|builder| builder.commit_from_file(path))
        .map_err(|e| DetectorError::ModelLoad(format!("{}: {}", path.display(), e)))
}

fn run_session(session: &Session, input: InputTensor) -> Result<(Vec<usize>, Vec<f32>), DetectorError> {
    let array = ndarray::Array4::from_shape_vec(input.shape, input.data)
        .map_err(|e| DetectorError::ImageProcessing(e.to_string()))?;

    let inputs = ort::inputs![array].map_err(|e| DetectorError::Inference(e.to_string()))?;
    let outputs = session
        .run(inputs)
        .map_err(|e| DetectorError::Inference(e.to_string()))?;

    let view = outputs[0]
        .try_extract_tensor::<f32>()
        .map_err(|e| DetectorError::OutputShape(e.to_string()))?;

    Ok((view.shape().to_vec(), view.iter().copied().collect()))
}

struct PrimaryModels {
    detector: Session,
    recognizer: Session,
}

impl PrimaryModels {
    fn infer(&self, frame: &VideoFrame) -> Result<Option<RawDetection>, DetectorError> {
        let (shape, data) = run_session(&self.detector, tensor::detector_input(frame)?)?;
        let Some(candidate) = decode::best_box(&shape, &data, decode::MIN_BOX_SCORE)? else {
            return Ok(None);
        };

        let bbox = candidate.to_pixels(frame.width, frame.height);
        plate::read_candidate(frame, bbox, candidate.score, |crop| self.read(crop))
    }

    fn read(&self, crop: &VideoFrame) -> Result<Option<RecognizedText>, DetectorError> {
        let (shape, data) = run_session(&self.recognizer, tensor::recognizer_input(crop)?)?;
        decode::ctc_greedy(&shape, &data)
    }
}

/// Highest-accuracy tier, backed by native ONNX Runtime sessions
pub struct PrimaryDetector {
    detector_path: Option<PathBuf>,
    recognizer_path: Option<PathBuf>,
    models: Option<Arc<PrimaryModels>>,
}

impl PrimaryDetector {
    pub fn new(detector_path: Option<PathBuf>, recognizer_path: Option<PathBuf>) -> Self {
        Self {
            detector_path,
            recognizer_path,
            models: None,
        }
    }
}

#[async_trait]
impl Detector for PrimaryDetector {
    fn tier(&self) -> Tier {
        Tier::Primary
    }

    async fn initialize(&mut self) -> Result<(), DetectorError> {
        if self.models.is_some() {
            return Ok(());
        }
        let (Some(detector_path), Some(recognizer_path)) = (self.detector_path.clone(), self.recognizer_path.clone())
        else {
            return Err(DetectorError::ModelLoad("primary models not configured".into()));
        };

        let models = tokio::task::spawn_blocking(move || -> Result<PrimaryModels, DetectorError> {
            Ok(PrimaryModels {
                detector: load_session(&detector_path)?,
                recognizer: load_session(&recognizer_path)?,
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
            debug!("Primary detector sessions released");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unconfigured_primary_fails_to_initialize() {
        let mut detector = PrimaryDetector::new(None, None);
        assert!(matches!(detector.initialize().await, Err(DetectorError::ModelLoad(_))));

        let frame = VideoFrame::filled(8, 8, [0, 0, 0]);
        assert!(matches!(detector.detect(&frame).await, Err(DetectorError::NotInitialized)));

        // Safe without a successful initialize
        detector.cleanup();
    }
}
