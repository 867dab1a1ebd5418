//! Plate text recognizer on tract (pure Rust ONNX)

use std::path::Path;
use tract_onnx::prelude::*;

use camera_capture::VideoFrame;

use crate::decode::{self, RecognizedText};
use crate::tensor::{self, InputTensor};
use crate::DetectorError;

/// Optimized, runnable tract model
pub(crate) type TractPlan = TypedRunnableModel<TypedModel>;

/// Load an ONNX model with a fixed input shape
pub(crate) fn load_plan(path: &Path, input_shape: [usize; 4]) -> Result<TractPlan, DetectorError> {
    tract_onnx::onnx()
        .model_for_path(path)
        .and_then(|model| model.with_input_fact(0, f32::fact(input_shape).into()))
        .and_then(|model| model.into_optimized())
        .and_then(|model| model.into_runnable())
        .map_err(|e| DetectorError::ModelLoad(format!("{}: {}", path.display(), e)))
}

/// Run a plan on one input and return the first output as `(shape, values)`
pub(crate) fn run_plan(plan: &TractPlan, input: InputTensor) -> Result<(Vec<usize>, Vec<f32>), DetectorError> {
    let array = tract_ndarray::Array4::from_shape_vec(input.shape, input.data)
        .map_err(|e| DetectorError::ImageProcessing(e.to_string()))?;

    let outputs = plan
        .run(tvec!(Tensor::from(array).into()))
        .map_err(|e| DetectorError::Inference(e.to_string()))?;

    let output = outputs
        .first()
        .ok_or_else(|| DetectorError::OutputShape("model produced no outputs".into()))?;
    let view = output
        .to_array_view::<f32>()
        .map_err(|e| DetectorError::OutputShape(e.to_string()))?;

    Ok((view.shape().to_vec(), view.iter().copied().collect()))
}

/// CTC text recognizer shared by the secondary and tertiary tiers
pub struct TractRecognizer {
    plan: TractPlan,
}

impl TractRecognizer {
    pub fn load(path: &Path) -> Result<Self, DetectorError> {
        Ok(Self {
            plan: load_plan(path, tensor::recognizer_shape())?,
        })
    }

    /// Read the characters on a plate crop
    pub fn read(&self, crop: &VideoFrame) -> Result<Option<RecognizedText>, DetectorError> {
        let input = tensor::recognizer_input(crop)?;
        let (shape, data) = run_plan(&self.plan, input)?;
        decode::ctc_greedy(&shape, &data)
    }
}
