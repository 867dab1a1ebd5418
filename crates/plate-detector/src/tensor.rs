//! Frame to model-input conversion

use camera_capture::VideoFrame;
use image::imageops::{self, FilterType};

use crate::DetectorError;

/// Square input edge of the detection models
pub const DETECTOR_INPUT_SIZE: u32 = 640;
/// Recognizer input height
pub const RECOGNIZER_INPUT_HEIGHT: u32 = 32;
/// Recognizer input width
pub const RECOGNIZER_INPUT_WIDTH: u32 = 128;

/// Dense NCHW float tensor, independent of the inference runtime
#[derive(Debug, Clone)]
pub struct InputTensor {
    pub shape: [usize; 4],
    pub data: Vec<f32>,
}

/// Shape of the detector input
pub fn detector_shape() -> [usize; 4] {
    [1, 3, DETECTOR_INPUT_SIZE as usize, DETECTOR_INPUT_SIZE as usize]
}

/// Shape of the recognizer input
pub fn recognizer_shape() -> [usize; 4] {
    [1, 1, RECOGNIZER_INPUT_HEIGHT as usize, RECOGNIZER_INPUT_WIDTH as usize]
}

/// Resize to the detector's square input and scale RGB to `[0, 1]`
pub fn detector_input(frame: &VideoFrame) -> Result<InputTensor, DetectorError> {
    let img = frame
        .to_rgb_image()
        .ok_or_else(|| DetectorError::ImageProcessing("Failed to create image buffer".into()))?;

    let size = DETECTOR_INPUT_SIZE;
    let resized = imageops::resize(&img, size, size, FilterType::Triangle);

    let plane = (size * size) as usize;
    let mut data = vec![0.0f32; plane * 3];
    for (x, y, pixel) in resized.enumerate_pixels() {
        let idx = (y * size + x) as usize;
        data[idx] = pixel[0] as f32 / 255.0;
        data[plane + idx] = pixel[1] as f32 / 255.0;
        data[2 * plane + idx] = pixel[2] as f32 / 255.0;
    }

    Ok(InputTensor {
        shape: detector_shape(),
        data,
    })
}

/// Grayscale plate crop resized to the recognizer's input
pub fn recognizer_input(crop: &VideoFrame) -> Result<InputTensor, DetectorError> {
    let gray = crop
        .to_luma_image()
        .ok_or_else(|| DetectorError::ImageProcessing("Failed to create plate crop".into()))?;

    let resized = imageops::resize(
        &gray,
        RECOGNIZER_INPUT_WIDTH,
        RECOGNIZER_INPUT_HEIGHT,
        FilterType::Triangle,
    );
    let data = resized.pixels().map(|p| p[0] as f32 / 255.0).collect();

    Ok(InputTensor {
        shape: recognizer_shape(),
        data,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detector_input_layout() {
        let frame = VideoFrame::filled(64, 48, [255, 0, 51]);
        let tensor = detector_input(&frame).unwrap();
        let plane = (DETECTOR_INPUT_SIZE * DETECTOR_INPUT_SIZE) as usize;

        assert_eq!(tensor.shape, detector_shape());
        assert_eq!(tensor.data.len(), plane * 3);
        assert!((tensor.data[0] - 1.0).abs() < 1e-6);
        assert!(tensor.data[plane].abs() < 1e-6);
        assert!((tensor.data[2 * plane] - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_recognizer_input_layout() {
        let frame = VideoFrame::filled(90, 20, [255, 255, 255]);
        let tensor = recognizer_input(&frame).unwrap();
        assert_eq!(tensor.data.len(), (RECOGNIZER_INPUT_WIDTH * RECOGNIZER_INPUT_HEIGHT) as usize);
        assert!(tensor.data.iter().all(|v| (*v - 1.0).abs() < 1e-6));
    }

    #[test]
    fn test_empty_frame_rejected() {
        let frame = VideoFrame::new(vec![], 0, 0, 0, 0);
        assert!(detector_input(&frame).is_err());
    }
}
