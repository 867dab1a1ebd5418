//! License Plate Detection
//!
//! Interchangeable recognition backends ranked in tiers:
//! - Primary: ONNX Runtime detector + recognizer (highest accuracy, highest cost)
//! - Secondary: pure-Rust tract detector + recognizer
//! - Tertiary: edge/contour heuristic + tract recognizer
//!
//! `DetectorChain` initializes tiers lazily and fails forward to the next
//! tier whenever one cannot load or keeps erroring at runtime.

pub mod chain;
pub mod config;
pub mod decode;
pub mod plate;
pub mod primary;
pub mod recognizer;
pub mod secondary;
pub mod tensor;
pub mod tertiary;

pub use chain::{ChainError, ChainOptions, DetectorChain};
pub use config::DetectorConfig;
pub use primary::PrimaryDetector;
pub use secondary::SecondaryDetector;
pub use tertiary::TertiaryDetector;

use async_trait::async_trait;
use camera_capture::VideoFrame;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Detector error types
#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("Model loading failed: {0}")]
    ModelLoad(String),

    #[error("Inference failed: {0}")]
    Inference(String),

    #[error("Image processing failed: {0}")]
    ImageProcessing(String),

    #[error("Unexpected model output: {0}")]
    OutputShape(String),

    #[error("Detector not initialized")]
    NotInitialized,

    #[error("Initialization timed out after {0}ms")]
    InitTimeout(u64),
}

/// Ranked detector tier; lower rank is tried first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Primary,
    Secondary,
    Tertiary,
}

impl Tier {
    /// All tiers in priority order
    pub const ALL: [Tier; 3] = [Tier::Primary, Tier::Secondary, Tier::Tertiary];

    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Primary => "primary",
            Tier::Secondary => "secondary",
            Tier::Tertiary => "tertiary",
        }
    }

    /// Position in `Tier::ALL`
    pub fn rank(&self) -> usize {
        *self as usize
    }

    /// Minimum confidences a raw detection from this tier must meet
    pub fn default_thresholds(&self) -> TierThresholds {
        match self {
            Tier::Primary => TierThresholds::new(0.70, 0.75),
            Tier::Secondary => TierThresholds::new(0.50, 0.60),
            Tier::Tertiary => TierThresholds::new(0.60, 0.70),
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Dual acceptance thresholds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TierThresholds {
    pub detection_min: f32,
    pub text_min: f32,
}

impl TierThresholds {
    pub const fn new(detection_min: f32, text_min: f32) -> Self {
        Self {
            detection_min,
            text_min,
        }
    }
}

/// Plate region in frame pixel space
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// Plate region as fractions of the frame size, for overlays
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalizedBox {
    pub left: f32,
    pub top: f32,
    pub width: f32,
    pub height: f32,
}

impl BoundingBox {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }

    /// Scale into `[0, 1]` frame fractions.
    ///
    /// Returns `None` while the frame size is unknown (zero), so callers
    /// skip the overlay instead of producing NaN/inf coordinates.
    pub fn normalized(&self, frame_width: u32, frame_height: u32) -> Option<NormalizedBox> {
        if frame_width == 0 || frame_height == 0 {
            return None;
        }
        let (fw, fh) = (frame_width as f32, frame_height as f32);
        Some(NormalizedBox {
            left: (self.x / fw).clamp(0.0, 1.0),
            top: (self.y / fh).clamp(0.0, 1.0),
            width: (self.width / fw).clamp(0.0, 1.0),
            height: (self.height / fh).clamp(0.0, 1.0),
        })
    }

    /// Integer crop rectangle clipped to the frame
    pub fn to_crop(&self, frame_width: u32, frame_height: u32) -> Option<(u32, u32, u32, u32)> {
        let x = self.x.max(0.0).floor() as u32;
        let y = self.y.max(0.0).floor() as u32;
        if x >= frame_width || y >= frame_height {
            return None;
        }
        let w = (self.width.max(0.0).ceil() as u32).min(frame_width - x);
        let h = (self.height.max(0.0).ceil() as u32).min(frame_height - y);
        (w > 0 && h > 0).then_some((x, y, w, h))
    }
}

/// Unfiltered backend output for one frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawDetection {
    pub plate_text: String,
    /// Certainty that a plate-shaped region was found, in `[0, 1]`
    pub detection_confidence: f32,
    /// Certainty in the recognized characters, in `[0, 1]`
    pub text_confidence: f32,
    pub bounding_box: BoundingBox,
}

/// Lifecycle of a backend inside a chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendState {
    Uninitialized,
    Initializing,
    Ready,
    Failed,
}

/// A pluggable plate recognition backend
#[async_trait]
pub trait Detector: Send + Sync {
    /// Tier this backend serves
    fn tier(&self) -> Tier;

    /// Load models/assets. Called at most once per chain.
    async fn initialize(&mut self) -> Result<(), DetectorError>;

    /// Find and read a plate. `Ok(None)` means no candidate in this frame.
    async fn detect(&self, frame: &VideoFrame) -> Result<Option<RawDetection>, DetectorError>;

    /// Release loaded resources; a no-op when never initialized
    fn cleanup(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_order_and_thresholds() {
        assert!(Tier::Primary < Tier::Secondary && Tier::Secondary < Tier::Tertiary);
        assert_eq!(Tier::Tertiary.rank(), 2);
        assert_eq!(Tier::Secondary.default_thresholds(), TierThresholds::new(0.50, 0.60));
    }

    #[test]
    fn test_normalized_guards_unknown_dimensions() {
        let bbox = BoundingBox::new(320.0, 180.0, 128.0, 36.0);
        assert!(bbox.normalized(0, 720).is_none());
        assert!(bbox.normalized(1280, 0).is_none());

        let norm = bbox.normalized(1280, 720).unwrap();
        assert!((norm.left - 0.25).abs() < 1e-6);
        assert!((norm.top - 0.25).abs() < 1e-6);
        assert!((norm.width - 0.1).abs() < 1e-6);
        assert!((norm.height - 0.05).abs() < 1e-6);
    }

    #[test]
    fn test_crop_clipped_to_frame() {
        let bbox = BoundingBox::new(90.0, 40.0, 50.0, 20.0);
        assert_eq!(bbox.to_crop(100, 50), Some((90, 40, 10, 10)));
        assert_eq!(BoundingBox::new(120.0, 0.0, 5.0, 5.0).to_crop(100, 50), None);
    }
}
