//! Tertiary tier: edge/contour plate localisation + tract recognizer

use async_trait::async_trait;
use camera_capture::VideoFrame;
use imageproc::contours::find_contours;
use imageproc::edges::canny;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

use crate::recognizer::TractRecognizer;
use crate::{plate, BoundingBox, Detector, DetectorError, RawDetection, Tier};

const CANNY_LOW: f32 = 50.0;
const CANNY_HIGH: f32 = 150.0;

/// Accepted contour bounding-box area, exclusive, in pixels
const MIN_REGION_AREA: f32 = 1000.0;
const MAX_REGION_AREA: f32 = 50000.0;

/// Accepted width/height ratio, inclusive
const MIN_ASPECT: f32 = 2.0;
const MAX_ASPECT: f32 = 6.0;
/// Aspect ratio of a typical plate
const IDEAL_ASPECT: f32 = 4.5;

/// Locate the most plate-like rectangle in a frame.
///
/// Returns the region and a detection confidence in `[0.5, 1.0]` that grows
/// as the aspect ratio approaches a typical plate.
pub fn find_plate_region(frame: &VideoFrame) -> Option<(BoundingBox, f32)> {
    let gray = frame.to_luma_image()?;
    let edges = canny(&gray, CANNY_LOW, CANNY_HIGH);

    let mut best: Option<(BoundingBox, f32)> = None;
    for contour in find_contours::<i32>(&edges) {
        let Some(bbox) = bounding_rect(&contour.points) else {
            continue;
        };
        let area = bbox.width * bbox.height;
        let aspect = bbox.width / bbox.height;
        if area <= MIN_REGION_AREA || area >= MAX_REGION_AREA || !(MIN_ASPECT..=MAX_ASPECT).contains(&aspect) {
            continue;
        }

        let largest = best
            .as_ref()
            .map(|(b, _)| area > b.width * b.height)
            .unwrap_or(true);
        if largest {
            let deviation = ((aspect - IDEAL_ASPECT).abs() / IDEAL_ASPECT).min(1.0);
            best = Some((bbox, 0.5 + 0.5 * (1.0 - deviation)));
        }
    }

    best
}

fn bounding_rect(points: &[imageproc::point::Point<i32>]) -> Option<BoundingBox> {
    let first = points.first()?;
    let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);
    for p in points {
        min_x = min_x.min(p.x);
        min_y = min_y.min(p.y);
        max_x = max_x.max(p.x);
        max_y = max_y.max(p.y);
    }

    let width = (max_x - min_x + 1) as f32;
    let height = (max_y - min_y + 1) as f32;
    Some(BoundingBox::new(min_x as f32, min_y as f32, width, height))
}

/// Last-resort tier; works without a detection model
pub struct TertiaryDetector {
    recognizer_path: Option<PathBuf>,
    recognizer: Option<Arc<TractRecognizer>>,
}

impl TertiaryDetector {
    pub fn new(recognizer_path: Option<PathBuf>) -> Self {
        Self {
            recognizer_path,
            recognizer: None,
        }
    }
}

#[async_trait]
impl Detector for TertiaryDetector {
    fn tier(&self) -> Tier {
        Tier::Tertiary
    }

    async fn initialize(&mut self) -> Result<(), DetectorError> {
        if self.recognizer.is_some() {
            return Ok(());
        }
        let path = self
            .recognizer_path
            .clone()
            .ok_or_else(|| DetectorError::ModelLoad("recognizer model not configured".into()))?;

        let recognizer = tokio::task::spawn_blocking(move || TractRecognizer::load(&path))
            .await
            .map_err(|e| DetectorError::ModelLoad(format!("model loading task failed: {}", e)))??;

        self.recognizer = Some(Arc::new(recognizer));
        Ok(())
    }

    async fn detect(&self, frame: &VideoFrame) -> Result<Option<RawDetection>, DetectorError> {
        let recognizer = self.recognizer.clone().ok_or(DetectorError::NotInitialized)?;
        let frame = frame.clone();

        tokio::task::spawn_blocking(move || {
            let Some((bbox, confidence)) = find_plate_region(&frame) else {
                return Ok(None);
            };
            plate::read_candidate(&frame, bbox, confidence, |crop| recognizer.read(crop))
        })
        .await
        .map_err(|e| DetectorError::Inference(format!("inference task failed: {}", e)))?
    }

    fn cleanup(&mut self) {
        if self.recognizer.take().is_some() {
            debug!("Tertiary recognizer released");
        }
    }
}
