//! Video frame snapshots

use image::{GrayImage, ImageFormat, RgbImage};
use std::io::Cursor;

/// Decoded RGB video frame
#[derive(Debug, Clone)]
pub struct VideoFrame {
    /// RGB pixel data (width * height * 3)
    pub data: Vec<u8>,
    /// Frame width
    pub width: u32,
    /// Frame height
    pub height: u32,
    /// Capture timestamp (nanoseconds since the Unix epoch)
    pub timestamp_ns: u64,
    /// Frame sequence number within the capture session
    pub sequence: u32,
}

impl VideoFrame {
    /// Create a new video frame from raw RGB data
    pub fn new(data: Vec<u8>, width: u32, height: u32, timestamp_ns: u64, sequence: u32) -> Self {
        Self {
            data,
            width,
            height,
            timestamp_ns,
            sequence,
        }
    }

    /// Solid-colour frame, mostly useful for fixtures
    pub fn filled(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        let data = rgb
            .iter()
            .copied()
            .cycle()
            .take((width * height * 3) as usize)
            .collect();
        Self::new(data, width, height, 0, 0)
    }

    /// Wrap a decoded image
    pub fn from_rgb_image(image: RgbImage, timestamp_ns: u64, sequence: u32) -> Self {
        let (width, height) = image.dimensions();
        Self::new(image.into_raw(), width, height, timestamp_ns, sequence)
    }

    /// View the frame as an `image` buffer (copies the pixels)
    pub fn to_rgb_image(&self) -> Option<RgbImage> {
        if !self.has_dimensions() {
            return None;
        }
        RgbImage::from_raw(self.width, self.height, self.data.clone())
    }

    /// Luminance image for edge-based processing
    pub fn to_luma_image(&self) -> Option<GrayImage> {
        self.to_rgb_image()
            .map(|rgb| image::DynamicImage::ImageRgb8(rgb).to_luma8())
    }

    /// Whether the intrinsic dimensions are known
    pub fn has_dimensions(&self) -> bool {
        self.width > 0 && self.height > 0
    }

    /// Get pixel at (x, y)
    pub fn get_pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let idx = ((y * self.width + x) * 3) as usize;
        self.data
            .get(idx..idx + 3)
            .map(|p| [p[0], p[1], p[2]])
    }

    /// Crop a region of the frame; `None` when the region leaves the frame
    pub fn crop(&self, x: u32, y: u32, w: u32, h: u32) -> Option<VideoFrame> {
        if w == 0 || h == 0 || x + w > self.width || y + h > self.height {
            return None;
        }

        let mut cropped = Vec::with_capacity((w * h * 3) as usize);
        for row in y..(y + h) {
            let start = ((row * self.width + x) * 3) as usize;
            let end = start + (w * 3) as usize;
            cropped.extend_from_slice(self.data.get(start..end)?);
        }

        Some(VideoFrame {
            data: cropped,
            width: w,
            height: h,
            timestamp_ns: self.timestamp_ns,
            sequence: self.sequence,
        })
    }

    /// Nearest-neighbour resize
    pub fn resize(&self, new_width: u32, new_height: u32) -> VideoFrame {
        if !self.has_dimensions() || new_width == 0 || new_height == 0 {
            return VideoFrame::new(Vec::new(), 0, 0, self.timestamp_ns, self.sequence);
        }

        let mut resized = Vec::with_capacity((new_width * new_height * 3) as usize);
        let x_ratio = self.width as f32 / new_width as f32;
        let y_ratio = self.height as f32 / new_height as f32;

        for y in 0..new_height {
            for x in 0..new_width {
                let src_x = ((x as f32 * x_ratio) as u32).min(self.width - 1);
                let src_y = ((y as f32 * y_ratio) as u32).min(self.height - 1);
                let pixel = self.get_pixel(src_x, src_y).unwrap_or([0, 0, 0]);
                resized.extend_from_slice(&pixel);
            }
        }

        VideoFrame {
            data: resized,
            width: new_width,
            height: new_height,
            timestamp_ns: self.timestamp_ns,
            sequence: self.sequence,
        }
    }

    /// Encode the frame as JPEG
    pub fn encode_jpeg(&self) -> Result<Vec<u8>, image::ImageError> {
        let rgb = self.to_rgb_image().ok_or_else(|| {
            image::ImageError::Parameter(image::error::ParameterError::from_kind(
                image::error::ParameterErrorKind::DimensionMismatch,
            ))
        })?;

        let mut bytes = Vec::new();
        rgb.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Jpeg)?;
        Ok(bytes)
    }
}
