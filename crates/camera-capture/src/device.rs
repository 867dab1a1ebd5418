//! Capture device contract and the directory replay device

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info};

use crate::{CameraConfig, CameraError, UnavailableReason, VideoFrame};

/// Camera permission as reported by the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionState {
    Granted,
    Denied,
    Prompt,
    Unknown,
}

/// Requested capture format; `None` fields leave the choice to the device
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CaptureConstraints {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub fps: Option<u32>,
}

impl CaptureConstraints {
    /// Constraints from the configured preferences
    pub fn preferred(config: &CameraConfig) -> Self {
        Self {
            width: Some(config.width),
            height: Some(config.height),
            fps: Some(config.fps),
        }
    }

    /// Whatever the device offers
    pub fn basic() -> Self {
        Self::default()
    }
}

/// A capture device that can be opened for exclusive use
#[async_trait]
pub trait CaptureDevice: Send + Sync {
    /// Human readable device name
    fn name(&self) -> &str;

    /// Current permission state
    async fn permission(&self) -> PermissionState;

    /// Ask the platform for access and report the resulting state
    async fn request_permission(&self) -> PermissionState;

    /// Acquire the hardware. Dropping the returned handle releases it.
    async fn open(&self, constraints: &CaptureConstraints) -> Result<Box<dyn DeviceHandle>, CameraError>;
}

/// Exclusive handle on an opened device
pub trait DeviceHandle: Send {
    /// Grab the current frame
    fn read_frame(&mut self) -> Result<VideoFrame, CameraError>;
}

const FRAME_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp"];

/// Replays still images from a directory as a camera feed.
///
/// Files are served in name order and the sequence wraps around. Only one
/// handle may be open at a time; a second `open` reports the device busy.
pub struct DirectoryDevice {
    root: PathBuf,
    name: String,
    in_use: Arc<AtomicBool>,
}

impl DirectoryDevice {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let name = format!("replay:{}", root.display());
        Self {
            root,
            name,
            in_use: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Whether a handle is currently open
    pub fn is_open(&self) -> bool {
        self.in_use.load(Ordering::SeqCst)
    }

    fn list_frames(&self) -> Result<Vec<PathBuf>, CameraError> {
        let entries = std::fs::read_dir(&self.root).map_err(|e| map_io_error(&self.root, e))?;

        let mut frames: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| is_frame_file(path))
            .collect();
        frames.sort();
        Ok(frames)
    }
}

#[async_trait]
impl CaptureDevice for DirectoryDevice {
    fn name(&self) -> &str {
        &self.name
    }

    async fn permission(&self) -> PermissionState {
        match std::fs::read_dir(&self.root) {
            Ok(_) => PermissionState::Granted,
            Err(e) if e.kind() == ErrorKind::PermissionDenied => PermissionState::Denied,
            Err(_) => PermissionState::Unknown,
        }
    }

    async fn request_permission(&self) -> PermissionState {
        // Filesystem access cannot be granted interactively
        self.permission().await
    }

    async fn open(&self, constraints: &CaptureConstraints) -> Result<Box<dyn DeviceHandle>, CameraError> {
        let frames = self.list_frames()?;
        if frames.is_empty() {
            return Err(CameraError::unavailable(
                UnavailableReason::NoDevice,
                format!("no frames found in {}", self.root.display()),
            ));
        }

        if self
            .in_use
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(CameraError::unavailable(
                UnavailableReason::Busy,
                format!("{} is already open", self.name),
            ));
        }

        info!("Opened {} ({} frames)", self.name, frames.len());
        Ok(Box::new(DirectoryHandle {
            frames,
            next: 0,
            sequence: 0,
            target: constraints.width.zip(constraints.height),
            in_use: self.in_use.clone(),
        }))
    }
}

struct DirectoryHandle {
    frames: Vec<PathBuf>,
    next: usize,
    sequence: u32,
    target: Option<(u32, u32)>,
    in_use: Arc<AtomicBool>,
}

impl DeviceHandle for DirectoryHandle {
    fn read_frame(&mut self) -> Result<VideoFrame, CameraError> {
        let path = &self.frames[self.next % self.frames.len()];
        self.next = (self.next + 1) % self.frames.len();

        let image = image::open(path)
            .map_err(|e| CameraError::Stream(format!("{}: {}", path.display(), e)))?
            .to_rgb8();

        self.sequence = self.sequence.wrapping_add(1);
        let frame = VideoFrame::from_rgb_image(image, now_ns(), self.sequence);

        Ok(match self.target {
            Some((w, h)) if (w, h) != (frame.width, frame.height) => frame.resize(w, h),
            _ => frame,
        })
    }
}

impl Drop for DirectoryHandle {
    fn drop(&mut self) {
        self.in_use.store(false, Ordering::SeqCst);
        debug!("Replay device released");
    }
}

fn is_frame_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| FRAME_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

fn map_io_error(root: &Path, err: std::io::Error) -> CameraError {
    let reason = match err.kind() {
        ErrorKind::PermissionDenied => UnavailableReason::PermissionDenied,
        ErrorKind::NotFound => UnavailableReason::NoDevice,
        _ => UnavailableReason::Unsupported,
    };
    CameraError::unavailable(reason, format!("{}: {}", root.display(), err))
}

pub(crate) fn now_ns() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame_dir(name: &str, count: usize) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("camera-capture-{}-{}", name, std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        for i in 0..count {
            let img = image::RgbImage::from_pixel(32, 24, image::Rgb([i as u8 * 40, 0, 0]));
            img.save(dir.join(format!("frame_{:03}.png", i))).unwrap();
        }
        dir
    }

    #[tokio::test]
    async fn test_missing_directory_is_no_device() {
        let device = DirectoryDevice::new("/nonexistent/plate-scanner/frames");
        let err = device.open(&CaptureConstraints::basic()).await.err().unwrap();
        assert_eq!(err.unavailable_reason(), Some(UnavailableReason::NoDevice));
        assert_eq!(device.permission().await, PermissionState::Unknown);
    }

    #[tokio::test]
    async fn test_replay_cycles_frames() {
        let dir = frame_dir("cycle", 2);
        let device = DirectoryDevice::new(&dir);
        let mut handle = device.open(&CaptureConstraints::basic()).await.unwrap();

        let first = handle.read_frame().unwrap();
        let second = handle.read_frame().unwrap();
        let third = handle.read_frame().unwrap();
        assert_eq!((first.width, first.height), (32, 24));
        assert_eq!(first.get_pixel(0, 0), third.get_pixel(0, 0));
        assert_ne!(first.get_pixel(0, 0), second.get_pixel(0, 0));
        assert_eq!(third.sequence, 3);
    }

    #[tokio::test]
    async fn test_exclusive_open_and_release() {
        let dir = frame_dir("exclusive", 1);
        let device = DirectoryDevice::new(&dir);

        let handle = device.open(&CaptureConstraints::basic()).await.unwrap();
        assert!(device.is_open());
        let err = device.open(&CaptureConstraints::basic()).await.err().unwrap();
        assert_eq!(err.unavailable_reason(), Some(UnavailableReason::Busy));

        drop(handle);
        assert!(!device.is_open());
        assert!(device.open(&CaptureConstraints::basic()).await.is_ok());
    }

    #[tokio::test]
    async fn test_constraints_resize_frames() {
        let dir = frame_dir("resize", 1);
        let device = DirectoryDevice::new(&dir);
        let constraints = CaptureConstraints {
            width: Some(64),
            height: Some(48),
            fps: None,
        };
        let mut handle = device.open(&constraints).await.unwrap();
        let frame = handle.read_frame().unwrap();
        assert_eq!((frame.width, frame.height), (64, 48));
    }
}
