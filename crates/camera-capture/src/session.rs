//! Camera session with exclusive ownership of the capture device

use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

use crate::device::{CaptureConstraints, CaptureDevice, DeviceHandle, PermissionState};
use crate::state::{CameraEvent, CameraState};
use crate::{CameraConfig, CameraError, UnavailableReason, VideoFrame};

type SharedHandle = Arc<Mutex<Box<dyn DeviceHandle>>>;

struct SessionInner {
    state: CameraState,
    /// Cloned by in-flight reads; the device is released when the last clone drops
    handle: Option<SharedHandle>,
    /// Bumped by every start and stop so a late start can detect it was superseded
    generation: u64,
    last_error: Option<String>,
    last_dimensions: Option<(u32, u32)>,
}

/// Owns the capture device handle for the lifetime of a scan.
///
/// The handle is released on `stop()` and when the session is dropped;
/// frame readers never acquire or release the device themselves.
pub struct CameraSession {
    device: Arc<dyn CaptureDevice>,
    config: CameraConfig,
    inner: Mutex<SessionInner>,
}

impl CameraSession {
    pub fn new(device: Arc<dyn CaptureDevice>, config: CameraConfig) -> Self {
        Self {
            device,
            config,
            inner: Mutex::new(SessionInner {
                state: CameraState::Idle,
                handle: None,
                generation: 0,
                last_error: None,
                last_dimensions: None,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionInner> {
        // A panic while holding the lock cannot leave the handle half-released
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Acquire the device and start streaming.
    ///
    /// Dropping the returned future before it resolves leaves the session
    /// in `Error`, so a later start is accepted.
    pub async fn start(&self) -> Result<(), CameraError> {
        let generation = {
            let mut inner = self.lock();
            inner.state = inner
                .state
                .transition(CameraEvent::StartRequested)
                .ok_or(CameraError::AlreadyStarted)?;
            inner.generation += 1;
            inner.last_error = None;
            inner.generation
        };
        let guard = StartGuard {
            session: self,
            generation,
            pending: true,
        };

        info!("Starting camera {}", self.device.name());
        let result = match tokio::time::timeout(self.config.start_timeout(), self.open_with_fallback()).await {
            Ok(result) => result,
            Err(_) => Err(CameraError::unavailable(
                UnavailableReason::Timeout,
                format!("device not ready after {}ms", self.config.start_timeout_ms),
            )),
        };

        guard.finish();
        let mut inner = self.lock();
        if inner.generation != generation || inner.state != CameraState::Starting {
            // Stopped while opening; the handle (if any) is dropped here
            debug!("Camera start superseded by stop");
            return Err(CameraError::Cancelled);
        }

        match result {
            Ok(handle) => {
                inner.handle = Some(Arc::new(Mutex::new(handle)));
                inner.state = inner
                    .state
                    .transition(CameraEvent::StartSucceeded)
                    .unwrap_or(CameraState::Active);
                info!("Camera active");
                Ok(())
            }
            Err(e) => {
                warn!("Camera start failed: {}", e);
                inner.state = inner
                    .state
                    .transition(CameraEvent::StartFailed)
                    .unwrap_or(CameraState::Error);
                inner.last_error = Some(e.to_string());
                Err(e)
            }
        }
    }

    async fn open_with_fallback(&self) -> Result<Box<dyn DeviceHandle>, CameraError> {
        let preferred = CaptureConstraints::preferred(&self.config);
        match self.device.open(&preferred).await {
            Err(CameraError::Format(reason)) => {
                warn!("Preferred capture format rejected ({}), retrying with basic settings", reason);
                self.device.open(&CaptureConstraints::basic()).await
            }
            other => other,
        }
    }

    /// Release the device. Idempotent and valid from every state.
    pub fn stop(&self) {
        let released = {
            let mut inner = self.lock();
            inner.state = inner
                .state
                .transition(CameraEvent::StopRequested)
                .unwrap_or(CameraState::Idle);
            inner.generation += 1;
            inner.last_error = None;
            inner.handle.take()
        };

        if released.is_some() {
            info!("Camera stopped, device released");
        }
        drop(released);
    }

    /// Snapshot of the current frame, `None` unless the session is active.
    ///
    /// The device read runs on the blocking pool without the session lock;
    /// a frame read across a stop is discarded.
    pub async fn capture_frame(&self) -> Option<VideoFrame> {
        let (handle, generation) = {
            let inner = self.lock();
            if !inner.state.is_active() {
                return None;
            }
            (inner.handle.clone()?, inner.generation)
        };

        let read = tokio::task::spawn_blocking(move || {
            let mut handle = handle.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            handle.read_frame()
        })
        .await;
        let frame = match read {
            Ok(Ok(frame)) => frame,
            Ok(Err(e)) => {
                warn!("Frame capture failed: {}", e);
                return None;
            }
            Err(e) => {
                warn!("Frame reader task failed: {}", e);
                return None;
            }
        };

        let mut inner = self.lock();
        if inner.generation != generation {
            debug!("Camera stopped during capture, frame dropped");
            return None;
        }
        if frame.has_dimensions() {
            inner.last_dimensions = Some((frame.width, frame.height));
        }
        Some(frame)
    }

    pub fn state(&self) -> CameraState {
        self.lock().state
    }

    pub fn is_active(&self) -> bool {
        self.state().is_active()
    }

    /// Message of the last failed start, cleared by the next start or stop
    pub fn last_error(&self) -> Option<String> {
        self.lock().last_error.clone()
    }

    /// Intrinsic frame size, known once a frame has been captured
    pub fn frame_dimensions(&self) -> Option<(u32, u32)> {
        self.lock().last_dimensions
    }

    pub async fn permission(&self) -> PermissionState {
        self.device.permission().await
    }

    pub async fn request_permission(&self) -> PermissionState {
        self.device.request_permission().await
    }

    pub fn device_name(&self) -> &str {
        self.device.name()
    }
}

/// Fails a start whose future is dropped mid-open
struct StartGuard<'a> {
    session: &'a CameraSession,
    generation: u64,
    pending: bool,
}

impl StartGuard<'_> {
    fn finish(mut self) {
        self.pending = false;
    }
}

impl Drop for StartGuard<'_> {
    fn drop(&mut self) {
        if !self.pending {
            return;
        }
        let mut inner = self.session.lock();
        if inner.generation == self.generation && inner.state == CameraState::Starting {
            warn!("Camera start abandoned");
            inner.state = inner
                .state
                .transition(CameraEvent::StartFailed)
                .unwrap_or(CameraState::Error);
            inner.last_error = Some(CameraError::Abandoned.to_string());
        }
    }
}

impl Drop for CameraSession {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc;
    use std::time::Duration;

    #[derive(Default)]
    struct Counters {
        opened: AtomicUsize,
        released: AtomicUsize,
    }

    enum Behaviour {
        Ok,
        Deny,
        RejectPreferred,
        Hang,
    }

    /// Holds a read open until the test lets it go
    struct ReadGate {
        entered: mpsc::SyncSender<()>,
        release: mpsc::Receiver<()>,
    }

    struct FakeDevice {
        behaviour: Behaviour,
        counters: Arc<Counters>,
        gate: Mutex<Option<ReadGate>>,
    }

    struct FakeHandle {
        counters: Arc<Counters>,
        gate: Option<ReadGate>,
    }

    impl DeviceHandle for FakeHandle {
        fn read_frame(&mut self) -> Result<VideoFrame, CameraError> {
            if let Some(gate) = &self.gate {
                let _ = gate.entered.send(());
                let _ = gate.release.recv();
            }
            Ok(VideoFrame::filled(4, 4, [1, 2, 3]))
        }
    }

    impl Drop for FakeHandle {
        fn drop(&mut self) {
            self.counters.released.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl CaptureDevice for FakeDevice {
        fn name(&self) -> &str {
            "fake"
        }

        async fn permission(&self) -> PermissionState {
            match self.behaviour {
                Behaviour::Deny => PermissionState::Denied,
                _ => PermissionState::Granted,
            }
        }

        async fn request_permission(&self) -> PermissionState {
            self.permission().await
        }

        async fn open(&self, constraints: &CaptureConstraints) -> Result<Box<dyn DeviceHandle>, CameraError> {
            match self.behaviour {
                Behaviour::Deny => {
                    return Err(CameraError::unavailable(UnavailableReason::PermissionDenied, "denied"))
                }
                Behaviour::RejectPreferred if constraints.width.is_some() => {
                    return Err(CameraError::Format("1280x720 unsupported".into()))
                }
                Behaviour::Hang => tokio::time::sleep(Duration::from_secs(3600)).await,
                _ => {}
            }
            self.counters.opened.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(FakeHandle {
                counters: self.counters.clone(),
                gate: self.gate.lock().unwrap().take(),
            }))
        }
    }

    fn session(behaviour: Behaviour) -> (CameraSession, Arc<Counters>) {
        let counters = Arc::new(Counters::default());
        let device = Arc::new(FakeDevice {
            behaviour,
            counters: counters.clone(),
            gate: Mutex::new(None),
        });
        (CameraSession::new(device, CameraConfig::default()), counters)
    }

    fn gated_session() -> (Arc<CameraSession>, Arc<Counters>, mpsc::Receiver<()>, mpsc::Sender<()>) {
        let (entered_tx, entered_rx) = mpsc::sync_channel(1);
        let (release_tx, release_rx) = mpsc::channel();
        let counters = Arc::new(Counters::default());
        let device = Arc::new(FakeDevice {
            behaviour: Behaviour::Ok,
            counters: counters.clone(),
            gate: Mutex::new(Some(ReadGate {
                entered: entered_tx,
                release: release_rx,
            })),
        });
        let camera = Arc::new(CameraSession::new(device, CameraConfig::default()));
        (camera, counters, entered_rx, release_tx)
    }

    #[tokio::test]
    async fn test_start_capture_stop() {
        let (camera, counters) = session(Behaviour::Ok);
        assert!(camera.capture_frame().await.is_none());

        camera.start().await.unwrap();
        assert_eq!(camera.state(), CameraState::Active);
        assert!(camera.capture_frame().await.is_some());
        assert_eq!(camera.frame_dimensions(), Some((4, 4)));

        camera.stop();
        assert_eq!(camera.state(), CameraState::Idle);
        assert!(camera.capture_frame().await.is_none());
        assert_eq!(counters.released.load(Ordering::SeqCst), 1);

        // Idempotent
        camera.stop();
        assert_eq!(counters.released.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_double_start_rejected() {
        let (camera, counters) = session(Behaviour::Ok);
        camera.start().await.unwrap();
        assert!(matches!(camera.start().await, Err(CameraError::AlreadyStarted)));
        assert_eq!(counters.opened.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_permission_denied_enters_error_and_retries() {
        let (camera, _) = session(Behaviour::Deny);
        let err = camera.start().await.unwrap_err();
        assert!(err.needs_permission());
        assert_eq!(camera.state(), CameraState::Error);
        assert!(camera.last_error().is_some());
        assert_eq!(camera.permission().await, PermissionState::Denied);

        // Error -> Starting -> Error on retry
        assert!(camera.start().await.is_err());
        assert_eq!(camera.state(), CameraState::Error);

        camera.stop();
        assert_eq!(camera.state(), CameraState::Idle);
    }

    #[tokio::test]
    async fn test_falls_back_to_basic_constraints() {
        let (camera, counters) = session(Behaviour::RejectPreferred);
        camera.start().await.unwrap();
        assert!(camera.is_active());
        assert_eq!(counters.opened.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_timeout() {
        let (camera, _) = session(Behaviour::Hang);
        let err = camera.start().await.unwrap_err();
        assert_eq!(err.unavailable_reason(), Some(UnavailableReason::Timeout));
        assert_eq!(camera.state(), CameraState::Error);
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_start_allows_retry() {
        let (camera, counters) = session(Behaviour::Hang);
        let abandoned = tokio::time::timeout(Duration::from_millis(100), camera.start()).await;
        assert!(abandoned.is_err());
        assert_eq!(camera.state(), CameraState::Error);
        assert!(camera.last_error().is_some());

        // A fresh start runs instead of reporting AlreadyStarted
        let err = camera.start().await.unwrap_err();
        assert_eq!(err.unavailable_reason(), Some(UnavailableReason::Timeout));
        assert_eq!(counters.opened.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_frame_read_leaves_session_unlocked() {
        let (camera, counters, entered, release) = gated_session();
        camera.start().await.unwrap();

        let reader = tokio::spawn({
            let camera = camera.clone();
            async move { camera.capture_frame().await }
        });
        tokio::task::spawn_blocking(move || entered.recv()).await.unwrap().unwrap();

        // The read is parked inside the device; the session still answers
        assert_eq!(camera.state(), CameraState::Active);
        camera.stop();
        assert_eq!(camera.state(), CameraState::Idle);

        release.send(()).unwrap();
        assert!(reader.await.unwrap().is_none());
        assert_eq!(counters.released.load(Ordering::SeqCst), 1);
        assert_eq!(camera.frame_dimensions(), None);
    }

    #[tokio::test]
    async fn test_drop_releases_device() {
        let (camera, counters) = session(Behaviour::Ok);
        camera.start().await.unwrap();
        drop(camera);
        assert_eq!(counters.released.load(Ordering::SeqCst), 1);
    }
}
