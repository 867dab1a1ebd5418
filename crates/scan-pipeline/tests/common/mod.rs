//! Shared fixtures for scanning tests
#![allow(dead_code)]

use async_trait::async_trait;
use camera_capture::{
    CameraConfig, CameraError, CaptureConstraints, CaptureDevice, DeviceHandle, PermissionState,
    UnavailableReason, VideoFrame,
};
use plate_detector::{BoundingBox, Detector, DetectorError, RawDetection, Tier};
use scan_pipeline::{DetectorFactory, Scanner, ScannerConfig};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use vehicle_registry::{InMemoryRegistry, RegistryError, SubmissionReceipt, ViolationReport, ViolationSubmitter};

#[derive(Default)]
pub struct DeviceCounters {
    pub opened: AtomicUsize,
    pub released: AtomicUsize,
}

impl DeviceCounters {
    pub fn held(&self) -> usize {
        self.opened.load(Ordering::SeqCst) - self.released.load(Ordering::SeqCst)
    }
}

/// Camera that streams a flat grey frame
pub struct MockCamera {
    pub deny: bool,
    pub counters: Arc<DeviceCounters>,
}

impl MockCamera {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            deny: false,
            counters: Arc::new(DeviceCounters::default()),
        })
    }

    pub fn denied() -> Arc<Self> {
        Arc::new(Self {
            deny: true,
            counters: Arc::new(DeviceCounters::default()),
        })
    }
}

struct MockHandle {
    counters: Arc<DeviceCounters>,
    sequence: u32,
}

impl DeviceHandle for MockHandle {
    fn read_frame(&mut self) -> Result<VideoFrame, CameraError> {
        self.sequence += 1;
        let mut frame = VideoFrame::filled(640, 480, [40, 40, 40]);
        frame.sequence = self.sequence;
        Ok(frame)
    }
}

impl Drop for MockHandle {
    fn drop(&mut self) {
        self.counters.released.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl CaptureDevice for MockCamera {
    fn name(&self) -> &str {
        "mock-camera"
    }

    async fn permission(&self) -> PermissionState {
        if self.deny {
            PermissionState::Denied
        } else {
            PermissionState::Granted
        }
    }

    async fn request_permission(&self) -> PermissionState {
        self.permission().await
    }

    async fn open(&self, _constraints: &CaptureConstraints) -> Result<Box<dyn DeviceHandle>, CameraError> {
        if self.deny {
            return Err(CameraError::unavailable(UnavailableReason::PermissionDenied, "user denied access"));
        }
        self.counters.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockHandle {
            counters: self.counters.clone(),
            sequence: 0,
        }))
    }
}

/// What a scripted tier does on each `detect()`
#[derive(Clone)]
pub enum Behaviour {
    Plate(RawDetection),
    Nothing,
    Fail,
}

#[derive(Default)]
pub struct TierCounters {
    pub inits: AtomicUsize,
    pub calls: AtomicUsize,
    pub in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    pub cleanups: AtomicUsize,
}

impl TierCounters {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

pub struct ScriptedTier {
    tier: Tier,
    init_ok: bool,
    behaviour: Behaviour,
    delay: Duration,
    counters: Arc<TierCounters>,
}

#[async_trait]
impl Detector for ScriptedTier {
    fn tier(&self) -> Tier {
        self.tier
    }

    async fn initialize(&mut self) -> Result<(), DetectorError> {
        self.counters.inits.fetch_add(1, Ordering::SeqCst);
        if self.init_ok {
            Ok(())
        } else {
            Err(DetectorError::ModelLoad("model unavailable".into()))
        }
    }

    async fn detect(&self, _frame: &VideoFrame) -> Result<Option<RawDetection>, DetectorError> {
        self.counters.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.counters.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.counters.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.counters.in_flight.fetch_sub(1, Ordering::SeqCst);

        match &self.behaviour {
            Behaviour::Plate(raw) => Ok(Some(raw.clone())),
            Behaviour::Nothing => Ok(None),
            Behaviour::Fail => Err(DetectorError::Inference("runtime crashed".into())),
        }
    }

    fn cleanup(&mut self) {
        self.counters.cleanups.fetch_add(1, Ordering::SeqCst);
    }
}

/// Recipe for one tier; every session gets a fresh instance sharing the counters
#[derive(Clone)]
pub struct TierSpec {
    pub tier: Tier,
    pub init_ok: bool,
    pub behaviour: Behaviour,
    pub delay: Duration,
    pub counters: Arc<TierCounters>,
}

impl TierSpec {
    pub fn new(tier: Tier, behaviour: Behaviour) -> Self {
        Self {
            tier,
            init_ok: true,
            behaviour,
            delay: Duration::ZERO,
            counters: Arc::new(TierCounters::default()),
        }
    }

    pub fn failing_init(tier: Tier) -> Self {
        Self {
            init_ok: false,
            ..Self::new(tier, Behaviour::Nothing)
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

pub struct ScriptedFactory {
    pub specs: Vec<TierSpec>,
}

impl DetectorFactory for ScriptedFactory {
    fn build(&self) -> Vec<Box<dyn Detector>> {
        self.specs
            .iter()
            .map(|spec| {
                Box::new(ScriptedTier {
                    tier: spec.tier,
                    init_ok: spec.init_ok,
                    behaviour: spec.behaviour.clone(),
                    delay: spec.delay,
                    counters: spec.counters.clone(),
                }) as Box<dyn Detector>
            })
            .collect()
    }
}

pub fn plate(text: &str, detection: f32, text_confidence: f32) -> RawDetection {
    RawDetection {
        plate_text: text.to_string(),
        detection_confidence: detection,
        text_confidence,
        bounding_box: BoundingBox::new(200.0, 300.0, 160.0, 40.0),
    }
}

pub fn registry() -> Arc<InMemoryRegistry> {
    let registry = InMemoryRegistry::new();
    registry.insert("AS-1234-22", "Kwame Mensah", "2019 Toyota Corolla", 2);
    registry.insert("GR-5519", "Abena Ofori", "2021 Kia Rio", 0);
    Arc::new(registry)
}

/// Submitter whose backend always answers 503
pub struct RejectingSubmitter;

#[async_trait]
impl ViolationSubmitter for RejectingSubmitter {
    async fn submit_violation(&self, _report: &ViolationReport) -> Result<SubmissionReceipt, RegistryError> {
        Err(RegistryError::Http {
            status: 503,
            body: "maintenance".into(),
        })
    }
}

pub fn scanner(camera: Arc<MockCamera>, specs: Vec<TierSpec>, config: ScannerConfig) -> Scanner {
    Scanner::new(
        camera,
        CameraConfig::default(),
        config,
        Arc::new(ScriptedFactory { specs }),
        registry(),
    )
}
