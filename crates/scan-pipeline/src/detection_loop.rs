//! Periodic detection loop
//!
//! `arm()` starts a ticker; every tick tries to take the pipeline lock and,
//! if it is free, runs one attempt in its own task while holding the lock.
//! A busy lock means the previous attempt is still running and the tick is
//! dropped. Each arm/disarm bumps an epoch; an attempt only commits its
//! result if the epoch it started under is still the armed one.

use camera_capture::{CameraEvent, CameraSession, CameraState};
use chrono::{DateTime, Utc};
use plate_detector::{ChainError, DetectorChain, Tier};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::attempt::{AttemptLog, AttemptOutcome, AttemptSummary, DetectionAttempt};
use crate::config::ScannerConfig;
use crate::gate::{DetectionResult, GateDecision, ResultGate};
use crate::lookup::{LookupCoordinator, PlateLookupRecord};
use crate::metrics;
use crate::state::{LoopState, ScannerEvent, ScannerState};
use crate::ScanError;

/// Work that must never run concurrently with itself
struct Pipeline {
    chain: DetectorChain,
    gate: ResultGate,
    lookup: LookupCoordinator,
}

struct LoopSettings {
    interval: Duration,
    stop_on_accept: bool,
    scan_timeout: Option<Duration>,
}

struct LoopStatus {
    epoch: u64,
    detection: LoopState,
    ticker: Option<JoinHandle<()>>,
    armed_at: Option<Instant>,
    last_accept_at: Option<Instant>,
    attempt_count: u64,
    skipped_ticks: u64,
    last_success: Option<DateTime<Utc>>,
    active_tier: Option<Tier>,
    last_result: Option<DetectionResult>,
    last_lookup: Option<PlateLookupRecord>,
    last_error: Option<String>,
    log: AttemptLog,
}

impl LoopStatus {
    fn armed(&self) -> bool {
        self.detection == LoopState::Armed
    }

    /// Move the loop through `event`; false when the event is invalid here
    fn apply(&mut self, camera: CameraState, event: ScannerEvent) -> bool {
        match ScannerState::new(camera, self.detection).transition(event) {
            Some(next) => {
                self.detection = next.detection;
                true
            }
            None => false,
        }
    }
}

/// Observability view of the loop
#[derive(Debug, Clone, Default, Serialize)]
pub struct LoopSnapshot {
    pub armed: bool,
    pub attempt_count: u64,
    pub skipped_ticks: u64,
    /// Wall-clock time of the latest accepted plate; never moves backwards
    pub last_success: Option<DateTime<Utc>>,
    pub active_tier: Option<Tier>,
    pub last_result: Option<DetectionResult>,
    pub last_lookup: Option<PlateLookupRecord>,
    pub last_error: Option<String>,
}

struct Shared {
    camera: Arc<CameraSession>,
    pipeline: Arc<AsyncMutex<Pipeline>>,
    status: Mutex<LoopStatus>,
    settings: LoopSettings,
}

impl Shared {
    fn status(&self) -> MutexGuard<'_, LoopStatus> {
        self.status.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn is_current(&self, epoch: u64) -> bool {
        let status = self.status();
        status.armed() && status.epoch == epoch
    }

    fn scan_timed_out(&self) -> bool {
        let Some(timeout) = self.settings.scan_timeout else {
            return false;
        };
        let status = self.status();
        status
            .last_accept_at
            .or(status.armed_at)
            .map(|since| since.elapsed() >= timeout)
            .unwrap_or(false)
    }

    /// Disarm unless a newer arm/disarm already happened
    fn disarm_if_current(&self, epoch: u64, error: Option<String>) -> bool {
        let camera = self.camera.state();
        let ticker = {
            let mut status = self.status();
            if !status.armed() || status.epoch != epoch {
                return false;
            }
            status.epoch += 1;
            status.apply(camera, ScannerEvent::Disarm);
            if error.is_some() {
                status.last_error = error;
            }
            status.ticker.take()
        };

        if let Some(ticker) = ticker {
            ticker.abort();
        }
        metrics::set_armed(false);
        info!("Detection loop disarmed");
        true
    }
}

/// Cancellable scanning scheduler over one camera session and detector chain
pub struct DetectionLoop {
    shared: Arc<Shared>,
}

impl DetectionLoop {
    pub fn new(
        camera: Arc<CameraSession>,
        chain: DetectorChain,
        lookup: LookupCoordinator,
        config: &ScannerConfig,
    ) -> Self {
        let pipeline = Pipeline {
            chain,
            gate: ResultGate::from_config(config),
            lookup,
        };
        let status = LoopStatus {
            epoch: 0,
            detection: LoopState::Disarmed,
            ticker: None,
            armed_at: None,
            last_accept_at: None,
            attempt_count: 0,
            skipped_ticks: 0,
            last_success: None,
            active_tier: None,
            last_result: None,
            last_lookup: None,
            last_error: None,
            log: AttemptLog::new(config.attempt_history),
        };

        Self {
            shared: Arc::new(Shared {
                camera,
                pipeline: Arc::new(AsyncMutex::new(pipeline)),
                status: Mutex::new(status),
                settings: LoopSettings {
                    interval: config.tick_interval(),
                    stop_on_accept: config.stop_on_accept,
                    scan_timeout: config.scan_timeout(),
                },
            }),
        }
    }

    pub fn camera(&self) -> &Arc<CameraSession> {
        &self.shared.camera
    }

    pub fn scanner_state(&self) -> ScannerState {
        let detection = self.shared.status().detection;
        ScannerState::new(self.shared.camera.state(), detection)
    }

    pub fn is_armed(&self) -> bool {
        self.shared.status().armed()
    }

    /// Start ticking. The first tick fires one interval after arming.
    ///
    /// Fails with `CameraNotActive` unless the camera is streaming, and with
    /// `AllDetectorsUnavailable` when no detector tier can be initialized.
    pub async fn arm(&self) -> Result<(), ScanError> {
        let current = self.scanner_state();
        if current.transition(ScannerEvent::Arm).is_none() {
            return Err(ScanError::CameraNotActive);
        }
        if current.detection == LoopState::Armed {
            return Ok(());
        }

        let active = {
            let mut pipeline = self.shared.pipeline.lock().await;
            let tier = pipeline.chain.get_active().await.map(|detector| detector.tier());
            tier
        };
        let tier = match active {
            Ok(tier) => tier,
            Err(e) => {
                error!(error = %e, "Cannot arm detection loop");
                self.shared.status().last_error = Some(e.to_string());
                return Err(e.into());
            }
        };

        let camera = self.shared.camera.state();
        let epoch = {
            let mut status = self.shared.status();
            if status.armed() {
                return Ok(());
            }
            if !status.apply(camera, ScannerEvent::Arm) {
                return Err(ScanError::CameraNotActive);
            }
            status.epoch += 1;
            status.armed_at = Some(Instant::now());
            status.last_accept_at = None;
            status.last_error = None;
            status.active_tier = Some(tier);
            status.epoch
        };

        let ticker = tokio::spawn(run_ticker(self.shared.clone(), epoch));
        {
            let mut status = self.shared.status();
            if status.epoch == epoch {
                status.ticker = Some(ticker);
            } else {
                ticker.abort();
            }
        }

        metrics::set_armed(true);
        info!(tier = %tier, interval_ms = self.shared.settings.interval.as_millis() as u64, "Detection loop armed");
        Ok(())
    }

    /// Stop ticking. No tick fires afterwards and an attempt still in flight
    /// is discarded when it resolves. The camera is left running.
    pub fn disarm(&self) {
        let camera = self.shared.camera.state();
        let (ticker, was_armed) = {
            let mut status = self.shared.status();
            let was_armed = status.armed();
            status.epoch += 1;
            status.apply(camera, ScannerEvent::Disarm);
            (status.ticker.take(), was_armed)
        };

        if let Some(ticker) = ticker {
            ticker.abort();
        }
        if was_armed {
            metrics::set_armed(false);
            info!("Detection loop disarmed");
        }
    }

    /// Feed a camera transition to the loop. Leaving Active disarms it.
    pub fn on_camera_event(&self, event: CameraEvent) {
        let current = self.scanner_state();
        let Some(next) = current.transition(ScannerEvent::Camera(event)) else {
            return;
        };
        if current.detection == LoopState::Armed && next.detection == LoopState::Disarmed {
            self.disarm();
        }
    }

    /// Disarm and release every detector.
    ///
    /// Never waits on a running `detect()`: when an attempt still holds the
    /// pipeline, the chain is cleaned up once that attempt lets go.
    pub fn shutdown(&self) {
        self.disarm();
        match self.shared.pipeline.clone().try_lock_owned() {
            Ok(mut pipeline) => pipeline.chain.cleanup(),
            Err(_) => {
                debug!("Attempt in flight, detector cleanup deferred");
                let pipeline = self.shared.pipeline.clone();
                tokio::spawn(async move {
                    pipeline.lock_owned().await.chain.cleanup();
                });
            }
        }
    }

    pub fn snapshot(&self) -> LoopSnapshot {
        let status = self.shared.status();
        LoopSnapshot {
            armed: status.armed(),
            attempt_count: status.attempt_count,
            skipped_ticks: status.skipped_ticks,
            last_success: status.last_success,
            active_tier: status.active_tier,
            last_result: status.last_result.clone(),
            last_lookup: status.last_lookup.clone(),
            last_error: status.last_error.clone(),
        }
    }

    /// Retained attempts (oldest first) and their summary
    pub fn attempts(&self) -> (Vec<DetectionAttempt>, AttemptSummary) {
        let status = self.shared.status();
        (status.log.recent(), status.log.summary())
    }
}

impl Drop for DetectionLoop {
    fn drop(&mut self) {
        self.disarm();
    }
}

async fn run_ticker(shared: Arc<Shared>, epoch: u64) {
    let period = shared.settings.interval;
    let mut ticks = interval_at(Instant::now() + period, period);
    ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticks.tick().await;
        if !shared.is_current(epoch) {
            break;
        }
        if shared.scan_timed_out() {
            info!("No plate accepted before scan timeout");
            shared.disarm_if_current(epoch, None);
            break;
        }

        match shared.pipeline.clone().try_lock_owned() {
            Ok(pipeline) => {
                tokio::spawn(run_attempt(shared.clone(), pipeline, epoch));
            }
            Err(_) => {
                shared.status().skipped_ticks += 1;
                metrics::record_skipped_tick();
                debug!("Previous attempt still in flight, tick skipped");
            }
        }
    }
}

async fn run_attempt(shared: Arc<Shared>, mut pipeline: OwnedMutexGuard<Pipeline>, epoch: u64) {
    let started = Instant::now();

    let Some(frame) = shared.camera.capture_frame().await else {
        if shared.camera.is_active() {
            debug!("No frame available this tick");
        } else {
            warn!("Camera no longer active");
            shared.disarm_if_current(epoch, Some(ScanError::CameraNotActive.to_string()));
        }
        return;
    };

    let Pipeline { chain, gate, lookup } = &mut *pipeline;
    let detector = match chain.get_active().await {
        Ok(detector) => detector,
        Err(e) => {
            error!(error = %e, "No detector available");
            shared.disarm_if_current(epoch, Some(e.to_string()));
            return;
        }
    };
    let tier = detector.tier();
    let detected = detector.detect(&frame).await;
    let latency_ms = started.elapsed().as_millis() as u64;

    let (outcome, raw, accepted, failure) = match detected {
        Ok(raw) => {
            chain.report_success(tier);
            let decision = gate.accept(raw.as_ref(), tier);
            let outcome = decision.outcome();
            let accepted = match decision {
                GateDecision::Accepted(result) => Some(result),
                _ => None,
            };
            (outcome, raw, accepted, None)
        }
        Err(e) => {
            warn!(tier = %tier, error = %e, "Detection failed");
            chain.report_runtime_failure(tier);
            (AttemptOutcome::DetectorFailed, None, None, Some(e.to_string()))
        }
    };
    let exhausted = chain.is_exhausted();
    let active_tier = chain.active_tier();

    if !shared.is_current(epoch) {
        debug!(tier = %tier, "Loop disarmed during detection, result discarded");
        return;
    }

    let lookup_record = match &accepted {
        Some(result) => Some(lookup.resolve(&result.plate_text).await),
        None => None,
    };

    let stop_after = {
        let mut status = shared.status();
        if !status.armed() || status.epoch != epoch {
            debug!(tier = %tier, "Loop disarmed during lookup, result discarded");
            return;
        }

        status.attempt_count += 1;
        let attempt = DetectionAttempt {
            sequence: status.attempt_count,
            timestamp: Utc::now(),
            tier,
            plate_text: raw.as_ref().map(|r| r.plate_text.clone()),
            detection_confidence: raw.as_ref().map(|r| r.detection_confidence),
            text_confidence: raw.as_ref().map(|r| r.text_confidence),
            latency_ms,
            outcome,
            error: failure,
        };
        status.log.push(attempt);
        status.active_tier = active_tier;

        if let Some(result) = accepted {
            let now = Utc::now();
            status.last_success = Some(status.last_success.map_or(now, |prev| prev.max(now)));
            status.last_accept_at = Some(Instant::now());
            info!(
                plate = %result.plate_text,
                tier = %tier,
                detection_confidence = result.detection_confidence,
                text_confidence = result.text_confidence,
                "Plate accepted"
            );
            status.last_result = Some(result);
            status.last_lookup = lookup_record;
        } else {
            debug!(tier = %tier, outcome = ?outcome, latency_ms, "Attempt complete");
        }

        outcome == AttemptOutcome::Accepted && shared.settings.stop_on_accept
    };
    metrics::record_attempt(tier, outcome, latency_ms);

    if exhausted {
        error!("Every detector tier has failed");
        shared.disarm_if_current(epoch, Some(ChainError::AllDetectorsUnavailable.to_string()));
    } else if stop_after {
        shared.disarm_if_current(epoch, None);
    }
}
