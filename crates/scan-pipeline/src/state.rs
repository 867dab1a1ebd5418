//! Scanner state machine: camera state × loop state

use camera_capture::{CameraEvent, CameraState};
use serde::{Deserialize, Serialize};

/// Whether the detection loop is ticking
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopState {
    #[default]
    Disarmed,
    Armed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScannerEvent {
    Camera(CameraEvent),
    Arm,
    Disarm,
}

/// Combined scanner state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ScannerState {
    pub camera: CameraState,
    pub detection: LoopState,
}

impl ScannerState {
    pub fn new(camera: CameraState, detection: LoopState) -> Self {
        Self { camera, detection }
    }

    /// Next state, or `None` if `event` is invalid here.
    ///
    /// The loop can only be armed on an active camera, and any camera
    /// transition away from Active disarms it.
    pub fn transition(self, event: ScannerEvent) -> Option<ScannerState> {
        match event {
            ScannerEvent::Arm => self
                .camera
                .is_active()
                .then_some(ScannerState::new(self.camera, LoopState::Armed)),
            ScannerEvent::Disarm => Some(ScannerState::new(self.camera, LoopState::Disarmed)),
            ScannerEvent::Camera(camera_event) => {
                let camera = self.camera.transition(camera_event)?;
                let detection = if camera.is_active() {
                    self.detection
                } else {
                    LoopState::Disarmed
                };
                Some(ScannerState::new(camera, detection))
            }
        }
    }

    pub fn is_scanning(&self) -> bool {
        self.camera.is_active() && self.detection == LoopState::Armed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arm_requires_active_camera() {
        let idle = ScannerState::default();
        assert_eq!(idle.transition(ScannerEvent::Arm), None);

        let active = ScannerState::new(CameraState::Active, LoopState::Disarmed);
        let armed = active.transition(ScannerEvent::Arm).unwrap();
        assert!(armed.is_scanning());
    }

    #[test]
    fn test_camera_stop_disarms() {
        let armed = ScannerState::new(CameraState::Active, LoopState::Armed);
        let stopped = armed
            .transition(ScannerEvent::Camera(CameraEvent::StopRequested))
            .unwrap();
        assert_eq!(stopped, ScannerState::new(CameraState::Idle, LoopState::Disarmed));
    }

    #[test]
    fn test_full_session() {
        let state = ScannerState::default()
            .transition(ScannerEvent::Camera(CameraEvent::StartRequested))
            .and_then(|s| s.transition(ScannerEvent::Camera(CameraEvent::StartSucceeded)))
            .and_then(|s| s.transition(ScannerEvent::Arm))
            .unwrap();
        assert!(state.is_scanning());

        let paused = state.transition(ScannerEvent::Disarm).unwrap();
        assert_eq!(paused.camera, CameraState::Active);
        assert!(!paused.is_scanning());
    }

    #[test]
    fn test_failed_start_stays_disarmed() {
        let state = ScannerState::default()
            .transition(ScannerEvent::Camera(CameraEvent::StartRequested))
            .and_then(|s| s.transition(ScannerEvent::Camera(CameraEvent::StartFailed)))
            .unwrap();
        assert_eq!(state.camera, CameraState::Error);
        assert_eq!(state.transition(ScannerEvent::Arm), None);
    }
}
