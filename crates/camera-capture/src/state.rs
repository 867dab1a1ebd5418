//! Camera session state machine

use serde::{Deserialize, Serialize};

/// Camera session state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CameraState {
    #[default]
    Idle,
    Starting,
    Active,
    Error,
}

/// Inputs driving the camera state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraEvent {
    StartRequested,
    StartSucceeded,
    StartFailed,
    StopRequested,
}

impl CameraState {
    /// Next state for `event`, or `None` when the event is not valid here.
    ///
    /// Stop is accepted from every state and always lands in `Idle`.
    pub fn transition(self, event: CameraEvent) -> Option<CameraState> {
        use CameraEvent::*;
        use CameraState::*;

        match (self, event) {
            (_, StopRequested) => Some(Idle),
            (Idle | Error, StartRequested) => Some(Starting),
            (Starting, StartSucceeded) => Some(Active),
            (Starting, StartFailed) => Some(Error),
            _ => None,
        }
    }

    /// Whether frames can be read
    pub fn is_active(self) -> bool {
        self == CameraState::Active
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use CameraEvent::*;
    use CameraState::*;

    #[test]
    fn test_happy_path() {
        let state = Idle.transition(StartRequested).unwrap();
        assert_eq!(state, Starting);
        let state = state.transition(StartSucceeded).unwrap();
        assert!(state.is_active());
        assert_eq!(state.transition(StopRequested), Some(Idle));
    }

    #[test]
    fn test_retry_from_error() {
        let failed = Starting.transition(StartFailed).unwrap();
        assert_eq!(failed, Error);
        assert_eq!(failed.transition(StartRequested), Some(Starting));
        assert_eq!(failed.transition(StopRequested), Some(Idle));
    }

    #[test]
    fn test_double_start_rejected() {
        assert_eq!(Active.transition(StartRequested), None);
        assert_eq!(Starting.transition(StartRequested), None);
        assert_eq!(Idle.transition(StartSucceeded), None);
    }
}
