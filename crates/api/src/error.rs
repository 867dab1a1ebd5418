//! HTTP error mapping

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use scan_pipeline::ScanError;
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Scan(#[from] ScanError),

    #[error("{0}")]
    BadRequest(String),
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<String>,
    needs_permission: bool,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        self.parts().0
    }

    fn parts(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            ApiError::Scan(e) => match e {
                ScanError::Camera(_) => (StatusCode::SERVICE_UNAVAILABLE, "camera_unavailable"),
                ScanError::CameraNotActive | ScanError::NoActiveCamera => (StatusCode::CONFLICT, "camera_not_active"),
                ScanError::Detectors(_) => (StatusCode::SERVICE_UNAVAILABLE, "detectors_unavailable"),
                ScanError::InvalidPlate(_) => (StatusCode::BAD_REQUEST, "invalid_plate"),
                ScanError::Evidence(_) => (StatusCode::INTERNAL_SERVER_ERROR, "evidence_failed"),
                ScanError::SubmissionUnavailable => (StatusCode::SERVICE_UNAVAILABLE, "submission_unavailable"),
                ScanError::Submission(_) => (StatusCode::BAD_GATEWAY, "submission_failed"),
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.parts();
        let (reason, needs_permission) = match &self {
            ApiError::Scan(ScanError::Camera(e)) => (e.unavailable_reason().map(|r| r.to_string()), e.needs_permission()),
            _ => (None, false),
        };

        if status.is_server_error() {
            tracing::warn!(status = status.as_u16(), error = %self, "Request failed");
        }

        let body = ErrorBody {
            error: code,
            message: self.to_string(),
            reason,
            needs_permission,
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camera_capture::{CameraError, UnavailableReason};
    use plate_detector::ChainError;

    #[test]
    fn test_status_codes() {
        let camera = ApiError::from(ScanError::Camera(CameraError::unavailable(
            UnavailableReason::PermissionDenied,
            "denied",
        )));
        assert_eq!(camera.parts().0, StatusCode::SERVICE_UNAVAILABLE);

        let exhausted = ApiError::from(ScanError::Detectors(ChainError::AllDetectorsUnavailable));
        assert_eq!(exhausted.parts(), (StatusCode::SERVICE_UNAVAILABLE, "detectors_unavailable"));

        let conflict = ApiError::from(ScanError::NoActiveCamera);
        assert_eq!(conflict.parts().0, StatusCode::CONFLICT);
    }
}
