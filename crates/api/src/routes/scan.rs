//! Scan lifecycle and observability routes

use axum::{
    extract::{Query, State},
    Json,
};
use camera_capture::PermissionState;
use plate_detector::NormalizedBox;
use scan_pipeline::{AttemptSummary, DetectionAttempt, ScanStatus};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::ApiError;
use crate::AppState;

/// Scanner state plus what the UI needs to draw and prompt
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    #[serde(flatten)]
    pub status: ScanStatus,
    pub permission: PermissionState,
    /// Last accepted plate as frame fractions; absent until the frame size is known
    pub overlay: Option<NormalizedBox>,
}

async fn status_response(state: &AppState) -> StatusResponse {
    let status = state.scanner.status().await;
    let overlay = match (&status.detection.last_result, status.frame_dimensions) {
        (Some(result), Some((width, height))) => result.bounding_box.normalized(width, height),
        _ => None,
    };

    StatusResponse {
        permission: state.scanner.permission().await,
        overlay,
        status,
    }
}

pub async fn start(State(state): State<Arc<AppState>>) -> Result<Json<StatusResponse>, ApiError> {
    state.scanner.start_scan().await?;
    Ok(Json(status_response(&state).await))
}

pub async fn stop(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    state.scanner.stop_scan().await;
    Json(status_response(&state).await)
}

pub async fn pause(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    state.scanner.pause_scan().await;
    Json(status_response(&state).await)
}

pub async fn status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    Json(status_response(&state).await)
}

#[derive(Debug, Serialize)]
pub struct PermissionResponse {
    pub permission: PermissionState,
}

/// Ask the platform for camera access again after a denial
pub async fn request_permission(State(state): State<Arc<AppState>>) -> Json<PermissionResponse> {
    Json(PermissionResponse {
        permission: state.scanner.request_permission().await,
    })
}

/// Query parameters for the attempts endpoint
#[derive(Debug, Deserialize)]
pub struct AttemptsQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct AttemptsResponse {
    pub data: Vec<DetectionAttempt>,
    pub count: usize,
    pub summary: AttemptSummary,
}

/// Most recent attempts, newest first
pub async fn attempts(
    State(state): State<Arc<AppState>>,
    Query(params): Query<AttemptsQuery>,
) -> Json<AttemptsResponse> {
    let (recent, summary) = state.scanner.attempts().await;
    let limit = params.limit.unwrap_or(recent.len());
    let data: Vec<DetectionAttempt> = recent.into_iter().rev().take(limit).collect();

    Json(AttemptsResponse {
        count: data.len(),
        data,
        summary,
    })
}
