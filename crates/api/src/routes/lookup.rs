//! Manual plate lookup

use axum::{extract::State, Json};
use scan_pipeline::PlateLookupRecord;
use serde::Deserialize;
use std::sync::Arc;

use crate::error::ApiError;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct LookupRequest {
    pub plate: String,
}

pub async fn lookup(
    State(state): State<Arc<AppState>>,
    Json(request): Json<LookupRequest>,
) -> Result<Json<PlateLookupRecord>, ApiError> {
    let record = state.scanner.manual_lookup(&request.plate).await?;
    Ok(Json(record))
}
