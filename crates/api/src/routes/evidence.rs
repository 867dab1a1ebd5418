//! Evidence capture and violation submission

use axum::{
    extract::{Query, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use vehicle_registry::{SubmissionReceipt, ViolationReport};

use crate::error::ApiError;
use crate::AppState;

/// Violation details to file together with the captured still
#[derive(Debug, Deserialize)]
pub struct ViolationDetails {
    pub violation_type: String,
    pub severity: Option<String>,
    pub location: Option<String>,
    pub description: Option<String>,
    pub fine_amount: Option<f64>,
    pub officer_notes: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct EvidenceRequest {
    pub plate_text: Option<String>,
    pub violation: Option<ViolationDetails>,
}

#[derive(Debug, Deserialize)]
pub struct EvidenceQuery {
    /// `jpeg` returns the image itself
    pub format: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct EvidenceResponse {
    pub id: String,
    pub reference: String,
    pub captured_at: DateTime<Utc>,
    pub plate_text: Option<String>,
    pub width: u32,
    pub height: u32,
    pub jpeg_bytes: usize,
    pub submission: Option<SubmissionReceipt>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub submission_error: Option<String>,
}

/// Capture a still, optionally filing a violation against it.
///
/// A failed submission still answers with the evidence body, using the
/// status the submission error maps to.
pub async fn capture(
    State(state): State<Arc<AppState>>,
    Query(query): Query<EvidenceQuery>,
    body: Option<Json<EvidenceRequest>>,
) -> Result<Response, ApiError> {
    let request = body.map(|Json(request)| request).unwrap_or_default();

    let (evidence, submitted) = match (request.violation, request.plate_text) {
        (Some(details), Some(plate)) => {
            let report = ViolationReport {
                plate_number: plate,
                violation_type: details.violation_type,
                severity: details.severity,
                location: details.location,
                description: details.description,
                fine_amount: details.fine_amount,
                evidence_refs: Vec::new(),
                officer_notes: details.officer_notes,
            };
            let (evidence, submitted) = state.scanner.capture_violation(report).await?;
            (evidence, Some(submitted))
        }
        (Some(_), None) => return Err(ApiError::BadRequest("a violation report needs plate_text".into())),
        (None, plate) => (state.scanner.capture_evidence(plate).await?, None),
    };
    let jpeg = evidence.encode_jpeg()?;

    let (status, submission, submission_error) = match submitted {
        Some(Ok(receipt)) => (StatusCode::OK, Some(receipt), None),
        Some(Err(e)) => {
            let error = ApiError::from(e);
            (error.status(), None, Some(error.to_string()))
        }
        None => (StatusCode::OK, None, None),
    };

    if query.format.as_deref() == Some("jpeg") && submission_error.is_none() {
        let mut response = ([(header::CONTENT_TYPE, "image/jpeg")], jpeg).into_response();
        if let Ok(id) = HeaderValue::from_str(&evidence.id.to_string()) {
            response.headers_mut().insert("x-evidence-id", id);
        }
        return Ok(response);
    }

    let body = EvidenceResponse {
        id: evidence.id.to_string(),
        reference: evidence.reference(),
        captured_at: evidence.captured_at,
        plate_text: evidence.plate_text.clone(),
        width: evidence.frame.width,
        height: evidence.frame.height,
        jpeg_bytes: jpeg.len(),
        submission,
        submission_error,
    };
    Ok((status, Json(body)).into_response())
}
