//! REST registry client

use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use crate::{
    describe_vehicle, RegistryError, SubmissionReceipt, VehicleLookup, VehicleRegistry, ViolationReport,
    ViolationSubmitter,
};

/// Violation statuses that still count against a vehicle
const OUTSTANDING_STATUSES: [&str; 2] = ["pending", "approved"];

/// Registry connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    pub base_url: String,
    pub timeout_ms: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            timeout_ms: 5000,
        }
    }
}

#[derive(Debug, Deserialize)]
struct VehicleRecord {
    owner_name: Option<String>,
    make: Option<String>,
    manufacturer: Option<String>,
    model: Option<String>,
    year: Option<u32>,
    year_of_manufacture: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ViolationRecord {
    #[serde(default)]
    status: Option<String>,
}

#[derive(Debug, Serialize)]
struct NewViolation<'a> {
    #[serde(flatten)]
    report: &'a ViolationReport,
    status: &'static str,
}

#[derive(Debug, Deserialize)]
struct CreatedViolation {
    id: serde_json::Value,
    #[serde(default)]
    status: Option<String>,
}

/// Registry client over the REST backend
pub struct HttpRegistryClient {
    http: Client,
    base_url: Url,
}

impl HttpRegistryClient {
    pub fn new(config: &RegistryConfig) -> Result<Self, RegistryError> {
        let base_url = Url::parse(&config.base_url)
            .map_err(|e| RegistryError::Unreachable(format!("invalid base url {}: {}", config.base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(RegistryError::Unreachable(format!("invalid base url {}", config.base_url)));
        }

        let http = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| RegistryError::Unreachable(e.to_string()))?;

        Ok(Self { http, base_url })
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn count_outstanding(&self, plate: &str) -> Result<u32, RegistryError> {
        let url = self.endpoint(&["violations"]);
        let response = self
            .http
            .get(url)
            .query(&[("plate_number", plate)])
            .send()
            .await
            .map_err(map_transport)?;
        let violations: Vec<ViolationRecord> = decode(response).await?;

        let outstanding = violations
            .iter()
            .filter(|v| {
                v.status
                    .as_deref()
                    .map(|s| OUTSTANDING_STATUSES.contains(&s.to_ascii_lowercase().as_str()))
                    .unwrap_or(false)
            })
            .count();
        Ok(outstanding as u32)
    }
}

fn map_transport(e: reqwest::Error) -> RegistryError {
    if e.is_timeout() {
        RegistryError::Timeout
    } else {
        RegistryError::Unreachable(e.to_string())
    }
}

async fn decode<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> Result<T, RegistryError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(RegistryError::Http {
            status: status.as_u16(),
            body,
        });
    }
    response
        .json()
        .await
        .map_err(|e| RegistryError::Decode(e.to_string()))
}

#[async_trait]
impl VehicleRegistry for HttpRegistryClient {
    async fn lookup_vehicle_by_plate(&self, plate: &str) -> Result<VehicleLookup, RegistryError> {
        let url = self.endpoint(&["vehicles", plate]);
        debug!("Looking up plate {} at {}", plate, url);

        let response = self.http.get(url).send().await.map_err(map_transport)?;
        if response.status() == StatusCode::NOT_FOUND {
            debug!("Plate {} not registered", plate);
            return Ok(VehicleLookup::not_found());
        }
        let vehicle: VehicleRecord = decode(response).await?;

        let outstanding_violations = self.count_outstanding(plate).await?;
        let make = vehicle.make.or(vehicle.manufacturer);
        Ok(VehicleLookup {
            found: true,
            owner: vehicle.owner_name,
            description: describe_vehicle(
                vehicle.year.or(vehicle.year_of_manufacture),
                make.as_deref(),
                vehicle.model.as_deref(),
            ),
            outstanding_violations,
        })
    }
}

#[async_trait]
impl ViolationSubmitter for HttpRegistryClient {
    async fn submit_violation(&self, report: &ViolationReport) -> Result<SubmissionReceipt, RegistryError> {
        let url = self.endpoint(&["violations"]);
        let body = NewViolation {
            report,
            status: "pending",
        };

        let response = self.http.post(url).json(&body).send().await.map_err(map_transport)?;
        let created: CreatedViolation = decode(response).await.map_err(|e| {
            warn!("Violation submission for {} failed: {}", report.plate_number, e);
            e
        })?;

        let id = match created.id {
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        };
        Ok(SubmissionReceipt {
            id,
            status: created.status.unwrap_or_else(|| "pending".to_string()),
        })
    }
}
