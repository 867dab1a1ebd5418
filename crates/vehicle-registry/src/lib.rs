//! Vehicle Registry Clients
//!
//! Contracts for the external registry consumed by the scanner:
//! - plate lookup (owner, description, outstanding violations)
//! - violation/evidence submission
//!
//! `HttpRegistryClient` talks to the REST backend; `InMemoryRegistry` serves
//! fixtures and offline use.

pub mod http;
pub mod memory;

pub use http::{HttpRegistryClient, RegistryConfig};
pub use memory::InMemoryRegistry;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Registry error types
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Registry unreachable: {0}")]
    Unreachable(String),

    #[error("Registry returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Malformed registry response: {0}")]
    Decode(String),

    #[error("Registry request timed out")]
    Timeout,
}

/// Result of a plate lookup
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VehicleLookup {
    pub found: bool,
    pub owner: Option<String>,
    pub description: Option<String>,
    pub outstanding_violations: u32,
}

impl VehicleLookup {
    /// A plate the registry does not know
    pub fn not_found() -> Self {
        Self::default()
    }
}

/// Plate lookup contract
#[async_trait]
pub trait VehicleRegistry: Send + Sync {
    async fn lookup_vehicle_by_plate(&self, plate: &str) -> Result<VehicleLookup, RegistryError>;
}

/// Violation report with evidence references
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViolationReport {
    pub plate_number: String,
    pub violation_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fine_amount: Option<f64>,
    #[serde(default)]
    pub evidence_refs: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub officer_notes: Option<String>,
}

/// Acknowledgement of a submitted report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionReceipt {
    pub id: String,
    pub status: String,
}

/// Violation submission contract
#[async_trait]
pub trait ViolationSubmitter: Send + Sync {
    async fn submit_violation(&self, report: &ViolationReport) -> Result<SubmissionReceipt, RegistryError>;
}

/// "{year} {make} {model}", skipping missing parts
pub fn describe_vehicle(year: Option<u32>, make: Option<&str>, model: Option<&str>) -> Option<String> {
    let year = year.map(|y| y.to_string());
    let parts: Vec<&str> = [year.as_deref(), make, model]
        .into_iter()
        .flatten()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();

    (!parts.is_empty()).then(|| parts.join(" "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe_vehicle() {
        assert_eq!(
            describe_vehicle(Some(2019), Some("Toyota"), Some("Corolla")).as_deref(),
            Some("2019 Toyota Corolla")
        );
        assert_eq!(describe_vehicle(None, Some("Kia"), Some(" ")).as_deref(), Some("Kia"));
        assert_eq!(describe_vehicle(None, None, None), None);
    }

    #[test]
    fn test_report_omits_empty_fields() {
        let report = ViolationReport {
            plate_number: "AS-1234-22".into(),
            violation_type: "speeding".into(),
            severity: None,
            location: None,
            description: None,
            fine_amount: None,
            evidence_refs: vec![],
            officer_notes: None,
        };
        let json = serde_json::to_value(&report).unwrap();
        assert!(json.get("severity").is_none());
        assert_eq!(json["plate_number"], "AS-1234-22");
    }
}
