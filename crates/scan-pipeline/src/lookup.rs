//! Registry lookups for recognized plates

use serde::{Serialize, Serializer};
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};
use vehicle_registry::VehicleRegistry;

use crate::metrics;

/// Displayable lookup verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupStatus {
    NoViolations,
    Outstanding(u32),
    NotRegistered,
    SystemError,
}

impl fmt::Display for LookupStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LookupStatus::NoViolations => f.write_str("No Violations"),
            LookupStatus::Outstanding(count) => write!(f, "{} Outstanding Violation(s)", count),
            LookupStatus::NotRegistered => f.write_str("Not Registered"),
            LookupStatus::SystemError => f.write_str("System Error"),
        }
    }
}

impl Serialize for LookupStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// What the registry knows about a plate
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlateLookupRecord {
    pub plate_text: String,
    pub vehicle_found: bool,
    pub owner_name: Option<String>,
    pub vehicle_description: Option<String>,
    pub outstanding_violation_count: u32,
    pub status: LookupStatus,
}

impl PlateLookupRecord {
    pub fn is_lookup_error(&self) -> bool {
        self.status == LookupStatus::SystemError
    }
}

/// Resolves plates against the registry; never fails
#[derive(Clone)]
pub struct LookupCoordinator {
    registry: Arc<dyn VehicleRegistry>,
}

impl LookupCoordinator {
    pub fn new(registry: Arc<dyn VehicleRegistry>) -> Self {
        Self { registry }
    }

    pub async fn resolve(&self, plate_text: &str) -> PlateLookupRecord {
        match self.registry.lookup_vehicle_by_plate(plate_text).await {
            Ok(vehicle) if vehicle.found => {
                let status = if vehicle.outstanding_violations > 0 {
                    LookupStatus::Outstanding(vehicle.outstanding_violations)
                } else {
                    LookupStatus::NoViolations
                };
                info!(plate = plate_text, %status, "Registry lookup complete");
                metrics::record_lookup("found");

                PlateLookupRecord {
                    plate_text: plate_text.to_string(),
                    vehicle_found: true,
                    owner_name: vehicle.owner,
                    vehicle_description: vehicle.description,
                    outstanding_violation_count: vehicle.outstanding_violations,
                    status,
                }
            }
            Ok(_) => {
                info!(plate = plate_text, "Plate not registered");
                metrics::record_lookup("not_found");
                Self::empty(plate_text, LookupStatus::NotRegistered)
            }
            Err(e) => {
                warn!(plate = plate_text, error = %e, "Registry lookup failed");
                metrics::record_lookup("error");
                Self::empty(plate_text, LookupStatus::SystemError)
            }
        }
    }

    fn empty(plate_text: &str, status: LookupStatus) -> PlateLookupRecord {
        PlateLookupRecord {
            plate_text: plate_text.to_string(),
            vehicle_found: false,
            owner_name: None,
            vehicle_description: None,
            outstanding_violation_count: 0,
            status,
        }
    }
}
