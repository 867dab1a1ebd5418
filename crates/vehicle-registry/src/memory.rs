//! In-memory registry for fixtures and offline operation

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;
use uuid::Uuid;

use crate::{RegistryError, SubmissionReceipt, VehicleLookup, VehicleRegistry, ViolationReport, ViolationSubmitter};

/// Registered vehicles keyed by plate, plus every accepted report
#[derive(Default)]
pub struct InMemoryRegistry {
    vehicles: RwLock<HashMap<String, VehicleLookup>>,
    reports: RwLock<Vec<ViolationReport>>,
}

fn plate_key(plate: &str) -> String {
    plate
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a vehicle; lookups ignore case and separators
    pub fn insert(&self, plate: &str, owner: &str, description: &str, outstanding_violations: u32) {
        let record = VehicleLookup {
            found: true,
            owner: Some(owner.to_string()),
            description: Some(description.to_string()),
            outstanding_violations,
        };
        if let Ok(mut vehicles) = self.vehicles.write() {
            vehicles.insert(plate_key(plate), record);
        }
    }

    /// Reports submitted so far
    pub fn reports(&self) -> Vec<ViolationReport> {
        self.reports.read().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl VehicleRegistry for InMemoryRegistry {
    async fn lookup_vehicle_by_plate(&self, plate: &str) -> Result<VehicleLookup, RegistryError> {
        let vehicles = self
            .vehicles
            .read()
            .map_err(|_| RegistryError::Unreachable("registry lock poisoned".into()))?;
        Ok(vehicles
            .get(&plate_key(plate))
            .cloned()
            .unwrap_or_else(VehicleLookup::not_found))
    }
}

#[async_trait]
impl ViolationSubmitter for InMemoryRegistry {
    async fn submit_violation(&self, report: &ViolationReport) -> Result<SubmissionReceipt, RegistryError> {
        let mut reports = self
            .reports
            .write()
            .map_err(|_| RegistryError::Unreachable("registry lock poisoned".into()))?;
        reports.push(report.clone());

        if let Ok(mut vehicles) = self.vehicles.write() {
            if let Some(vehicle) = vehicles.get_mut(&plate_key(&report.plate_number)) {
                vehicle.outstanding_violations += 1;
            }
        }

        Ok(SubmissionReceipt {
            id: Uuid::new_v4().to_string(),
            status: "pending".to_string(),
        })
    }
}
