//! Model locations for the detector tiers

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::{Detector, PrimaryDetector, SecondaryDetector, TertiaryDetector};

/// Model paths; a tier whose models are missing fails initialization and
/// the chain moves on to the next one.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// ONNX Runtime plate detector
    pub primary_detector_model: Option<PathBuf>,
    /// ONNX Runtime text recognizer
    pub primary_recognizer_model: Option<PathBuf>,
    /// tract plate detector
    pub secondary_model: Option<PathBuf>,
    /// tract text recognizer shared by the secondary and tertiary tiers
    pub recognizer_model: Option<PathBuf>,
}

impl DetectorConfig {
    /// Fresh, uninitialized backends for one scanning session
    pub fn build_tiers(&self) -> Vec<Box<dyn Detector>> {
        vec![
            Box::new(PrimaryDetector::new(
                self.primary_detector_model.clone(),
                self.primary_recognizer_model.clone(),
            )),
            Box::new(SecondaryDetector::new(
                self.secondary_model.clone(),
                self.recognizer_model.clone(),
            )),
            Box::new(TertiaryDetector::new(self.recognizer_model.clone())),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ChainError, ChainOptions, DetectorChain, Tier};

    #[test]
    fn test_builds_one_backend_per_tier() {
        let tiers: Vec<Tier> = DetectorConfig::default()
            .build_tiers()
            .iter()
            .map(|b| b.tier())
            .collect();
        assert_eq!(tiers, Tier::ALL.to_vec());
    }

    #[tokio::test]
    async fn test_unconfigured_models_exhaust_chain() {
        let mut chain = DetectorChain::new(DetectorConfig::default().build_tiers(), ChainOptions::default());
        assert_eq!(chain.get_active().await.err(), Some(ChainError::AllDetectorsUnavailable));
    }
}
