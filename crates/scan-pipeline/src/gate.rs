//! Per-tier confidence gate

use plate_detector::{BoundingBox, RawDetection, Tier, TierThresholds};
use serde::{Deserialize, Serialize};

use crate::attempt::AttemptOutcome;
use crate::config::ScannerConfig;

/// A detection that met its tier's thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    pub plate_text: String,
    pub bounding_box: BoundingBox,
    pub detection_confidence: f32,
    pub text_confidence: f32,
    pub tier: Tier,
}

/// Gate verdict for one attempt
#[derive(Debug, Clone, PartialEq)]
pub enum GateDecision {
    NoCandidate,
    BelowThreshold,
    Accepted(DetectionResult),
}

impl GateDecision {
    pub fn outcome(&self) -> AttemptOutcome {
        match self {
            GateDecision::NoCandidate => AttemptOutcome::NoCandidate,
            GateDecision::BelowThreshold => AttemptOutcome::BelowThreshold,
            GateDecision::Accepted(_) => AttemptOutcome::Accepted,
        }
    }

    pub fn accepted(&self) -> Option<&DetectionResult> {
        match self {
            GateDecision::Accepted(result) => Some(result),
            _ => None,
        }
    }
}

fn meets(confidence: f32, min: f32) -> bool {
    confidence.is_finite() && confidence >= min
}

/// Stateless threshold check; the same input always yields the same verdict
#[derive(Debug, Clone)]
pub struct ResultGate {
    thresholds: [TierThresholds; 3],
}

impl Default for ResultGate {
    fn default() -> Self {
        Self {
            thresholds: Tier::ALL.map(|tier| tier.default_thresholds()),
        }
    }
}

impl ResultGate {
    pub fn from_config(config: &ScannerConfig) -> Self {
        Self {
            thresholds: Tier::ALL.map(|tier| config.thresholds(tier)),
        }
    }

    pub fn thresholds(&self, tier: Tier) -> TierThresholds {
        self.thresholds[tier.rank()]
    }

    /// Accept `raw` iff both confidences are finite and meet or exceed the
    /// tier minimums. NaN and infinities never pass.
    pub fn accept(&self, raw: Option<&RawDetection>, tier: Tier) -> GateDecision {
        let Some(raw) = raw else {
            return GateDecision::NoCandidate;
        };

        let min = self.thresholds(tier);
        if !(meets(raw.detection_confidence, min.detection_min) && meets(raw.text_confidence, min.text_min)) {
            return GateDecision::BelowThreshold;
        }

        GateDecision::Accepted(DetectionResult {
            plate_text: raw.plate_text.clone(),
            bounding_box: raw.bounding_box,
            detection_confidence: raw.detection_confidence,
            text_confidence: raw.text_confidence,
            tier,
        })
    }
}
