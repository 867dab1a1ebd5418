//! Detection attempt records

use chrono::{DateTime, Utc};
use plate_detector::Tier;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// How one tick ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    NoCandidate,
    BelowThreshold,
    Accepted,
    DetectorFailed,
}

/// One tick of the scanning loop
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionAttempt {
    /// Tick order within the scanning session
    pub sequence: u64,
    pub timestamp: DateTime<Utc>,
    pub tier: Tier,
    pub plate_text: Option<String>,
    pub detection_confidence: Option<f32>,
    pub text_confidence: Option<f32>,
    pub latency_ms: u64,
    pub outcome: AttemptOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Aggregates over the retained window
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AttemptSummary {
    pub total: usize,
    pub accepted: usize,
    pub success_rate: f32,
    pub avg_detection_confidence: Option<f32>,
    pub avg_text_confidence: Option<f32>,
    pub avg_latency_ms: f64,
}

/// Bounded window of the most recent attempts
#[derive(Debug, Clone)]
pub struct AttemptLog {
    data: VecDeque<DetectionAttempt>,
    capacity: usize,
}

impl AttemptLog {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            data: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, attempt: DetectionAttempt) {
        if self.data.len() >= self.capacity {
            self.data.pop_front();
        }
        self.data.push_back(attempt);
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn last(&self) -> Option<&DetectionAttempt> {
        self.data.back()
    }

    /// Retained attempts, oldest first
    pub fn recent(&self) -> Vec<DetectionAttempt> {
        self.data.iter().cloned().collect()
    }

    pub fn summary(&self) -> AttemptSummary {
        let total = self.data.len();
        if total == 0 {
            return AttemptSummary::default();
        }

        let accepted = self
            .data
            .iter()
            .filter(|a| a.outcome == AttemptOutcome::Accepted)
            .count();
        let latency: u64 = self.data.iter().map(|a| a.latency_ms).sum();

        AttemptSummary {
            total,
            accepted,
            success_rate: accepted as f32 / total as f32,
            avg_detection_confidence: mean(self.data.iter().filter_map(|a| a.detection_confidence)),
            avg_text_confidence: mean(self.data.iter().filter_map(|a| a.text_confidence)),
            avg_latency_ms: latency as f64 / total as f64,
        }
    }
}

fn mean(values: impl Iterator<Item = f32>) -> Option<f32> {
    let (sum, count) = values.fold((0.0f32, 0usize), |(sum, count), v| (sum + v, count + 1));
    (count > 0).then(|| sum / count as f32)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attempt(sequence: u64, outcome: AttemptOutcome, confidence: Option<f32>, latency_ms: u64) -> DetectionAttempt {
        DetectionAttempt {
            sequence,
            timestamp: Utc::now(),
            tier: Tier::Primary,
            plate_text: None,
            detection_confidence: confidence,
            text_confidence: confidence,
            latency_ms,
            outcome,
            error: None,
        }
    }

    #[test]
    fn test_log_is_bounded_and_ordered() {
        let mut log = AttemptLog::new(3);
        for seq in 1..=5 {
            log.push(attempt(seq, AttemptOutcome::NoCandidate, None, 10));
        }

        let sequences: Vec<u64> = log.recent().iter().map(|a| a.sequence).collect();
        assert_eq!(sequences, vec![3, 4, 5]);
        assert_eq!(log.last().map(|a| a.sequence), Some(5));
    }

    #[test]
    fn test_summary() {
        let mut log = AttemptLog::new(10);
        log.push(attempt(1, AttemptOutcome::Accepted, Some(0.9), 20));
        log.push(attempt(2, AttemptOutcome::BelowThreshold, Some(0.5), 40));
        log.push(attempt(3, AttemptOutcome::NoCandidate, None, 30));
        log.push(attempt(4, AttemptOutcome::DetectorFailed, None, 10));

        let summary = log.summary();
        assert_eq!(summary.total, 4);
        assert_eq!(summary.accepted, 1);
        assert!((summary.success_rate - 0.25).abs() < 1e-6);
        assert!((summary.avg_detection_confidence.unwrap() - 0.7).abs() < 1e-6);
        assert!((summary.avg_latency_ms - 25.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_summary() {
        assert_eq!(AttemptLog::new(0).summary(), AttemptSummary::default());
    }
}
