//! Scanning metrics.
//!
//! Counters and histograms exported through whatever `metrics` recorder the
//! host installs (Prometheus in the server binary).

use ::metrics::{counter, gauge, histogram};
use plate_detector::Tier;

use crate::attempt::AttemptOutcome;

/// Metric name constants for consistency.
pub mod names {
    /// Detection attempts by tier and outcome.
    pub const ATTEMPTS_TOTAL: &str = "plate_scan_attempts_total";

    /// Ticks dropped because an attempt was still running.
    pub const SKIPPED_TICKS_TOTAL: &str = "plate_scan_skipped_ticks_total";

    /// Attempt latency in seconds by tier.
    pub const ATTEMPT_LATENCY_SECONDS: &str = "plate_scan_attempt_latency_seconds";

    /// Registry lookups by result.
    pub const LOOKUPS_TOTAL: &str = "plate_scan_lookups_total";

    /// 1 while the loop is armed.
    pub const ARMED: &str = "plate_scan_armed";
}

fn outcome_label(outcome: AttemptOutcome) -> &'static str {
    match outcome {
        AttemptOutcome::NoCandidate => "no_candidate",
        AttemptOutcome::BelowThreshold => "below_threshold",
        AttemptOutcome::Accepted => "accepted",
        AttemptOutcome::DetectorFailed => "detector_failed",
    }
}

/// Record a completed attempt.
pub fn record_attempt(tier: Tier, outcome: AttemptOutcome, latency_ms: u64) {
    counter!(
        names::ATTEMPTS_TOTAL,
        "tier" => tier.as_str(),
        "outcome" => outcome_label(outcome)
    )
    .increment(1);

    histogram!(
        names::ATTEMPT_LATENCY_SECONDS,
        "tier" => tier.as_str()
    )
    .record(latency_ms as f64 / 1000.0);
}

/// Record a dropped tick.
pub fn record_skipped_tick() {
    counter!(names::SKIPPED_TICKS_TOTAL).increment(1);
}

/// Record a registry lookup result.
pub fn record_lookup(result: &'static str) {
    counter!(names::LOOKUPS_TOTAL, "result" => result).increment(1);
}

pub fn set_armed(armed: bool) {
    gauge!(names::ARMED).set(if armed { 1.0 } else { 0.0 });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_names() {
        assert!(names::ATTEMPTS_TOTAL.ends_with("_total"));
        assert!(names::ATTEMPT_LATENCY_SECONDS.contains("latency"));
        assert_eq!(outcome_label(AttemptOutcome::DetectorFailed), "detector_failed");
    }
}
