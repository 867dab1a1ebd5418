//! Scanner configuration

use plate_detector::{ChainOptions, Tier, TierThresholds};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Per-tier threshold overrides; unset tiers keep their defaults
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TierThresholdOverrides {
    pub primary: Option<TierThresholds>,
    pub secondary: Option<TierThresholds>,
    pub tertiary: Option<TierThresholds>,
}

impl TierThresholdOverrides {
    pub fn get(&self, tier: Tier) -> Option<TierThresholds> {
        match tier {
            Tier::Primary => self.primary,
            Tier::Secondary => self.secondary,
            Tier::Tertiary => self.tertiary,
        }
    }
}

/// Scanning loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScannerConfig {
    /// Time between detection ticks
    pub tick_interval_ms: u64,
    pub tier_thresholds: TierThresholdOverrides,
    /// Number of recent attempts kept for observability
    pub attempt_history: usize,
    /// Upper bound on one detector tier's initialization
    pub init_timeout_ms: u64,
    /// Consecutive runtime errors before a tier is demoted
    pub runtime_failure_limit: u32,
    /// Disarm after the first accepted plate
    pub stop_on_accept: bool,
    /// Disarm after this long without an accepted plate
    pub scan_timeout_ms: Option<u64>,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 1500,
            tier_thresholds: TierThresholdOverrides::default(),
            attempt_history: 10,
            init_timeout_ms: 5000,
            runtime_failure_limit: 1,
            stop_on_accept: false,
            scan_timeout_ms: None,
        }
    }
}

impl ScannerConfig {
    /// Tick period; never zero
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }

    /// Effective thresholds for `tier`
    pub fn thresholds(&self, tier: Tier) -> TierThresholds {
        self.tier_thresholds
            .get(tier)
            .unwrap_or_else(|| tier.default_thresholds())
    }

    pub fn scan_timeout(&self) -> Option<Duration> {
        self.scan_timeout_ms.map(Duration::from_millis)
    }

    pub fn chain_options(&self) -> ChainOptions {
        ChainOptions {
            init_timeout: Duration::from_millis(self.init_timeout_ms),
            runtime_failure_limit: self.runtime_failure_limit.max(1),
        }
    }
}
