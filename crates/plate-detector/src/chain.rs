//! Ordered fail-forward chain of detector tiers

use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{BackendState, Detector, DetectorError, Tier};

/// Chain errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChainError {
    #[error("All detectors unavailable")]
    AllDetectorsUnavailable,
}

/// Chain tuning
#[derive(Debug, Clone, Copy)]
pub struct ChainOptions {
    /// Upper bound on a single backend's `initialize()`
    pub init_timeout: Duration,
    /// Consecutive runtime errors before a Ready tier is demoted
    pub runtime_failure_limit: u32,
}

impl Default for ChainOptions {
    fn default() -> Self {
        Self {
            init_timeout: Duration::from_millis(5000),
            runtime_failure_limit: 1,
        }
    }
}

struct TierSlot {
    backend: Box<dyn Detector>,
    state: BackendState,
    runtime_failures: u32,
}

/// Detector tiers in priority order.
///
/// A tier that fails to initialize, or keeps failing at runtime, is marked
/// Failed and never retried for the lifetime of the chain. Build a new chain
/// per scanning session.
pub struct DetectorChain {
    slots: Vec<TierSlot>,
    options: ChainOptions,
}

impl DetectorChain {
    /// Create a chain; backends are ordered by tier regardless of input order
    pub fn new(mut backends: Vec<Box<dyn Detector>>, options: ChainOptions) -> Self {
        backends.sort_by_key(|b| b.tier());
        let slots = backends
            .into_iter()
            .map(|backend| TierSlot {
                backend,
                state: BackendState::Uninitialized,
                runtime_failures: 0,
            })
            .collect();

        Self { slots, options }
    }

    /// Highest-priority usable backend, initializing lazily.
    pub async fn get_active(&mut self) -> Result<&dyn Detector, ChainError> {
        let idx = self.ensure_active().await?;
        Ok(self.slots[idx].backend.as_ref())
    }

    async fn ensure_active(&mut self) -> Result<usize, ChainError> {
        let init_timeout = self.options.init_timeout;

        for (idx, slot) in self.slots.iter_mut().enumerate() {
            match slot.state {
                BackendState::Ready => return Ok(idx),
                BackendState::Failed => continue,
                BackendState::Uninitialized | BackendState::Initializing => {}
            }

            let tier = slot.backend.tier();
            slot.state = BackendState::Initializing;
            info!(tier = %tier, "Initializing detector tier");

            let result = match tokio::time::timeout(init_timeout, slot.backend.initialize()).await {
                Ok(result) => result,
                Err(_) => Err(DetectorError::InitTimeout(init_timeout.as_millis() as u64)),
            };

            match result {
                Ok(()) => {
                    slot.state = BackendState::Ready;
                    slot.runtime_failures = 0;
                    info!(tier = %tier, "Detector tier ready");
                    return Ok(idx);
                }
                Err(e) => {
                    warn!(tier = %tier, error = %e, "Detector tier failed to initialize");
                    slot.state = BackendState::Failed;
                    slot.backend.cleanup();
                }
            }
        }

        Err(ChainError::AllDetectorsUnavailable)
    }

    /// Record a `detect()` error from `tier`. Returns true when the tier was
    /// demoted to Failed.
    pub fn report_runtime_failure(&mut self, tier: Tier) -> bool {
        let limit = self.options.runtime_failure_limit.max(1);
        let Some(slot) = self.slot_mut(tier) else {
            return false;
        };
        if slot.state != BackendState::Ready {
            return false;
        }

        slot.runtime_failures += 1;
        if slot.runtime_failures < limit {
            debug!(tier = %tier, failures = slot.runtime_failures, "Detector runtime failure tolerated");
            return false;
        }

        warn!(tier = %tier, failures = slot.runtime_failures, "Demoting detector tier after runtime failures");
        slot.state = BackendState::Failed;
        slot.backend.cleanup();
        true
    }

    /// Reset the consecutive failure count after a successful `detect()`
    pub fn report_success(&mut self, tier: Tier) {
        if let Some(slot) = self.slot_mut(tier) {
            slot.runtime_failures = 0;
        }
    }

    /// Tier currently serving detections, if one is Ready
    pub fn active_tier(&self) -> Option<Tier> {
        self.slots
            .iter()
            .find(|slot| slot.state == BackendState::Ready)
            .map(|slot| slot.backend.tier())
    }

    /// Every tier has failed
    pub fn is_exhausted(&self) -> bool {
        self.slots.iter().all(|slot| slot.state == BackendState::Failed)
    }

    /// Per-tier lifecycle states in priority order
    pub fn tier_states(&self) -> Vec<(Tier, BackendState)> {
        self.slots
            .iter()
            .map(|slot| (slot.backend.tier(), slot.state))
            .collect()
    }

    /// Release every backend regardless of state
    pub fn cleanup(&mut self) {
        for slot in &mut self.slots {
            slot.backend.cleanup();
        }
        debug!("Detector chain cleaned up");
    }

    fn slot_mut(&mut self, tier: Tier) -> Option<&mut TierSlot> {
        self.slots.iter_mut().find(|slot| slot.backend.tier() == tier)
    }
}
