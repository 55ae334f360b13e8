//! Controller context — the collaborators and settings every component
//! receives explicitly instead of reaching for process-wide state.

use std::sync::Arc;

use canary_core::CanarydConfig;
use canary_state::WorkloadRepository;

use crate::retry::RetryPolicy;

/// Sizing and lifecycle knobs for canary rollouts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RolloutSettings {
    /// Replica count given to a newly created canary.
    pub canary_replicas: u32,
    /// How many replicas a baseline gives up to its canary.
    pub scale_step: u32,
    /// A baseline is never scaled below this count.
    pub baseline_floor: u32,
    /// Delete canaries and restore baselines when a desired state is deleted.
    pub rollback_on_delete: bool,
}

impl Default for RolloutSettings {
    fn default() -> Self {
        Self::from_config(&CanarydConfig::default())
    }
}

impl RolloutSettings {
    pub fn from_config(config: &CanarydConfig) -> Self {
        Self {
            canary_replicas: config.canary_replicas(),
            scale_step: config.scale_step(),
            baseline_floor: config.baseline_floor(),
            rollback_on_delete: config.rollback_on_delete(),
        }
    }

    /// Target replica count for a baseline whose pre-rollout count was
    /// `original`. Never negative, never below the floor, and never above
    /// `original` (a baseline already under the floor is left alone).
    pub fn baseline_target(&self, original: u32) -> u32 {
        original
            .saturating_sub(self.scale_step)
            .max(self.baseline_floor.min(original))
    }
}

/// Shared handle passed to the diff engine, resolver, actuator and
/// reconciler. Constructed once at startup.
#[derive(Clone)]
pub struct ControllerContext {
    pub repo: Arc<dyn WorkloadRepository>,
    pub retry: RetryPolicy,
    pub settings: RolloutSettings,
}

impl ControllerContext {
    pub fn new(repo: Arc<dyn WorkloadRepository>) -> Self {
        Self {
            repo,
            retry: RetryPolicy::default(),
            settings: RolloutSettings::default(),
        }
    }

    pub fn from_config(repo: Arc<dyn WorkloadRepository>, config: &CanarydConfig) -> Self {
        Self {
            repo,
            retry: RetryPolicy::from_config(config),
            settings: RolloutSettings::from_config(config),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_settings(mut self, settings: RolloutSettings) -> Self {
        self.settings = settings;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn baseline_target_decrements_by_step() {
        let s = RolloutSettings::default();
        assert_eq!(s.baseline_target(4), 3);
        assert_eq!(s.baseline_target(1), 0);
        assert_eq!(s.baseline_target(0), 0);
    }

    #[test]
    fn baseline_target_respects_floor() {
        let s = RolloutSettings {
            scale_step: 3,
            baseline_floor: 2,
            ..Default::default()
        };
        assert_eq!(s.baseline_target(10), 7);
        assert_eq!(s.baseline_target(4), 2);
        assert_eq!(s.baseline_target(2), 2);
        // Already under the floor: left as is, never scaled up.
        assert_eq!(s.baseline_target(1), 1);
    }
}
