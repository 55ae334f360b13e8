//! Reconcile orchestrator — one full diff → decide → act pass per event.
//!
//! Passes are level-triggered: each one recomputes the diff from the
//! repository and carries nothing over from earlier passes. A failure
//! listing workloads aborts the pass before anything is written; a failure
//! in one convergence task abandons that task only.

use std::collections::HashSet;

use tracing::{debug, error, info, warn};

use canary_core::{
    BASELINE_ANNOTATION, DesiredState, DesiredStateEvent, LabelSelector, OWNER_ANNOTATION, Workload,
};

use crate::actuator::{Actuator, CanaryAction, ScaleOutcome};
use crate::context::ControllerContext;
use crate::diff::find_mismatches;
use crate::error::{RolloutError, RolloutResult};
use crate::policy::ParsedPolicy;
use crate::resolver::find_canary;

/// Outcome of converging a single baseline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskReport {
    /// `{namespace}/{name}` of the baseline.
    pub baseline: String,
    pub canary: Option<CanaryAction>,
    pub scale: Option<ScaleOutcome>,
    pub error: Option<String>,
}

impl TaskReport {
    fn new(baseline: String) -> Self {
        Self {
            baseline,
            canary: None,
            scale: None,
            error: None,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Summary of one reconcile pass.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReconcileReport {
    pub desired: String,
    pub tasks: Vec<TaskReport>,
}

impl ReconcileReport {
    pub fn failed(&self) -> usize {
        self.tasks.iter().filter(|t| !t.is_ok()).count()
    }

    /// True when nothing needed converging.
    pub fn is_noop(&self) -> bool {
        self.tasks.is_empty()
    }
}

/// Summary of a rollback triggered by a desired-state deletion.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RollbackReport {
    pub desired: String,
    pub canaries_deleted: Vec<String>,
    pub baselines_restored: Vec<String>,
    pub errors: Vec<String>,
}

/// What a single event led to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventOutcome {
    Reconciled(ReconcileReport),
    RolledBack(RollbackReport),
    /// Delete observed with rollback disabled.
    Ignored,
    /// Event rejected or pass aborted; the error has been logged.
    Failed(String),
}

/// Drives diff, resolver and actuator for desired-state events.
#[derive(Clone)]
pub struct Reconciler {
    ctx: ControllerContext,
}

impl Reconciler {
    pub fn new(ctx: ControllerContext) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &ControllerContext {
        &self.ctx
    }

    /// Handle one change-feed event. Errors are logged and reported, never
    /// propagated: a bad event must not stop the controller.
    pub async fn handle_event(&self, event: &DesiredStateEvent) -> EventOutcome {
        let desired = event.object();
        debug!(desired = %desired.key(), kind = event.kind(), "handling desired-state event");

        let result = match event {
            DesiredStateEvent::Added(d) => self.reconcile(d).await.map(EventOutcome::Reconciled),
            DesiredStateEvent::Updated { old, new } => {
                if old.spec == new.spec {
                    debug!(desired = %new.key(), "spec unchanged, reconciling anyway");
                }
                self.reconcile(new).await.map(EventOutcome::Reconciled)
            }
            DesiredStateEvent::Deleted(d) => {
                if self.ctx.settings.rollback_on_delete {
                    self.rollback(d).await.map(EventOutcome::RolledBack)
                } else {
                    info!(desired = %d.key(), "desired state deleted, leaving canaries in place");
                    Ok(EventOutcome::Ignored)
                }
            }
        };

        match result {
            Ok(outcome) => outcome,
            Err(e @ (RolloutError::Selector(_) | RolloutError::InvalidDesiredState { .. })) => {
                warn!(desired = %desired.key(), error = %e, "dropping malformed desired state");
                EventOutcome::Failed(e.to_string())
            }
            Err(e) => {
                error!(desired = %desired.key(), error = %e, "reconcile pass aborted");
                EventOutcome::Failed(e.to_string())
            }
        }
    }

    /// Check a desired state before acting on it and return its selector.
    pub fn validate(desired: &DesiredState) -> RolloutResult<LabelSelector> {
        if desired.spec.image.trim().is_empty() {
            return Err(RolloutError::InvalidDesiredState {
                key: desired.key(),
                reason: "image must not be empty".to_string(),
            });
        }
        let selector = LabelSelector::parse(&desired.spec.label_selectors)?;
        if let Err(e) = ParsedPolicy::parse(&desired.spec.rollout_policy) {
            // Pacing is not enforced, so a bad policy does not block the pass.
            warn!(desired = %desired.key(), error = %e, "ignoring rollout policy");
        }
        Ok(selector)
    }

    /// Run one full reconcile pass for `desired`.
    pub async fn reconcile(&self, desired: &DesiredState) -> RolloutResult<ReconcileReport> {
        let selector = Self::validate(desired)?;
        let repo = self.ctx.repo.as_ref();
        let mismatches = find_mismatches(repo, desired, &selector)?;

        let mut report = ReconcileReport {
            desired: desired.key(),
            tasks: Vec::with_capacity(mismatches.len()),
        };
        let actuator = Actuator::new(&self.ctx);

        for baseline in &mismatches {
            let mut task = TaskReport::new(baseline.key());
            if let Err(e) = self.converge(&actuator, desired, &selector, baseline, &mut task).await {
                warn!(
                    desired = %desired.key(),
                    baseline = %baseline.key(),
                    error = %e,
                    "convergence task abandoned"
                );
                task.error = Some(e.to_string());
            }
            report.tasks.push(task);
        }

        info!(
            desired = %report.desired,
            image = %desired.spec.image,
            mismatched = report.tasks.len(),
            failed = report.failed(),
            "reconcile pass complete"
        );
        Ok(report)
    }

    /// Resolve, create or update the canary, then scale the baseline.
    async fn converge(
        &self,
        actuator: &Actuator<'_>,
        desired: &DesiredState,
        selector: &LabelSelector,
        baseline: &Workload,
        task: &mut TaskReport,
    ) -> RolloutResult<()> {
        let existing = find_canary(
            self.ctx.repo.as_ref(),
            &desired.metadata.namespace,
            selector,
            baseline.name(),
        )?;

        let outcome = match existing {
            None => actuator.create_canary(desired, baseline).await?,
            Some(canary) => actuator.update_canary(desired, canary).await?,
        };
        task.canary = Some(outcome.action);

        task.scale = Some(actuator.scale_baseline(baseline).await?);
        Ok(())
    }

    /// Delete the canaries owned by `desired` and restore the baselines it
    /// scaled down. Baselines whose canary belongs to another desired state,
    /// or whose canary could not be deleted, are left scaled.
    pub async fn rollback(&self, desired: &DesiredState) -> RolloutResult<RollbackReport> {
        let selector = LabelSelector::parse(&desired.spec.label_selectors)?;
        let namespace = &desired.metadata.namespace;
        let owner = desired.key();
        let actuator = Actuator::new(&self.ctx);
        let mut report = RollbackReport {
            desired: owner.clone(),
            ..Default::default()
        };

        let selected = self.ctx.repo.list(namespace, &selector)?;
        let (canaries, baselines): (Vec<_>, Vec<_>) =
            selected.into_iter().partition(|w| w.is_canary());

        let mut kept_for = HashSet::new();
        for canary in canaries {
            let owned = canary.metadata.annotations.get(OWNER_ANNOTATION) == Some(&owner);
            let baseline = canary.metadata.annotations.get(BASELINE_ANNOTATION).cloned();
            if !owned {
                debug!(canary = %canary.key(), "canary owned by another desired state, keeping");
                kept_for.extend(baseline);
                continue;
            }
            match actuator.delete_canary(&canary) {
                Ok(_) => report.canaries_deleted.push(canary.key()),
                Err(e) => {
                    // The canary still runs, so its baseline stays scaled.
                    warn!(canary = %canary.key(), error = %e, "failed to delete canary");
                    report.errors.push(format!("{}: {e}", canary.key()));
                    kept_for.extend(baseline);
                }
            }
        }

        for baseline in baselines {
            if baseline.original_replicas().is_none() || kept_for.contains(baseline.name()) {
                continue;
            }
            match actuator.restore_baseline(&baseline).await {
                Ok(_) => report.baselines_restored.push(baseline.key()),
                Err(e) => {
                    warn!(baseline = %baseline.key(), error = %e, "failed to restore baseline");
                    report.errors.push(format!("{}: {e}", baseline.key()));
                }
            }
        }

        info!(
            desired = %owner,
            %selector,
            canaries = report.canaries_deleted.len(),
            baselines = report.baselines_restored.len(),
            errors = report.errors.len(),
            "rollback complete"
        );
        Ok(report)
    }
}
