//! Convergence actuator — the mutating half of a reconcile pass.
//!
//! Every write is a read-modify-write against the repository's revision
//! token. When a write loses a race the actuator backs off, re-reads the
//! authoritative object and recomputes from it; the stale in-memory copy is
//! never written again. Loops are bounded by the context's `RetryPolicy`.
//!
//! All operations are idempotent:
//! - create-canary resolves an existing canary into update-canary;
//! - update-canary only writes when the canary's image differs;
//! - scale-baseline moves the baseline to an absolute target derived from
//!   the replica count recorded before the first scale-down, so repeated
//!   passes do not keep decrementing.

use tracing::{debug, info, warn};

use canary_core::{
    BASELINE_ANNOTATION, DesiredState, ORIGINAL_REPLICAS_ANNOTATION, OWNER_ANNOTATION,
    ROLE_AUTO_CANARY, ROLE_LABEL, Workload,
};
use canary_state::StateError;

use crate::context::ControllerContext;
use crate::error::{RolloutError, RolloutResult};

/// What happened to the canary in one task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CanaryAction {
    Created,
    Updated,
    Unchanged,
}

/// Result of a canary operation with the resulting stored object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanaryOutcome {
    pub action: CanaryAction,
    pub canary: Workload,
}

/// What happened to a baseline's replica count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScaleOutcome {
    Scaled { from: u32, to: u32 },
    AtTarget(u32),
}

/// Derive a canary from its baseline: same spec, the desired image on the
/// primary container, `replicas` replicas and the `role=auto-canary` marker.
pub fn build_canary(desired: &DesiredState, baseline: &Workload, replicas: u32) -> Workload {
    let mut canary = baseline.clone();
    canary.metadata.name = baseline.canary_name();
    canary.metadata.resource_version = 0;
    canary
        .metadata
        .labels
        .insert(ROLE_LABEL.to_string(), ROLE_AUTO_CANARY.to_string());
    // Baseline bookkeeping must not leak into the clone.
    canary.metadata.annotations.remove(ORIGINAL_REPLICAS_ANNOTATION);
    canary.metadata.annotations.insert(
        BASELINE_ANNOTATION.to_string(),
        baseline.metadata.name.clone(),
    );
    canary
        .metadata
        .annotations
        .insert(OWNER_ANNOTATION.to_string(), desired.key());
    canary.spec.replicas = replicas;
    canary.set_primary_image(&desired.spec.image);
    canary
}

/// Executes canary and baseline mutations under optimistic concurrency.
pub struct Actuator<'a> {
    ctx: &'a ControllerContext,
}

impl<'a> Actuator<'a> {
    pub fn new(ctx: &'a ControllerContext) -> Self {
        Self { ctx }
    }

    /// Re-read a workload during a retry. A vanished object ends the loop.
    fn refetch(&self, namespace: &str, name: &str) -> RolloutResult<Workload> {
        match self.ctx.repo.get(namespace, name) {
            Ok(w) => Ok(w),
            Err(StateError::NotFound(key)) => Err(RolloutError::Vanished(key)),
            Err(e) => Err(e.into()),
        }
    }

    /// Create the canary for `baseline`. If one already exists (including
    /// one created concurrently by another writer) the call converges it
    /// through [`update_canary`](Self::update_canary) instead.
    pub async fn create_canary(
        &self,
        desired: &DesiredState,
        baseline: &Workload,
    ) -> RolloutResult<CanaryOutcome> {
        if baseline.primary_image().is_none() {
            return Err(RolloutError::NoContainers(baseline.key()));
        }
        let canary = build_canary(desired, baseline, self.ctx.settings.canary_replicas);
        let key = canary.key();
        let mut backoff = self.ctx.retry.backoff();

        loop {
            match self.ctx.repo.create(&canary) {
                Ok(created) => {
                    info!(
                        canary = %key,
                        baseline = %baseline.key(),
                        image = %desired.spec.image,
                        replicas = created.spec.replicas,
                        "canary created"
                    );
                    return Ok(CanaryOutcome {
                        action: CanaryAction::Created,
                        canary: created,
                    });
                }
                Err(e) if e.is_conflict() => {
                    debug!(canary = %key, attempt = backoff.attempt(), "canary already exists, re-reading");
                    match self.ctx.repo.get(canary.namespace(), canary.name()) {
                        Ok(existing) => return self.update_canary(desired, existing).await,
                        // Deleted between our create and our read: try again.
                        Err(StateError::NotFound(_)) => {}
                        Err(e) => return Err(e.into()),
                    }
                    if !backoff.wait().await {
                        warn!(canary = %key, attempts = backoff.attempt(), "giving up on canary creation");
                        return Err(RolloutError::RetriesExhausted {
                            operation: "create-canary",
                            key,
                            attempts: backoff.attempt(),
                        });
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Converge an existing canary onto the desired image. Replica count is
    /// left untouched. A canary owned by another desired state is refused.
    pub async fn update_canary(
        &self,
        desired: &DesiredState,
        canary: Workload,
    ) -> RolloutResult<CanaryOutcome> {
        let key = canary.key();
        let mut current = canary;
        let mut backoff = self.ctx.retry.backoff();

        let owner = desired.key();

        loop {
            if !current.is_canary() {
                return Err(RolloutError::NotManaged(key));
            }
            if let Some(other) = current.metadata.annotations.get(OWNER_ANNOTATION)
                && *other != owner
            {
                warn!(canary = %key, owner = %other, desired = %owner, "canary owned by another desired state");
                return Err(RolloutError::OwnedElsewhere {
                    key,
                    owner: other.clone(),
                });
            }
            if current.primary_image() == Some(desired.spec.image.as_str()) {
                debug!(canary = %key, "canary already on desired image");
                return Ok(CanaryOutcome {
                    action: CanaryAction::Unchanged,
                    canary: current,
                });
            }

            let mut next = current.clone();
            if !next.set_primary_image(&desired.spec.image) {
                return Err(RolloutError::NoContainers(key));
            }

            match self.ctx.repo.update(&next) {
                Ok(updated) => {
                    info!(
                        canary = %key,
                        from = current.primary_image().unwrap_or_default(),
                        to = %desired.spec.image,
                        "canary image updated"
                    );
                    return Ok(CanaryOutcome {
                        action: CanaryAction::Updated,
                        canary: updated,
                    });
                }
                Err(e) if e.is_conflict() => {
                    if !backoff.wait().await {
                        warn!(canary = %key, attempts = backoff.attempt(), "giving up on canary update");
                        return Err(RolloutError::RetriesExhausted {
                            operation: "update-canary",
                            key,
                            attempts: backoff.attempt(),
                        });
                    }
                    current = self.refetch(current.namespace(), current.name())?;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Scale `baseline` down to its target replica count.
    ///
    /// The pre-rollout replica count is recorded on the baseline the first
    /// time it is scaled; later passes compute the same target from it. A
    /// manual scale-up above the recorded count is taken as the new
    /// original.
    pub async fn scale_baseline(&self, baseline: &Workload) -> RolloutResult<ScaleOutcome> {
        let key = baseline.key();
        let mut current = baseline.clone();
        let mut backoff = self.ctx.retry.backoff();

        loop {
            let original = current
                .original_replicas()
                .map_or(current.spec.replicas, |recorded| {
                    recorded.max(current.spec.replicas)
                });
            let target = self.ctx.settings.baseline_target(original);

            let mut next = current.clone();
            next.metadata.annotations.insert(
                ORIGINAL_REPLICAS_ANNOTATION.to_string(),
                original.to_string(),
            );
            next.spec.replicas = target;

            if next == current {
                debug!(baseline = %key, replicas = target, "baseline already at target");
                return Ok(ScaleOutcome::AtTarget(target));
            }

            match self.ctx.repo.update(&next) {
                Ok(_) => {
                    let from = current.spec.replicas;
                    if from == target {
                        debug!(baseline = %key, original, "recorded original replica count");
                        return Ok(ScaleOutcome::AtTarget(target));
                    }
                    info!(baseline = %key, from, to = target, original, "baseline scaled");
                    return Ok(ScaleOutcome::Scaled { from, to: target });
                }
                Err(e) if e.is_conflict() => {
                    if !backoff.wait().await {
                        warn!(baseline = %key, attempts = backoff.attempt(), "giving up on baseline scale");
                        return Err(RolloutError::RetriesExhausted {
                            operation: "scale-baseline",
                            key,
                            attempts: backoff.attempt(),
                        });
                    }
                    current = self.refetch(current.namespace(), current.name())?;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Undo [`scale_baseline`](Self::scale_baseline): restore the recorded
    /// replica count and drop the bookkeeping annotation.
    pub async fn restore_baseline(&self, baseline: &Workload) -> RolloutResult<ScaleOutcome> {
        let key = baseline.key();
        let mut current = baseline.clone();
        let mut backoff = self.ctx.retry.backoff();

        loop {
            if !current
                .metadata
                .annotations
                .contains_key(ORIGINAL_REPLICAS_ANNOTATION)
            {
                return Ok(ScaleOutcome::AtTarget(current.spec.replicas));
            }
            let restored = current.original_replicas().unwrap_or(current.spec.replicas);

            let mut next = current.clone();
            next.metadata.annotations.remove(ORIGINAL_REPLICAS_ANNOTATION);
            next.spec.replicas = restored;

            match self.ctx.repo.update(&next) {
                Ok(_) => {
                    let from = current.spec.replicas;
                    if from == restored {
                        return Ok(ScaleOutcome::AtTarget(restored));
                    }
                    info!(baseline = %key, from, to = restored, "baseline restored");
                    return Ok(ScaleOutcome::Scaled { from, to: restored });
                }
                Err(e) if e.is_conflict() => {
                    if !backoff.wait().await {
                        return Err(RolloutError::RetriesExhausted {
                            operation: "restore-baseline",
                            key,
                            attempts: backoff.attempt(),
                        });
                    }
                    current = self.refetch(current.namespace(), current.name())?;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Delete a canary. Returns false when it was already gone.
    pub fn delete_canary(&self, canary: &Workload) -> RolloutResult<bool> {
        if !canary.is_canary() {
            return Err(RolloutError::NotManaged(canary.key()));
        }
        let existed = self.ctx.repo.delete(canary.namespace(), canary.name())?;
        if existed {
            info!(canary = %canary.key(), "canary deleted");
        }
        Ok(existed)
    }
}
