//! Diff engine. Finds workloads that have not converged on the desired
//! image.

use tracing::debug;

use canary_core::{DesiredState, LabelSelector, Workload};
use canary_state::{StateResult, WorkloadRepository};

/// Whether `workload` is a baseline that still runs something other than
/// `image`. Canaries and container-less workloads never qualify.
pub fn is_mismatch(workload: &Workload, image: &str) -> bool {
    if workload.is_canary() {
        return false;
    }
    match workload.primary_image() {
        Some(current) => current != image,
        None => false,
    }
}

/// List the workloads selected by `desired` and return the baselines whose
/// primary image differs from the desired image.
///
/// A listing failure is returned as-is; no partial result is produced.
pub fn find_mismatches(
    repo: &dyn WorkloadRepository,
    desired: &DesiredState,
    selector: &LabelSelector,
) -> StateResult<Vec<Workload>> {
    let namespace = &desired.metadata.namespace;
    let selected = repo.list(namespace, selector)?;
    let total = selected.len();

    let mismatched: Vec<Workload> = selected
        .into_iter()
        .filter(|w| is_mismatch(w, &desired.spec.image))
        .collect();

    debug!(
        desired = %desired.key(),
        %selector,
        selected = total,
        mismatched = mismatched.len(),
        "diffed workloads against desired image"
    );
    Ok(mismatched)
}
