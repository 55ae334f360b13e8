//! Canary existence resolver.
//!
//! Always asks the repository at decision time; a cached answer could race
//! a concurrent creator into a duplicate.

use canary_core::{
    BASELINE_ANNOTATION, LabelSelector, ROLE_AUTO_CANARY, ROLE_LABEL, Workload, canary_name_for,
};
use canary_state::{StateResult, WorkloadRepository};

/// Look up the canary belonging to `baseline` among the workloads matching
/// `selector AND role=auto-canary`.
pub fn find_canary(
    repo: &dyn WorkloadRepository,
    namespace: &str,
    selector: &LabelSelector,
    baseline: &str,
) -> StateResult<Option<Workload>> {
    let canary_selector = selector.and_equals(ROLE_LABEL, ROLE_AUTO_CANARY);
    let expected_name = canary_name_for(baseline);
    let found = repo
        .list(namespace, &canary_selector)?
        .into_iter()
        .find(|c| {
            c.metadata.name == expected_name
                || c.metadata.annotations.get(BASELINE_ANNOTATION).map(String::as_str)
                    == Some(baseline)
        });
    Ok(found)
}

/// Whether a canary for `baseline` currently exists.
pub fn canary_exists(
    repo: &dyn WorkloadRepository,
    namespace: &str,
    selector: &LabelSelector,
    baseline: &str,
) -> StateResult<bool> {
    Ok(find_canary(repo, namespace, selector, baseline)?.is_some())
}
