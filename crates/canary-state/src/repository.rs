//! Repository traits consumed by the reconciler.
//!
//! Calls are synchronous: each maps onto a single redb transaction in
//! [`StateStore`](crate::StateStore). Writes are revision-checked; see
//! [`StateError::Conflict`](crate::StateError::Conflict).

use std::sync::Arc;

use canary_core::{DesiredState, LabelSelector, Workload};

use crate::error::StateResult;

/// Request/response access to workload objects.
pub trait WorkloadRepository: Send + Sync {
    /// Workloads in `namespace` whose labels satisfy `selector`.
    fn list(&self, namespace: &str, selector: &LabelSelector) -> StateResult<Vec<Workload>>;

    /// Fetch the current revision of a workload. Missing objects are
    /// reported as `StateError::NotFound`.
    fn get(&self, namespace: &str, name: &str) -> StateResult<Workload>;

    /// Create a workload. Fails with `StateError::AlreadyExists` when the
    /// name is taken.
    fn create(&self, workload: &Workload) -> StateResult<Workload>;

    /// Replace a workload. Fails with `StateError::Conflict` when
    /// `workload.metadata.resource_version` is stale.
    fn update(&self, workload: &Workload) -> StateResult<Workload>;

    /// Delete a workload. Returns true if it existed.
    fn delete(&self, namespace: &str, name: &str) -> StateResult<bool>;
}

/// Read access to stored desired-state objects, used for resyncs.
pub trait DesiredStateRepository: Send + Sync {
    fn list_desired_states(&self) -> StateResult<Vec<DesiredState>>;
}

impl<R: WorkloadRepository + ?Sized> WorkloadRepository for Arc<R> {
    fn list(&self, namespace: &str, selector: &LabelSelector) -> StateResult<Vec<Workload>> {
        (**self).list(namespace, selector)
    }

    fn get(&self, namespace: &str, name: &str) -> StateResult<Workload> {
        (**self).get(namespace, name)
    }

    fn create(&self, workload: &Workload) -> StateResult<Workload> {
        (**self).create(workload)
    }

    fn update(&self, workload: &Workload) -> StateResult<Workload> {
        (**self).update(workload)
    }

    fn delete(&self, namespace: &str, name: &str) -> StateResult<bool> {
        (**self).delete(namespace, name)
    }
}
