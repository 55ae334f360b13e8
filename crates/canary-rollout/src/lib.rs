//! canary-rollout — progressive canary rollout engine.
//!
//! Reconciles `CanaryDeploy` desired states against live workloads: for
//! every selected baseline not yet running the desired image, a canary
//! clone on the new image is created (or converged) and the baseline gives
//! up a replica to it.
//!
//! # Components
//!
//! - **`diff`**: find baselines whose primary image differs from the desired one
//! - **`resolver`**: check whether a baseline already has a canary
//! - **`actuator`**: create/update canaries, scale/restore baselines under
//!   optimistic concurrency with bounded backoff
//! - **`reconciler`**: per-event orchestration and delete rollback
//! - **`controller`**: feed consumption, namespace scoping, periodic resync
//! - **`feed`**: typed desired-state change channel
//! - **`policy`**: rollout policy validation

pub mod actuator;
pub mod context;
pub mod controller;
pub mod diff;
pub mod error;
pub mod feed;
pub mod policy;
pub mod reconciler;
pub mod resolver;
pub mod retry;

pub use actuator::{Actuator, CanaryAction, CanaryOutcome, ScaleOutcome};
pub use context::{ControllerContext, RolloutSettings};
pub use controller::Controller;
pub use error::{RolloutError, RolloutResult};
pub use feed::{ChangeFeed, FeedReceiver};
pub use reconciler::{EventOutcome, ReconcileReport, Reconciler, RollbackReport, TaskReport};
pub use retry::RetryPolicy;
