//! canary-state — embedded object store for canaryd.
//!
//! Backed by [redb](https://docs.rs/redb), holds workloads and desired-state
//! objects. Every object carries a `resource_version` revision token:
//! creates assign version 1, updates succeed only when the writer's version
//! matches the stored one and then bump it. A stale write is reported as
//! [`StateError::Conflict`] rather than silently overwriting.
//!
//! The [`WorkloadRepository`] and [`DesiredStateRepository`] traits are the
//! seams the reconciler programs against; [`StateStore`] implements both.

pub mod error;
pub mod repository;
pub mod store;
pub mod tables;

pub use error::{StateError, StateResult};
pub use repository::{DesiredStateRepository, WorkloadRepository};
pub use store::StateStore;
