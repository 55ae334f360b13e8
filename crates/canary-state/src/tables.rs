//! redb table definitions for the canaryd object store.
//!
//! Both tables use `{namespace}/{name}` keys and JSON-serialized values.

use redb::TableDefinition;

/// Workload objects keyed by `{namespace}/{name}`.
pub const WORKLOADS: TableDefinition<&str, &[u8]> = TableDefinition::new("workloads");

/// Desired-state (`CanaryDeploy`) objects keyed by `{namespace}/{name}`.
pub const DESIRED_STATES: TableDefinition<&str, &[u8]> = TableDefinition::new("desired_states");
