//! StateStore — redb-backed object persistence for canaryd.
//!
//! Provides revision-checked CRUD over workloads and desired states. All
//! values are JSON-serialized into redb's `&[u8]` value columns. The store
//! supports both on-disk and in-memory backends (the latter for testing).
//!
//! redb serializes write transactions, so the read-compare-write inside a
//! single transaction is atomic with respect to other writers.

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition, TableHandle};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use canary_core::{DesiredState, LabelSelector, ObjectMeta, Workload};

use crate::error::{StateError, StateResult};
use crate::repository::{DesiredStateRepository, WorkloadRepository};
use crate::tables::*;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

type ObjectTable = TableDefinition<'static, &'static str, &'static [u8]>;

/// Objects that carry an `ObjectMeta` and can be stored.
trait StoredObject: Clone + Serialize + DeserializeOwned {
    fn meta(&self) -> &ObjectMeta;
    fn meta_mut(&mut self) -> &mut ObjectMeta;
}

impl StoredObject for Workload {
    fn meta(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn meta_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }
}

impl StoredObject for DesiredState {
    fn meta(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn meta_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }
}

fn validate_meta(meta: &ObjectMeta) -> StateResult<()> {
    for (field, value) in [("name", &meta.name), ("namespace", &meta.namespace)] {
        if value.is_empty() {
            return Err(StateError::Invalid(format!("{field} must not be empty")));
        }
        if value.contains('/') {
            return Err(StateError::Invalid(format!(
                "{field} {value:?} must not contain '/'"
            )));
        }
    }
    Ok(())
}

/// Thread-safe object store backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
}

impl StateStore {
    /// Open (or create) a persistent store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory state store opened");
        Ok(store)
    }

    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(WORKLOADS).map_err(map_err!(Table))?;
        txn.open_table(DESIRED_STATES).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    // ── Generic object operations ─────────────────────────────────

    fn create_object<T: StoredObject>(&self, table: ObjectTable, obj: &T) -> StateResult<T> {
        validate_meta(obj.meta())?;
        let key = obj.meta().key();
        let mut stored = obj.clone();
        stored.meta_mut().resource_version = 1;
        let value = serde_json::to_vec(&stored).map_err(map_err!(Serialize))?;

        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut t = txn.open_table(table).map_err(map_err!(Table))?;
            let exists = t.get(key.as_str()).map_err(map_err!(Read))?.is_some();
            if exists {
                return Err(StateError::AlreadyExists(key));
            }
            t.insert(key.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%key, table = table.name(), "object created");
        Ok(stored)
    }

    fn update_object<T: StoredObject>(&self, table: ObjectTable, obj: &T) -> StateResult<T> {
        validate_meta(obj.meta())?;
        let key = obj.meta().key();

        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let stored = {
            let mut t = txn.open_table(table).map_err(map_err!(Table))?;
            let current: T = match t.get(key.as_str()).map_err(map_err!(Read))? {
                Some(guard) => {
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?
                }
                None => return Err(StateError::NotFound(key.clone())),
            };

            let actual = current.meta().resource_version;
            let expected = obj.meta().resource_version;
            if expected != actual {
                return Err(StateError::Conflict {
                    key: key.clone(),
                    expected,
                    actual,
                });
            }

            let mut next = obj.clone();
            next.meta_mut().resource_version = actual + 1;
            let value = serde_json::to_vec(&next).map_err(map_err!(Serialize))?;
            t.insert(key.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
            next
        };
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(
            %key,
            table = table.name(),
            version = stored.meta().resource_version,
            "object updated"
        );
        Ok(stored)
    }

    fn get_object<T: StoredObject>(&self, table: ObjectTable, key: &str) -> StateResult<Option<T>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let t = txn.open_table(table).map_err(map_err!(Table))?;
        match t.get(key).map_err(map_err!(Read))? {
            Some(guard) => {
                let obj: T =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(obj))
            }
            None => Ok(None),
        }
    }

    /// Scan a table, keeping objects under `prefix` that pass `keep`.
    fn scan_objects<T: StoredObject>(
        &self,
        table: ObjectTable,
        prefix: &str,
        keep: impl Fn(&T) -> bool,
    ) -> StateResult<Vec<T>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let t = txn.open_table(table).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in t.iter().map_err(map_err!(Read))? {
            let (key, value) = entry.map_err(map_err!(Read))?;
            if !key.value().starts_with(prefix) {
                continue;
            }
            let obj: T = serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            if keep(&obj) {
                results.push(obj);
            }
        }
        Ok(results)
    }

    fn remove_object<T: StoredObject>(&self, table: ObjectTable, key: &str) -> StateResult<Option<T>> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let removed = {
            let mut t = txn.open_table(table).map_err(map_err!(Table))?;
            match t.remove(key).map_err(map_err!(Write))? {
                Some(guard) => Some(
                    serde_json::from_slice::<T>(guard.value()).map_err(map_err!(Deserialize))?,
                ),
                None => None,
            }
        };
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%key, table = table.name(), existed = removed.is_some(), "object deleted");
        Ok(removed)
    }

    // ── Workloads ──────────────────────────────────────────────────

    pub fn create_workload(&self, workload: &Workload) -> StateResult<Workload> {
        self.create_object(WORKLOADS, workload)
    }

    pub fn update_workload(&self, workload: &Workload) -> StateResult<Workload> {
        self.update_object(WORKLOADS, workload)
    }

    /// Get a workload by `{namespace}/{name}` key.
    pub fn get_workload(&self, key: &str) -> StateResult<Option<Workload>> {
        self.get_object(WORKLOADS, key)
    }

    /// List workloads, optionally restricted to one namespace.
    pub fn list_workloads(&self, namespace: Option<&str>) -> StateResult<Vec<Workload>> {
        let prefix = namespace.map(|ns| format!("{ns}/")).unwrap_or_default();
        self.scan_objects(WORKLOADS, &prefix, |_: &Workload| true)
    }

    /// Delete a workload by key, returning the removed object.
    pub fn delete_workload(&self, key: &str) -> StateResult<Option<Workload>> {
        self.remove_object(WORKLOADS, key)
    }

    // ── Desired states ─────────────────────────────────────────────

    pub fn create_desired_state(&self, desired: &DesiredState) -> StateResult<DesiredState> {
        self.create_object(DESIRED_STATES, desired)
    }

    pub fn update_desired_state(&self, desired: &DesiredState) -> StateResult<DesiredState> {
        self.update_object(DESIRED_STATES, desired)
    }

    pub fn get_desired_state(&self, key: &str) -> StateResult<Option<DesiredState>> {
        self.get_object(DESIRED_STATES, key)
    }

    /// List desired states, optionally restricted to one namespace.
    pub fn list_desired_states_in(&self, namespace: Option<&str>) -> StateResult<Vec<DesiredState>> {
        let prefix = namespace.map(|ns| format!("{ns}/")).unwrap_or_default();
        self.scan_objects(DESIRED_STATES, &prefix, |_: &DesiredState| true)
    }

    /// Delete a desired state by key, returning the removed object.
    pub fn delete_desired_state(&self, key: &str) -> StateResult<Option<DesiredState>> {
        self.remove_object(DESIRED_STATES, key)
    }
}

impl WorkloadRepository for StateStore {
    fn list(&self, namespace: &str, selector: &LabelSelector) -> StateResult<Vec<Workload>> {
        let prefix = format!("{namespace}/");
        self.scan_objects(WORKLOADS, &prefix, |w: &Workload| {
            selector.matches(&w.metadata.labels)
        })
    }

    fn get(&self, namespace: &str, name: &str) -> StateResult<Workload> {
        let key = canary_core::object_key(namespace, name);
        self.get_workload(&key)?
            .ok_or(StateError::NotFound(key))
    }

    fn create(&self, workload: &Workload) -> StateResult<Workload> {
        self.create_workload(workload)
    }

    fn update(&self, workload: &Workload) -> StateResult<Workload> {
        self.update_workload(workload)
    }

    fn delete(&self, namespace: &str, name: &str) -> StateResult<bool> {
        let key = canary_core::object_key(namespace, name);
        Ok(self.delete_workload(&key)?.is_some())
    }
}

impl DesiredStateRepository for StateStore {
    fn list_desired_states(&self) -> StateResult<Vec<DesiredState>> {
        self.list_desired_states_in(None)
    }
}
