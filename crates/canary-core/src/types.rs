//! Shared object types used across canaryd crates.
//!
//! Field names on the wire follow the camelCase convention of the
//! resources they model (`labelSelectors`, `rolloutPolicy`,
//! `resourceVersion`).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Label key carrying the role marker of a workload.
pub const ROLE_LABEL: &str = "role";

/// Role marker value for workloads created by the canary controller.
pub const ROLE_AUTO_CANARY: &str = "auto-canary";

/// Annotation on a canary naming the baseline it was cloned from.
pub const BASELINE_ANNOTATION: &str = "canary.rollout.io/baseline";

/// Annotation on a canary naming the owning desired state (`namespace/name`).
pub const OWNER_ANNOTATION: &str = "canary.rollout.io/owner";

/// Annotation on a baseline recording its replica count before the first
/// scale-down.
pub const ORIGINAL_REPLICAS_ANNOTATION: &str = "canary.rollout.io/original-replicas";

/// Prefix prepended to a baseline name to derive its canary name.
pub const CANARY_NAME_PREFIX: &str = "canary-";

/// Identity and bookkeeping shared by every stored object.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    pub name: String,
    pub namespace: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
    /// Revision token assigned by the repository. Zero until first stored.
    #[serde(default)]
    pub resource_version: u64,
}

impl ObjectMeta {
    pub fn new(namespace: &str, name: &str) -> Self {
        Self {
            name: name.to_string(),
            namespace: namespace.to_string(),
            ..Default::default()
        }
    }

    /// Composite `{namespace}/{name}` key.
    pub fn key(&self) -> String {
        object_key(&self.namespace, &self.name)
    }
}

/// Build the `{namespace}/{name}` key used for storage and logging.
pub fn object_key(namespace: &str, name: &str) -> String {
    format!("{namespace}/{name}")
}

// ── Desired state ─────────────────────────────────────────────────

/// User-declared rollout intent (the `CanaryDeploy` resource).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesiredState {
    pub metadata: ObjectMeta,
    pub spec: DesiredStateSpec,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DesiredStateSpec {
    /// Comma-separated label requirements, e.g. `app=web,tier!=cache`.
    pub label_selectors: String,
    /// Image reference the matching workloads should run.
    pub image: String,
    #[serde(default)]
    pub rollout_policy: RolloutPolicy,
}

/// Declared pacing of a rollout. Both fields are free-form strings on the
/// wire and may be empty.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RolloutPolicy {
    #[serde(default)]
    pub duration: String,
    #[serde(default)]
    pub rate_of_change: String,
}

impl DesiredState {
    pub fn new(namespace: &str, name: &str, selector: &str, image: &str) -> Self {
        Self {
            metadata: ObjectMeta::new(namespace, name),
            spec: DesiredStateSpec {
                label_selectors: selector.to_string(),
                image: image.to_string(),
                rollout_policy: RolloutPolicy::default(),
            },
        }
    }

    pub fn key(&self) -> String {
        self.metadata.key()
    }
}

/// A change notification for a desired-state object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DesiredStateEvent {
    Added(DesiredState),
    Updated { old: DesiredState, new: DesiredState },
    Deleted(DesiredState),
}

impl DesiredStateEvent {
    /// The object the event is about (the new version for updates).
    pub fn object(&self) -> &DesiredState {
        match self {
            Self::Added(d) | Self::Deleted(d) => d,
            Self::Updated { new, .. } => new,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Added(_) => "add",
            Self::Updated { .. } => "update",
            Self::Deleted(_) => "delete",
        }
    }
}

// ── Workload ──────────────────────────────────────────────────────

/// An orchestrated unit with a replica count and running containers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workload {
    pub metadata: ObjectMeta,
    pub spec: WorkloadSpec,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WorkloadSpec {
    pub replicas: u32,
    #[serde(default)]
    pub containers: Vec<Container>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Container {
    pub name: String,
    pub image: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
}

impl Container {
    pub fn new(name: &str, image: &str) -> Self {
        Self {
            name: name.to_string(),
            image: image.to_string(),
            args: Vec::new(),
            env: BTreeMap::new(),
        }
    }
}

impl Workload {
    /// Single-container workload.
    pub fn new(namespace: &str, name: &str, image: &str, replicas: u32) -> Self {
        Self {
            metadata: ObjectMeta::new(namespace, name),
            spec: WorkloadSpec {
                replicas,
                containers: vec![Container::new(name, image)],
            },
        }
    }

    /// Builder-style label setter.
    pub fn with_label(mut self, key: &str, value: &str) -> Self {
        self.metadata
            .labels
            .insert(key.to_string(), value.to_string());
        self
    }

    pub fn key(&self) -> String {
        self.metadata.key()
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn namespace(&self) -> &str {
        &self.metadata.namespace
    }

    /// Image of the first container, if any.
    pub fn primary_image(&self) -> Option<&str> {
        self.spec.containers.first().map(|c| c.image.as_str())
    }

    /// Replace the image of the first container. Returns false when the
    /// workload has no containers.
    pub fn set_primary_image(&mut self, image: &str) -> bool {
        match self.spec.containers.first_mut() {
            Some(c) => {
                c.image = image.to_string();
                true
            }
            None => false,
        }
    }

    /// Whether this workload carries the `role=auto-canary` marker.
    pub fn is_canary(&self) -> bool {
        self.metadata.labels.get(ROLE_LABEL).map(String::as_str) == Some(ROLE_AUTO_CANARY)
    }

    /// Name of the canary derived from this workload.
    pub fn canary_name(&self) -> String {
        canary_name_for(&self.metadata.name)
    }

    /// Replica count recorded before the first scale-down, if present and
    /// well-formed.
    pub fn original_replicas(&self) -> Option<u32> {
        self.metadata
            .annotations
            .get(ORIGINAL_REPLICAS_ANNOTATION)
            .and_then(|v| v.parse().ok())
    }
}

/// Derive the canary name for a baseline.
pub fn canary_name_for(baseline: &str) -> String {
    format!("{CANARY_NAME_PREFIX}{baseline}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn desired_state_uses_camel_case_wire_format() {
        let json = r#"{
            "metadata": {"name": "web-rollout", "namespace": "default"},
            "spec": {
                "labelSelectors": "app=web",
                "image": "web:v2",
                "rolloutPolicy": {"duration": "10m", "rateOfChange": "10%"}
            }
        }"#;
        let ds: DesiredState = serde_json::from_str(json).unwrap();
        assert_eq!(ds.spec.label_selectors, "app=web");
        assert_eq!(ds.spec.rollout_policy.rate_of_change, "10%");
        assert_eq!(ds.metadata.resource_version, 0);
        assert_eq!(ds.key(), "default/web-rollout");
    }

    #[test]
    fn rollout_policy_is_optional() {
        let json = r#"{
            "metadata": {"name": "r", "namespace": "ns"},
            "spec": {"labelSelectors": "app=web", "image": "web:v2"}
        }"#;
        let ds: DesiredState = serde_json::from_str(json).unwrap();
        assert_eq!(ds.spec.rollout_policy, RolloutPolicy::default());
    }

    #[test]
    fn canary_marker_detection() {
        let w = Workload::new("default", "web", "web:v1", 3);
        assert!(!w.is_canary());
        let c = w.clone().with_label(ROLE_LABEL, ROLE_AUTO_CANARY);
        assert!(c.is_canary());
        let other = w.with_label(ROLE_LABEL, "frontend");
        assert!(!other.is_canary());
    }

    #[test]
    fn primary_image_reads_first_container() {
        let mut w = Workload::new("default", "web", "web:v1", 1);
        w.spec.containers.push(Container::new("sidecar", "envoy:1"));
        assert_eq!(w.primary_image(), Some("web:v1"));
        assert!(w.set_primary_image("web:v2"));
        assert_eq!(w.primary_image(), Some("web:v2"));
        assert_eq!(w.spec.containers[1].image, "envoy:1");

        w.spec.containers.clear();
        assert_eq!(w.primary_image(), None);
        assert!(!w.set_primary_image("web:v3"));
    }

    #[test]
    fn canary_name_and_original_replicas() {
        let mut w = Workload::new("default", "web", "web:v1", 4);
        assert_eq!(w.canary_name(), "canary-web");
        assert_eq!(w.original_replicas(), None);

        w.metadata
            .annotations
            .insert(ORIGINAL_REPLICAS_ANNOTATION.to_string(), "4".to_string());
        assert_eq!(w.original_replicas(), Some(4));

        w.metadata
            .annotations
            .insert(ORIGINAL_REPLICAS_ANNOTATION.to_string(), "four".to_string());
        assert_eq!(w.original_replicas(), None);
    }

    #[test]
    fn event_object_is_newest_version() {
        let old = DesiredState::new("default", "r", "app=web", "web:v2");
        let mut new = old.clone();
        new.spec.image = "web:v3".to_string();
        let ev = DesiredStateEvent::Updated { old, new };
        assert_eq!(ev.object().spec.image, "web:v3");
        assert_eq!(ev.kind(), "update");
    }
}
