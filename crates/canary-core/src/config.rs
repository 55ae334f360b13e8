//! canaryd.toml configuration parser.
//!
//! Every field is optional; the accessor methods supply defaults so a
//! missing file and an empty file behave the same.

use serde::{Deserialize, Serialize};
use std::path::Path;

pub const DEFAULT_CANARY_REPLICAS: u32 = 1;
pub const DEFAULT_SCALE_STEP: u32 = 1;
pub const DEFAULT_BASELINE_FLOOR: u32 = 0;
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
pub const DEFAULT_INITIAL_BACKOFF_MS: u64 = 50;
pub const DEFAULT_MAX_BACKOFF_MS: u64 = 2_000;
pub const DEFAULT_BACKOFF_MULTIPLIER: u32 = 2;
pub const DEFAULT_API_PORT: u16 = 8480;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CanarydConfig {
    pub controller: Option<ControllerSection>,
    pub retry: Option<RetrySection>,
    pub api: Option<ApiSection>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ControllerSection {
    /// Restrict reconciliation to one namespace. Unset means all.
    pub namespace: Option<String>,
    pub canary_replicas: Option<u32>,
    pub scale_step: Option<u32>,
    pub baseline_floor: Option<u32>,
    pub rollback_on_delete: Option<bool>,
    /// Periodic full resync. Zero or unset disables it.
    pub resync_interval_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RetrySection {
    pub max_attempts: Option<u32>,
    pub initial_backoff_ms: Option<u64>,
    pub max_backoff_ms: Option<u64>,
    pub multiplier: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiSection {
    pub port: Option<u16>,
}

impl CanarydConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: CanarydConfig = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    fn controller(&self) -> ControllerSection {
        self.controller.clone().unwrap_or_default()
    }

    fn retry(&self) -> RetrySection {
        self.retry.clone().unwrap_or_default()
    }

    pub fn namespace(&self) -> Option<String> {
        self.controller().namespace.filter(|ns| !ns.is_empty())
    }

    pub fn canary_replicas(&self) -> u32 {
        self.controller()
            .canary_replicas
            .unwrap_or(DEFAULT_CANARY_REPLICAS)
    }

    pub fn scale_step(&self) -> u32 {
        self.controller().scale_step.unwrap_or(DEFAULT_SCALE_STEP)
    }

    pub fn baseline_floor(&self) -> u32 {
        self.controller()
            .baseline_floor
            .unwrap_or(DEFAULT_BASELINE_FLOOR)
    }

    pub fn rollback_on_delete(&self) -> bool {
        self.controller().rollback_on_delete.unwrap_or(true)
    }

    pub fn resync_interval_secs(&self) -> Option<u64> {
        self.controller()
            .resync_interval_secs
            .filter(|secs| *secs > 0)
    }

    pub fn max_attempts(&self) -> u32 {
        self.retry().max_attempts.unwrap_or(DEFAULT_MAX_ATTEMPTS).max(1)
    }

    pub fn initial_backoff_ms(&self) -> u64 {
        self.retry()
            .initial_backoff_ms
            .unwrap_or(DEFAULT_INITIAL_BACKOFF_MS)
    }

    pub fn max_backoff_ms(&self) -> u64 {
        self.retry().max_backoff_ms.unwrap_or(DEFAULT_MAX_BACKOFF_MS)
    }

    pub fn backoff_multiplier(&self) -> u32 {
        self.retry()
            .multiplier
            .unwrap_or(DEFAULT_BACKOFF_MULTIPLIER)
            .max(1)
    }

    pub fn api_port(&self) -> u16 {
        self.api
            .as_ref()
            .and_then(|a| a.port)
            .unwrap_or(DEFAULT_API_PORT)
    }

    /// A copy with every field set to its effective value.
    pub fn resolved(&self) -> Self {
        Self {
            controller: Some(ControllerSection {
                namespace: self.namespace(),
                canary_replicas: Some(self.canary_replicas()),
                scale_step: Some(self.scale_step()),
                baseline_floor: Some(self.baseline_floor()),
                rollback_on_delete: Some(self.rollback_on_delete()),
                resync_interval_secs: Some(self.resync_interval_secs().unwrap_or(0)),
            }),
            retry: Some(RetrySection {
                max_attempts: Some(self.max_attempts()),
                initial_backoff_ms: Some(self.initial_backoff_ms()),
                max_backoff_ms: Some(self.max_backoff_ms()),
                multiplier: Some(self.backoff_multiplier()),
            }),
            api: Some(ApiSection {
                port: Some(self.api_port()),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let config: CanarydConfig = toml::from_str("").unwrap();
        assert_eq!(config.namespace(), None);
        assert_eq!(config.canary_replicas(), 1);
        assert_eq!(config.scale_step(), 1);
        assert_eq!(config.baseline_floor(), 0);
        assert!(config.rollback_on_delete());
        assert_eq!(config.resync_interval_secs(), None);
        assert_eq!(config.max_attempts(), DEFAULT_MAX_ATTEMPTS);
        assert_eq!(config.api_port(), DEFAULT_API_PORT);
    }

    #[test]
    fn parses_all_sections() {
        let toml_str = r#"
[controller]
namespace = "prod"
canary_replicas = 2
baseline_floor = 1
rollback_on_delete = false
resync_interval_secs = 30

[retry]
max_attempts = 8
initial_backoff_ms = 10
max_backoff_ms = 500
multiplier = 3

[api]
port = 9000
"#;
        let config: CanarydConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.namespace().as_deref(), Some("prod"));
        assert_eq!(config.canary_replicas(), 2);
        assert_eq!(config.baseline_floor(), 1);
        assert!(!config.rollback_on_delete());
        assert_eq!(config.resync_interval_secs(), Some(30));
        assert_eq!(config.max_attempts(), 8);
        assert_eq!(config.initial_backoff_ms(), 10);
        assert_eq!(config.max_backoff_ms(), 500);
        assert_eq!(config.backoff_multiplier(), 3);
        assert_eq!(config.api_port(), 9000);
    }

    #[test]
    fn degenerate_values_are_clamped() {
        let toml_str = r#"
[controller]
namespace = ""
resync_interval_secs = 0

[retry]
max_attempts = 0
multiplier = 0
"#;
        let config: CanarydConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.namespace(), None);
        assert_eq!(config.resync_interval_secs(), None);
        assert_eq!(config.max_attempts(), 1);
        assert_eq!(config.backoff_multiplier(), 1);
    }

    #[test]
    fn from_file_reads_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("canaryd.toml");
        std::fs::write(&path, "[controller]\ncanary_replicas = 3\n").unwrap();
        let config = CanarydConfig::from_file(&path).unwrap();
        assert_eq!(config.canary_replicas(), 3);
        assert!(config.to_toml_string().unwrap().contains("canary_replicas = 3"));
    }

    #[test]
    fn resolved_fills_defaults() {
        let resolved = CanarydConfig::default().resolved();
        let text = resolved.to_toml_string().unwrap();
        assert!(text.contains("scale_step = 1"));
        assert!(text.contains("port = 8480"));
        let reparsed: CanarydConfig = toml::from_str(&text).unwrap();
        assert_eq!(reparsed.max_backoff_ms(), DEFAULT_MAX_BACKOFF_MS);
        assert_eq!(reparsed.resync_interval_secs(), None);
    }
}
