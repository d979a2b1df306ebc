//! Settings file for the CLI.
//!
//! ```yaml
//! routing:
//!   default_platform: claude
//!   tiers:
//!     - { platform: gemini, quota_key: gemini_free, unit_cost: 0.0, rank: 1 }
//!     - { platform: claude, quota_key: claude_subscription, unit_cost: 1.0, rank: 2 }
//! runtime:
//!   concurrency_limit: 4
//!   retry: { max_retries: 3, base_delay: 1s, max_delay: 60s }
//! platforms:
//!   - { id: gemini, adapter: mock, config: { latency: 200ms } }
//!   - { id: claude, adapter: mock }
//! quota:
//!   gemini_free: { used: 120, limit: 1500 }
//! cost_store: ./costs.sqlite
//! ```
//!
//! Every section is optional. Without `platforms`, each routed platform gets
//! a mock adapter.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::Value as JsonValue;

use switchyard_core::{QuotaStatus, RoutingConfig};
use switchyard_runtime::{
    AdapterSet, CostStore, FactoryRegistry, Orchestrator, PlatformSpec, QuotaTracker,
    RuntimeConfig,
};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Kept untyped until [`Settings::routing`] so it goes through schema validation
    pub routing: Option<JsonValue>,
    pub runtime: RuntimeConfig,
    pub platforms: Vec<PlatformSpec>,
    pub quota: BTreeMap<String, QuotaStatus>,
    pub cost_store: Option<PathBuf>,
}

impl Settings {
    /// Load `path`, or defaults when no settings file is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading settings file {}", path.display()))?;
        Self::from_yaml(&raw).with_context(|| format!("parsing settings file {}", path.display()))
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn routing(&self) -> Result<RoutingConfig> {
        match &self.routing {
            Some(value) => Ok(RoutingConfig::from_value(value.clone())?),
            None => Ok(RoutingConfig::default()),
        }
    }

    /// Declared platforms, or a mock adapter per routed platform.
    pub fn platform_specs(&self, routing: &RoutingConfig) -> Vec<PlatformSpec> {
        if !self.platforms.is_empty() {
            return self.platforms.clone();
        }

        let mut ids: Vec<String> = routing.tiers.iter().map(|t| t.platform.clone()).collect();
        ids.push(routing.default_platform.clone());
        ids.sort();
        ids.dedup();
        ids.into_iter()
            .map(|id| PlatformSpec {
                id,
                adapter: "mock".to_string(),
                config: JsonValue::Null,
            })
            .collect()
    }

    pub fn quota_tracker(&self) -> QuotaTracker {
        QuotaTracker::with_entries(
            self.quota
                .iter()
                .map(|(key, status)| (key.clone(), status.used, status.limit)),
        )
    }

    pub fn cost_store_path(&self) -> PathBuf {
        self.cost_store.clone().unwrap_or_else(CostStore::default_path)
    }

    /// Wire an orchestrator from these settings.
    pub fn orchestrator(&self) -> Result<Orchestrator> {
        let routing = self.routing()?;
        let specs = self.platform_specs(&routing);
        let adapters = AdapterSet::from_specs(&specs, &FactoryRegistry::with_defaults())?;

        let path = self.cost_store_path();
        let store = CostStore::open(&path)
            .with_context(|| format!("opening cost store {}", path.display()))?;
        tracing::debug!(path = %path.display(), platforms = specs.len(), "Loaded settings");

        Ok(Orchestrator::builder()
            .routing(routing)
            .config(self.runtime.clone())
            .adapters(adapters)
            .quota(Arc::new(self.quota_tracker()))
            .cost_store(Arc::new(store))
            .build()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use switchyard_core::QuotaView;

    #[test]
    fn test_empty_settings_use_defaults() {
        let settings = Settings::from_yaml("{}").unwrap();
        let routing = settings.routing().unwrap();
        assert_eq!(routing, RoutingConfig::default());

        let specs = settings.platform_specs(&routing);
        assert!(specs.iter().all(|s| s.adapter == "mock"));
        assert!(specs.iter().any(|s| s.id == routing.default_platform));
    }

    #[test]
    fn test_full_settings() {
        let yaml = r#"
routing:
  default_platform: claude
  tiers:
    - { platform: gemini, quota_key: gemini_free, unit_cost: 0.0, rank: 1 }
    - { platform: claude, quota_key: claude_subscription, unit_cost: 1.0, rank: 2 }
runtime:
  concurrency_limit: 2
  retry: { max_retries: 1, base_delay: 10ms, max_delay: 1s }
platforms:
  - { id: gemini, adapter: mock, config: { latency: 5ms } }
  - { id: claude, adapter: mock }
quota:
  gemini_free: { used: 120, limit: 1500 }
cost_store: /tmp/costs.sqlite
"#;
        let settings = Settings::from_yaml(yaml).unwrap();

        assert_eq!(settings.runtime.concurrency_limit, 2);
        assert_eq!(settings.runtime.retry.max_retries, 1);
        assert_eq!(settings.platforms.len(), 2);
        assert_eq!(settings.cost_store_path(), PathBuf::from("/tmp/costs.sqlite"));

        let quota = settings.quota_tracker();
        assert_eq!(quota.status()["gemini_free"].remaining(), Some(1380));
        assert_eq!(settings.routing().unwrap().tiers.len(), 2);
    }

    #[test]
    fn test_invalid_routing_is_rejected() {
        let settings = Settings::from_yaml("routing: { default_platform: claude, tiers: [] }").unwrap();
        assert!(settings.routing().is_err());
    }
}
