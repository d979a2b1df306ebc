//! Adapter factories and the live platform set.
//!
//! Adapter types register a factory that builds instances from JSON config,
//! so new backends can be added without touching an enum. An [`AdapterSet`]
//! holds the live adapter for each platform id.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;

use super::PlatformAdapter;

/// Errors from building adapters.
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Unknown adapter type '{adapter_type}'. Available: {available:?}")]
    UnknownAdapterType {
        adapter_type: String,
        available: Vec<String>,
    },

    #[error("Invalid config for platform '{platform}': {reason}")]
    InvalidConfig { platform: String, reason: String },

    #[error("Platform '{0}' is declared more than once")]
    DuplicatePlatform(String),
}

/// Factory for creating adapters from configuration.
pub trait AdapterFactory: Send + Sync {
    /// Unique identifier for this adapter type (e.g. "mock").
    fn adapter_type(&self) -> &'static str;

    /// Create an adapter serving `platform`.
    fn create(
        &self,
        platform: &str,
        config: &JsonValue,
    ) -> Result<Arc<dyn PlatformAdapter>, RegistryError>;

    /// Validate configuration without creating an adapter.
    fn validate_config(&self, platform: &str, config: &JsonValue) -> Result<(), RegistryError>;

    /// Human-readable description of this adapter type.
    fn description(&self) -> &'static str {
        "Platform adapter"
    }
}

/// Registry of available adapter factories.
#[derive(Default)]
pub struct FactoryRegistry {
    factories: BTreeMap<String, Arc<dyn AdapterFactory>>,
}

impl FactoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory, replacing any with the same type.
    pub fn register(&mut self, factory: Arc<dyn AdapterFactory>) {
        self.factories
            .insert(factory.adapter_type().to_string(), factory);
    }

    /// Create an adapter of `adapter_type` serving `platform`.
    pub fn create(
        &self,
        adapter_type: &str,
        platform: &str,
        config: &JsonValue,
    ) -> Result<Arc<dyn PlatformAdapter>, RegistryError> {
        self.factory(adapter_type)?.create(platform, config)
    }

    /// Validate configuration for an adapter type.
    pub fn validate(
        &self,
        adapter_type: &str,
        platform: &str,
        config: &JsonValue,
    ) -> Result<(), RegistryError> {
        self.factory(adapter_type)?.validate_config(platform, config)
    }

    pub fn available_types(&self) -> Vec<&str> {
        self.factories.keys().map(|s| s.as_str()).collect()
    }

    fn factory(&self, adapter_type: &str) -> Result<&Arc<dyn AdapterFactory>, RegistryError> {
        self.factories
            .get(adapter_type)
            .ok_or_else(|| RegistryError::UnknownAdapterType {
                adapter_type: adapter_type.to_string(),
                available: self.available_types().iter().map(|s| s.to_string()).collect(),
            })
    }

    /// Registry with the built-in adapter types.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(super::MockAdapterFactory));
        registry
    }
}

impl std::fmt::Debug for FactoryRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FactoryRegistry")
            .field("adapter_types", &self.available_types())
            .finish()
    }
}

/// Declarative description of one platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlatformSpec {
    /// Platform id, as used in cost tiers
    pub id: String,

    /// Adapter type registered in the factory registry
    pub adapter: String,

    /// Adapter-specific configuration
    #[serde(default)]
    pub config: JsonValue,
}

/// Live adapters keyed by platform id.
#[derive(Default, Clone)]
pub struct AdapterSet {
    adapters: BTreeMap<String, Arc<dyn PlatformAdapter>>,
}

impl AdapterSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build adapters for every spec.
    pub fn from_specs(specs: &[PlatformSpec], factories: &FactoryRegistry) -> Result<Self, RegistryError> {
        let mut set = Self::new();
        for spec in specs {
            if set.contains(&spec.id) {
                return Err(RegistryError::DuplicatePlatform(spec.id.clone()));
            }
            factories.validate(&spec.adapter, &spec.id, &spec.config)?;
            let adapter = factories.create(&spec.adapter, &spec.id, &spec.config)?;
            set.insert(spec.id.clone(), adapter);
        }
        Ok(set)
    }

    /// Register an adapter under `platform`, replacing any existing one.
    pub fn insert(&mut self, platform: impl Into<String>, adapter: Arc<dyn PlatformAdapter>) {
        self.adapters.insert(platform.into(), adapter);
    }

    /// Builder-style [`insert`](Self::insert) keyed by the adapter's own name.
    pub fn with(mut self, adapter: Arc<dyn PlatformAdapter>) -> Self {
        let name = adapter.name().to_string();
        self.adapters.insert(name, adapter);
        self
    }

    pub fn get(&self, platform: &str) -> Option<Arc<dyn PlatformAdapter>> {
        self.adapters.get(platform).cloned()
    }

    pub fn contains(&self, platform: &str) -> bool {
        self.adapters.contains_key(platform)
    }

    pub fn platforms(&self) -> Vec<&str> {
        self.adapters.keys().map(|s| s.as_str()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}

impl std::fmt::Debug for AdapterSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterSet")
            .field("platforms", &self.platforms())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platforms::MockAdapter;

    #[test]
    fn test_registry_defaults() {
        let registry = FactoryRegistry::with_defaults();
        assert_eq!(registry.available_types(), vec!["mock"]);
    }

    #[test]
    fn test_registry_unknown_type() {
        let registry = FactoryRegistry::new();
        let result = registry.create("unknown", "p", &serde_json::json!({}));

        match result {
            Err(RegistryError::UnknownAdapterType { adapter_type, .. }) => {
                assert_eq!(adapter_type, "unknown");
            }
            _ => panic!("Expected UnknownAdapterType error"),
        }
    }

    #[test]
    fn test_adapter_set_from_specs() {
        let specs = vec![
            PlatformSpec {
                id: "gemini".to_string(),
                adapter: "mock".to_string(),
                config: serde_json::json!({"model": "gemini-2.5-flash"}),
            },
            PlatformSpec {
                id: "claude".to_string(),
                adapter: "mock".to_string(),
                config: JsonValue::Null,
            },
        ];
        let set = AdapterSet::from_specs(&specs, &FactoryRegistry::with_defaults()).unwrap();
        assert_eq!(set.platforms(), vec!["claude", "gemini"]);
        assert_eq!(set.get("gemini").unwrap().name(), "gemini");
    }

    #[test]
    fn test_duplicate_platform_rejected() {
        let spec = PlatformSpec {
            id: "a".to_string(),
            adapter: "mock".to_string(),
            config: JsonValue::Null,
        };
        let result = AdapterSet::from_specs(&[spec.clone(), spec], &FactoryRegistry::with_defaults());
        assert!(matches!(result, Err(RegistryError::DuplicatePlatform(_))));
    }

    #[test]
    fn test_with_uses_adapter_name() {
        let set = AdapterSet::new().with(Arc::new(MockAdapter::new("local")));
        assert!(set.contains("local"));
    }
}
