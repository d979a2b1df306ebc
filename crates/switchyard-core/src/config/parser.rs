//! Routing config parsing from YAML/JSON.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

use super::schema::validate_routing_schema;
use crate::pricing::PricingTable;
use crate::router::Router;
use crate::tiers::{CostTier, CostTiers};

/// Errors raised while loading or validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Config does not match schema: {}", .0.join("; "))]
    SchemaViolation(Vec<String>),

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

impl ConfigError {
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Tier table, pricing table and fallback platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingConfig {
    /// Platform used when every tier is out of quota
    pub default_platform: String,

    /// Cost tiers, any order; sorted by rank on load
    pub tiers: Vec<CostTier>,

    /// Model pricing
    #[serde(default)]
    pub pricing: PricingTable,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            default_platform: "claude".to_string(),
            tiers: CostTiers::builtin().iter().cloned().collect(),
            pricing: PricingTable::builtin(),
        }
    }
}

impl RoutingConfig {
    /// Parse from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let value: serde_json::Value = serde_yaml::from_str(yaml)?;
        Self::from_value(value)
    }

    /// Parse from a JSON string.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let value: serde_json::Value = serde_json::from_str(json)?;
        Self::from_value(value)
    }

    /// Parse from a YAML file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Schema-check, deserialize and validate an already-parsed value.
    pub fn from_value(value: serde_json::Value) -> Result<Self, ConfigError> {
        validate_routing_schema(&value).map_err(ConfigError::SchemaViolation)?;
        let mut config: RoutingConfig = serde_json::from_value(value)?;
        config.tiers.sort_by_key(|t| t.rank);
        config.validate()?;
        Ok(config)
    }

    /// Semantic checks the schema cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_platform.trim().is_empty() {
            return Err(ConfigError::invalid("default_platform", "must not be empty"));
        }

        if self.tiers.is_empty() {
            return Err(ConfigError::invalid("tiers", "at least one tier is required"));
        }

        let mut ranks = std::collections::HashSet::new();
        for tier in &self.tiers {
            if !ranks.insert(tier.rank) {
                return Err(ConfigError::invalid(
                    "tiers",
                    format!("duplicate rank {}", tier.rank),
                ));
            }
            if !tier.unit_cost.is_finite() || tier.unit_cost < 0.0 {
                return Err(ConfigError::invalid(
                    format!("tiers.{}.unit_cost", tier.platform),
                    "must be a non-negative number",
                ));
            }
        }

        for (model, pricing) in self.pricing.models() {
            if pricing.input_per_mtok < 0.0 || pricing.output_per_mtok < 0.0 {
                return Err(ConfigError::invalid(
                    format!("pricing.{}", model),
                    "rates must be non-negative",
                ));
            }
        }

        Ok(())
    }

    /// Ordered tier table.
    pub fn cost_tiers(&self) -> CostTiers {
        CostTiers::new(self.tiers.clone())
    }

    /// Router over this config's tiers.
    pub fn router(&self) -> Router {
        Router::new(self.cost_tiers(), self.default_platform.clone())
    }
}
