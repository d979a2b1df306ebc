//! JSON Schema validation for routing configuration.
//!
//! The schema is embedded at compile time and compiled once.

use std::sync::OnceLock;

/// Embedded routing schema.
const ROUTING_SCHEMA_JSON: &str = include_str!("../../schema/routing.schema.json");

/// Compiled JSON Schema validator (initialized once, reused).
static COMPILED_SCHEMA: OnceLock<Result<jsonschema::Validator, String>> = OnceLock::new();

fn get_validator() -> Result<&'static jsonschema::Validator, String> {
    let result = COMPILED_SCHEMA.get_or_init(|| {
        let schema_value: serde_json::Value = match serde_json::from_str(ROUTING_SCHEMA_JSON) {
            Ok(v) => v,
            Err(e) => return Err(format!("Invalid schema JSON: {}", e)),
        };

        match jsonschema::options().build(&schema_value) {
            Ok(v) => Ok(v),
            Err(e) => Err(format!("Failed to compile schema: {}", e)),
        }
    });

    result.as_ref().map_err(Clone::clone)
}

/// Validate a routing config value against the schema.
///
/// Returns every violation, each suffixed with its instance path.
pub fn validate_routing_schema(config_json: &serde_json::Value) -> Result<(), Vec<String>> {
    let validator = get_validator().map_err(|e| vec![e])?;

    let errors: Vec<String> = validator
        .iter_errors(config_json)
        .map(|e| format!("{} at {}", e, e.instance_path))
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_valid_config() {
        let config = json!({
            "default_platform": "claude",
            "tiers": [{"platform": "claude", "quota_key": "claude", "rank": 1}]
        });
        assert!(validate_routing_schema(&config).is_ok());
    }

    #[test]
    fn test_missing_tiers() {
        let config = json!({"default_platform": "claude"});
        let errors = validate_routing_schema(&config).unwrap_err();
        assert!(!errors.is_empty());
    }

    #[test]
    fn test_negative_cost_rejected() {
        let config = json!({
            "default_platform": "claude",
            "tiers": [{"platform": "a", "quota_key": "a", "unit_cost": -1.0, "rank": 1}]
        });
        assert!(validate_routing_schema(&config).is_err());
    }
}
