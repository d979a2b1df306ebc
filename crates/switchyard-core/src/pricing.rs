//! Per-model pricing and pre-flight cost estimation.
//!
//! Rates are USD per million tokens. Unknown models price at zero rather
//! than failing: an unpriced task is still recorded, it just costs nothing.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::types::TokenUsage;

/// Default token count above which `should_warn_cost` fires.
pub const DEFAULT_COST_WARN_TOKENS: u64 = 10_000;

/// Input/output rates for one model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelPricing {
    /// USD per million input tokens
    pub input_per_mtok: f64,

    /// USD per million output tokens
    pub output_per_mtok: f64,
}

impl ModelPricing {
    pub fn new(input_per_mtok: f64, output_per_mtok: f64) -> Self {
        Self {
            input_per_mtok,
            output_per_mtok,
        }
    }

    pub fn free() -> Self {
        Self::new(0.0, 0.0)
    }

    /// Cost of `usage` at these rates.
    pub fn cost(&self, usage: &TokenUsage) -> f64 {
        let input_cost = (usage.input_tokens as f64 / 1_000_000.0) * self.input_per_mtok;
        let output_cost = (usage.output_tokens as f64 / 1_000_000.0) * self.output_per_mtok;
        input_cost + output_cost
    }
}

/// Result of a pre-flight estimate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CostEstimate {
    pub estimated_tokens: u64,
    pub cost: f64,
}

/// Model name → pricing.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PricingTable {
    models: BTreeMap<String, ModelPricing>,
}

impl PricingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a model's rates.
    pub fn insert(&mut self, model: impl Into<String>, pricing: ModelPricing) {
        self.models.insert(model.into(), pricing);
    }

    /// Look up a model. Exact names win; otherwise the longest table key
    /// contained in `model` is used, so dated model ids resolve to their
    /// family entry.
    pub fn lookup(&self, model: &str) -> Option<&ModelPricing> {
        if let Some(p) = self.models.get(model) {
            return Some(p);
        }
        self.models
            .iter()
            .filter(|(key, _)| model.contains(key.as_str()))
            .max_by_key(|(key, _)| key.len())
            .map(|(_, p)| p)
    }

    /// Cost of `usage` on `model`; zero for unknown models.
    pub fn cost_for(&self, model: &str, usage: &TokenUsage) -> f64 {
        self.lookup(model)
            .map(|p| p.cost(usage))
            .unwrap_or(0.0)
    }

    /// Approximate cost of sending `prompt` to `model`.
    pub fn estimate_cost(&self, prompt: &str, model: &str) -> CostEstimate {
        let estimated_tokens = estimate_tokens(prompt);
        let cost = self.cost_for(model, &TokenUsage::new(estimated_tokens, 0));
        CostEstimate {
            estimated_tokens,
            cost,
        }
    }

    /// True only when the estimated token count exceeds `threshold_tokens`.
    /// Advisory; callers may proceed regardless.
    pub fn should_warn_cost(&self, prompt: &str, model: &str, threshold_tokens: u64) -> bool {
        let estimate = self.estimate_cost(prompt, model);
        let warn = estimate.estimated_tokens > threshold_tokens;
        if warn {
            tracing::warn!(
                model = %model,
                estimated_tokens = estimate.estimated_tokens,
                estimated_cost = estimate.cost,
                threshold = threshold_tokens,
                "Prompt exceeds cost warning threshold"
            );
        }
        warn
    }

    pub fn models(&self) -> impl Iterator<Item = (&str, &ModelPricing)> {
        self.models.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Built-in rates (USD per million tokens).
    pub fn builtin() -> Self {
        let mut table = Self::new();
        table.insert("claude-sonnet-4-5", ModelPricing::new(3.0, 15.0));
        table.insert("claude-opus-4-5", ModelPricing::new(5.0, 25.0));
        table.insert("claude-haiku-4-5", ModelPricing::new(1.0, 5.0));
        table.insert("gpt-4o-mini", ModelPricing::new(0.15, 0.6));
        table.insert("gpt-4o", ModelPricing::new(2.5, 10.0));
        table.insert("gemini-2.5-flash", ModelPricing::free());
        table.insert("llama-3.3-70b", ModelPricing::free());
        table
    }
}

/// Rough token count: about four characters per token.
pub fn estimate_tokens(text: &str) -> u64 {
    (text.chars().count() / 4) as u64
}
