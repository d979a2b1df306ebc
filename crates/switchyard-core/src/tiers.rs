//! Cost tiers used for routing.
//!
//! Tiers are kept sorted ascending by `rank`; lower rank means cheaper and
//! is tried first.

use serde::{Deserialize, Serialize};

/// One routing priority rung.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostTier {
    /// Platform served by this tier
    pub platform: String,

    /// Key consulted in the quota tracker
    pub quota_key: String,

    /// Relative unit cost (0.0 marks a free tier)
    #[serde(default)]
    pub unit_cost: f64,

    /// Priority rank, ascending
    pub rank: u32,
}

impl CostTier {
    pub fn new(
        platform: impl Into<String>,
        quota_key: impl Into<String>,
        unit_cost: f64,
        rank: u32,
    ) -> Self {
        Self {
            platform: platform.into(),
            quota_key: quota_key.into(),
            unit_cost,
            rank,
        }
    }

    /// Free tiers are subject to quota threshold warnings.
    pub fn is_free(&self) -> bool {
        self.unit_cost == 0.0
    }
}

/// Ordered tier table.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CostTiers {
    tiers: Vec<CostTier>,
}

impl CostTiers {
    /// Build a table, sorting by rank.
    pub fn new(mut tiers: Vec<CostTier>) -> Self {
        tiers.sort_by_key(|t| t.rank);
        Self { tiers }
    }

    /// Tiers in ascending rank order.
    pub fn iter(&self) -> impl Iterator<Item = &CostTier> {
        self.tiers.iter()
    }

    /// First tier serving `platform`.
    pub fn for_platform(&self, platform: &str) -> Option<&CostTier> {
        self.tiers.iter().find(|t| t.platform == platform)
    }

    /// Quota key for a platform. Platforms outside the table use their own
    /// name as key.
    pub fn quota_key_for<'a>(&'a self, platform: &'a str) -> &'a str {
        self.for_platform(platform)
            .map(|t| t.quota_key.as_str())
            .unwrap_or(platform)
    }

    /// Distinct platforms in cost order.
    pub fn platforms(&self) -> Vec<&str> {
        let mut seen = Vec::new();
        for tier in &self.tiers {
            if !seen.contains(&tier.platform.as_str()) {
                seen.push(tier.platform.as_str());
            }
        }
        seen
    }

    pub fn len(&self) -> usize {
        self.tiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiers.is_empty()
    }

    /// The built-in table: two free tiers, a metered tier, then subscription.
    pub fn builtin() -> Self {
        Self::new(vec![
            CostTier::new("gemini", "gemini_free", 0.0, 1),
            CostTier::new("groq", "groq_free", 0.0, 2),
            CostTier::new("openrouter", "openrouter_credits", 0.5, 3),
            CostTier::new("claude", "claude_subscription", 1.0, 4),
        ])
    }
}

impl From<Vec<CostTier>> for CostTiers {
    fn from(tiers: Vec<CostTier>) -> Self {
        Self::new(tiers)
    }
}
