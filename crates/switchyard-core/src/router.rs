//! Platform routing.
//!
//! Policy (in order):
//! 1. A task's platform hint wins if the hint's quota key is usable.
//! 2. Otherwise the first tier, by ascending rank, whose quota key is usable.
//! 3. Otherwise the default (subscription) platform.
//!
//! `route` is total: it always returns a platform.

use serde::{Deserialize, Serialize};

use crate::quota::QuotaView;
use crate::tiers::CostTiers;
use crate::types::Task;

/// Advisory signal for a free-tier quota key running hot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuotaWarning {
    pub quota_key: String,
    pub platform: String,
    pub utilization: f64,
}

/// Picks a platform for each task.
#[derive(Debug, Clone)]
pub struct Router {
    tiers: CostTiers,
    default_platform: String,
}

impl Router {
    pub fn new(tiers: CostTiers, default_platform: impl Into<String>) -> Self {
        Self {
            tiers,
            default_platform: default_platform.into(),
        }
    }

    pub fn tiers(&self) -> &CostTiers {
        &self.tiers
    }

    pub fn default_platform(&self) -> &str {
        &self.default_platform
    }

    /// Select a platform for `task`.
    pub fn route(&self, task: &Task, quota: &dyn QuotaView) -> String {
        if let Some(hint) = task.platform_hint.as_deref() {
            let key = self.tiers.quota_key_for(hint);
            if quota.can_use(key) {
                tracing::debug!(task_id = %task.id, platform = %hint, "Routing to hinted platform");
                return hint.to_string();
            }
            tracing::debug!(
                task_id = %task.id,
                platform = %hint,
                quota_key = %key,
                "Hinted platform out of quota, walking cost tiers"
            );
        }

        for tier in self.tiers.iter() {
            if quota.can_use(&tier.quota_key) {
                tracing::debug!(
                    task_id = %task.id,
                    platform = %tier.platform,
                    rank = tier.rank,
                    "Routing by cost tier"
                );
                return tier.platform.clone();
            }
        }

        tracing::debug!(
            task_id = %task.id,
            platform = %self.default_platform,
            "All tiers exhausted, using default platform"
        );
        self.default_platform.clone()
    }

    /// Report free-tier quota keys whose utilization is at or above
    /// `fraction`. Advisory only; never affects routing.
    pub fn warn_quota_threshold(&self, quota: &dyn QuotaView, fraction: f64) -> Vec<QuotaWarning> {
        let status = quota.status();
        let mut warnings = Vec::new();

        for tier in self.tiers.iter().filter(|t| t.is_free()) {
            let Some(utilization) = status.get(&tier.quota_key).and_then(|s| s.utilization())
            else {
                continue;
            };
            if utilization >= fraction
                && !warnings
                    .iter()
                    .any(|w: &QuotaWarning| w.quota_key == tier.quota_key)
            {
                tracing::warn!(
                    quota_key = %tier.quota_key,
                    platform = %tier.platform,
                    utilization = utilization,
                    threshold = fraction,
                    "Free-tier quota nearly exhausted"
                );
                warnings.push(QuotaWarning {
                    quota_key: tier.quota_key.clone(),
                    platform: tier.platform.clone(),
                    utilization,
                });
            }
        }

        warnings
    }

    /// Total remaining units across metered tier keys, `None` if no tier
    /// key has a limit.
    pub fn remaining_quota(&self, quota: &dyn QuotaView) -> Option<u64> {
        let status = quota.status();
        let mut seen: Vec<&str> = Vec::new();
        let mut total: Option<u64> = None;

        for tier in self.tiers.iter() {
            if seen.contains(&tier.quota_key.as_str()) {
                continue;
            }
            seen.push(&tier.quota_key);
            if let Some(remaining) = status.get(&tier.quota_key).and_then(|s| s.remaining()) {
                total = Some(total.unwrap_or(0).saturating_add(remaining));
            }
        }

        total
    }
}
