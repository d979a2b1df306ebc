//! Batch aggregation.
//!
//! Deterministic fan-in over a batch's results. Stateless: recomputed per
//! batch, grouped through a `BTreeMap` so output order is stable.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::types::TaskResult;

/// Summary of one batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedResult {
    /// All results, in submission order
    pub results: Vec<TaskResult>,

    pub total_cost: f64,

    pub total_tokens: u64,

    /// Sum of per-task durations (not batch wall time)
    pub total_duration_ms: u64,

    pub success_count: usize,

    pub failure_count: usize,

    /// `success_count / results.len()`, 0.0 for an empty batch
    pub success_rate: f64,

    /// Task ids grouped by the platform that produced their result
    pub by_platform: BTreeMap<String, Vec<String>>,
}

impl AggregatedResult {
    pub fn from_results(results: Vec<TaskResult>) -> Self {
        let mut total_cost = 0.0;
        let mut total_tokens = 0;
        let mut total_duration_ms = 0;
        let mut success_count = 0;
        let mut by_platform: BTreeMap<String, Vec<String>> = BTreeMap::new();

        for result in &results {
            total_cost += result.cost;
            total_tokens += result.usage.total();
            total_duration_ms += result.duration_ms;
            if result.success {
                success_count += 1;
            }
            by_platform
                .entry(result.platform.clone())
                .or_default()
                .push(result.task_id.clone());
        }

        let failure_count = results.len() - success_count;
        let success_rate = if results.is_empty() {
            0.0
        } else {
            success_count as f64 / results.len() as f64
        };

        Self {
            results,
            total_cost,
            total_tokens,
            total_duration_ms,
            success_count,
            failure_count,
            success_rate,
            by_platform,
        }
    }

    /// Results that failed, in submission order.
    pub fn failures(&self) -> impl Iterator<Item = &TaskResult> {
        self.results.iter().filter(|r| !r.success)
    }
}
