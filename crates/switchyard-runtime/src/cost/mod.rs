//! Cost accounting.
//!
//! One [`CostRecord`] per task, persisted in SQLite and upserted by task id,
//! so recording the same task twice converges to a single row.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

mod store;
mod tracker;

pub use store::CostStore;
pub use tracker::CostTracker;

/// Errors from the cost store.
#[derive(Error, Debug)]
pub enum CostError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid timestamp '{0}' in cost store")]
    Timestamp(String),

    #[error("cost store task failed: {0}")]
    Join(String),
}

/// Persisted spend for one task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostRecord {
    pub task_id: String,
    pub platform: String,
    pub model: Option<String>,
    pub chain_id: Option<String>,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cost: f64,
    pub timestamp: DateTime<Utc>,
}

impl CostRecord {
    pub fn total_tokens(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

/// Spend grouped by platform.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlatformTotal {
    pub platform: String,
    pub task_count: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cost: f64,
}

impl PlatformTotal {
    pub fn total_tokens(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

/// Spend for one UTC day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub date: NaiveDate,
    pub task_count: u64,
    pub total_cost: f64,
    pub total_tokens: u64,
    pub by_platform: BTreeMap<String, PlatformTotal>,
}

impl SessionSummary {
    fn from_totals(date: NaiveDate, totals: Vec<PlatformTotal>) -> Self {
        let mut summary = Self {
            date,
            task_count: 0,
            total_cost: 0.0,
            total_tokens: 0,
            by_platform: BTreeMap::new(),
        };
        for total in totals {
            summary.task_count += total.task_count;
            summary.total_cost += total.cost;
            summary.total_tokens += total.total_tokens();
            summary.by_platform.insert(total.platform.clone(), total);
        }
        summary
    }
}
