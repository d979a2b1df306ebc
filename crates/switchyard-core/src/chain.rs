//! Task chain genealogy and running totals.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One task's contribution to its chain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ChainEntry {
    pub cost: f64,
    pub tokens: u64,
}

/// Lineage and totals for a workflow rooted at one task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskChain {
    pub chain_id: String,

    /// Task ids in the order they joined the chain
    pub task_ids: Vec<String>,

    /// First task recorded in the chain
    pub root_task_id: String,

    pub total_cost: f64,

    pub total_tokens: u64,

    entries: BTreeMap<String, ChainEntry>,
}

impl TaskChain {
    /// Start a chain whose root is `root_task_id`.
    pub fn new(chain_id: impl Into<String>, root_task_id: impl Into<String>) -> Self {
        Self {
            chain_id: chain_id.into(),
            task_ids: Vec::new(),
            root_task_id: root_task_id.into(),
            total_cost: 0.0,
            total_tokens: 0,
            entries: BTreeMap::new(),
        }
    }

    /// Record a task's spend. Re-recording a task replaces its previous
    /// contribution, matching the cost store's upsert.
    pub fn record(&mut self, task_id: &str, cost: f64, tokens: u64) {
        let entry = ChainEntry { cost, tokens };
        match self.entries.insert(task_id.to_string(), entry) {
            Some(previous) => {
                self.total_cost -= previous.cost;
                self.total_tokens = self.total_tokens.saturating_sub(previous.tokens);
            }
            None => self.task_ids.push(task_id.to_string()),
        }
        self.total_cost += cost;
        self.total_tokens += tokens;
    }

    pub fn contains(&self, task_id: &str) -> bool {
        self.entries.contains_key(task_id)
    }

    pub fn entry(&self, task_id: &str) -> Option<&ChainEntry> {
        self.entries.get(task_id)
    }

    pub fn len(&self) -> usize {
        self.task_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.task_ids.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_totals_accumulate() {
        let mut chain = TaskChain::new("c1", "t1");
        chain.record("t1", 0.5, 100);
        chain.record("t2", 0.25, 50);

        assert_eq!(chain.task_ids, vec!["t1", "t2"]);
        assert!((chain.total_cost - 0.75).abs() < 1e-12);
        assert_eq!(chain.total_tokens, 150);
    }

    #[test]
    fn test_rerecord_replaces() {
        let mut chain = TaskChain::new("c1", "t1");
        chain.record("t1", 0.5, 100);
        chain.record("t1", 0.2, 40);

        assert_eq!(chain.len(), 1);
        assert!((chain.total_cost - 0.2).abs() < 1e-12);
        assert_eq!(chain.total_tokens, 40);
    }
}
