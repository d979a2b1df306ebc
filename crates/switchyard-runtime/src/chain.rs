//! Live chain registry.

use parking_lot::Mutex;
use std::collections::HashMap;

use switchyard_core::TaskChain;

/// Chains seen by this process, keyed by chain id.
#[derive(Debug, Default)]
pub struct ChainTracker {
    chains: Mutex<HashMap<String, TaskChain>>,
}

impl ChainTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `task_id`'s spend under `chain_id`, creating the chain with
    /// `task_id` as root if it does not exist yet.
    pub fn record(&self, chain_id: &str, task_id: &str, cost: f64, tokens: u64) {
        let mut chains = self.chains.lock();
        let chain = chains
            .entry(chain_id.to_string())
            .or_insert_with(|| TaskChain::new(chain_id, task_id));
        chain.record(task_id, cost, tokens);
        tracing::debug!(
            chain_id = %chain_id,
            task_id = %task_id,
            total_cost = chain.total_cost,
            tasks = chain.len(),
            "Chain updated"
        );
    }

    /// Make sure `chain_id` exists with `root_task_id` as its root.
    pub fn ensure(&self, chain_id: &str, root_task_id: &str) {
        self.chains
            .lock()
            .entry(chain_id.to_string())
            .or_insert_with(|| TaskChain::new(chain_id, root_task_id));
    }

    /// Running cost of a chain; zero when unknown.
    pub fn get_chain_cost(&self, chain_id: &str) -> f64 {
        self.chains
            .lock()
            .get(chain_id)
            .map(|c| c.total_cost)
            .unwrap_or(0.0)
    }

    pub fn get_chain(&self, chain_id: &str) -> Option<TaskChain> {
        self.chains.lock().get(chain_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.chains.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.chains.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_creates_chain() {
        let tracker = ChainTracker::new();
        tracker.record("c1", "t1", 0.5, 100);
        tracker.record("c1", "t2", 0.25, 50);

        let chain = tracker.get_chain("c1").unwrap();
        assert_eq!(chain.root_task_id, "t1");
        assert_eq!(chain.task_ids, vec!["t1", "t2"]);
        assert!((tracker.get_chain_cost("c1") - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_unknown_chain_costs_nothing() {
        assert_eq!(ChainTracker::new().get_chain_cost("missing"), 0.0);
    }

    #[test]
    fn test_ensure_keeps_existing_root() {
        let tracker = ChainTracker::new();
        tracker.record("c1", "t1", 0.0, 0);
        tracker.ensure("c1", "other");
        assert_eq!(tracker.get_chain("c1").unwrap().root_task_id, "t1");
    }
}
