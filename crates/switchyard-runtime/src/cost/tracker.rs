//! Async front for the cost store.

use chrono::{NaiveDate, Utc};
use std::sync::Arc;

use switchyard_core::{CostEstimate, PricingTable, Task, TaskResult};

use super::{CostError, CostRecord, CostStore, PlatformTotal, SessionSummary};

/// Prices task results and answers spend queries.
///
/// Store calls run on the blocking pool so SQLite never stalls the
/// executor.
#[derive(Clone)]
pub struct CostTracker {
    store: Arc<CostStore>,
    pricing: Arc<PricingTable>,
}

impl CostTracker {
    pub fn new(store: Arc<CostStore>, pricing: Arc<PricingTable>) -> Self {
        Self { store, pricing }
    }

    pub fn in_memory(pricing: Arc<PricingTable>) -> Result<Self, CostError> {
        Ok(Self::new(Arc::new(CostStore::in_memory()?), pricing))
    }

    pub fn pricing(&self) -> &PricingTable {
        &self.pricing
    }

    pub fn store(&self) -> &Arc<CostStore> {
        &self.store
    }

    /// Build the record for `result` without persisting it.
    ///
    /// The chain is `chain_id` if given, else the task's, else the result's.
    pub fn build_record(&self, task: &Task, result: &TaskResult, chain_id: Option<&str>) -> CostRecord {
        let model = result.model.as_deref().unwrap_or(&result.platform);
        let cost = self.pricing.cost_for(model, &result.usage);
        let chain_id = chain_id
            .map(str::to_string)
            .or_else(|| task.context.chain_id.clone())
            .or_else(|| result.chain_id.clone());

        CostRecord {
            task_id: result.task_id.clone(),
            platform: result.platform.clone(),
            model: result.model.clone(),
            chain_id,
            input_tokens: result.usage.input_tokens,
            output_tokens: result.usage.output_tokens,
            cost,
            timestamp: Utc::now(),
        }
    }

    /// Price and upsert the record for `result`.
    pub async fn record(
        &self,
        task: &Task,
        result: &TaskResult,
        chain_id: Option<&str>,
    ) -> Result<CostRecord, CostError> {
        let record = self.build_record(task, result, chain_id);
        let store = self.store.clone();
        let row = record.clone();
        blocking(move || store.upsert(&row)).await?;

        tracing::debug!(
            task_id = %record.task_id,
            platform = %record.platform,
            cost = record.cost,
            chain_id = ?record.chain_id,
            "Recorded cost"
        );
        Ok(record)
    }

    pub async fn get_task_cost(&self, task_id: &str) -> Result<Option<f64>, CostError> {
        let store = self.store.clone();
        let task_id = task_id.to_string();
        blocking(move || store.task_cost(&task_id)).await
    }

    pub async fn get_chain_cost(&self, chain_id: &str) -> Result<f64, CostError> {
        let store = self.store.clone();
        let chain_id = chain_id.to_string();
        blocking(move || store.chain_cost(&chain_id)).await
    }

    pub async fn get_chain_records(&self, chain_id: &str) -> Result<Vec<CostRecord>, CostError> {
        let store = self.store.clone();
        let chain_id = chain_id.to_string();
        blocking(move || store.chain_records(&chain_id)).await
    }

    pub async fn get_platform_totals(&self) -> Result<Vec<PlatformTotal>, CostError> {
        let store = self.store.clone();
        blocking(move || store.platform_totals()).await
    }

    pub async fn get_session_summary(&self, day: NaiveDate) -> Result<SessionSummary, CostError> {
        let store = self.store.clone();
        blocking(move || store.session_summary(day)).await
    }

    pub async fn get_recent(&self, limit: usize) -> Result<Vec<CostRecord>, CostError> {
        let store = self.store.clone();
        blocking(move || store.recent(limit)).await
    }

    /// Chain recorded for `task_id`, if it has a record in one.
    pub async fn get_task_chain(&self, task_id: &str) -> Result<Option<String>, CostError> {
        let store = self.store.clone();
        let task_id = task_id.to_string();
        blocking(move || Ok(store.get(&task_id)?.and_then(|record| record.chain_id))).await
    }

    /// Move an unchained task's record into `chain_id`.
    pub async fn attach_to_chain(&self, task_id: &str, chain_id: &str) -> Result<bool, CostError> {
        let store = self.store.clone();
        let task_id = task_id.to_string();
        let chain_id = chain_id.to_string();
        blocking(move || store.attach_to_chain(&task_id, &chain_id)).await
    }

    pub fn estimate_cost(&self, prompt: &str, model: &str) -> CostEstimate {
        self.pricing.estimate_cost(prompt, model)
    }

    pub fn should_warn_cost(&self, prompt: &str, model: &str, threshold_tokens: u64) -> bool {
        self.pricing.should_warn_cost(prompt, model, threshold_tokens)
    }
}

async fn blocking<F, R>(f: F) -> Result<R, CostError>
where
    F: FnOnce() -> Result<R, CostError> + Send + 'static,
    R: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| CostError::Join(e.to_string()))?
}
