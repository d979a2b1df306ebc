//! Text and JSON rendering for command results.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use anyhow::Result;
use serde::Serialize;

use switchyard_core::{AggregatedResult, QuotaStatus, TaskResult};
use switchyard_runtime::{CostRecord, OrchestratorStatus, PlatformTotal, SessionSummary};

use crate::cli::OutputFormat;

/// Spend report for the `costs` command.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum CostReport {
    Chain {
        chain_id: String,
        total_cost: f64,
        records: Vec<CostRecord>,
    },
    Overview {
        today: SessionSummary,
        platforms: Vec<PlatformTotal>,
        recent: Vec<CostRecord>,
    },
}

/// Anything the CLI can print in either format.
pub trait Render: Serialize {
    fn text(&self) -> String;
}

pub fn print<T: Render>(value: &T, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => print!("{}", value.text()),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(value)?),
    }
    Ok(())
}

fn result_line(out: &mut String, result: &TaskResult) {
    let status = if result.success { "ok" } else { "FAILED" };
    let _ = writeln!(
        out,
        "{:<12} {:<6} {:<10} ${:.6}  {} tokens  {} ms  {} attempt(s)",
        result.task_id.get(..12).unwrap_or(&result.task_id),
        status,
        result.platform,
        result.cost,
        result.usage.total(),
        result.duration_ms,
        result.attempts,
    );
    if let Some(error) = &result.error {
        let _ = writeln!(out, "    error: {error}");
    }
}

impl Render for TaskResult {
    fn text(&self) -> String {
        let mut out = String::new();
        result_line(&mut out, self);
        if let Some(output) = &self.output {
            let _ = writeln!(out, "\n{output}");
        }
        out
    }
}

impl Render for AggregatedResult {
    fn text(&self) -> String {
        let mut out = String::new();
        for result in &self.results {
            result_line(&mut out, result);
        }
        let _ = writeln!(
            out,
            "\n{} succeeded, {} failed ({:.0}%)  total ${:.6}  {} tokens",
            self.success_count,
            self.failure_count,
            self.success_rate * 100.0,
            self.total_cost,
            self.total_tokens,
        );
        for (platform, ids) in &self.by_platform {
            let _ = writeln!(out, "  {platform}: {} task(s)", ids.len());
        }
        out
    }
}

impl Render for OrchestratorStatus {
    fn text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "platforms:         {}", self.platforms.join(", "));
        let _ = writeln!(out, "default platform:  {}", self.default_platform);
        let _ = writeln!(
            out,
            "concurrency:       {} (adaptive {})",
            self.concurrency_limit, self.adaptive_limit
        );
        if !self.circuits.is_empty() {
            let _ = writeln!(out, "circuits:");
            for (platform, state) in &self.circuits {
                let _ = writeln!(out, "  {platform:<10} {state}");
            }
        }
        out
    }
}

impl Render for BTreeMap<String, QuotaStatus> {
    fn text(&self) -> String {
        if self.is_empty() {
            return "no quota keys configured\n".to_string();
        }
        let mut out = String::new();
        for (key, status) in self {
            match (status.limit, status.utilization()) {
                (Some(limit), Some(utilization)) => {
                    let _ = writeln!(
                        out,
                        "{key:<22} {:>8} / {:<8} {:>5.1}%",
                        status.used,
                        limit,
                        utilization * 100.0
                    );
                }
                _ => {
                    let _ = writeln!(out, "{key:<22} {:>8} (unmetered)", status.used);
                }
            }
        }
        out
    }
}

fn record_line(out: &mut String, record: &CostRecord) {
    let _ = writeln!(
        out,
        "{}  {:<12} {:<10} {:<20} {:>8} tokens  ${:.6}",
        record.timestamp.format("%Y-%m-%d %H:%M:%S"),
        record.task_id.get(..12).unwrap_or(&record.task_id),
        record.platform,
        record.model.as_deref().unwrap_or("-"),
        record.total_tokens(),
        record.cost,
    );
}

impl Render for CostReport {
    fn text(&self) -> String {
        let mut out = String::new();
        match self {
            CostReport::Chain { chain_id, total_cost, records } => {
                let _ = writeln!(
                    out,
                    "chain {chain_id}: {} task(s), ${total_cost:.6}",
                    records.len()
                );
                for record in records {
                    record_line(&mut out, record);
                }
            }
            CostReport::Overview { today, platforms, recent } => {
                let _ = writeln!(
                    out,
                    "today ({}): {} task(s), ${:.6}, {} tokens",
                    today.date, today.task_count, today.total_cost, today.total_tokens
                );
                if !platforms.is_empty() {
                    let _ = writeln!(out, "\nall time by platform:");
                    for total in platforms {
                        let _ = writeln!(
                            out,
                            "  {:<10} {:>5} task(s)  {:>10} tokens  ${:.6}",
                            total.platform,
                            total.task_count,
                            total.total_tokens(),
                            total.cost
                        );
                    }
                }
                if !recent.is_empty() {
                    let _ = writeln!(out, "\nrecent:");
                    for record in recent {
                        record_line(&mut out, record);
                    }
                }
            }
        }
        out
    }
}
