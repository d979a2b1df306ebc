//! Switchyard CLI
//!
//! Thin caller of the runtime: every command builds an orchestrator from the
//! settings file and prints what it returns.

mod cli;
mod logging;
mod output;
mod settings;

use std::path::Path;
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::Parser;

use switchyard_core::{QuotaView, Task};

use crate::cli::{Cli, Commands};
use crate::output::CostReport;
use crate::settings::Settings;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    logging::init(cli.verbose)?;

    let mut settings = Settings::load(cli.config.as_deref())?;
    let format = cli.format;

    match cli.command {
        Commands::Submit { prompt, platform, model, kind, chain } => {
            let mut task = Task::new(prompt).with_kind(kind.into());
            if let Some(platform) = platform {
                task = task.with_hint(platform);
            }
            if let Some(model) = model {
                task = task.with_model(model);
            }
            if let Some(chain) = chain {
                task = task.in_chain(chain);
            }

            let orchestrator = settings.orchestrator()?;
            let result = orchestrator.submit(task).await;
            output::print(&result, format)?;
            if !result.success {
                return Ok(ExitCode::FAILURE);
            }
        }
        Commands::Batch { prompts, file, parallel } => {
            let mut tasks = match &file {
                Some(path) => read_tasks(path)?,
                None => Vec::new(),
            };
            tasks.extend(prompts.into_iter().map(Task::new));
            if tasks.is_empty() {
                bail!("no tasks given; pass prompts or --file");
            }
            if let Some(parallel) = parallel {
                settings.runtime.concurrency_limit = parallel;
            }

            let orchestrator = settings.orchestrator()?;
            let batch = orchestrator.execute_batch(tasks).await?;
            output::print(&batch, format)?;
            if batch.failure_count > 0 {
                return Ok(ExitCode::FAILURE);
            }
        }
        Commands::Status => {
            let orchestrator = settings.orchestrator()?;
            output::print(&orchestrator.status(), format)?;
        }
        Commands::Costs { chain, recent } => {
            let orchestrator = settings.orchestrator()?;
            let costs = orchestrator.costs();
            let report = match chain {
                Some(chain_id) => CostReport::Chain {
                    total_cost: costs.get_chain_cost(&chain_id).await?,
                    records: costs.get_chain_records(&chain_id).await?,
                    chain_id,
                },
                None => CostReport::Overview {
                    today: costs.get_session_summary(Utc::now().date_naive()).await?,
                    platforms: costs.get_platform_totals().await?,
                    recent: costs.get_recent(recent).await?,
                },
            };
            output::print(&report, format)?;
        }
        Commands::Quota => {
            let orchestrator = settings.orchestrator()?;
            output::print(&orchestrator.quota().status(), format)?;
        }
    }

    Ok(ExitCode::SUCCESS)
}

/// Tasks from a YAML or JSON list, or one prompt per non-empty line.
fn read_tasks(path: &Path) -> Result<Vec<Task>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading tasks from {}", path.display()))?;

    let tasks = match path.extension().and_then(|e| e.to_str()) {
        Some("json") => serde_json::from_str(&raw)
            .with_context(|| format!("parsing {}", path.display()))?,
        Some("yaml" | "yml") => serde_yaml::from_str(&raw)
            .with_context(|| format!("parsing {}", path.display()))?,
        _ => raw
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(Task::new)
            .collect(),
    };
    Ok(tasks)
}
