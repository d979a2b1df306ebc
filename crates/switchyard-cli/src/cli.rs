//! Command line definition.

use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use switchyard_core::TaskKind;

#[derive(Parser, Debug)]
#[command(name = "switchyard")]
#[command(author, version, about = "Route tasks across execution platforms and track what they cost")]
pub struct Cli {
    /// Settings file (YAML)
    #[arg(short, long, global = true, env = "SWITCHYARD_CONFIG")]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    /// Increase logging verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Submit one task and wait for its result
    Submit {
        /// Prompt to send
        prompt: String,

        /// Preferred platform, used while its quota lasts
        #[arg(short, long)]
        platform: Option<String>,

        /// Model to price the task against
        #[arg(short, long)]
        model: Option<String>,

        #[arg(short, long, value_enum, default_value_t = KindArg::General)]
        kind: KindArg,

        /// Chain to attribute the task's cost to
        #[arg(long)]
        chain: Option<String>,
    },

    /// Run many tasks concurrently
    Batch {
        /// Prompts, one task each
        prompts: Vec<String>,

        /// Read tasks from a file: YAML/JSON task list, or one prompt per line
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Maximum tasks in flight (further throttled by remaining quota)
        #[arg(short = 'j', long)]
        parallel: Option<usize>,
    },

    /// Show platforms, circuits and concurrency
    Status,

    /// Show recorded spend
    Costs {
        /// Only show records for this chain
        #[arg(long)]
        chain: Option<String>,

        /// Number of recent records to list
        #[arg(long, default_value_t = 10)]
        recent: usize,
    },

    /// Show quota usage per key
    Quota,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum KindArg {
    Code,
    Review,
    Research,
    Summarize,
    General,
}

impl From<KindArg> for TaskKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Code => TaskKind::Code,
            KindArg::Review => TaskKind::Review,
            KindArg::Research => TaskKind::Research,
            KindArg::Summarize => TaskKind::Summarize,
            KindArg::General => TaskKind::General,
        }
    }
}
