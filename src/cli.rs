use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::config::{
    DEFAULT_BASELINE_COMMAND, DEFAULT_CALL_TIMEOUT_MS, DEFAULT_MAX_CONTEXT_CHARS,
    DEFAULT_MAX_OUTPUT_CHARS, DEFAULT_MODEL_KEY, DEFAULT_NOISE_TOKEN, DEFAULT_QUERY_ENDPOINT,
};

pub const DEFAULT_DB_PATH: &str = "benchmarks/agent_mode_benchmark.sqlite";
pub const DEFAULT_ARTIFACTS_ROOT: &str = "benchmarks/agent_mode_artifacts";
const DEFAULT_NOTES: &str = "Agent-mode synthetic benchmark: graph vs baseline workflow with \
                             context resets, documentation updates at each step, \
                             implementation/test/revert, post-summary retention comparison, \
                             and case-specific stress metrics.";

#[derive(Parser, Debug)]
#[command(
    name = "agentbench",
    version,
    about = "Synthetic agent-mode benchmark: graph vs baseline phase workflows"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Plan a benchmark run and optionally execute it.
    Run(RunArgs),
    Status(StatusArgs),
    /// Render the latest ranking as Markdown.
    Report(ReportArgs),
    /// Fail when weighted scores regressed between the two newest executed runs.
    Gate(GateArgs),
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    #[arg(long, default_value = DEFAULT_DB_PATH)]
    pub db_path: PathBuf,

    #[arg(long, default_value = DEFAULT_ARTIFACTS_ROOT)]
    pub artifacts_root: PathBuf,

    #[arg(long, default_value = ".")]
    pub project_root: PathBuf,

    /// Case profile to run; repeat for several cases.
    #[arg(long = "case-id", default_values_t = vec!["A001".to_string()])]
    pub case_ids: Vec<String>,

    #[arg(long, default_value = DEFAULT_MODEL_KEY)]
    pub model: String,

    #[arg(long, default_value = DEFAULT_NOTES)]
    pub notes: String,

    #[arg(long, default_value_t = false)]
    pub plan_only: bool,

    #[arg(long, default_value_t = false)]
    pub execute: bool,

    /// Run the two methods of a case on separate threads.
    #[arg(long, default_value_t = false)]
    pub parallel_methods: bool,

    #[arg(long, default_value = DEFAULT_QUERY_ENDPOINT)]
    pub query_endpoint: String,

    #[arg(long, default_value_t = DEFAULT_CALL_TIMEOUT_MS)]
    pub query_timeout_ms: u64,

    /// Shell command whose stdout becomes the baseline signal; empty disables it.
    #[arg(long, default_value = DEFAULT_BASELINE_COMMAND)]
    pub baseline_command: String,

    #[arg(long, default_value_t = DEFAULT_CALL_TIMEOUT_MS)]
    pub baseline_timeout_ms: u64,

    #[arg(long, default_value = DEFAULT_NOISE_TOKEN)]
    pub noise_token: String,

    #[arg(long, default_value_t = DEFAULT_MAX_CONTEXT_CHARS)]
    pub max_context_chars: usize,

    #[arg(long, default_value_t = DEFAULT_MAX_OUTPUT_CHARS)]
    pub max_output_chars: usize,

    #[arg(long)]
    pub manifest_path: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct StatusArgs {
    #[arg(long, default_value = DEFAULT_DB_PATH)]
    pub db_path: PathBuf,

    #[arg(long, default_value_t = 5)]
    pub limit: usize,
}

#[derive(Args, Debug, Clone)]
pub struct ReportArgs {
    #[arg(long, default_value = DEFAULT_DB_PATH)]
    pub db_path: PathBuf,

    /// Defaults to `agent_mode_report.md` next to the database.
    #[arg(long)]
    pub output: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct GateArgs {
    #[arg(long, default_value = DEFAULT_DB_PATH)]
    pub db_path: PathBuf,

    #[arg(long, default_value_t = 0.02)]
    pub max_score_regression: f64,
}
