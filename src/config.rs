use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Result, bail};
use serde::Serialize;

pub const DEFAULT_MODEL_KEY: &str = "sonnet-4.5";
pub const DEFAULT_NOISE_TOKEN: &str = "UNRELATED_CONTEXT_PAYLOAD";
pub const DEFAULT_MAX_CONTEXT_CHARS: usize = 420;
pub const DEFAULT_MAX_OUTPUT_CHARS: usize = 680;
pub const DEFAULT_QUERY_ENDPOINT: &str = "http://localhost:9000/mcp";
pub const DEFAULT_CALL_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_BASELINE_COMMAND: &str = "git log --oneline -n 5";
pub const DEFAULT_SIGNAL_CHARS: usize = 400;
pub const SUMMARY_STORAGE_CHARS: usize = 4000;

/// Everything a benchmark run needs that is not part of the static catalogs.
#[derive(Debug, Clone, Serialize)]
pub struct BenchConfig {
    pub model_key: String,
    pub noise_token: String,
    pub max_context_chars: usize,
    pub max_output_chars: usize,
    pub signal_chars: usize,
    pub project_root: PathBuf,
    pub artifacts_root: PathBuf,
    pub query_endpoint: String,
    pub query_timeout_ms: u64,
    pub baseline_command: Option<String>,
    pub baseline_timeout_ms: u64,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            model_key: DEFAULT_MODEL_KEY.to_string(),
            noise_token: DEFAULT_NOISE_TOKEN.to_string(),
            max_context_chars: DEFAULT_MAX_CONTEXT_CHARS,
            max_output_chars: DEFAULT_MAX_OUTPUT_CHARS,
            signal_chars: DEFAULT_SIGNAL_CHARS,
            project_root: PathBuf::from("."),
            artifacts_root: PathBuf::from("benchmarks/agent_mode_artifacts"),
            query_endpoint: DEFAULT_QUERY_ENDPOINT.to_string(),
            query_timeout_ms: DEFAULT_CALL_TIMEOUT_MS,
            baseline_command: Some(DEFAULT_BASELINE_COMMAND.to_string()),
            baseline_timeout_ms: DEFAULT_CALL_TIMEOUT_MS,
        }
    }
}

impl BenchConfig {
    pub fn validate(&self) -> Result<()> {
        if self.model_key.trim().is_empty() {
            bail!("model label must not be empty");
        }
        if self.noise_token.trim().is_empty() {
            bail!("noise token must not be empty");
        }
        if self.max_context_chars < 16 || self.max_output_chars < 16 {
            bail!(
                "context/output limits must be at least 16 chars (got context={} output={})",
                self.max_context_chars,
                self.max_output_chars
            );
        }
        if self.query_timeout_ms == 0 || self.baseline_timeout_ms == 0 {
            bail!("external call timeouts must be greater than zero");
        }
        Ok(())
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }

    pub fn baseline_timeout(&self) -> Duration {
        Duration::from_millis(self.baseline_timeout_ms)
    }
}
