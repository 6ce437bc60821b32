use std::fmt;

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Method {
    Graph,
    Baseline,
}

impl Method {
    pub const ALL: [Method; 2] = [Method::Graph, Method::Baseline];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Graph => "graph",
            Self::Baseline => "baseline",
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "graph" => Ok(Self::Graph),
            "baseline" => Ok(Self::Baseline),
            other => bail!("unknown method label: {other}"),
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum RunStatus {
    Planned,
    Executed,
}

impl RunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Planned => "PLANNED",
            Self::Executed => "EXECUTED",
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "PLANNED" => Ok(Self::Planned),
            "EXECUTED" => Ok(Self::Executed),
            other => bail!("unknown run status: {other}"),
        }
    }

    /// Status only moves forward.
    pub fn can_transition_to(self, next: RunStatus) -> bool {
        matches!((self, next), (Self::Planned, Self::Executed))
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum StepStatus {
    Planned,
    Completed,
    /// Ran to completion with at least one failed external call.
    Degraded,
}

impl StepStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Planned => "PLANNED",
            Self::Completed => "COMPLETED",
            Self::Degraded => "DEGRADED",
        }
    }

    pub fn is_finished(self) -> bool {
        !matches!(self, Self::Planned)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunRecord {
    pub run_id: String,
    pub generated_at: String,
    pub model_key: String,
    pub status: RunStatus,
    pub notes: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct StepResult {
    pub run_id: String,
    pub case_id: String,
    pub method: Method,
    pub phase_order: u32,
    pub phase_name: String,
    pub status: StepStatus,
    pub latency_ms: f64,
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub total_tokens: i64,
    pub accuracy: f64,
    pub change_tracking_score: f64,
    pub output_hash: String,
    pub execution_notes: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct MethodResult {
    pub run_id: String,
    pub case_id: String,
    pub method: Method,
    pub total_tokens: i64,
    pub avg_accuracy: f64,
    pub avg_change_tracking: f64,
    pub completed_phases: u32,
    pub pre_summary: String,
    pub post_summary: String,
    pub retention_score: Option<f64>,
    pub contamination_score: Option<f64>,
    pub drift_detection_score: Option<f64>,
    pub revert_integrity_score: Option<f64>,
}

/// Behavioral flags observed while a method runs through the phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StressState {
    pub noise_leaked: bool,
    pub drift_detected: bool,
    pub revert_clean: bool,
}

impl Default for StressState {
    fn default() -> Self {
        Self {
            noise_leaked: false,
            drift_detected: false,
            revert_clean: true,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunManifest {
    pub manifest_version: u32,
    pub run_id: String,
    pub generated_at: String,
    pub updated_at: String,
    pub status: String,
    pub model_key: String,
    pub cases: Vec<String>,
    pub methods: Vec<String>,
    pub phases_per_method: usize,
    pub db_path: String,
    pub artifacts_root: String,
    pub units: Vec<RunManifestUnit>,
    pub warnings: Vec<String>,
    pub notes: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunManifestUnit {
    pub case_id: String,
    pub method: String,
    pub total_tokens: i64,
    pub completed_phases: u32,
    pub degraded_phases: usize,
    pub stress: StressState,
}
