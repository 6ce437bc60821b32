use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use serde_json::json;
use tracing::{info, warn};

use super::aggregate::aggregate_method_result;
use super::handlers::{DRIFT_MARKER, PhaseRequest, SYNTHETIC_DIR, select_handler};
use super::scoring::{phase_accuracy, phase_change_tracking};
use crate::config::BenchConfig;
use crate::external::Collaborators;
use crate::metrics::{compress_text, estimate_tokens, hash_text};
use crate::model::{Method, MethodResult, StepResult, StepStatus, StressState};
use crate::phases::{Phase, PhaseKind, build_phase_catalog};
use crate::profiles::CaseProfile;
use crate::staging::{StagingArea, dir_is_clean};
use crate::util::round_to;

/// Everything one method produced for one case.
#[derive(Debug, Clone)]
pub struct MethodRun {
    pub steps: Vec<StepResult>,
    pub result: MethodResult,
    pub stress: StressState,
}

impl MethodRun {
    pub fn degraded_phases(&self) -> usize {
        self.steps
            .iter()
            .filter(|step| step.status == StepStatus::Degraded)
            .count()
    }
}

/// Fingerprint of the previous phase; the only history a phase may see.
struct PhaseFingerprint {
    name: &'static str,
    hash: String,
}

#[derive(Default)]
struct RollingState {
    previous: Option<PhaseFingerprint>,
    pre_summary: String,
    post_summary: String,
    stress: StressState,
}

pub struct PhaseExecutor<'a> {
    config: &'a BenchConfig,
    collaborators: &'a Collaborators,
    phases: Vec<Phase>,
}

impl<'a> PhaseExecutor<'a> {
    pub fn new(config: &'a BenchConfig, collaborators: &'a Collaborators) -> Self {
        Self {
            config,
            collaborators,
            phases: build_phase_catalog(),
        }
    }

    pub fn phases(&self) -> &[Phase] {
        &self.phases
    }

    /// Runs every phase in order for one (run, case, method).
    ///
    /// Staging write failures abort; external-call failures only degrade a step.
    pub fn execute_method(
        &self,
        run_id: &str,
        profile: &CaseProfile,
        method: Method,
        staging: &mut dyn StagingArea,
    ) -> Result<MethodRun> {
        let mut state = RollingState::default();
        let mut steps = Vec::with_capacity(self.phases.len());

        for phase in &self.phases {
            let step = self
                .execute_phase(run_id, profile, method, phase, &mut state, staging)
                .with_context(|| {
                    format!(
                        "phase {} failed for case {} method {}",
                        phase.name(),
                        profile.case_id,
                        method
                    )
                })?;
            steps.push(step);
        }

        let result = aggregate_method_result(
            run_id,
            profile,
            method,
            &steps,
            &state.pre_summary,
            &state.post_summary,
            &state.stress,
        );

        info!(
            run_id = %run_id,
            case_id = profile.case_id,
            method = %method,
            total_tokens = result.total_tokens,
            completed_phases = result.completed_phases,
            noise_leaked = state.stress.noise_leaked,
            drift_detected = state.stress.drift_detected,
            revert_clean = state.stress.revert_clean,
            "method run completed"
        );

        Ok(MethodRun {
            steps,
            result,
            stress: state.stress,
        })
    }

    fn execute_phase(
        &self,
        run_id: &str,
        profile: &CaseProfile,
        method: Method,
        phase: &Phase,
        state: &mut RollingState,
        staging: &mut dyn StagingArea,
    ) -> Result<StepResult> {
        let started = Instant::now();
        let context_text = seed_phase_context(
            phase,
            method,
            profile.case_id,
            state
                .previous
                .as_ref()
                .map(|previous| (previous.name, previous.hash.as_str())),
            self.config.max_context_chars,
        );

        let request = PhaseRequest {
            method,
            profile,
            config: self.config,
        };
        let outcome = select_handler(phase.kind, method, profile).produce(
            &request,
            self.collaborators,
            staging,
        )?;
        let output = outcome.output;

        match phase.kind {
            PhaseKind::PreSummary => state.pre_summary = output.clone(),
            PhaseKind::PostSummary => {
                state.post_summary = output.clone();
                if profile.inject_context_noise {
                    state.stress.noise_leaked = output.contains(&self.config.noise_token);
                }
            }
            PhaseKind::DocsStepUpdate if profile.detect_doc_drift => {
                state.stress.drift_detected = output.contains(DRIFT_MARKER);
            }
            PhaseKind::RevertAndCleanup => {
                state.stress.revert_clean = dir_is_clean(staging, Path::new(SYNTHETIC_DIR))?;
            }
            _ => {}
        }

        let artifact = write_phase_artifact(staging, phase, method, &output, self.config)?;
        let artifact_written = staging.file_exists(&artifact);
        let output_hash = hash_text(&output);
        state.previous = Some(PhaseFingerprint {
            name: phase.name(),
            hash: output_hash.clone(),
        });

        let input_tokens = estimate_tokens(&context_text);
        let output_tokens = estimate_tokens(&output);
        let mut notes = vec![format!("artifact={}", staging.display_path(&artifact))];
        for failure in &outcome.failures {
            warn!(
                case_id = profile.case_id,
                method = %method,
                phase = phase.name(),
                reason = %failure,
                "external call degraded phase output"
            );
            notes.push(failure.clone());
        }

        let status = if outcome.failures.is_empty() {
            StepStatus::Completed
        } else {
            StepStatus::Degraded
        };

        Ok(StepResult {
            run_id: run_id.to_string(),
            case_id: profile.case_id.to_string(),
            method,
            phase_order: phase.order,
            phase_name: phase.name().to_string(),
            status,
            latency_ms: round_to(started.elapsed().as_secs_f64() * 1000.0, 2),
            input_tokens,
            output_tokens,
            total_tokens: input_tokens + output_tokens,
            accuracy: phase_accuracy(phase, &output, artifact_written),
            change_tracking_score: phase_change_tracking(phase, &output),
            output_hash,
            execution_notes: notes.join("; "),
        })
    }
}

/// Bounded context for a phase: its template plus the previous phase's fingerprint only.
pub fn seed_phase_context(
    phase: &Phase,
    method: Method,
    case_id: &str,
    previous: Option<(&str, &str)>,
    max_chars: usize,
) -> String {
    let (previous_phase, previous_hash) = previous.unwrap_or(("none", "none"));
    let compact = format!(
        "case={case_id}; method={method}; phase={}; prompt={}; boundary={}; \
         prev_phase={previous_phase}; prev_hash={previous_hash}",
        phase.name(),
        phase.kind.context_template(),
        phase.context_boundary,
    );
    compress_text(&compact, max_chars)
}

fn write_phase_artifact(
    staging: &mut dyn StagingArea,
    phase: &Phase,
    method: Method,
    content: &str,
    config: &BenchConfig,
) -> Result<PathBuf> {
    let preview = compress_text(content, config.max_output_chars);
    let content_hash = hash_text(content);

    let (path, body) = match method {
        Method::Graph => {
            let payload = json!({
                "phase": phase.name(),
                "objective": phase.objective,
                "context_boundary": phase.context_boundary,
                "documentation_targets": phase.documentation_targets,
                "content_hash": content_hash,
                "content_preview": preview,
            });
            let body = serde_json::to_string_pretty(&payload)
                .context("failed to serialize graph phase artifact")?;
            (PathBuf::from(format!("{}.json", phase.artifact_stem())), body)
        }
        Method::Baseline => {
            let body = [
                format!("# {}", phase.name()),
                String::new(),
                format!("- objective: {}", phase.objective),
                format!("- context_boundary: {}", phase.context_boundary),
                format!(
                    "- documentation_targets: {}",
                    phase.documentation_targets.join(", ")
                ),
                String::new(),
                format!("- content_hash: {content_hash}"),
                String::new(),
                preview,
            ]
            .join("\n");
            (PathBuf::from(format!("{}.md", phase.artifact_stem())), body)
        }
    };

    staging.write_file(&path, &body)?;
    Ok(path)
}
