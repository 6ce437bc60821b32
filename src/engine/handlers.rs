use std::path::{Path, PathBuf};

use anyhow::Result;
use tracing::debug;

use crate::config::BenchConfig;
use crate::external::{Collaborators, render_project_digest};
use crate::metrics::compress_text;
use crate::model::Method;
use crate::phases::PhaseKind;
use crate::profiles::CaseProfile;
use crate::staging::StagingArea;
use crate::util::truncate_chars;

pub const SYNTHETIC_DIR: &str = "synthetic_impl";
pub const IMPL_FILE: &str = "synthetic_impl/feature_plan.rs";
pub const TEST_EVIDENCE_FILE: &str = "synthetic_impl/feature_plan.test.txt";
pub const RESIDUAL_FILE: &str = "residual.lock";
pub const DRIFT_SEED_FILE: &str = "drift_seed.md";
pub const DRIFT_MARKER: &str = "DRIFT_DETECTED";

const STRUCTURE_QUERY: &str = "high level structure of the codebase";
const GRAPH_UNAVAILABLE: &str = "graph unavailable";
const CLI_UNAVAILABLE: &str = "cli unavailable";
const DIGEST_UNAVAILABLE: &str = "digest unavailable";

const FEATURE_PLAN_TEXT: &str = "Feature: synthetic retention-check feature\n\
                                 Plan:\n\
                                 1) add synthetic implementation file\n\
                                 2) add synthetic test evidence\n\
                                 3) update docs artifact\n\
                                 4) revert synthetic files\n";
const DOCS_STEP_ACK: &str = "Updated phase docs with plan context and traceability links.";
const DOCS_STEP_DRIFT: &str =
    "Updated phase docs with plan context and traceability links. DRIFT_DETECTED";
const DOCS_POST_ACK: &str = "Updated post-implementation and test documentation artifacts.";
const SYNTHETIC_IMPL_SOURCE: &str =
    "pub const SYNTHETIC_FEATURE_PLAN: (&str, bool) = (\"agent-benchmark\", true);\n";
const DRIFT_SEED_TEXT: &str =
    "drift_seed: docs claim old behavior while code indicates new behavior\n";

pub struct PhaseRequest<'a> {
    pub method: Method,
    pub profile: &'a CaseProfile,
    pub config: &'a BenchConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PhaseOutcome {
    pub output: String,
    /// External-call failures absorbed while producing `output`.
    pub failures: Vec<String>,
}

impl PhaseOutcome {
    fn text(output: String) -> Self {
        Self {
            output,
            failures: Vec::new(),
        }
    }
}

pub trait PhaseHandler: Sync {
    /// Errors are reserved for staging writes; external failures land in `failures`.
    fn produce(
        &self,
        request: &PhaseRequest<'_>,
        collaborators: &Collaborators,
        staging: &mut dyn StagingArea,
    ) -> Result<PhaseOutcome>;
}

/// Picks the handler for one (phase, method, profile) combination.
pub fn select_handler(
    kind: PhaseKind,
    method: Method,
    profile: &CaseProfile,
) -> &'static dyn PhaseHandler {
    match kind {
        PhaseKind::PreSummary => &SummaryHandler { echo_noise: false },
        PhaseKind::FeaturePlan => &FeaturePlanHandler,
        PhaseKind::DocsStepUpdate if profile.detect_doc_drift && method == Method::Graph => {
            &AckHandler {
                text: DOCS_STEP_DRIFT,
            }
        }
        PhaseKind::DocsStepUpdate => &AckHandler {
            text: DOCS_STEP_ACK,
        },
        PhaseKind::Implementation => &ImplementationHandler,
        PhaseKind::Tests => &TestsHandler,
        PhaseKind::DocsPostImpl => &AckHandler {
            text: DOCS_POST_ACK,
        },
        PhaseKind::RevertAndCleanup
            if profile.stress_revert_integrity && method == Method::Baseline =>
        {
            &RevertHandler { partial: true }
        }
        PhaseKind::RevertAndCleanup => &RevertHandler { partial: false },
        PhaseKind::PostSummary if profile.inject_context_noise && method == Method::Baseline => {
            &SummaryHandler { echo_noise: true }
        }
        PhaseKind::PostSummary => &SummaryHandler { echo_noise: false },
    }
}

struct SummaryHandler {
    echo_noise: bool,
}

impl PhaseHandler for SummaryHandler {
    fn produce(
        &self,
        request: &PhaseRequest<'_>,
        collaborators: &Collaborators,
        _staging: &mut dyn StagingArea,
    ) -> Result<PhaseOutcome> {
        let config = request.config;
        let mut failures = Vec::new();

        let (signal_label, signal) = match request.method {
            Method::Graph => ("graph_signal", graph_signal(collaborators, config, &mut failures)),
            Method::Baseline => ("cli_signal", cli_signal(collaborators, config, &mut failures)),
        };

        let echo = self
            .echo_noise
            .then(|| format!("noise_echo={}\n", config.noise_token));
        let budget = config
            .max_output_chars
            .saturating_sub(echo.as_deref().map(|e| e.chars().count()).unwrap_or(0));

        let mut output = match collaborators.scanner.scan() {
            Ok(snapshot) => render_project_digest(&snapshot, signal_label, &signal, budget),
            Err(err) => {
                failures.push(format!("project scan failed: {err:#}"));
                compress_text(DIGEST_UNAVAILABLE, budget)
            }
        };
        if let Some(echo) = echo {
            output.push_str(&echo);
        }

        Ok(PhaseOutcome { output, failures })
    }
}

fn graph_signal(
    collaborators: &Collaborators,
    config: &BenchConfig,
    failures: &mut Vec<String>,
) -> String {
    match collaborators.query.graph_query(STRUCTURE_QUERY) {
        Ok(text) if !text.trim().is_empty() => {
            truncate_chars(&text, config.signal_chars).to_string()
        }
        Ok(_) => {
            failures.push("query endpoint returned no payload".to_string());
            GRAPH_UNAVAILABLE.to_string()
        }
        Err(err) => {
            failures.push(format!("query endpoint failed: {err:#}"));
            GRAPH_UNAVAILABLE.to_string()
        }
    }
}

fn cli_signal(
    collaborators: &Collaborators,
    config: &BenchConfig,
    failures: &mut Vec<String>,
) -> String {
    let Some(command) = config.baseline_command.as_deref() else {
        return CLI_UNAVAILABLE.to_string();
    };

    match collaborators.shell.run(command, config.baseline_timeout()) {
        Ok(output) if output.success() && !output.stdout.trim().is_empty() => {
            truncate_chars(output.stdout.trim(), config.signal_chars).to_string()
        }
        Ok(output) if output.success() => {
            failures.push("baseline command produced no output".to_string());
            CLI_UNAVAILABLE.to_string()
        }
        Ok(output) => {
            let code = output
                .exit_code
                .map(|code| code.to_string())
                .unwrap_or_else(|| "signal".to_string());
            failures.push(format!(
                "baseline command exited with {code}: {}",
                truncate_chars(output.stderr.trim(), 120)
            ));
            CLI_UNAVAILABLE.to_string()
        }
        Err(err) => {
            failures.push(format!("baseline command failed: {err:#}"));
            CLI_UNAVAILABLE.to_string()
        }
    }
}

struct FeaturePlanHandler;

impl PhaseHandler for FeaturePlanHandler {
    fn produce(
        &self,
        request: &PhaseRequest<'_>,
        _collaborators: &Collaborators,
        staging: &mut dyn StagingArea,
    ) -> Result<PhaseOutcome> {
        let mut plan = FEATURE_PLAN_TEXT.to_string();
        if request.profile.inject_context_noise {
            plan.push_str(&format!("context_noise={}\n", request.config.noise_token));
        }
        if request.profile.detect_doc_drift {
            staging.write_file(Path::new(DRIFT_SEED_FILE), DRIFT_SEED_TEXT)?;
        }
        Ok(PhaseOutcome::text(compress_text(
            &plan,
            request.config.max_output_chars,
        )))
    }
}

struct AckHandler {
    text: &'static str,
}

impl PhaseHandler for AckHandler {
    fn produce(
        &self,
        request: &PhaseRequest<'_>,
        _collaborators: &Collaborators,
        _staging: &mut dyn StagingArea,
    ) -> Result<PhaseOutcome> {
        Ok(PhaseOutcome::text(compress_text(
            self.text,
            request.config.max_output_chars,
        )))
    }
}

struct ImplementationHandler;

impl PhaseHandler for ImplementationHandler {
    fn produce(
        &self,
        request: &PhaseRequest<'_>,
        _collaborators: &Collaborators,
        staging: &mut dyn StagingArea,
    ) -> Result<PhaseOutcome> {
        let impl_file = Path::new(IMPL_FILE);
        staging.write_file(impl_file, SYNTHETIC_IMPL_SOURCE)?;
        let output = format!(
            "Implemented synthetic feature file: {}",
            staging.display_path(impl_file)
        );
        Ok(PhaseOutcome::text(compress_text(
            &output,
            request.config.max_output_chars,
        )))
    }
}

struct TestsHandler;

impl PhaseHandler for TestsHandler {
    fn produce(
        &self,
        request: &PhaseRequest<'_>,
        _collaborators: &Collaborators,
        staging: &mut dyn StagingArea,
    ) -> Result<PhaseOutcome> {
        let impl_file = Path::new(IMPL_FILE);
        let passed = staging.file_exists(impl_file);
        let checked = impl_file
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or(IMPL_FILE);
        staging.write_file(
            Path::new(TEST_EVIDENCE_FILE),
            &format!("synthetic_test_passed={passed}\nchecked_file={checked}\n"),
        )?;
        Ok(PhaseOutcome::text(compress_text(
            &format!("Synthetic tests executed, passed={passed}"),
            request.config.max_output_chars,
        )))
    }
}

struct RevertHandler {
    partial: bool,
}

impl PhaseHandler for RevertHandler {
    fn produce(
        &self,
        request: &PhaseRequest<'_>,
        _collaborators: &Collaborators,
        staging: &mut dyn StagingArea,
    ) -> Result<PhaseOutcome> {
        let impl_dir = Path::new(SYNTHETIC_DIR);
        let max_chars = request.config.max_output_chars;

        if !staging.dir_exists(impl_dir) {
            return Ok(PhaseOutcome::text(compress_text(
                "No synthetic implementation directory found; nothing to revert.",
                max_chars,
            )));
        }

        if self.partial {
            let residual = impl_dir.join(RESIDUAL_FILE);
            staging.write_file(&residual, "simulate partial cleanup")?;
            let leftovers = staging
                .list_dir(impl_dir)?
                .into_iter()
                .filter(|child| child != &residual)
                .collect::<Vec<PathBuf>>();
            for child in &leftovers {
                staging.remove_path(child)?;
            }
            debug!(removed = leftovers.len(), "partial revert kept residual marker");
            return Ok(PhaseOutcome::text(compress_text(
                &format!(
                    "Partial revert completed with residual artifact: {}",
                    staging.display_path(&residual)
                ),
                max_chars,
            )));
        }

        staging.remove_path(impl_dir)?;
        Ok(PhaseOutcome::text(compress_text(
            &format!(
                "Reverted synthetic implementation directory: {}",
                staging.display_path(impl_dir)
            ),
            max_chars,
        )))
    }
}
