use crate::metrics::word_set_similarity;
use crate::model::StressState;
use crate::phases::{Phase, PhaseKind};
use crate::profiles::CaseProfile;
use crate::util::round_to;

const FILE_COUNT_MARKER: &str = "src_files=";
const DOC_COUNT_MARKER: &str = "docs_md_files=";
const MIN_ACK_CHARS: usize = 20;
const CHANGE_TRACKING_CATEGORIES: f64 = 4.0;

/// Content checks for one phase. The artifact check applies to every phase.
fn accuracy_checks(phase: &Phase, output: &str, artifact_written: bool) -> Vec<bool> {
    let content_check = match phase.kind {
        PhaseKind::PreSummary | PhaseKind::PostSummary => {
            output.contains(FILE_COUNT_MARKER) && output.contains(DOC_COUNT_MARKER)
        }
        PhaseKind::Implementation => output.contains("Implemented synthetic feature"),
        PhaseKind::Tests => output.contains("passed=true"),
        PhaseKind::RevertAndCleanup => {
            output.contains("Reverted synthetic") || output.contains("nothing to revert")
        }
        PhaseKind::FeaturePlan | PhaseKind::DocsStepUpdate | PhaseKind::DocsPostImpl => {
            output.trim().chars().count() > MIN_ACK_CHARS
        }
    };
    vec![artifact_written, content_check]
}

fn score_checks(checks: &[bool], output: &str) -> f64 {
    if checks.is_empty() {
        return if output.trim().is_empty() { 0.0 } else { 1.0 };
    }
    let points = checks.iter().filter(|passed| **passed).count();
    round_to(points as f64 / checks.len() as f64, 3)
}

pub fn phase_accuracy(phase: &Phase, output: &str, artifact_written: bool) -> f64 {
    score_checks(&accuracy_checks(phase, output, artifact_written), output)
}

pub fn phase_change_tracking(phase: &Phase, output: &str) -> f64 {
    let lower = output.to_lowercase();
    let mut references = 0u32;

    if lower.contains("synthetic") {
        references += 1;
    }
    if lower.contains("context") || lower.contains("trace") {
        references += 1;
    }
    if ["docs", "documentation", "phase"]
        .iter()
        .any(|token| output.contains(token))
    {
        references += 1;
    }
    if phase.requires_revert && lower.contains("revert") {
        references += 1;
    }

    round_to(
        (f64::from(references) / CHANGE_TRACKING_CATEGORIES).min(1.0),
        3,
    )
}

pub fn retention_score(pre_summary: &str, post_summary: &str) -> f64 {
    word_set_similarity(pre_summary, post_summary)
}

/// 1.0 unless noise injection is active and the noise reached the post-summary.
pub fn contamination_score(profile: &CaseProfile, state: &StressState) -> f64 {
    if profile.inject_context_noise && state.noise_leaked {
        0.0
    } else {
        1.0
    }
}

/// Neutral 1.0 when drift detection is not part of the case.
pub fn drift_detection_score(profile: &CaseProfile, state: &StressState) -> f64 {
    if !profile.detect_doc_drift || state.drift_detected {
        1.0
    } else {
        0.0
    }
}

pub fn revert_integrity_score(state: &StressState) -> f64 {
    if state.revert_clean { 1.0 } else { 0.0 }
}
