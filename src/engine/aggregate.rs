use std::collections::BTreeMap;

use serde::Serialize;

use super::scoring::{
    contamination_score, drift_detection_score, retention_score, revert_integrity_score,
};
use crate::config::SUMMARY_STORAGE_CHARS;
use crate::model::{Method, MethodResult, StepResult, StressState};
use crate::profiles::CaseProfile;
use crate::util::truncate_chars;

pub fn aggregate_method_result(
    run_id: &str,
    profile: &CaseProfile,
    method: Method,
    steps: &[StepResult],
    pre_summary: &str,
    post_summary: &str,
    stress: &StressState,
) -> MethodResult {
    let total_tokens = steps.iter().map(|step| step.total_tokens).sum();
    let completed_phases = steps
        .iter()
        .filter(|step| step.status.is_finished())
        .count() as u32;

    MethodResult {
        run_id: run_id.to_string(),
        case_id: profile.case_id.to_string(),
        method,
        total_tokens,
        avg_accuracy: mean(steps.iter().map(|step| step.accuracy)),
        avg_change_tracking: mean(steps.iter().map(|step| step.change_tracking_score)),
        completed_phases,
        pre_summary: truncate_chars(pre_summary, SUMMARY_STORAGE_CHARS).to_string(),
        post_summary: truncate_chars(post_summary, SUMMARY_STORAGE_CHARS).to_string(),
        retention_score: Some(retention_score(pre_summary, post_summary)),
        contamination_score: Some(contamination_score(profile, stress)),
        drift_detection_score: Some(drift_detection_score(profile, stress)),
        revert_integrity_score: Some(revert_integrity_score(stress)),
    }
}

/// Unrounded; rounding happens where scores are ranked or rendered.
fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values.fold((0.0, 0usize), |(sum, count), value| {
        (sum + value, count + 1)
    });
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

/// Per-method rollup across every case of a run.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MethodComparison {
    pub method: Method,
    pub cases: usize,
    pub total_tokens: i64,
    pub avg_accuracy: f64,
    pub avg_change_tracking: f64,
    pub avg_retention: f64,
}

pub fn compare_by_method(results: &[MethodResult]) -> Vec<MethodComparison> {
    let mut grouped: BTreeMap<&'static str, (Method, Vec<&MethodResult>)> = BTreeMap::new();
    for result in results {
        grouped
            .entry(result.method.as_str())
            .or_insert_with(|| (result.method, Vec::new()))
            .1
            .push(result);
    }

    grouped
        .into_values()
        .map(|(method, rows)| MethodComparison {
            method,
            cases: rows.len(),
            total_tokens: rows.iter().map(|row| row.total_tokens).sum(),
            avg_accuracy: mean(rows.iter().map(|row| row.avg_accuracy)),
            avg_change_tracking: mean(rows.iter().map(|row| row.avg_change_tracking)),
            avg_retention: mean(rows.iter().map(|row| row.retention_score.unwrap_or(0.0))),
        })
        .collect()
}
