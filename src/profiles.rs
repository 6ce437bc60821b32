use anyhow::{Result, bail};
use serde::Serialize;

use crate::model::MethodResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CaseProfile {
    pub case_id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub inject_context_noise: bool,
    pub detect_doc_drift: bool,
    pub stress_revert_integrity: bool,
}

const CASE_PROFILES: [CaseProfile; 4] = [
    CaseProfile {
        case_id: "A001",
        name: "baseline_agent_workflow",
        description: "Original synthetic workflow for graph vs baseline comparison.",
        inject_context_noise: false,
        detect_doc_drift: false,
        stress_revert_integrity: false,
    },
    CaseProfile {
        case_id: "A002",
        name: "context_pollution_resistance",
        description: "Inject irrelevant context and measure leakage into final summaries.",
        inject_context_noise: true,
        detect_doc_drift: false,
        stress_revert_integrity: false,
    },
    CaseProfile {
        case_id: "A003",
        name: "documentation_drift_detection",
        description: "Simulate docs-vs-code mismatch and measure drift detection quality.",
        inject_context_noise: false,
        detect_doc_drift: true,
        stress_revert_integrity: false,
    },
    CaseProfile {
        case_id: "A004",
        name: "revert_integrity_stress",
        description: "Stress revert/cleanup and measure residual synthetic artifacts.",
        inject_context_noise: false,
        detect_doc_drift: false,
        stress_revert_integrity: true,
    },
];

pub fn case_profiles() -> &'static [CaseProfile] {
    &CASE_PROFILES
}

pub fn supported_case_ids() -> Vec<&'static str> {
    let mut ids = case_profiles()
        .iter()
        .map(|profile| profile.case_id)
        .collect::<Vec<_>>();
    ids.sort_unstable();
    ids
}

pub fn get_case_profile(case_id: &str) -> Result<CaseProfile> {
    let trimmed = case_id.trim();
    match CASE_PROFILES
        .iter()
        .find(|profile| profile.case_id.eq_ignore_ascii_case(trimmed))
    {
        Some(profile) => Ok(*profile),
        None => bail!(
            "unsupported case id: {trimmed}. Supported: {}",
            supported_case_ids().join(", ")
        ),
    }
}

impl CaseProfile {
    pub fn is_neutral(&self) -> bool {
        !self.inject_context_noise && !self.detect_doc_drift && !self.stress_revert_integrity
    }

    /// Stress score that represents this case in the weighted ranking.
    ///
    /// A neutral profile averages all three stress scores; a profile with
    /// several active flags averages the active ones.
    pub fn case_metric(&self, result: &MethodResult) -> f64 {
        let contamination = result.contamination_score.unwrap_or(0.0);
        let drift = result.drift_detection_score.unwrap_or(0.0);
        let revert = result.revert_integrity_score.unwrap_or(0.0);

        if self.is_neutral() {
            return (contamination + drift + revert) / 3.0;
        }

        let active = [
            (self.inject_context_noise, contamination),
            (self.detect_doc_drift, drift),
            (self.stress_revert_integrity, revert),
        ]
        .into_iter()
        .filter_map(|(enabled, score)| enabled.then_some(score))
        .collect::<Vec<f64>>();

        active.iter().sum::<f64>() / active.len() as f64
    }
}
