use std::collections::BTreeMap;

use serde::Serialize;

use crate::model::{Method, MethodResult, RunStatus};
use crate::profiles::get_case_profile;
use crate::util::round_to;

pub const ACCURACY_WEIGHT: f64 = 0.35;
pub const CHANGE_TRACKING_WEIGHT: f64 = 0.25;
pub const RETENTION_WEIGHT: f64 = 0.15;
pub const CASE_METRIC_WEIGHT: f64 = 0.15;
pub const TOKEN_EFFICIENCY_WEIGHT: f64 = 0.10;

/// Score gap below which two methods are reported as a tie.
pub const TIE_EPSILON: f64 = 0.005;

/// A stored method result together with the run it belongs to.
#[derive(Debug, Clone)]
pub struct RankingRow {
    pub result: MethodResult,
    pub run_status: RunStatus,
    pub generated_at: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct WeightedScore {
    pub run_id: String,
    pub case_id: String,
    pub method: Method,
    pub generated_at: String,
    pub total_tokens: i64,
    pub avg_accuracy: f64,
    pub avg_change_tracking: f64,
    pub retention_score: Option<f64>,
    pub case_metric: f64,
    pub token_efficiency: Option<f64>,
    pub weighted_score: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Winner {
    Method(Method),
    Tie,
}

impl Winner {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Method(method) => method.as_str(),
            Self::Tie => "tie",
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CaseWinner {
    pub case_id: String,
    pub winner: Winner,
    pub winner_score: f64,
    pub second_score: f64,
    pub score_delta: f64,
}

/// Newest executed row per (case, method); planned runs never rank.
///
/// Equal timestamps fall back to the larger run id so the pick is stable.
pub fn latest_per_case_method(rows: &[RankingRow]) -> Vec<&RankingRow> {
    let mut latest: BTreeMap<(&str, &str), &RankingRow> = BTreeMap::new();
    for row in rows
        .iter()
        .filter(|row| row.run_status == RunStatus::Executed)
    {
        let key = (row.result.case_id.as_str(), row.result.method.as_str());
        let newer = latest.get(&key).is_none_or(|current| {
            (row.generated_at.as_str(), row.result.run_id.as_str())
                > (current.generated_at.as_str(), current.result.run_id.as_str())
        });
        if newer {
            latest.insert(key, row);
        }
    }
    latest.into_values().collect()
}

/// Cheapest total in the case divided by this total; `None` for a zero total.
pub fn token_efficiency(case_min_tokens: i64, total_tokens: i64) -> Option<f64> {
    if total_tokens == 0 {
        return None;
    }
    Some(case_min_tokens as f64 / total_tokens as f64)
}

pub fn case_metric(result: &MethodResult) -> f64 {
    match get_case_profile(&result.case_id) {
        Ok(profile) => profile.case_metric(result),
        Err(_) => {
            (result.contamination_score.unwrap_or(0.0)
                + result.drift_detection_score.unwrap_or(0.0)
                + result.revert_integrity_score.unwrap_or(0.0))
                / 3.0
        }
    }
}

pub fn weighted_scores(rows: &[RankingRow]) -> Vec<WeightedScore> {
    let latest = latest_per_case_method(rows);

    let mut case_min_tokens: BTreeMap<&str, i64> = BTreeMap::new();
    for row in &latest {
        let entry = case_min_tokens
            .entry(row.result.case_id.as_str())
            .or_insert(row.result.total_tokens);
        *entry = (*entry).min(row.result.total_tokens);
    }

    latest
        .iter()
        .map(|row| {
            let result = &row.result;
            let metric = case_metric(result);
            let efficiency = token_efficiency(
                case_min_tokens
                    .get(result.case_id.as_str())
                    .copied()
                    .unwrap_or(result.total_tokens),
                result.total_tokens,
            );
            let score = ACCURACY_WEIGHT * result.avg_accuracy
                + CHANGE_TRACKING_WEIGHT * result.avg_change_tracking
                + RETENTION_WEIGHT * result.retention_score.unwrap_or(0.0)
                + CASE_METRIC_WEIGHT * metric
                + TOKEN_EFFICIENCY_WEIGHT * efficiency.unwrap_or(0.0);

            WeightedScore {
                run_id: result.run_id.clone(),
                case_id: result.case_id.clone(),
                method: result.method,
                generated_at: row.generated_at.clone(),
                total_tokens: result.total_tokens,
                avg_accuracy: result.avg_accuracy,
                avg_change_tracking: result.avg_change_tracking,
                retention_score: result.retention_score,
                case_metric: metric,
                token_efficiency: efficiency,
                weighted_score: round_to(score, 4),
            }
        })
        .collect()
}

pub fn determine_winners(scores: &[WeightedScore]) -> Vec<CaseWinner> {
    let mut by_case: BTreeMap<&str, Vec<&WeightedScore>> = BTreeMap::new();
    for score in scores {
        by_case.entry(score.case_id.as_str()).or_default().push(score);
    }

    by_case
        .into_iter()
        .filter_map(|(case_id, mut ranked)| {
            ranked.sort_by(|left, right| {
                right
                    .weighted_score
                    .total_cmp(&left.weighted_score)
                    .then_with(|| left.method.as_str().cmp(right.method.as_str()))
            });
            let top = ranked.first()?;
            let second_score = ranked
                .get(1)
                .map(|next| next.weighted_score)
                .unwrap_or(top.weighted_score);
            let score_delta = round_to(top.weighted_score - second_score, 4);
            let winner = if ranked.len() > 1 && score_delta < TIE_EPSILON {
                Winner::Tie
            } else {
                Winner::Method(top.method)
            };

            Some(CaseWinner {
                case_id: case_id.to_string(),
                winner,
                winner_score: top.weighted_score,
                second_score,
                score_delta,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(
        run_id: &str,
        generated_at: &str,
        case_id: &str,
        method: Method,
        total_tokens: i64,
        status: RunStatus,
    ) -> RankingRow {
        RankingRow {
            result: MethodResult {
                run_id: run_id.to_string(),
                case_id: case_id.to_string(),
                method,
                total_tokens,
                avg_accuracy: 1.0,
                avg_change_tracking: 0.5,
                completed_phases: 8,
                pre_summary: String::new(),
                post_summary: String::new(),
                retention_score: Some(1.0),
                contamination_score: Some(1.0),
                drift_detection_score: Some(1.0),
                revert_integrity_score: Some(1.0),
            },
            run_status: status,
            generated_at: generated_at.to_string(),
        }
    }

    fn score(case_id: &str, method: Method, weighted_score: f64) -> WeightedScore {
        WeightedScore {
            run_id: "run-1".to_string(),
            case_id: case_id.to_string(),
            method,
            generated_at: "2026-01-01T00:00:00.000Z".to_string(),
            total_tokens: 100,
            avg_accuracy: 1.0,
            avg_change_tracking: 1.0,
            retention_score: Some(1.0),
            case_metric: 1.0,
            token_efficiency: Some(1.0),
            weighted_score,
        }
    }

    #[test]
    fn narrow_gap_is_reported_as_tie() {
        let winners = determine_winners(&[
            score("A001", Method::Graph, 0.8021),
            score("A001", Method::Baseline, 0.7994),
        ]);
        assert_eq!(winners.len(), 1);
        assert_eq!(winners[0].winner, Winner::Tie);
        assert_eq!(winners[0].winner.as_str(), "tie");
        assert_eq!(winners[0].winner_score, 0.8021);
        assert_eq!(winners[0].second_score, 0.7994);
        assert_eq!(winners[0].score_delta, 0.0027);
    }

    #[test]
    fn clear_gap_names_the_top_method() {
        let winners = determine_winners(&[
            score("A002", Method::Baseline, 0.70),
            score("A002", Method::Graph, 0.81),
        ]);
        assert_eq!(winners[0].winner, Winner::Method(Method::Graph));
        assert_eq!(winners[0].score_delta, 0.11);
    }

    #[test]
    fn equal_scores_rank_by_method_name_and_tie() {
        let winners = determine_winners(&[
            score("A003", Method::Graph, 0.9),
            score("A003", Method::Baseline, 0.9),
        ]);
        assert_eq!(winners[0].winner, Winner::Tie);
        assert_eq!(winners[0].score_delta, 0.0);
    }

    #[test]
    fn single_method_case_wins_against_itself() {
        let winners = determine_winners(&[score("A004", Method::Graph, 0.6)]);
        assert_eq!(winners[0].winner, Winner::Method(Method::Graph));
        assert_eq!(winners[0].second_score, 0.6);
        assert_eq!(winners[0].score_delta, 0.0);
    }

    #[test]
    fn token_efficiency_is_relative_to_cheapest_method() {
        let rows = vec![
            row("run-1", "2026-01-01T00:00:00.000Z", "A001", Method::Graph, 500, RunStatus::Executed),
            row("run-1", "2026-01-01T00:00:00.000Z", "A001", Method::Baseline, 1000, RunStatus::Executed),
        ];
        let scores = weighted_scores(&rows);
        let efficiency = |method: Method| {
            scores
                .iter()
                .find(|score| score.method == method)
                .and_then(|score| score.token_efficiency)
        };
        assert_eq!(efficiency(Method::Graph), Some(1.0));
        assert_eq!(efficiency(Method::Baseline), Some(0.5));
        assert_eq!(token_efficiency(0, 0), None);
    }

    #[test]
    fn zero_token_rows_drop_the_efficiency_term() {
        let rows = vec![row(
            "run-1",
            "2026-01-01T00:00:00.000Z",
            "A001",
            Method::Graph,
            0,
            RunStatus::Executed,
        )];
        let scores = weighted_scores(&rows);
        assert_eq!(scores[0].token_efficiency, None);
        // 0.35 + 0.125 + 0.15 + 0.15
        assert_eq!(scores[0].weighted_score, 0.775);
    }

    #[test]
    fn ranking_uses_latest_executed_row_only() {
        let mut newest_planned = row(
            "run-3",
            "2026-03-01T00:00:00.000Z",
            "A001",
            Method::Graph,
            10,
            RunStatus::Planned,
        );
        newest_planned.result.avg_accuracy = 0.0;
        let mut older = row(
            "run-1",
            "2026-01-01T00:00:00.000Z",
            "A001",
            Method::Graph,
            900,
            RunStatus::Executed,
        );
        older.result.avg_accuracy = 0.2;
        let newer = row(
            "run-2",
            "2026-02-01T00:00:00.000Z",
            "A001",
            Method::Graph,
            400,
            RunStatus::Executed,
        );

        let rows = vec![older, newest_planned, newer];
        let latest = latest_per_case_method(&rows);
        assert_eq!(latest.len(), 1);
        assert_eq!(latest[0].result.run_id, "run-2");

        let scores = weighted_scores(&rows);
        assert_eq!(scores.len(), 1);
        assert_eq!(scores[0].run_id, "run-2");
    }

    #[test]
    fn scores_are_bounded_and_deterministic() {
        let mut rows = Vec::new();
        for (index, case_id) in ["A001", "A002", "A003", "A004", "Z999"].iter().enumerate() {
            for method in Method::ALL {
                let mut entry = row(
                    "run-1",
                    "2026-01-01T00:00:00.000Z",
                    case_id,
                    method,
                    100 + index as i64 * 37,
                    RunStatus::Executed,
                );
                entry.result.contamination_score = Some(0.0);
                entry.result.retention_score = None;
                rows.push(entry);
            }
        }

        let first = weighted_scores(&rows);
        let second = weighted_scores(&rows);
        assert_eq!(first, second);
        assert_eq!(first.len(), 10);
        for score in &first {
            assert!((0.0..=1.0).contains(&score.weighted_score));
        }
        assert_eq!(determine_winners(&first), determine_winners(&second));
    }

    #[test]
    fn case_metric_follows_the_case_profile() {
        let mut result = row(
            "run-1",
            "2026-01-01T00:00:00.000Z",
            "A002",
            Method::Graph,
            100,
            RunStatus::Executed,
        )
        .result;
        result.contamination_score = Some(0.0);
        assert_eq!(case_metric(&result), 0.0);

        result.case_id = "A001".to_string();
        assert!((case_metric(&result) - 2.0 / 3.0).abs() < 1e-9);

        result.case_id = "Z999".to_string();
        assert!((case_metric(&result) - 2.0 / 3.0).abs() < 1e-9);
    }
}
