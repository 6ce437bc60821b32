use anyhow::{Result, bail};
use serde::Serialize;
use tracing::{info, warn};

use crate::cli::GateArgs;
use crate::model::Method;
use crate::ranking::{RankingRow, WeightedScore, weighted_scores};
use crate::store;
use crate::util::round_to;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreRegression {
    pub case_id: String,
    pub method: Method,
    pub previous_score: f64,
    pub current_score: f64,
    pub drop: f64,
}

pub fn run(args: GateArgs) -> Result<()> {
    if args.max_score_regression < 0.0 {
        bail!("--max-score-regression must not be negative");
    }

    let Some(connection) = store::open_existing(&args.db_path)? else {
        warn!(path = %args.db_path.display(), "database missing; regression gate skipped");
        return Ok(());
    };

    let runs = store::latest_executed_runs(&connection, 2)?;
    let [current, previous] = runs.as_slice() else {
        info!(executed_runs = runs.len(), "fewer than two executed runs; regression gate skipped");
        return Ok(());
    };

    let rows = store::load_ranking_rows(&connection)?;
    let current_scores = scores_for_run(&rows, &current.run_id);
    let previous_scores = scores_for_run(&rows, &previous.run_id);
    let regressions =
        find_regressions(&previous_scores, &current_scores, args.max_score_regression);

    info!(
        current_run = %current.run_id,
        previous_run = %previous.run_id,
        compared = current_scores.len(),
        regressions = regressions.len(),
        "regression gate evaluated"
    );

    if regressions.is_empty() {
        return Ok(());
    }
    for regression in &regressions {
        warn!(
            case_id = %regression.case_id,
            method = %regression.method,
            previous_score = regression.previous_score,
            current_score = regression.current_score,
            drop = regression.drop,
            "weighted score regressed"
        );
    }
    bail!(
        "weighted score regressed beyond {} for {} unit(s) between {} and {}",
        args.max_score_regression,
        regressions.len(),
        previous.run_id,
        current.run_id
    );
}

/// Scores computed from one run's rows alone, so token efficiency stays within that run.
fn scores_for_run(rows: &[RankingRow], run_id: &str) -> Vec<WeightedScore> {
    let scoped = rows
        .iter()
        .filter(|row| row.result.run_id == run_id)
        .cloned()
        .collect::<Vec<_>>();
    weighted_scores(&scoped)
}

/// Units present in both runs whose score dropped by more than `max_drop`.
pub fn find_regressions(
    previous: &[WeightedScore],
    current: &[WeightedScore],
    max_drop: f64,
) -> Vec<ScoreRegression> {
    current
        .iter()
        .filter_map(|now| {
            let before = previous
                .iter()
                .find(|score| score.case_id == now.case_id && score.method == now.method)?;
            let drop = round_to(before.weighted_score - now.weighted_score, 4);
            (drop > max_drop).then(|| ScoreRegression {
                case_id: now.case_id.clone(),
                method: now.method,
                previous_score: before.weighted_score,
                current_score: now.weighted_score,
                drop,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn score(case_id: &str, method: Method, weighted_score: f64) -> WeightedScore {
        WeightedScore {
            run_id: "run".to_string(),
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
    fn drops_beyond_threshold_are_reported() {
        let previous = vec![
            score("A001", Method::Graph, 0.90),
            score("A001", Method::Baseline, 0.80),
        ];
        let current = vec![
            score("A001", Method::Graph, 0.85),
            score("A001", Method::Baseline, 0.79),
        ];
        let regressions = find_regressions(&previous, &current, 0.02);
        assert_eq!(regressions.len(), 1);
        assert_eq!(regressions[0].method, Method::Graph);
        assert_eq!(regressions[0].drop, 0.05);
    }

    #[test]
    fn improvements_and_new_units_pass() {
        let previous = vec![score("A001", Method::Graph, 0.70)];
        let current = vec![
            score("A001", Method::Graph, 0.75),
            score("A002", Method::Graph, 0.10),
        ];
        assert!(find_regressions(&previous, &current, 0.02).is_empty());
    }

    #[test]
    fn drop_equal_to_threshold_is_tolerated() {
        let previous = vec![score("A003", Method::Baseline, 0.60)];
        let current = vec![score("A003", Method::Baseline, 0.58)];
        assert!(find_regressions(&previous, &current, 0.02).is_empty());
    }
}
