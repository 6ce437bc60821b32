use anyhow::{Context, Result, bail};
use rusqlite::{Connection, OptionalExtension, Transaction, params};
use tracing::info;

use super::reads::{latest_executed_runs, load_ranking_rows, load_run_results};
use crate::engine::{MethodRun, compare_by_method};
use crate::model::{Method, RunRecord, RunStatus, StepStatus};
use crate::phases::Phase;
use crate::profiles::CaseProfile;
use crate::ranking::{determine_winners, weighted_scores};
use crate::util::now_utc_string;

/// Inserts a PLANNED run and one PLANNED step row per (case, method, phase).
pub fn insert_planned_run(
    connection: &mut Connection,
    run: &RunRecord,
    cases: &[CaseProfile],
    phases: &[Phase],
) -> Result<usize> {
    let tx = connection.transaction()?;
    tx.execute(
        "INSERT INTO agent_benchmark_runs(run_id, generated_at, model_key, status, notes)
         VALUES(?1, ?2, ?3, ?4, ?5)",
        params![
            &run.run_id,
            &run.generated_at,
            &run.model_key,
            run.status.as_str(),
            &run.notes
        ],
    )
    .with_context(|| format!("failed to insert run {}", run.run_id))?;

    let mut planned = 0usize;
    for case in cases {
        for method in Method::ALL {
            for phase in phases {
                upsert_planned_step(&tx, &run.run_id, case.case_id, method, phase)?;
                planned += 1;
            }
        }
    }

    tx.commit()?;
    Ok(planned)
}

fn upsert_planned_step(
    tx: &Transaction<'_>,
    run_id: &str,
    case_id: &str,
    method: Method,
    phase: &Phase,
) -> Result<()> {
    tx.execute(
        "
        INSERT INTO agent_benchmark_steps(
          run_id, case_id, method, phase_order, phase_name,
          objective, context_boundary, expected_artifacts, documentation_targets,
          requires_revert, status
        ) VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
        ON CONFLICT(run_id, case_id, method, phase_order) DO NOTHING
        ",
        params![
            run_id,
            case_id,
            method.as_str(),
            phase.order,
            phase.name(),
            phase.objective,
            phase.context_boundary,
            serde_json::to_string(phase.expected_artifacts)?,
            serde_json::to_string(phase.documentation_targets)?,
            phase.requires_revert,
            StepStatus::Planned.as_str(),
        ],
    )
    .with_context(|| {
        format!(
            "failed to plan step {} for {case_id}/{method}",
            phase.name()
        )
    })?;
    Ok(())
}

/// Writes one (case, method) unit: every step row plus the result row, atomically.
pub fn persist_method_run(
    connection: &mut Connection,
    run: &MethodRun,
    phases: &[Phase],
) -> Result<()> {
    let result = &run.result;
    let tx = connection.transaction()?;

    for step in &run.steps {
        let Some(phase) = phases.iter().find(|phase| phase.order == step.phase_order) else {
            bail!(
                "step {} references phase order {} missing from the catalog",
                step.phase_name,
                step.phase_order
            );
        };
        upsert_planned_step(&tx, &step.run_id, &step.case_id, step.method, phase)?;
        tx.execute(
            "
            UPDATE agent_benchmark_steps
            SET status = ?1,
                latency_ms = ?2,
                input_tokens = ?3,
                output_tokens = ?4,
                total_tokens = ?5,
                accuracy = ?6,
                change_tracking_score = ?7,
                output_hash = ?8,
                execution_notes = ?9
            WHERE run_id = ?10 AND case_id = ?11 AND method = ?12 AND phase_order = ?13
            ",
            params![
                step.status.as_str(),
                step.latency_ms,
                step.input_tokens,
                step.output_tokens,
                step.total_tokens,
                step.accuracy,
                step.change_tracking_score,
                &step.output_hash,
                &step.execution_notes,
                &step.run_id,
                &step.case_id,
                step.method.as_str(),
                step.phase_order,
            ],
        )
        .with_context(|| format!("failed to record step {}", step.phase_name))?;
    }

    tx.execute(
        "
        INSERT INTO agent_benchmark_results(
          run_id, case_id, method, total_tokens, avg_accuracy,
          avg_change_tracking, completed_phases, pre_summary, post_summary, retention_score,
          contamination_score, drift_detection_score, revert_integrity_score
        ) VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
        ON CONFLICT(run_id, case_id, method) DO UPDATE SET
          total_tokens=excluded.total_tokens,
          avg_accuracy=excluded.avg_accuracy,
          avg_change_tracking=excluded.avg_change_tracking,
          completed_phases=excluded.completed_phases,
          pre_summary=excluded.pre_summary,
          post_summary=excluded.post_summary,
          retention_score=excluded.retention_score,
          contamination_score=excluded.contamination_score,
          drift_detection_score=excluded.drift_detection_score,
          revert_integrity_score=excluded.revert_integrity_score
        ",
        params![
            &result.run_id,
            &result.case_id,
            result.method.as_str(),
            result.total_tokens,
            result.avg_accuracy,
            result.avg_change_tracking,
            result.completed_phases,
            &result.pre_summary,
            &result.post_summary,
            result.retention_score,
            result.contamination_score,
            result.drift_detection_score,
            result.revert_integrity_score,
        ],
    )
    .with_context(|| {
        format!(
            "failed to record result for {}/{}",
            result.case_id, result.method
        )
    })?;

    tx.commit()?;
    Ok(())
}

/// Moves a run forward to EXECUTED; any other transition is rejected.
pub fn mark_run_executed(connection: &Connection, run_id: &str) -> Result<()> {
    let current: Option<String> = connection
        .query_row(
            "SELECT status FROM agent_benchmark_runs WHERE run_id = ?1",
            [run_id],
            |row| row.get(0),
        )
        .optional()?;
    let Some(current) = current else {
        bail!("run {run_id} does not exist");
    };

    let current = RunStatus::parse(&current)?;
    if !current.can_transition_to(RunStatus::Executed) {
        bail!(
            "run {run_id} cannot move from {} to {}",
            current.as_str(),
            RunStatus::Executed.as_str()
        );
    }

    connection.execute(
        "UPDATE agent_benchmark_runs SET status = ?1 WHERE run_id = ?2",
        params![RunStatus::Executed.as_str(), run_id],
    )?;
    Ok(())
}

/// Row counts written by one `refresh_ranking_tables` pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RankingRefresh {
    pub scores: usize,
    pub winners: usize,
    pub comparisons: usize,
}

/// Recomputes the weighted-score and winner tables from every stored result,
/// and the per-method comparison from the latest executed run.
pub fn refresh_ranking_tables(connection: &mut Connection) -> Result<RankingRefresh> {
    let rows = load_ranking_rows(connection)?;
    let scores = weighted_scores(&rows);
    let winners = determine_winners(&scores);
    let latest = latest_executed_runs(connection, 1)?.into_iter().next();
    let comparison = match &latest {
        Some(run) => compare_by_method(&load_run_results(connection, &run.run_id)?),
        None => Vec::new(),
    };
    let refreshed_at = now_utc_string();

    let tx = connection.transaction()?;
    tx.execute("DELETE FROM agent_mode_weighted_scores", [])?;
    tx.execute("DELETE FROM agent_mode_winners", [])?;
    tx.execute("DELETE FROM agent_mode_method_comparison", [])?;

    {
        let mut statement = tx.prepare(
            "
            INSERT INTO agent_mode_weighted_scores(
              case_id, method, run_id, generated_at, total_tokens, avg_accuracy,
              avg_change_tracking, retention_score, case_metric, token_efficiency,
              weighted_score, refreshed_at
            ) VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            ",
        )?;
        for score in &scores {
            statement.execute(params![
                &score.case_id,
                score.method.as_str(),
                &score.run_id,
                &score.generated_at,
                score.total_tokens,
                score.avg_accuracy,
                score.avg_change_tracking,
                score.retention_score,
                score.case_metric,
                score.token_efficiency,
                score.weighted_score,
                &refreshed_at,
            ])?;
        }
    }

    {
        let mut statement = tx.prepare(
            "
            INSERT INTO agent_mode_winners(
              case_id, winner_method, winner_score, second_score, score_delta, refreshed_at
            ) VALUES(?1, ?2, ?3, ?4, ?5, ?6)
            ",
        )?;
        for winner in &winners {
            statement.execute(params![
                &winner.case_id,
                winner.winner.as_str(),
                winner.winner_score,
                winner.second_score,
                winner.score_delta,
                &refreshed_at,
            ])?;
        }
    }

    if let Some(run) = &latest {
        let mut statement = tx.prepare(
            "
            INSERT INTO agent_mode_method_comparison(
              method, run_id, cases, total_tokens, avg_accuracy,
              avg_change_tracking, avg_retention, refreshed_at
            ) VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ",
        )?;
        for row in &comparison {
            statement.execute(params![
                row.method.as_str(),
                &run.run_id,
                row.cases as i64,
                row.total_tokens,
                row.avg_accuracy,
                row.avg_change_tracking,
                row.avg_retention,
                &refreshed_at,
            ])?;
        }
    }

    tx.commit()?;
    let refresh = RankingRefresh {
        scores: scores.len(),
        winners: winners.len(),
        comparisons: comparison.len(),
    };
    info!(
        scores = refresh.scores,
        winners = refresh.winners,
        comparisons = refresh.comparisons,
        "ranking tables refreshed"
    );
    Ok(refresh)
}
