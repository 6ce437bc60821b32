use anyhow::{Context, Result};
use rusqlite::{Connection, Row, params};
use serde::Serialize;

use crate::model::{Method, MethodResult, RunRecord, RunStatus};
use crate::ranking::{CaseWinner, RankingRow, Winner};

const RESULT_COLUMNS: &str = "r.run_id, r.case_id, r.method, r.total_tokens, r.avg_accuracy,
    r.avg_change_tracking, r.completed_phases, r.pre_summary, r.post_summary,
    r.retention_score, r.contamination_score, r.drift_detection_score,
    r.revert_integrity_score";

/// A (run, case, method) whose steps ran but whose result row never landed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IncompleteUnit {
    pub run_id: String,
    pub case_id: String,
    pub method: String,
    pub finished_steps: i64,
}

fn method_result_from_row(row: &Row<'_>) -> Result<MethodResult> {
    let run_id: String = row.get(0)?;
    let case_id: String = row.get(1)?;
    let method_label: String = row.get(2)?;
    let method = Method::parse(&method_label)
        .with_context(|| format!("stored result {run_id}/{case_id} has a bad method"))?;

    Ok(MethodResult {
        run_id,
        case_id,
        method,
        total_tokens: row.get(3)?,
        avg_accuracy: row.get(4)?,
        avg_change_tracking: row.get(5)?,
        completed_phases: row.get(6)?,
        pre_summary: row.get::<_, Option<String>>(7)?.unwrap_or_default(),
        post_summary: row.get::<_, Option<String>>(8)?.unwrap_or_default(),
        retention_score: row.get(9)?,
        contamination_score: row.get(10)?,
        drift_detection_score: row.get(11)?,
        revert_integrity_score: row.get(12)?,
    })
}

pub fn load_ranking_rows(connection: &Connection) -> Result<Vec<RankingRow>> {
    let sql = format!(
        "SELECT {RESULT_COLUMNS}, runs.status, runs.generated_at
         FROM agent_benchmark_results r
         JOIN agent_benchmark_runs runs ON runs.run_id = r.run_id
         ORDER BY runs.generated_at, r.case_id, r.method"
    );
    let mut statement = connection
        .prepare(&sql)
        .context("failed to prepare ranking query")?;
    let mut rows = statement.query([])?;

    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        let result = method_result_from_row(row)?;
        let status: String = row.get(13)?;
        let generated_at: String = row.get(14)?;
        out.push(RankingRow {
            result,
            run_status: RunStatus::parse(&status)?,
            generated_at,
        });
    }
    Ok(out)
}

pub fn load_run_results(connection: &Connection, run_id: &str) -> Result<Vec<MethodResult>> {
    let sql = format!(
        "SELECT {RESULT_COLUMNS}
         FROM agent_benchmark_results r
         WHERE r.run_id = ?1
         ORDER BY r.case_id, r.method"
    );
    let mut statement = connection.prepare(&sql)?;
    let mut rows = statement.query([run_id])?;

    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        out.push(method_result_from_row(row)?);
    }
    Ok(out)
}

fn run_record_from_row(row: &Row<'_>) -> Result<RunRecord> {
    let status: String = row.get(3)?;
    Ok(RunRecord {
        run_id: row.get(0)?,
        generated_at: row.get(1)?,
        model_key: row.get(2)?,
        status: RunStatus::parse(&status)?,
        notes: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
    })
}

/// Newest first.
pub fn list_runs(connection: &Connection) -> Result<Vec<RunRecord>> {
    let mut statement = connection.prepare(
        "SELECT run_id, generated_at, model_key, status, notes
         FROM agent_benchmark_runs
         ORDER BY generated_at DESC, run_id DESC",
    )?;
    let mut rows = statement.query([])?;

    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        out.push(run_record_from_row(row)?);
    }
    Ok(out)
}

pub fn latest_executed_runs(connection: &Connection, limit: usize) -> Result<Vec<RunRecord>> {
    let mut statement = connection.prepare(
        "SELECT run_id, generated_at, model_key, status, notes
         FROM agent_benchmark_runs
         WHERE status = ?1
         ORDER BY generated_at DESC, run_id DESC
         LIMIT ?2",
    )?;
    let mut rows = statement.query(params![RunStatus::Executed.as_str(), limit as i64])?;

    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        out.push(run_record_from_row(row)?);
    }
    Ok(out)
}

pub fn incomplete_units(connection: &Connection) -> Result<Vec<IncompleteUnit>> {
    let mut statement = connection.prepare(
        "
        SELECT s.run_id, s.case_id, s.method, COUNT(*) AS finished_steps
        FROM agent_benchmark_steps s
        LEFT JOIN agent_benchmark_results r
          ON r.run_id = s.run_id AND r.case_id = s.case_id AND r.method = s.method
        WHERE s.status != 'PLANNED' AND r.run_id IS NULL
        GROUP BY s.run_id, s.case_id, s.method
        ORDER BY s.run_id, s.case_id, s.method
        ",
    )?;
    let mut rows = statement.query([])?;

    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        out.push(IncompleteUnit {
            run_id: row.get(0)?,
            case_id: row.get(1)?,
            method: row.get(2)?,
            finished_steps: row.get(3)?,
        });
    }
    Ok(out)
}

/// Winners as last materialized by `refresh_ranking_tables`.
pub fn load_winners(connection: &Connection) -> Result<Vec<CaseWinner>> {
    let mut statement = connection.prepare(
        "SELECT case_id, winner_method, winner_score, second_score, score_delta
         FROM agent_mode_winners
         ORDER BY case_id",
    )?;
    let mut rows = statement.query([])?;

    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        let label: String = row.get(1)?;
        let winner = if label == Winner::Tie.as_str() {
            Winner::Tie
        } else {
            Winner::Method(Method::parse(&label)?)
        };
        out.push(CaseWinner {
            case_id: row.get(0)?,
            winner,
            winner_score: row.get(2)?,
            second_score: row.get(3)?,
            score_delta: row.get(4)?,
        });
    }
    Ok(out)
}
