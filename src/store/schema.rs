use anyhow::{Context, Result, bail};
use rusqlite::Connection;

use super::DB_SCHEMA_VERSION;
use crate::util::now_utc_string;

pub(super) fn configure_connection(connection: &Connection) -> Result<()> {
    connection
        .pragma_update(None, "journal_mode", "WAL")
        .context("failed to set journal_mode=WAL")?;
    connection
        .pragma_update(None, "synchronous", "NORMAL")
        .context("failed to set synchronous=NORMAL")?;
    Ok(())
}

pub(super) fn ensure_schema(connection: &Connection) -> Result<()> {
    connection
        .execute_batch(
            "
        CREATE TABLE IF NOT EXISTS metadata (
          key TEXT PRIMARY KEY,
          value TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS agent_benchmark_runs (
          run_id TEXT PRIMARY KEY,
          generated_at TEXT NOT NULL,
          model_key TEXT NOT NULL,
          status TEXT NOT NULL,
          notes TEXT
        );

        CREATE TABLE IF NOT EXISTS agent_benchmark_steps (
          run_id TEXT NOT NULL,
          case_id TEXT NOT NULL,
          method TEXT NOT NULL,
          phase_order INTEGER NOT NULL,
          phase_name TEXT NOT NULL,
          objective TEXT NOT NULL,
          context_boundary TEXT NOT NULL,
          expected_artifacts TEXT NOT NULL,
          documentation_targets TEXT NOT NULL,
          requires_revert INTEGER NOT NULL,
          status TEXT NOT NULL,
          latency_ms REAL,
          input_tokens INTEGER,
          output_tokens INTEGER,
          total_tokens INTEGER,
          accuracy REAL,
          change_tracking_score REAL,
          output_hash TEXT,
          execution_notes TEXT,
          PRIMARY KEY (run_id, case_id, method, phase_order),
          FOREIGN KEY(run_id) REFERENCES agent_benchmark_runs(run_id)
        );

        CREATE TABLE IF NOT EXISTS agent_benchmark_results (
          run_id TEXT NOT NULL,
          case_id TEXT NOT NULL,
          method TEXT NOT NULL,
          total_tokens INTEGER NOT NULL,
          avg_accuracy REAL NOT NULL,
          avg_change_tracking REAL NOT NULL,
          completed_phases INTEGER NOT NULL,
          pre_summary TEXT,
          post_summary TEXT,
          retention_score REAL,
          PRIMARY KEY (run_id, case_id, method),
          FOREIGN KEY(run_id) REFERENCES agent_benchmark_runs(run_id)
        );

        CREATE TABLE IF NOT EXISTS agent_mode_weighted_scores (
          case_id TEXT NOT NULL,
          method TEXT NOT NULL,
          run_id TEXT NOT NULL,
          generated_at TEXT NOT NULL,
          total_tokens INTEGER NOT NULL,
          avg_accuracy REAL NOT NULL,
          avg_change_tracking REAL NOT NULL,
          retention_score REAL,
          case_metric REAL NOT NULL,
          token_efficiency REAL,
          weighted_score REAL NOT NULL,
          refreshed_at TEXT NOT NULL,
          PRIMARY KEY (case_id, method)
        );

        CREATE TABLE IF NOT EXISTS agent_mode_winners (
          case_id TEXT PRIMARY KEY,
          winner_method TEXT NOT NULL,
          winner_score REAL NOT NULL,
          second_score REAL NOT NULL,
          score_delta REAL NOT NULL,
          refreshed_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS agent_mode_method_comparison (
          method TEXT PRIMARY KEY,
          run_id TEXT NOT NULL,
          cases INTEGER NOT NULL,
          total_tokens INTEGER NOT NULL,
          avg_accuracy REAL NOT NULL,
          avg_change_tracking REAL NOT NULL,
          avg_retention REAL NOT NULL,
          refreshed_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_runs_status_generated
          ON agent_benchmark_runs(status, generated_at);
        CREATE INDEX IF NOT EXISTS idx_steps_run_status
          ON agent_benchmark_steps(run_id, status);
        ",
        )
        .context("failed to initialize benchmark tables")?;

    ensure_column_exists(connection, "agent_benchmark_results", "contamination_score REAL")?;
    ensure_column_exists(connection, "agent_benchmark_results", "drift_detection_score REAL")?;
    ensure_column_exists(connection, "agent_benchmark_results", "revert_integrity_score REAL")?;

    ensure_views(connection)?;

    let now = now_utc_string();
    connection.execute(
        "INSERT INTO metadata(key, value) VALUES('db_schema_version', ?1)
         ON CONFLICT(key) DO UPDATE SET value=excluded.value",
        [DB_SCHEMA_VERSION],
    )?;
    connection.execute(
        "INSERT INTO metadata(key, value) VALUES('db_updated_at', ?1)
         ON CONFLICT(key) DO UPDATE SET value=excluded.value",
        [now],
    )?;

    Ok(())
}

fn ensure_views(connection: &Connection) -> Result<()> {
    connection
        .execute_batch(
            "
        -- superseded by the agent_mode_method_comparison table
        DROP VIEW IF EXISTS latest_agent_mode_comparison;

        CREATE VIEW IF NOT EXISTS latest_agent_mode_case_metrics AS
        WITH latest AS (
          SELECT run_id
          FROM agent_benchmark_runs
          WHERE status = 'EXECUTED'
          ORDER BY generated_at DESC, run_id DESC
          LIMIT 1
        )
        SELECT
          r.case_id,
          r.method,
          r.total_tokens,
          r.avg_accuracy,
          r.avg_change_tracking,
          r.retention_score,
          r.contamination_score,
          r.drift_detection_score,
          r.revert_integrity_score
        FROM agent_benchmark_results r
        JOIN latest l ON r.run_id = l.run_id
        ORDER BY r.case_id, r.method;

        CREATE VIEW IF NOT EXISTS latest_agent_mode_plan AS
        WITH latest AS (
          SELECT run_id
          FROM agent_benchmark_runs
          ORDER BY generated_at DESC, run_id DESC
          LIMIT 1
        )
        SELECT
          s.case_id,
          s.method,
          s.phase_order,
          s.phase_name,
          s.status,
          s.requires_revert,
          s.context_boundary
        FROM agent_benchmark_steps s
        JOIN latest l ON s.run_id = l.run_id
        ORDER BY s.case_id, s.method, s.phase_order;
        ",
        )
        .context("failed to initialize benchmark views")?;
    Ok(())
}

fn ensure_column_exists(
    connection: &Connection,
    table_name: &str,
    column_definition: &str,
) -> Result<()> {
    let Some(column_name) = column_definition.split_whitespace().next() else {
        bail!("invalid column definition: {column_definition}");
    };

    let pragma_sql = format!("PRAGMA table_info({table_name})");
    let mut statement = connection
        .prepare(&pragma_sql)
        .with_context(|| format!("failed to inspect schema for table {table_name}"))?;
    let mut rows = statement.query([])?;
    while let Some(row) = rows.next()? {
        let existing_name: String = row.get(1)?;
        if existing_name == column_name {
            return Ok(());
        }
    }

    let alter_sql = format!("ALTER TABLE {table_name} ADD COLUMN {column_definition}");
    connection
        .execute(&alter_sql, [])
        .with_context(|| format!("failed to add column {column_name} on {table_name}"))?;

    Ok(())
}
