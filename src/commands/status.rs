use anyhow::Result;
use rusqlite::Connection;
use tracing::{info, warn};

use crate::cli::StatusArgs;
use crate::store;

pub fn run(args: StatusArgs) -> Result<()> {
    info!(db_path = %args.db_path.display(), "status requested");

    let Some(connection) = store::open_existing(&args.db_path)? else {
        warn!(path = %args.db_path.display(), "database file missing");
        return Ok(());
    };

    let runs = store::list_runs(&connection)?;
    info!(
        runs = runs.len(),
        steps = query_count(&connection, "SELECT COUNT(*) FROM agent_benchmark_steps").unwrap_or(0),
        results = query_count(&connection, "SELECT COUNT(*) FROM agent_benchmark_results")
            .unwrap_or(0),
        "database status"
    );
    for run in runs.iter().take(args.limit) {
        info!(
            run_id = %run.run_id,
            status = run.status.as_str(),
            model = %run.model_key,
            generated_at = %run.generated_at,
            "benchmark run"
        );
    }

    for unit in store::incomplete_units(&connection)? {
        warn!(
            run_id = %unit.run_id,
            case_id = %unit.case_id,
            method = %unit.method,
            finished_steps = unit.finished_steps,
            "unit executed without a result row"
        );
    }

    let winners = store::load_winners(&connection)?;
    if winners.is_empty() {
        info!("no executed runs ranked yet");
    }
    for winner in winners {
        info!(
            case_id = %winner.case_id,
            winner = winner.winner.as_str(),
            winner_score = winner.winner_score,
            second_score = winner.second_score,
            score_delta = winner.score_delta,
            "latest winner"
        );
    }

    Ok(())
}

fn query_count(conn: &Connection, sql: &str) -> Result<i64> {
    let count = conn.query_row(sql, [], |row| row.get(0))?;
    Ok(count)
}
