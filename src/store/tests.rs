use rusqlite::Connection;

use super::reads::IncompleteUnit;
use super::*;
use crate::config::BenchConfig;
use crate::engine::fakes::healthy_collaborators;
use crate::engine::{MethodRun, PhaseExecutor};
use crate::model::{Method, RunRecord, RunStatus};
use crate::phases::build_phase_catalog;
use crate::profiles::get_case_profile;
use crate::ranking::Winner;
use crate::staging::MemoryStaging;

fn test_connection() -> Connection {
    let connection = Connection::open_in_memory().expect("in-memory database");
    ensure_schema(&connection).expect("schema should initialize");
    connection
}

fn planned_run(run_id: &str, generated_at: &str) -> RunRecord {
    RunRecord {
        run_id: run_id.to_string(),
        generated_at: generated_at.to_string(),
        model_key: "sonnet-4.5".to_string(),
        status: RunStatus::Planned,
        notes: "store test".to_string(),
    }
}

fn execute_unit(run_id: &str, case_id: &str, method: Method) -> MethodRun {
    let config = BenchConfig::default();
    let collaborators = healthy_collaborators();
    let executor = PhaseExecutor::new(&config, &collaborators);
    let profile = get_case_profile(case_id).expect("known case");
    let mut staging = MemoryStaging::new();
    executor
        .execute_method(run_id, &profile, method, &mut staging)
        .expect("method run should succeed")
}

fn count(connection: &Connection, sql: &str) -> i64 {
    connection
        .query_row(sql, [], |row| row.get(0))
        .expect("count query should succeed")
}

fn execute_run(connection: &mut Connection, run_id: &str, generated_at: &str, case_ids: &[&str]) {
    let phases = build_phase_catalog();
    let cases = case_ids
        .iter()
        .map(|id| get_case_profile(id).expect("known case"))
        .collect::<Vec<_>>();
    insert_planned_run(connection, &planned_run(run_id, generated_at), &cases, &phases)
        .expect("plan should insert");
    for case_id in case_ids {
        for method in Method::ALL {
            let unit = execute_unit(run_id, case_id, method);
            persist_method_run(connection, &unit, &phases).expect("unit should persist");
        }
    }
    mark_run_executed(connection, run_id).expect("run should execute");
}

#[test]
fn schema_is_idempotent_and_versioned() {
    let connection = test_connection();
    ensure_schema(&connection).expect("second pass should be a no-op");

    let version: String = connection
        .query_row(
            "SELECT value FROM metadata WHERE key = 'db_schema_version'",
            [],
            |row| row.get(0),
        )
        .expect("schema version recorded");
    assert_eq!(version, DB_SCHEMA_VERSION);
    assert_eq!(
        count(
            &connection,
            "SELECT COUNT(*) FROM pragma_table_info('agent_benchmark_results')
             WHERE name = 'revert_integrity_score'"
        ),
        1
    );
}

#[test]
fn planning_inserts_one_step_per_case_method_phase() {
    let mut connection = test_connection();
    let phases = build_phase_catalog();
    let cases = vec![
        get_case_profile("A001").expect("known case"),
        get_case_profile("A004").expect("known case"),
    ];
    let planned = insert_planned_run(
        &mut connection,
        &planned_run("run-1", "2026-01-01T00:00:00.000Z"),
        &cases,
        &phases,
    )
    .expect("plan should insert");

    assert_eq!(planned, 32);
    assert_eq!(
        count(
            &connection,
            "SELECT COUNT(*) FROM agent_benchmark_steps WHERE status = 'PLANNED'"
        ),
        32
    );
    assert_eq!(count(&connection, "SELECT COUNT(*) FROM latest_agent_mode_plan"), 32);
    let refresh = refresh_ranking_tables(&mut connection).expect("refresh succeeds");
    assert_eq!(refresh.comparisons, 0);
    assert_eq!(
        count(&connection, "SELECT COUNT(*) FROM agent_mode_method_comparison"),
        0
    );

    let targets: String = connection
        .query_row(
            "SELECT documentation_targets FROM agent_benchmark_steps
             WHERE case_id = 'A001' AND method = 'graph' AND phase_order = 2",
            [],
            |row| row.get(0),
        )
        .expect("planned step row");
    let parsed: Vec<String> = serde_json::from_str(&targets).expect("targets are json");
    assert_eq!(parsed.len(), 2);
}

#[test]
fn executed_run_feeds_views_and_ranking_tables() {
    let mut connection = test_connection();
    execute_run(
        &mut connection,
        "run-1",
        "2026-01-01T00:00:00.000Z",
        &["A001", "A002"],
    );

    assert_eq!(
        count(
            &connection,
            "SELECT COUNT(*) FROM agent_benchmark_steps WHERE status = 'PLANNED'"
        ),
        0
    );
    assert_eq!(
        count(&connection, "SELECT COUNT(*) FROM latest_agent_mode_case_metrics"),
        4
    );

    let refresh = refresh_ranking_tables(&mut connection).expect("refresh succeeds");
    assert_eq!((refresh.scores, refresh.winners, refresh.comparisons), (4, 2, 2));

    let stored = load_winners(&connection).expect("winners load");
    assert_eq!(stored.len(), 2);
    assert_eq!(stored[0].case_id, "A001");
    let a002 = &stored[1];
    assert_eq!(a002.case_id, "A002");
    assert_ne!(a002.winner, Winner::Method(Method::Baseline));

    let results = load_run_results(&connection, "run-1").expect("results load");
    assert_eq!(results.len(), 4);
    let baseline_a002 = results
        .iter()
        .find(|result| result.case_id == "A002" && result.method == Method::Baseline)
        .expect("baseline A002 result");
    assert_eq!(baseline_a002.contamination_score, Some(0.0));
}

#[test]
fn method_comparison_table_matches_the_rust_rollup() {
    let mut connection = test_connection();
    execute_run(&mut connection, "run-1", "2026-01-01T00:00:00.000Z", &["A001"]);
    execute_run(
        &mut connection,
        "run-2",
        "2026-02-01T00:00:00.000Z",
        &["A001", "A002", "A003"],
    );
    refresh_ranking_tables(&mut connection).expect("refresh succeeds");

    let expected = crate::engine::compare_by_method(
        &load_run_results(&connection, "run-2").expect("results load"),
    );
    let mut statement = connection
        .prepare(
            "SELECT method, run_id, cases, total_tokens, avg_accuracy,
                    avg_change_tracking, avg_retention
             FROM agent_mode_method_comparison ORDER BY method",
        )
        .expect("comparison query prepares");
    let stored = statement
        .query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, i64>(3)?,
                row.get::<_, f64>(4)?,
                row.get::<_, f64>(5)?,
                row.get::<_, f64>(6)?,
            ))
        })
        .expect("comparison rows load")
        .collect::<rusqlite::Result<Vec<_>>>()
        .expect("comparison rows decode");

    assert_eq!(stored.len(), expected.len());
    for (row, rollup) in stored.iter().zip(&expected) {
        assert_eq!(row.0, rollup.method.as_str());
        assert_eq!(row.1, "run-2");
        assert_eq!(row.2, rollup.cases as i64);
        assert_eq!(row.3, rollup.total_tokens);
        assert_eq!(row.4, rollup.avg_accuracy);
        assert_eq!(row.5, rollup.avg_change_tracking);
        assert_eq!(row.6, rollup.avg_retention);
    }
    assert_eq!(
        count(
            &connection,
            "SELECT COUNT(*) FROM sqlite_master
             WHERE type = 'view' AND name = 'latest_agent_mode_comparison'"
        ),
        0
    );
}

#[test]
fn persisting_a_unit_twice_keeps_one_row_per_phase() {
    let mut connection = test_connection();
    let phases = build_phase_catalog();
    let case = get_case_profile("A003").expect("known case");
    insert_planned_run(
        &mut connection,
        &planned_run("run-1", "2026-01-01T00:00:00.000Z"),
        &[case],
        &phases,
    )
    .expect("plan should insert");

    let unit = execute_unit("run-1", "A003", Method::Graph);
    persist_method_run(&mut connection, &unit, &phases).expect("first persist");
    persist_method_run(&mut connection, &unit, &phases).expect("second persist");

    assert_eq!(
        count(
            &connection,
            "SELECT COUNT(*) FROM agent_benchmark_steps WHERE method = 'graph'"
        ),
        8
    );
    assert_eq!(
        count(&connection, "SELECT COUNT(*) FROM agent_benchmark_results"),
        1
    );
}

#[test]
fn run_status_never_moves_backwards() {
    let mut connection = test_connection();
    execute_run(&mut connection, "run-1", "2026-01-01T00:00:00.000Z", &["A001"]);

    let err = mark_run_executed(&connection, "run-1").expect_err("second transition fails");
    assert!(err.to_string().contains("cannot move from EXECUTED"));
    let err = mark_run_executed(&connection, "run-missing").expect_err("unknown run fails");
    assert!(err.to_string().contains("does not exist"));
}

#[test]
fn planned_runs_do_not_replace_the_latest_executed_view() {
    let mut connection = test_connection();
    execute_run(&mut connection, "run-1", "2026-01-01T00:00:00.000Z", &["A001"]);
    let phases = build_phase_catalog();
    let case = get_case_profile("A002").expect("known case");
    insert_planned_run(
        &mut connection,
        &planned_run("run-2", "2026-02-01T00:00:00.000Z"),
        &[case],
        &phases,
    )
    .expect("plan should insert");

    assert_eq!(
        count(
            &connection,
            "SELECT COUNT(*) FROM latest_agent_mode_case_metrics WHERE case_id = 'A001'"
        ),
        2
    );
    assert_eq!(
        count(
            &connection,
            "SELECT COUNT(*) FROM latest_agent_mode_plan WHERE case_id = 'A002'"
        ),
        16
    );

    let runs = list_runs(&connection).expect("runs load");
    assert_eq!(runs[0].run_id, "run-2");
    assert_eq!(runs[0].status, RunStatus::Planned);
    let executed = latest_executed_runs(&connection, 2).expect("executed runs load");
    assert_eq!(executed.len(), 1);
    assert_eq!(executed[0].run_id, "run-1");
}

#[test]
fn steps_without_a_result_are_reported_incomplete() {
    let mut connection = test_connection();
    let phases = build_phase_catalog();
    let case = get_case_profile("A001").expect("known case");
    insert_planned_run(
        &mut connection,
        &planned_run("run-1", "2026-01-01T00:00:00.000Z"),
        &[case],
        &phases,
    )
    .expect("plan should insert");
    connection
        .execute(
            "UPDATE agent_benchmark_steps SET status = 'COMPLETED'
             WHERE method = 'graph' AND phase_order <= 3",
            [],
        )
        .expect("simulated partial execution");

    let incomplete = incomplete_units(&connection).expect("incomplete units load");
    assert_eq!(
        incomplete,
        vec![IncompleteUnit {
            run_id: "run-1".to_string(),
            case_id: "A001".to_string(),
            method: "graph".to_string(),
            finished_steps: 3,
        }]
    );
}

fn metadata_value(connection: &Connection, key: &str) -> String {
    connection
        .query_row("SELECT value FROM metadata WHERE key = ?1", [key], |row| {
            row.get(0)
        })
        .expect("metadata value recorded")
}

#[test]
fn read_only_open_leaves_the_database_untouched() {
    let temp = tempfile::tempdir().expect("tempdir should be created");
    let db_path = temp.path().join("bench.sqlite");
    {
        let connection = open_database(&db_path).expect("database should be created");
        connection
            .execute(
                "UPDATE metadata SET value = '2026-01-01T00:00:00.000Z'
                 WHERE key = 'db_updated_at'",
                [],
            )
            .expect("pin updated_at");
    }

    let connection = open_existing(&db_path)
        .expect("read-only open succeeds")
        .expect("database exists");
    assert_eq!(
        metadata_value(&connection, "db_updated_at"),
        "2026-01-01T00:00:00.000Z"
    );
    assert!(
        connection.execute("DELETE FROM metadata", []).is_err(),
        "read-only connection must reject writes"
    );
    drop(connection);

    let reopened = open_database(&db_path).expect("database reopens");
    assert_ne!(
        metadata_value(&reopened, "db_updated_at"),
        "2026-01-01T00:00:00.000Z"
    );
}

#[test]
fn read_only_open_skips_missing_and_rejects_foreign_files() {
    let temp = tempfile::tempdir().expect("tempdir should be created");
    let missing = temp.path().join("missing.sqlite");
    assert!(open_existing(&missing).expect("missing file is not an error").is_none());
    assert!(!missing.exists());

    let foreign = temp.path().join("foreign.sqlite");
    Connection::open(&foreign)
        .expect("foreign database")
        .execute_batch("CREATE TABLE notes (body TEXT);")
        .expect("foreign schema");
    let error = open_existing(&foreign).expect_err("foreign database is rejected");
    assert!(
        error.to_string().contains("not a benchmark database"),
        "unexpected: {error}"
    );
}
