use std::path::Path;

use anyhow::{Context, Result, bail};
use rusqlite::{Connection, OpenFlags, OptionalExtension};
use tracing::debug;

use crate::util::ensure_directory;

const DB_SCHEMA_VERSION: &str = "1.0.0";

mod reads;
mod schema;
#[cfg(test)]
mod tests;
mod writes;

pub use reads::{
    incomplete_units, latest_executed_runs, list_runs, load_ranking_rows, load_run_results,
    load_winners,
};
pub use writes::{
    insert_planned_run, mark_run_executed, persist_method_run, refresh_ranking_tables,
};

use schema::*;

/// Opens (or creates) the benchmark database and brings its schema up to date.
pub fn open_database(db_path: &Path) -> Result<Connection> {
    if let Some(parent) = db_path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        ensure_directory(parent)?;
    }
    let connection = Connection::open(db_path)
        .with_context(|| format!("failed to open {}", db_path.display()))?;
    configure_connection(&connection)?;
    ensure_schema(&connection)?;
    debug!(path = %db_path.display(), "benchmark database ready");
    Ok(connection)
}

/// Opens an existing database read-only. Never creates or migrates it.
pub fn open_existing(db_path: &Path) -> Result<Option<Connection>> {
    if !db_path.exists() {
        return Ok(None);
    }
    let connection = Connection::open_with_flags(
        db_path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .with_context(|| format!("failed to open database read-only: {}", db_path.display()))?;

    let version: Option<String> = connection
        .query_row(
            "SELECT value FROM metadata WHERE key = 'db_schema_version'",
            [],
            |row| row.get(0),
        )
        .optional()
        .with_context(|| format!("{} is not a benchmark database", db_path.display()))?;
    let Some(version) = version else {
        bail!("{} has no schema version; run the benchmark first", db_path.display());
    };
    debug!(path = %db_path.display(), version = %version, "benchmark database opened read-only");
    Ok(Some(connection))
}
