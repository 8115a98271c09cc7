use anyhow::{Context, Result};
use rusqlite::Connection;
use tracing::{info, warn};

use crate::cli::StatusArgs;

pub fn run(args: StatusArgs) -> Result<()> {
    let db_path = args
        .db_path
        .unwrap_or_else(|| args.cache_root.join("tedaward.sqlite"));

    if !db_path.exists() {
        warn!(path = %db_path.display(), "database file missing");
        return Ok(());
    }

    let connection = Connection::open(&db_path)
        .with_context(|| format!("failed to open {}", db_path.display()))?;

    let categories = query_count(&connection, "SELECT COUNT(*) FROM categories").unwrap_or(0);
    let authorities = query_count(&connection, "SELECT COUNT(*) FROM authorities").unwrap_or(0);
    let winners = query_count(&connection, "SELECT COUNT(*) FROM winners").unwrap_or(0);
    let contracts = query_count(&connection, "SELECT COUNT(*) FROM contracts").unwrap_or(0);
    let items =
        query_count(&connection, "SELECT COUNT(*) FROM contract_object_items").unwrap_or(0);
    let done = query_count(
        &connection,
        "SELECT COUNT(*) FROM processed_documents WHERE status = 'done'",
    )
    .unwrap_or(0);
    let in_progress = query_count(
        &connection,
        "SELECT COUNT(*) FROM processed_documents WHERE status = 'in_progress'",
    )
    .unwrap_or(0);

    info!(
        path = %db_path.display(),
        categories,
        authorities,
        winners,
        contracts,
        items,
        documents_done = done,
        documents_in_progress = in_progress,
        "database status"
    );

    if in_progress > 0 {
        warn!(
            documents_in_progress = in_progress,
            "stale claims present; the next ingest run will reclaim them"
        );
    }

    Ok(())
}

fn query_count(connection: &Connection, sql: &str) -> Result<i64> {
    let count = connection.query_row(sql, [], |row| row.get(0))?;
    Ok(count)
}
