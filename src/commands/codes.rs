use std::fs;

use anyhow::{Context, Result, bail};
use rusqlite::{Connection, OptionalExtension, params};
use tracing::{info, warn};

use crate::cli::CodesArgs;
use crate::commands::ingest::{configure_connection, ensure_schema};
use crate::model::CodeEntry;
use crate::util::ensure_directory;

pub fn run(args: CodesArgs) -> Result<()> {
    ensure_directory(&args.cache_root)?;
    let db_path = args
        .db_path
        .unwrap_or_else(|| args.cache_root.join("tedaward.sqlite"));

    let raw = fs::read(&args.codes_path)
        .with_context(|| format!("failed to read {}", args.codes_path.display()))?;
    let entries: Vec<CodeEntry> = serde_json::from_slice(&raw)
        .with_context(|| format!("failed to parse {}", args.codes_path.display()))?;

    if entries.is_empty() {
        bail!("no classification codes in {}", args.codes_path.display());
    }

    let mut connection = Connection::open(&db_path)
        .with_context(|| format!("failed to open {}", db_path.display()))?;
    configure_connection(&connection)?;
    ensure_schema(&connection)?;

    let loaded = load_codes(&mut connection, &entries)?;

    info!(
        path = %args.codes_path.display(),
        db = %db_path.display(),
        codes = loaded,
        "classification codes loaded"
    );

    Ok(())
}

// Two passes inside one transaction: insert every code, then link parents,
// so entries may reference parents defined later in the file.
fn load_codes(connection: &mut Connection, entries: &[CodeEntry]) -> Result<usize> {
    let tx = connection.transaction()?;

    {
        let mut insert = tx.prepare(
            "
            INSERT INTO categories(code, name)
            VALUES(?1, ?2)
            ON CONFLICT(code) DO UPDATE SET name=excluded.name
            ",
        )?;

        for entry in entries {
            if entry.code.is_empty() {
                bail!("classification entry {:?} has an empty code", entry.name);
            }
            insert.execute(params![entry.code, entry.name])?;
        }
    }

    {
        let mut link = tx.prepare("UPDATE categories SET parent_id = ?1 WHERE code = ?2")?;

        for entry in entries {
            let Some(parent_code) = entry.parent.as_deref().filter(|code| !code.is_empty()) else {
                continue;
            };

            let parent_id: Option<i64> = tx
                .query_row(
                    "SELECT id FROM categories WHERE code = ?1",
                    params![parent_code],
                    |row| row.get(0),
                )
                .optional()?;

            match parent_id {
                Some(parent_id) => {
                    link.execute(params![parent_id, entry.code])?;
                }
                None => {
                    warn!(code = %entry.code, parent = %parent_code, "parent code not found, left unlinked");
                }
            }
        }
    }

    tx.commit()?;
    Ok(entries.len())
}
