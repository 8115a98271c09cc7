use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, Transaction, params};
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

use crate::cli::IngestArgs;
use crate::model::{
    DocumentOutcome, ExtractedDocument, ExtractionOutcome, IngestCounts, IngestPaths,
    IngestRunManifest, RejectReason,
};
use crate::money::REFERENCE_CURRENCY;
use crate::util::{
    ensure_directory, now_utc_string, sha256_file, utc_compact_string, write_json_pretty,
};
use crate::xml::{self, Element};

use super::db_setup::{DB_SCHEMA_VERSION, configure_connection, ensure_schema};
use super::extract_authority::extract_authority;
use super::extract_base_contract::extract_base_contract;
use super::extract_object::extract_object;
use super::persist;

const MARKER_IN_PROGRESS: &str = "in_progress";
const MARKER_DONE: &str = "done";

pub fn run(args: IngestArgs) -> Result<()> {
    let started_ts = Utc::now();
    let started_at = now_utc_string();
    let run_id = format!("run-{}", utc_compact_string(started_ts));

    ensure_directory(&args.cache_root)?;
    let manifest_path = args.manifest_path.clone().unwrap_or_else(|| {
        args.cache_root
            .join("manifests")
            .join(format!("ingest_run_{}.json", utc_compact_string(started_ts)))
    });
    let db_path = args
        .db_path
        .clone()
        .unwrap_or_else(|| args.cache_root.join("tedaward.sqlite"));

    info!(source = %args.source_dir.display(), run_id = %run_id, "starting ingest");

    let mut connection = Connection::open(&db_path)
        .with_context(|| format!("failed to open {}", db_path.display()))?;
    configure_connection(&connection)?;
    ensure_schema(&connection)?;

    let categories_total = count_rows(&connection, "SELECT COUNT(*) FROM categories")?;
    if categories_total == 0 {
        bail!("no classification codes loaded; run `tedaward codes` first");
    }

    let documents = discover_documents(&args.source_dir)?;
    if documents.is_empty() {
        warn!(source = %args.source_dir.display(), "no xml documents found");
    }

    let mut counts = IngestCounts::default();
    let mut warnings = Vec::new();

    for path in &documents {
        if let Some(max_documents) = args.max_documents {
            if counts.documents_seen >= max_documents {
                break;
            }
        }
        counts.documents_seen += 1;

        let doc_id = match document_id(path) {
            Ok(doc_id) => doc_id,
            Err(err) => {
                counts.failed += 1;
                warnings.push(format!("{}: {err:#}", path.display()));
                error!(path = %path.display(), error = %err, "unusable document path");
                continue;
            }
        };

        match process_document(&mut connection, path, &doc_id) {
            Ok(DocumentOutcome::Ingested) => {
                counts.ingested += 1;
                info!(doc = %doc_id, "document ingested");
            }
            Ok(DocumentOutcome::Skipped) => {
                counts.skipped += 1;
                info!(doc = %doc_id, "already processed, skipping");
            }
            Ok(DocumentOutcome::Rejected(reason)) => {
                tally_reject(&mut counts, reason);
                warn!(doc = %doc_id, reason = reason.as_str(), "document rejected");
            }
            Err(err) => {
                counts.failed += 1;
                warnings.push(format!("{doc_id}: {err:#}"));
                error!(doc = %doc_id, error = %err, "document failed, eligible for retry");
            }
        }
    }

    counts.contracts_total = count_rows(&connection, "SELECT COUNT(*) FROM contracts")?;
    counts.authorities_total = count_rows(&connection, "SELECT COUNT(*) FROM authorities")?;
    counts.winners_total = count_rows(&connection, "SELECT COUNT(*) FROM winners")?;
    counts.items_total = count_rows(&connection, "SELECT COUNT(*) FROM contract_object_items")?;

    let manifest = IngestRunManifest {
        manifest_version: 1,
        run_id,
        db_schema_version: DB_SCHEMA_VERSION.to_string(),
        reference_currency: REFERENCE_CURRENCY.to_string(),
        status: "completed".to_string(),
        started_at,
        updated_at: now_utc_string(),
        paths: IngestPaths {
            cache_root: args.cache_root.display().to_string(),
            source_directory: args.source_dir.display().to_string(),
            manifest_path: manifest_path.display().to_string(),
            db_path: db_path.display().to_string(),
        },
        counts: counts.clone(),
        warnings,
    };
    write_json_pretty(&manifest_path, &manifest)?;

    info!(path = %manifest_path.display(), "wrote ingest run manifest");
    info!(
        seen = counts.documents_seen,
        ingested = counts.ingested,
        skipped = counts.skipped,
        failed = counts.failed,
        "ingest completed"
    );

    Ok(())
}

fn discover_documents(source_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut documents = Vec::new();

    for entry in WalkDir::new(source_dir).sort_by_file_name() {
        let entry =
            entry.with_context(|| format!("failed to walk {}", source_dir.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }

        let is_xml = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case("xml"))
            .unwrap_or(false);
        if is_xml {
            documents.push(entry.into_path());
        }
    }

    Ok(documents)
}

fn document_id(path: &Path) -> Result<String> {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(ToOwned::to_owned)
        .with_context(|| format!("invalid UTF-8 filename: {}", path.display()))
}

// Per-document state machine: unseen -> in_progress -> done. A reject or
// error deletes the claim row so the document reverts to unseen; a stale
// in_progress claim from a killed run is reclaimed on the next pass.
pub(crate) fn process_document(
    connection: &mut Connection,
    path: &Path,
    doc_id: &str,
) -> Result<DocumentOutcome> {
    let status: Option<String> = connection
        .query_row(
            "SELECT status FROM processed_documents WHERE doc_id = ?1",
            params![doc_id],
            |row| row.get(0),
        )
        .optional()?;

    if status.as_deref() == Some(MARKER_DONE) {
        return Ok(DocumentOutcome::Skipped);
    }

    claim_document(connection, path, doc_id)?;

    match ingest_document(connection, path, doc_id) {
        Ok(DocumentOutcome::Ingested) => Ok(DocumentOutcome::Ingested),
        Ok(outcome) => {
            release_document(connection, doc_id)?;
            Ok(outcome)
        }
        Err(err) => {
            if let Err(release_err) = release_document(connection, doc_id) {
                error!(doc = %doc_id, error = %release_err, "failed to release document claim");
            }
            Err(err)
        }
    }
}

fn claim_document(connection: &Connection, path: &Path, doc_id: &str) -> Result<()> {
    let source_sha256 = sha256_file(path)?;
    connection.execute(
        "
        INSERT INTO processed_documents(doc_id, status, source_sha256, started_at)
        VALUES(?1, ?2, ?3, ?4)
        ON CONFLICT(doc_id) DO UPDATE SET
          status=excluded.status,
          source_sha256=excluded.source_sha256,
          started_at=excluded.started_at,
          completed_at=NULL
        ",
        params![doc_id, MARKER_IN_PROGRESS, source_sha256, now_utc_string()],
    )?;
    Ok(())
}

fn release_document(connection: &Connection, doc_id: &str) -> Result<()> {
    connection.execute(
        "DELETE FROM processed_documents WHERE doc_id = ?1",
        params![doc_id],
    )?;
    Ok(())
}

fn ingest_document(
    connection: &mut Connection,
    path: &Path,
    doc_id: &str,
) -> Result<DocumentOutcome> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let root = xml::parse_document(&raw)
        .with_context(|| format!("failed to parse {}", path.display()))?;

    match extract_document(&root) {
        ExtractionOutcome::Rejected(reason) => Ok(DocumentOutcome::Rejected(reason)),
        ExtractionOutcome::Extracted(document) => {
            let tx = connection.transaction()?;
            let counts = persist::save_document(&tx, doc_id, &document)
                .with_context(|| format!("failed to persist {doc_id}"))?;
            mark_done(&tx, doc_id)?;
            tx.commit()?;

            debug!(
                doc = %doc_id,
                authorities_created = counts.authorities_created,
                winners_created = counts.winners_created,
                items_created = counts.items_created,
                "document persisted"
            );
            Ok(DocumentOutcome::Ingested)
        }
    }
}

fn mark_done(tx: &Transaction<'_>, doc_id: &str) -> Result<()> {
    tx.execute(
        "UPDATE processed_documents SET status = ?1, completed_at = ?2 WHERE doc_id = ?3",
        params![MARKER_DONE, now_utc_string(), doc_id],
    )?;
    Ok(())
}

// The first absent section rejects the whole document before any
// persistence is attempted.
pub(crate) fn extract_document(root: &Element) -> ExtractionOutcome {
    let Some(base) = extract_base_contract(root) else {
        return ExtractionOutcome::Rejected(RejectReason::MissingBaseContract);
    };
    let Some(authority) = extract_authority(root) else {
        return ExtractionOutcome::Rejected(RejectReason::MissingAuthority);
    };
    let Some(object) = extract_object(root) else {
        return ExtractionOutcome::Rejected(RejectReason::MissingObject);
    };
    if object.items.is_empty() {
        return ExtractionOutcome::Rejected(RejectReason::NoWinners);
    }

    ExtractionOutcome::Extracted(Box::new(ExtractedDocument {
        authority,
        base,
        object,
    }))
}

fn tally_reject(counts: &mut IngestCounts, reason: RejectReason) {
    match reason {
        RejectReason::MissingAuthority => counts.rejected_missing_authority += 1,
        RejectReason::MissingBaseContract => counts.rejected_missing_base_contract += 1,
        RejectReason::MissingObject => counts.rejected_missing_object += 1,
        RejectReason::NoWinners => counts.rejected_no_winners += 1,
    }
}

fn count_rows(connection: &Connection, sql: &str) -> Result<i64> {
    let count = connection.query_row(sql, [], |row| row.get(0))?;
    Ok(count)
}
