use anyhow::{Context, Result};
use rusqlite::Connection;

use crate::util::now_utc_string;

pub(crate) const DB_SCHEMA_VERSION: &str = "0.1.0";

pub(crate) fn configure_connection(connection: &Connection) -> Result<()> {
    connection
        .pragma_update(None, "journal_mode", "WAL")
        .context("failed to set journal_mode=WAL")?;
    connection
        .pragma_update(None, "synchronous", "NORMAL")
        .context("failed to set synchronous=NORMAL")?;
    connection
        .pragma_update(None, "foreign_keys", "ON")
        .context("failed to enable foreign key enforcement")?;
    Ok(())
}

pub(crate) fn ensure_schema(connection: &Connection) -> Result<()> {
    connection.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS metadata (
          key TEXT PRIMARY KEY,
          value TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS categories (
          id INTEGER PRIMARY KEY,
          code TEXT NOT NULL UNIQUE,
          name TEXT NOT NULL,
          parent_id INTEGER,
          FOREIGN KEY(parent_id) REFERENCES categories(id)
        );

        CREATE TABLE IF NOT EXISTS authorities (
          id INTEGER PRIMARY KEY,
          official_name TEXT NOT NULL UNIQUE,
          address TEXT,
          town TEXT,
          contact_point TEXT,
          postal_code TEXT,
          fax TEXT,
          national_id TEXT,
          country TEXT,
          phone TEXT,
          email TEXT,
          nuts TEXT,
          website TEXT
        );

        CREATE TABLE IF NOT EXISTS winners (
          id INTEGER PRIMARY KEY,
          official_name TEXT NOT NULL UNIQUE,
          address TEXT,
          town TEXT,
          postal_code TEXT,
          country TEXT,
          email TEXT,
          nuts TEXT,
          website TEXT,
          total_awarded_eur REAL NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS contract_objects (
          id INTEGER PRIMARY KEY,
          main_category_id INTEGER NOT NULL,
          title TEXT,
          short_descr TEXT,
          contract_type TEXT,
          val_total REAL,
          val_total_currency TEXT,
          val_total_eur REAL,
          lot_division INTEGER NOT NULL,
          FOREIGN KEY(main_category_id) REFERENCES categories(id)
        );

        CREATE TABLE IF NOT EXISTS contract_object_items (
          id INTEGER PRIMARY KEY,
          contract_object_id INTEGER NOT NULL,
          lot_no TEXT NOT NULL,
          nuts_code TEXT,
          title TEXT,
          short_descr TEXT,
          val_total REAL,
          val_total_currency TEXT,
          val_total_eur REAL,
          FOREIGN KEY(contract_object_id) REFERENCES contract_objects(id) ON DELETE CASCADE
        );

        CREATE TABLE IF NOT EXISTS item_categories (
          item_id INTEGER NOT NULL,
          category_id INTEGER NOT NULL,
          PRIMARY KEY(item_id, category_id),
          FOREIGN KEY(item_id) REFERENCES contract_object_items(id) ON DELETE CASCADE,
          FOREIGN KEY(category_id) REFERENCES categories(id)
        );

        CREATE TABLE IF NOT EXISTS item_winners (
          item_id INTEGER NOT NULL,
          winner_id INTEGER NOT NULL,
          PRIMARY KEY(item_id, winner_id),
          FOREIGN KEY(item_id) REFERENCES contract_object_items(id) ON DELETE CASCADE,
          FOREIGN KEY(winner_id) REFERENCES winners(id)
        );

        CREATE TABLE IF NOT EXISTS contracts (
          id INTEGER PRIMARY KEY,
          doc_id TEXT NOT NULL UNIQUE,
          uri TEXT NOT NULL,
          uri_english TEXT NOT NULL,
          date_published TEXT NOT NULL,
          short_title TEXT NOT NULL,
          contract_nature TEXT NOT NULL,
          authority_id INTEGER NOT NULL,
          contract_object_id INTEGER NOT NULL UNIQUE,
          FOREIGN KEY(authority_id) REFERENCES authorities(id),
          FOREIGN KEY(contract_object_id) REFERENCES contract_objects(id) ON DELETE CASCADE
        );

        CREATE TABLE IF NOT EXISTS contract_categories (
          contract_id INTEGER NOT NULL,
          category_id INTEGER NOT NULL,
          PRIMARY KEY(contract_id, category_id),
          FOREIGN KEY(contract_id) REFERENCES contracts(id) ON DELETE CASCADE,
          FOREIGN KEY(category_id) REFERENCES categories(id)
        );

        CREATE TABLE IF NOT EXISTS processed_documents (
          doc_id TEXT PRIMARY KEY,
          status TEXT NOT NULL,
          source_sha256 TEXT,
          started_at TEXT NOT NULL,
          completed_at TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_categories_parent ON categories(parent_id);
        CREATE INDEX IF NOT EXISTS idx_items_object ON contract_object_items(contract_object_id);
        CREATE INDEX IF NOT EXISTS idx_contracts_authority ON contracts(authority_id);
        ",
    )?;

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
