use anyhow::{Context, Result, bail};
use rusqlite::{OptionalExtension, Transaction, params, params_from_iter};

use crate::model::{ExtractedDocument, ObjectItem, OrgFields, WinnerEntry};
use crate::util::normalize_official_name;

const AUTHORITY_FIELDS: &[(&str, &str)] = &[
    ("ADDRESS", "address"),
    ("TOWN", "town"),
    ("CONTACT_POINT", "contact_point"),
    ("POSTAL_CODE", "postal_code"),
    ("FAX", "fax"),
    ("NATIONALID", "national_id"),
    ("COUNTRY", "country"),
    ("PHONE", "phone"),
    ("E_MAIL", "email"),
    ("NUTS", "nuts"),
    ("URL_GENERAL", "website"),
];

const WINNER_FIELDS: &[(&str, &str)] = &[
    ("ADDRESS", "address"),
    ("TOWN", "town"),
    ("POSTAL_CODE", "postal_code"),
    ("COUNTRY", "country"),
    ("E_MAIL", "email"),
    ("NUTS", "nuts"),
    ("URL", "website"),
];

#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct PersistCounts {
    pub authorities_created: usize,
    pub winners_created: usize,
    pub items_created: usize,
}

// Applies one fully extracted document inside the caller's transaction; any
// error unwinds through the caller and rolls back every write.
pub(crate) fn save_document(
    tx: &Transaction<'_>,
    doc_id: &str,
    document: &ExtractedDocument,
) -> Result<PersistCounts> {
    let mut counts = PersistCounts::default();

    let (authority_id, authority_created) =
        resolve_or_merge_org(tx, "authorities", AUTHORITY_FIELDS, &document.authority)
            .context("failed to resolve contracting authority")?;
    if authority_created {
        counts.authorities_created += 1;
    }

    let object = &document.object;
    let main_category_id = category_id(tx, &object.main_code)?;

    tx.execute(
        "
        INSERT INTO contract_objects(
          main_category_id, title, short_descr, contract_type,
          val_total, val_total_currency, val_total_eur, lot_division)
        VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        ",
        params![
            main_category_id,
            object.title,
            object.short_descr,
            object.contract_type,
            object.total.amount,
            object.total.currency,
            object.total.reference_amount,
            object.lot_division,
        ],
    )?;
    let contract_object_id = tx.last_insert_rowid();

    for item in &object.items {
        save_item(
            tx,
            contract_object_id,
            main_category_id,
            &object.main_code,
            item,
            &mut counts,
        )?;
    }

    let base = &document.base;
    tx.execute(
        "
        INSERT INTO contracts(
          doc_id, uri, uri_english, date_published, short_title,
          contract_nature, authority_id, contract_object_id)
        VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        ",
        params![
            doc_id,
            base.uri_original,
            base.uri_english,
            base.date_published,
            base.short_title,
            base.contract_nature,
            authority_id,
            contract_object_id,
        ],
    )?;
    let contract_id = tx.last_insert_rowid();

    for reference in &base.original_codes {
        let code = reference.split(" - ").next().unwrap_or(reference);
        let code_id = category_id(tx, code)?;
        tx.execute(
            "INSERT OR IGNORE INTO contract_categories(contract_id, category_id) VALUES(?1, ?2)",
            params![contract_id, code_id],
        )?;
    }

    Ok(counts)
}

fn save_item(
    tx: &Transaction<'_>,
    contract_object_id: i64,
    main_category_id: i64,
    main_code: &str,
    item: &ObjectItem,
    counts: &mut PersistCounts,
) -> Result<()> {
    tx.execute(
        "
        INSERT INTO contract_object_items(
          contract_object_id, lot_no, nuts_code, title, short_descr,
          val_total, val_total_currency, val_total_eur)
        VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        ",
        params![
            contract_object_id,
            item.lot_no,
            item.nuts_code,
            item.title,
            item.short_descr,
            item.value.amount,
            item.value.currency,
            item.value.reference_amount,
        ],
    )?;
    let item_id = tx.last_insert_rowid();
    counts.items_created += 1;

    // The main code is folded into the item's code set when absent.
    let mut main_linked = false;
    for code in &item.additional_codes {
        let code_id = category_id(tx, code)?;
        if code == main_code {
            main_linked = true;
        }
        tx.execute(
            "INSERT OR IGNORE INTO item_categories(item_id, category_id) VALUES(?1, ?2)",
            params![item_id, code_id],
        )?;
    }
    if !main_linked {
        tx.execute(
            "INSERT OR IGNORE INTO item_categories(item_id, category_id) VALUES(?1, ?2)",
            params![item_id, main_category_id],
        )?;
    }

    for entry in &item.winners {
        save_winner(tx, item_id, entry, counts)?;
    }

    Ok(())
}

fn save_winner(
    tx: &Transaction<'_>,
    item_id: i64,
    entry: &WinnerEntry,
    counts: &mut PersistCounts,
) -> Result<()> {
    let (winner_id, created) = resolve_or_merge_org(tx, "winners", WINNER_FIELDS, &entry.fields)
        .context("failed to resolve winner")?;
    if created {
        counts.winners_created += 1;
    }

    tx.execute(
        "UPDATE winners SET total_awarded_eur = total_awarded_eur + ?1 WHERE id = ?2",
        params![entry.value.reference_amount, winner_id],
    )?;
    tx.execute(
        "INSERT OR IGNORE INTO item_winners(item_id, winner_id) VALUES(?1, ?2)",
        params![item_id, winner_id],
    )?;

    Ok(())
}

// Resolves an organization row by normalized official name, creating it on
// first sighting and merging attribute fields on every later one.
fn resolve_or_merge_org(
    tx: &Transaction<'_>,
    table: &str,
    field_columns: &[(&str, &str)],
    fields: &OrgFields,
) -> Result<(i64, bool)> {
    let raw_name = fields.get("OFFICIALNAME").map(String::as_str).unwrap_or("");
    let official_name = normalize_official_name(raw_name);
    if official_name.is_empty() {
        bail!("organization record has no official name");
    }

    let existing: Option<i64> = tx
        .query_row(
            &format!("SELECT id FROM {table} WHERE official_name = ?1"),
            params![official_name],
            |row| row.get(0),
        )
        .optional()?;

    if let Some(id) = existing {
        merge_org_fields(tx, table, field_columns, id, fields)?;
        return Ok((id, false));
    }

    let columns = field_columns
        .iter()
        .map(|(_, column)| *column)
        .collect::<Vec<_>>()
        .join(", ");
    let placeholders = (1..=field_columns.len() + 1)
        .map(|index| format!("?{index}"))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!("INSERT INTO {table}(official_name, {columns}) VALUES({placeholders})");

    let mut values = Vec::with_capacity(field_columns.len() + 1);
    values.push(official_name);
    for (field, _) in field_columns {
        values.push(fields.get(*field).cloned().unwrap_or_default());
    }

    tx.execute(&sql, params_from_iter(values.iter()))?;
    Ok((tx.last_insert_rowid(), true))
}

fn merge_org_fields(
    tx: &Transaction<'_>,
    table: &str,
    field_columns: &[(&str, &str)],
    id: i64,
    fields: &OrgFields,
) -> Result<()> {
    for (field, column) in field_columns {
        let incoming = fields.get(*field).map(String::as_str).unwrap_or("");
        let stored: Option<String> = tx.query_row(
            &format!("SELECT {column} FROM {table} WHERE id = ?1"),
            params![id],
            |row| row.get(0),
        )?;

        if let Some(merged) = merge_field(stored.as_deref(), incoming) {
            tx.execute(
                &format!("UPDATE {table} SET {column} = ?1 WHERE id = ?2"),
                params![merged, id],
            )?;
        }
    }

    Ok(())
}

// A non-empty incoming value that is not already a substring of the stored
// value is appended with a separator. Growth is unbounded on noisy inputs.
fn merge_field(stored: Option<&str>, incoming: &str) -> Option<String> {
    match stored {
        None => (!incoming.is_empty()).then(|| incoming.to_string()),
        Some(current) => {
            if current.contains(incoming) {
                None
            } else {
                Some(format!("{current}, {incoming}"))
            }
        }
    }
}

fn category_id(tx: &Transaction<'_>, code: &str) -> Result<i64> {
    tx.query_row(
        "SELECT id FROM categories WHERE code = ?1",
        params![code],
        |row| row.get(0),
    )
    .optional()?
    .with_context(|| format!("classification code {code} is not loaded"))
}
