use std::collections::HashMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

// Flat organization attribute set, element local name to trimmed text.
pub type OrgFields = HashMap<String, String>;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct MonetaryValue {
    pub amount: f64,
    pub currency: Option<String>,
    pub reference_amount: f64,
}

#[derive(Debug, Clone)]
pub struct BaseContractData {
    pub date_published: NaiveDate,
    pub short_title: String,
    pub uri_original: String,
    pub uri_english: String,
    // Each entry stored as "<code> - <label>".
    pub original_codes: Vec<String>,
    pub contract_nature: String,
}

#[derive(Debug, Clone)]
pub struct ObjectData {
    pub title: Option<String>,
    pub main_code: String,
    pub contract_type: Option<String>,
    pub short_descr: Option<String>,
    pub lot_division: bool,
    pub total: MonetaryValue,
    pub items: Vec<ObjectItem>,
}

#[derive(Debug, Clone)]
pub struct ObjectItem {
    pub lot_no: String,
    pub title: Option<String>,
    pub nuts_code: Option<String>,
    pub short_descr: Option<String>,
    pub additional_codes: Vec<String>,
    pub value: MonetaryValue,
    pub winners: Vec<WinnerEntry>,
}

// One awarded contractor on one lot, carrying the award's resolved value.
#[derive(Debug, Clone)]
pub struct WinnerEntry {
    pub fields: OrgFields,
    pub value: MonetaryValue,
}

#[derive(Debug, Clone)]
pub struct ExtractedDocument {
    pub authority: OrgFields,
    pub base: BaseContractData,
    pub object: ObjectData,
}

#[derive(Debug, Clone)]
pub enum ExtractionOutcome {
    Extracted(Box<ExtractedDocument>),
    Rejected(RejectReason),
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RejectReason {
    MissingAuthority,
    MissingBaseContract,
    MissingObject,
    NoWinners,
}

impl RejectReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::MissingAuthority => "missing authority data",
            Self::MissingBaseContract => "missing base contract data",
            Self::MissingObject => "missing object data",
            Self::NoWinners => "no items with winners",
        }
    }
}

#[derive(Debug, Eq, PartialEq)]
pub enum DocumentOutcome {
    Ingested,
    Skipped,
    Rejected(RejectReason),
}

#[derive(Debug, Clone, Deserialize)]
pub struct CodeEntry {
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub parent: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestPaths {
    pub cache_root: String,
    pub source_directory: String,
    pub manifest_path: String,
    pub db_path: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestCounts {
    pub documents_seen: usize,
    pub ingested: usize,
    pub skipped: usize,
    pub rejected_missing_authority: usize,
    pub rejected_missing_base_contract: usize,
    pub rejected_missing_object: usize,
    pub rejected_no_winners: usize,
    pub failed: usize,
    pub contracts_total: i64,
    pub authorities_total: i64,
    pub winners_total: i64,
    pub items_total: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestRunManifest {
    pub manifest_version: u32,
    pub run_id: String,
    pub db_schema_version: String,
    pub reference_currency: String,
    pub status: String,
    pub started_at: String,
    pub updated_at: String,
    pub paths: IngestPaths,
    pub counts: IngestCounts,
    pub warnings: Vec<String>,
}
