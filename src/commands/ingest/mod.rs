mod db_setup;
mod extract_authority;
mod extract_award;
mod extract_base_contract;
mod extract_object;
mod persist;
mod reconcile;
mod run;

pub use run::run;

pub(crate) use db_setup::{configure_connection, ensure_schema};
