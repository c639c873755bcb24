//! Evolution Ledger
//!
//! SQLite-backed append-only records: one audit verdict per skill per
//! cycle, and the permanent evolution history. The ledger is where
//! purged scheduling records live on -- history rows are never deleted.

mod database;
mod schema;

pub use database::Ledger;
pub use schema::{CREATE_TABLES, SCHEMA_VERSION};
