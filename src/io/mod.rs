//! File input and output: CSV export and ledger persistence.

pub mod export;
pub mod ledger_store;
