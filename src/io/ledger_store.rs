//! JSON persistence for the credit ledger.
//!
//! The ledger is stored as a plain array of lots so a later run can resume
//! with the same balances and expiry dates. Validity is not stored; it comes
//! from the scenario that loads the file.

use std::fs::File;
use std::io::{self, BufReader, Read, Write};
use std::path::Path;

use thiserror::Error;
use tracing::debug;

use crate::error::SettlementError;
use crate::settlement::ledger::{CreditLedger, CreditLot};

/// Errors raised while saving or loading a ledger file.
#[derive(Debug, Error)]
pub enum LedgerStoreError {
    #[error("ledger file I/O failed: {0}")]
    Io(#[from] io::Error),

    #[error("ledger file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("ledger file holds an invalid lot: {0}")]
    Invalid(#[from] SettlementError),
}

/// Saves every lot, including exhausted and expired ones, to `path`.
///
/// # Errors
///
/// Returns `LedgerStoreError::Io` if the file cannot be created and
/// `LedgerStoreError::Json` if serialization fails.
pub fn save_ledger(ledger: &CreditLedger, path: &Path) -> Result<(), LedgerStoreError> {
    let file = File::create(path)?;
    write_ledger(ledger, io::BufWriter::new(file))
}

/// Writes the ledger lots as a pretty-printed JSON array.
///
/// # Errors
///
/// Returns `LedgerStoreError::Json` if serialization or writing fails.
pub fn write_ledger(ledger: &CreditLedger, mut writer: impl Write) -> Result<(), LedgerStoreError> {
    serde_json::to_writer_pretty(&mut writer, ledger.lots())?;
    writer.flush()?;
    Ok(())
}

/// Loads a ledger previously written by [`save_ledger`].
///
/// # Errors
///
/// Returns `LedgerStoreError::Io` if the file cannot be read,
/// `LedgerStoreError::Json` if it does not parse, and
/// `LedgerStoreError::Invalid` if a lot breaks the ledger invariants.
pub fn load_ledger(path: &Path, validity_months: u32) -> Result<CreditLedger, LedgerStoreError> {
    let file = File::open(path)?;
    read_ledger(BufReader::new(file), validity_months)
}

/// Reads a JSON array of lots and rebuilds the ledger, re-sorted by expiry.
///
/// # Errors
///
/// See [`load_ledger`].
pub fn read_ledger(reader: impl Read, validity_months: u32) -> Result<CreditLedger, LedgerStoreError> {
    let lots: Vec<CreditLot> = serde_json::from_reader(reader)?;
    let ledger = CreditLedger::from_lots(lots, validity_months)?;
    debug!(lots = ledger.lots().len(), "ledger loaded");
    Ok(ledger)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::period::MonthYear;

    fn sample_ledger() -> CreditLedger {
        let mut ledger = CreditLedger::new(60);
        ledger.add_credit(1, 2024, 500.0).ok();
        ledger.add_credit(2, 2024, 300.0).ok();
        ledger.consume(200.0, MonthYear { year: 2024, month: 3 }).ok();
        ledger
    }

    #[test]
    fn write_then_read_keeps_balances() {
        let ledger = sample_ledger();
        let mut buf = Vec::new();
        assert!(write_ledger(&ledger, &mut buf).is_ok());

        let restored = read_ledger(buf.as_slice(), 60);
        let restored = restored.unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(restored, ledger);
        let as_of = MonthYear { year: 2024, month: 4 };
        assert_eq!(restored.available_balance(as_of), 600.0);
    }

    #[test]
    fn lots_are_resorted_by_expiry() {
        let json = r#"[
            {"generated": {"year": 2024, "month": 5}, "generated_kwh": 10.0, "consumed_kwh": 0.0,
             "remaining_kwh": 10.0, "expiry": {"year": 2029, "month": 5}, "active": true},
            {"generated": {"year": 2024, "month": 2}, "generated_kwh": 20.0, "consumed_kwh": 0.0,
             "remaining_kwh": 20.0, "expiry": {"year": 2029, "month": 2}, "active": true}
        ]"#;
        let ledger = read_ledger(json.as_bytes(), 60).unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(ledger.lots()[0].generated, MonthYear { year: 2024, month: 2 });
        assert_eq!(
            ledger.latest_generation(),
            Some(MonthYear { year: 2024, month: 5 })
        );
    }

    #[test]
    fn inconsistent_lot_is_rejected() {
        let json = r#"[
            {"generated": {"year": 2024, "month": 1}, "generated_kwh": 10.0, "consumed_kwh": 4.0,
             "remaining_kwh": 9.0, "expiry": {"year": 2029, "month": 1}, "active": true}
        ]"#;
        let err = read_ledger(json.as_bytes(), 60);
        assert!(matches!(err, Err(LedgerStoreError::Invalid(_))));
    }

    #[test]
    fn malformed_json_is_rejected() {
        let err = read_ledger("[{".as_bytes(), 60);
        assert!(matches!(err, Err(LedgerStoreError::Json(_))));
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = load_ledger(Path::new("/nonexistent/ledger.json"), 60);
        assert!(matches!(err, Err(LedgerStoreError::Io(_))));
    }
}
