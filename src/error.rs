//! Error taxonomy for the settlement engine.

use thiserror::Error;

/// Errors raised by the settlement components.
///
/// `Validation` and `Ledger` are recoverable and carry the offending value or
/// the exact shortfall. `Calculation` marks guarded divisions; most callers map
/// it to a sentinel (see [`crate::settlement::finance::Payback`]) instead of
/// failing the run.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SettlementError {
    /// An input was rejected before any computation happened.
    #[error("invalid {field} = {value}: {message}")]
    Validation {
        /// Name of the rejected input.
        field: &'static str,
        /// The rejected value, rendered for display.
        value: String,
        /// Constraint the value violated.
        message: String,
    },
    /// A guarded arithmetic condition (zero investment, no economy, ...).
    #[error("calculation error: {0}")]
    Calculation(String),
    /// The ledger could not supply the full amount requested.
    #[error(
        "ledger shortfall: requested {requested_kwh:.2} kWh, drew {available_kwh:.2} kWh \
         ({shortfall_kwh:.2} kWh short)"
    )]
    Ledger {
        /// Amount asked for.
        requested_kwh: f64,
        /// Amount the ledger could actually supply.
        available_kwh: f64,
        /// `requested_kwh - available_kwh`.
        shortfall_kwh: f64,
    },
}

impl SettlementError {
    /// Builds a [`SettlementError::Validation`] from any displayable value.
    pub fn validation(
        field: &'static str,
        value: impl std::fmt::Display,
        message: impl Into<String>,
    ) -> Self {
        Self::Validation {
            field,
            value: value.to_string(),
            message: message.into(),
        }
    }
}

/// Result alias used throughout the settlement modules.
pub type Result<T> = std::result::Result<T, SettlementError>;

/// Rejects `value` unless it is finite and `>= 0`.
pub(crate) fn ensure_non_negative(field: &'static str, value: f64) -> Result<()> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(SettlementError::validation(
            field,
            value,
            "must be finite and >= 0",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_message_names_field_and_value() {
        let err = SettlementError::validation("month", 13, "must be in [1, 12]");
        assert_eq!(err.to_string(), "invalid month = 13: must be in [1, 12]");
    }

    #[test]
    fn ledger_message_reports_shortfall() {
        let err = SettlementError::Ledger {
            requested_kwh: 100.0,
            available_kwh: 40.0,
            shortfall_kwh: 60.0,
        };
        assert!(err.to_string().contains("60.00 kWh short"));
    }

    #[test]
    fn non_negative_guard() {
        assert!(ensure_non_negative("x", 0.0).is_ok());
        assert!(ensure_non_negative("x", -0.1).is_err());
        assert!(ensure_non_negative("x", f64::NAN).is_err());
        assert!(ensure_non_negative("x", f64::INFINITY).is_err());
    }
}
