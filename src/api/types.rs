//! API response and query types.

use serde::{Deserialize, Serialize};

use crate::config::ScenarioConfig;
use crate::model::period::MonthYear;
use crate::settlement::ledger::{CreditLot, LotState};
use crate::settlement::types::{
    AnnualFinancialResult, AnnualSettlement, EnergySummary, UnitAnnualSummary,
};

/// Scenario plus one summary per settled year.
#[derive(Debug, Serialize)]
pub struct StateResponse {
    pub scenario: ScenarioConfig,
    pub years: Vec<YearSummary>,
    /// Credits still usable after the last settled month (kWh).
    pub ledger_balance_kwh: f64,
}

/// Annual totals without the monthly detail.
#[derive(Debug, Serialize)]
pub struct YearSummary {
    pub year: i32,
    pub energy: EnergySummary,
    pub financial: AnnualFinancialResult,
    pub units: Vec<UnitAnnualSummary>,
}

impl From<&AnnualSettlement> for YearSummary {
    fn from(y: &AnnualSettlement) -> Self {
        Self {
            year: y.year,
            energy: y.energy.clone(),
            financial: y.financial.clone(),
            units: y.units.clone(),
        }
    }
}

/// Credit lot with its derived lifecycle state.
#[derive(Debug, Serialize)]
pub struct LotRecord {
    pub generated: MonthYear,
    pub expiry: MonthYear,
    pub generated_kwh: f64,
    pub consumed_kwh: f64,
    pub remaining_kwh: f64,
    pub state: LotState,
}

impl From<&CreditLot> for LotRecord {
    fn from(lot: &CreditLot) -> Self {
        Self {
            generated: lot.generated,
            expiry: lot.expiry,
            generated_kwh: lot.generated_kwh,
            consumed_kwh: lot.consumed_kwh,
            remaining_kwh: lot.remaining_kwh,
            state: lot.state(),
        }
    }
}

/// Ledger listing in expiry order.
#[derive(Debug, Serialize)]
pub struct LedgerResponse {
    pub validity_months: u32,
    pub lots: Vec<LotRecord>,
}

/// Optional period range for the months endpoint, `MM/YYYY` or `YYYY-MM`.
#[derive(Debug, Deserialize)]
pub struct MonthQuery {
    /// First month (inclusive).
    pub from: Option<String>,
    /// Last month (inclusive).
    pub to: Option<String>,
}

/// Error response body for 400-class errors.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Human-readable error message.
    pub error: String,
}
