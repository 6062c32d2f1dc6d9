//! Credit banking and financial settlement.

pub mod allocator;
pub mod balance;
pub mod clock;
pub mod engine;
pub mod finance;
pub mod ledger;
pub mod summary;
pub mod tariff;
pub mod types;

pub use allocator::{CreditAllocator, Distribution, UnitAllocation};
pub use balance::EnergyBalanceCalculator;
pub use engine::SettlementRun;
pub use finance::{FinancialMetricsEngine, IrrEstimate, IrrStatus, Payback};
pub use ledger::{CreditLedger, CreditLot, LedgerDraw, LotState};
pub use tariff::{CostBreakdown, TariffEngine};
pub use types::{
    AnnualFinancialResult, AnnualSettlement, EnergySummary, MonthlyEnergyResult,
    MonthlyFinancialResult, MonthlySettlement, UnitAnnualSummary,
};
