//! Result records produced by a settlement run.

use std::fmt;

use serde::Serialize;

use crate::model::period::MonthYear;
use crate::model::tariff_flag::TariffFlag;
use crate::model::unit::ConnectionClass;

use super::allocator::Distribution;
use super::finance::{IrrEstimate, Payback};
use super::ledger::LedgerDraw;

/// Energy figures for one settled month.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyEnergyResult {
    /// Month settled.
    pub period: MonthYear,
    /// Configured generation before losses (kWh).
    pub nominal_generation_kwh: f64,
    /// Real generation (kWh).
    pub generation_kwh: f64,
    /// Aggregate consumption of active units (kWh).
    pub consumption_kwh: f64,
    /// Aggregate connection-class floor (kWh).
    pub minimum_billable_kwh: f64,
    /// `generation - max(consumption, floor)` (kWh).
    pub balance_kwh: f64,
    /// Surplus banked as a new credit lot (kWh).
    pub credits_generated_kwh: f64,
    /// Credits drawn from the ledger (kWh).
    pub credits_consumed_kwh: f64,
    /// Credits forfeited to expiry at the start of the month (kWh).
    pub credits_expired_kwh: f64,
    /// Surplus physically injected into the grid (kWh).
    pub grid_injected_kwh: f64,
    /// Deficit drawn from the grid (kWh).
    pub grid_drawn_kwh: f64,
    /// Real generation over installed capacity for the month, in [0, 1].
    pub capacity_factor: f64,
    /// Real over nominal generation, in [0, 1].
    pub real_efficiency: f64,
    /// Nominal minus real generation (kWh).
    pub losses_kwh: f64,
}

impl MonthlyEnergyResult {
    /// Consumption used for billing: never below the aggregate floor.
    pub fn effective_consumption_kwh(&self) -> f64 {
        self.consumption_kwh.max(self.minimum_billable_kwh)
    }
}

/// Money figures for one settled month.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyFinancialResult {
    pub period: MonthYear,
    /// Flag the month was priced under.
    pub flag: TariffFlag,
    pub cost_without_system: f64,
    pub cost_with_system: f64,
    /// `cost_without - cost_with + credits_consumed_value`.
    pub economy: f64,
    pub credits_consumed_value: f64,
    /// Value of the surplus banked this month.
    pub credits_generated_value: f64,
    /// Surcharge part of the no-plant bill.
    pub flag_surcharge_value: f64,
    pub availability_cost: f64,
    /// Tax part of the no-plant bill.
    pub taxes: f64,
}

/// One month of settlement: energy, allocation, ledger draw and money.
#[derive(Debug, Clone, Serialize)]
pub struct MonthlySettlement {
    pub energy: MonthlyEnergyResult,
    pub distribution: Distribution,
    pub draw: LedgerDraw,
    pub financial: MonthlyFinancialResult,
    /// Ledger balance usable after this month's draw (kWh).
    pub ledger_balance_kwh: f64,
}

/// Annual money totals plus investment metrics.
#[derive(Debug, Clone, Serialize)]
pub struct AnnualFinancialResult {
    pub year: i32,
    pub cost_without_system: f64,
    pub cost_with_system: f64,
    pub economy: f64,
    pub credits_consumed_value: f64,
    pub credits_generated_value: f64,
    pub investment: f64,
    pub payback: Payback,
    pub roi_percent: f64,
    pub irr: IrrEstimate,
    /// Horizon used for ROI and IRR (years).
    pub horizon_years: u32,
}

/// Annual energy totals and plant diagnostics.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct EnergySummary {
    pub generation_kwh: f64,
    pub consumption_kwh: f64,
    /// Generation minus effective consumption, summed over the year.
    pub balance_kwh: f64,
    pub credits_generated_kwh: f64,
    pub credits_consumed_kwh: f64,
    pub credits_expired_kwh: f64,
    /// `generation / consumption` in %, capped at 100.
    pub self_sufficiency_pct: f64,
    pub mean_capacity_factor: f64,
    pub mean_efficiency: f64,
    pub losses_kwh: f64,
    /// Annual generation per installed kWp.
    pub specific_yield_kwh_per_kwp: f64,
}

impl EnergySummary {
    /// Aggregates monthly energy results.
    ///
    /// # Arguments
    ///
    /// * `months` - Monthly results of one year
    /// * `installed_capacity_kw` - Plant capacity for the specific yield
    pub fn from_months(months: &[MonthlyEnergyResult], installed_capacity_kw: f64) -> Self {
        if months.is_empty() {
            return Self::default();
        }
        let n = months.len() as f64;
        let sum = |f: fn(&MonthlyEnergyResult) -> f64| months.iter().map(f).sum::<f64>();

        let generation = sum(|m| m.generation_kwh);
        let consumption = sum(|m| m.consumption_kwh);
        let self_sufficiency = if consumption > 0.0 {
            (generation / consumption * 100.0).min(100.0)
        } else {
            0.0
        };
        let specific_yield = if installed_capacity_kw > 0.0 {
            generation / installed_capacity_kw
        } else {
            0.0
        };

        Self {
            generation_kwh: generation,
            consumption_kwh: consumption,
            balance_kwh: sum(|m| m.balance_kwh),
            credits_generated_kwh: sum(|m| m.credits_generated_kwh),
            credits_consumed_kwh: sum(|m| m.credits_consumed_kwh),
            credits_expired_kwh: sum(|m| m.credits_expired_kwh),
            self_sufficiency_pct: self_sufficiency,
            mean_capacity_factor: sum(|m| m.capacity_factor) / n,
            mean_efficiency: sum(|m| m.real_efficiency) / n,
            losses_kwh: sum(|m| m.losses_kwh),
            specific_yield_kwh_per_kwp: specific_yield,
        }
    }
}

/// Per-unit totals over a settled year.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnitAnnualSummary {
    pub unit_id: String,
    pub name: String,
    pub connection: ConnectionClass,
    pub consumption_kwh: f64,
    pub credits_received_kwh: f64,
    /// Sum of monthly final bills (kWh).
    pub billed_kwh: f64,
    /// Share of the year's total consumption, 1 decimal.
    pub consumption_share_pct: f64,
}

/// Everything produced by settling one calendar year.
#[derive(Debug, Clone, Serialize)]
pub struct AnnualSettlement {
    pub year: i32,
    pub months: Vec<MonthlySettlement>,
    pub energy: EnergySummary,
    pub financial: AnnualFinancialResult,
    pub units: Vec<UnitAnnualSummary>,
}

impl fmt::Display for MonthlySettlement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let e = &self.energy;
        write!(
            f,
            "{} gen={:.1} kWh cons={:.1} kWh bal={:+.1} kWh credits +{:.1}/-{:.1}/x{:.1} \
             ledger={:.1} kWh economy={:.2}",
            e.period,
            e.generation_kwh,
            e.consumption_kwh,
            e.balance_kwh,
            e.credits_generated_kwh,
            e.credits_consumed_kwh,
            e.credits_expired_kwh,
            self.ledger_balance_kwh,
            self.financial.economy,
        )
    }
}
