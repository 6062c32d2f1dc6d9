//! Settlement run that drives the components month by month.

use tracing::{debug, info, warn};

use crate::error::{Result, SettlementError};
use crate::model::period::MonthYear;
use crate::model::system::SystemConfig;
use crate::model::tariff_flag::TariffFlag;
use crate::model::unit::ConsumingUnit;

use super::allocator::CreditAllocator;
use super::balance::EnergyBalanceCalculator;
use super::clock::MonthClock;
use super::finance::{DEFAULT_HORIZON_YEARS, FinancialMetricsEngine};
use super::ledger::{CreditLedger, LedgerDraw, check_validity};
use super::summary::unit_summaries;
use super::tariff::TariffEngine;
use super::types::{AnnualSettlement, EnergySummary, MonthlyFinancialResult, MonthlySettlement};

/// Deficits or draw shortfalls below this are rounding noise (kWh).
const REPORTING_TOLERANCE_KWH: f64 = 0.01;

/// Owns the credit ledger for one settlement run and replays months in
/// chronological order.
///
/// The ledger is passed in and can be taken back out with
/// [`into_ledger`](Self::into_ledger), so a later run can resume from it.
pub struct SettlementRun {
    system: SystemConfig,
    units: Vec<ConsumingUnit>,
    flag: TariffFlag,
    horizon_years: u32,
    ledger: CreditLedger,
    finance: FinancialMetricsEngine,
    last_settled: Option<MonthYear>,
}

impl SettlementRun {
    /// Creates a settlement run.
    ///
    /// # Arguments
    ///
    /// * `system` - Plant and tariff configuration
    /// * `units` - Consuming units sharing the plant
    /// * `flag` - Tariff flag applied to every settled month
    /// * `ledger` - Starting ledger, empty or restored from a previous run
    ///
    /// # Errors
    ///
    /// Returns `SettlementError::Validation` if the tariff rates or the
    /// investment cost are invalid, if the credit validity is out of range,
    /// or if the ledger was built with a different validity than `system`.
    pub fn new(
        system: SystemConfig,
        units: Vec<ConsumingUnit>,
        flag: TariffFlag,
        ledger: CreditLedger,
    ) -> Result<Self> {
        check_validity(system.credit_validity_months)?;
        if ledger.validity_months() != system.credit_validity_months {
            return Err(SettlementError::validation(
                "validity_months",
                ledger.validity_months(),
                format!(
                    "ledger validity must match the plant's {} months",
                    system.credit_validity_months
                ),
            ));
        }
        let floor = EnergyBalanceCalculator::new(&system, &units).floor_total();
        let tariff = TariffEngine::new(system.tariff.clone(), floor)?;
        let finance = FinancialMetricsEngine::new(tariff, system.investment_cost)?;
        Ok(Self {
            system,
            units,
            flag,
            horizon_years: DEFAULT_HORIZON_YEARS,
            ledger,
            finance,
            last_settled: None,
        })
    }

    /// Sets the ROI/IRR horizon (years).
    pub fn with_horizon(mut self, horizon_years: u32) -> Self {
        self.horizon_years = horizon_years;
        self
    }

    /// Settles a single month.
    ///
    /// Expired lots are forfeited first. A surplus is banked as a new lot. In
    /// a deficit month the units share the generation left after the floors
    /// plus `min(available credits, deficit)` from the ledger; the ledger is
    /// only charged for grants beyond that generation.
    ///
    /// # Errors
    ///
    /// Returns `SettlementError::Validation` if `period` is outside the
    /// supported calendar, is not strictly after the last settled month and
    /// the ledger's newest lot or draw, or if any input fails validation.
    /// The ledger is not touched when the period is rejected.
    pub fn settle_month(&mut self, period: MonthYear) -> Result<MonthlySettlement> {
        self.check_order(period)?;

        let mut energy = EnergyBalanceCalculator::new(&self.system, &self.units).balance(period)?;
        energy.credits_expired_kwh = self.ledger.expire(period);

        let allocator = CreditAllocator::new(&self.units);
        let (distribution, draw) = if energy.credits_generated_kwh > 0.0 {
            self.ledger
                .add_credit_at(period, energy.credits_generated_kwh)?;
            (allocator.floor_only(period), LedgerDraw::default())
        } else if energy.grid_drawn_kwh > 0.0 {
            let offer = self
                .ledger
                .available_balance(period)
                .min(energy.grid_drawn_kwh);
            if energy.grid_drawn_kwh - offer > REPORTING_TOLERANCE_KWH {
                warn!(
                    period = %period,
                    deficit_kwh = energy.grid_drawn_kwh,
                    uncovered_kwh = energy.grid_drawn_kwh - offer,
                    "deficit not fully covered by credits"
                );
            }
            let from_generation =
                (energy.generation_kwh - energy.minimum_billable_kwh).max(0.0);
            allocator.settle(period, from_generation, offer, &mut self.ledger)?
        } else {
            (allocator.floor_only(period), LedgerDraw::default())
        };

        if draw.shortfall_kwh() > REPORTING_TOLERANCE_KWH {
            warn!(
                period = %period,
                shortfall_kwh = draw.shortfall_kwh(),
                "ledger supplied less than the credits granted"
            );
        }

        energy.credits_consumed_kwh = draw.consumed_kwh;
        let financial = self
            .finance
            .monthly(&energy, draw.consumed_kwh, self.flag)?;
        let ledger_balance_kwh = self.ledger.available_balance(period);
        self.last_settled = Some(period);

        debug!(
            period = %period,
            balance_kwh = energy.balance_kwh,
            credits_generated_kwh = energy.credits_generated_kwh,
            credits_consumed_kwh = energy.credits_consumed_kwh,
            credits_expired_kwh = energy.credits_expired_kwh,
            ledger_balance_kwh,
            economy = financial.economy,
            "month settled"
        );

        Ok(MonthlySettlement {
            energy,
            distribution,
            draw,
            financial,
            ledger_balance_kwh,
        })
    }

    fn check_order(&self, period: MonthYear) -> Result<()> {
        period.validated()?;
        if let Some(last) = self.last_settled.filter(|&last| period <= last) {
            return Err(SettlementError::validation(
                "period",
                period,
                format!("must be after the last settled month {last}"),
            ));
        }
        if let Some(latest) = self
            .ledger
            .latest_activity()
            .filter(|&latest| period <= latest)
        {
            return Err(SettlementError::validation(
                "period",
                period,
                format!("must be after the ledger's last banked or drawn month {latest}"),
            ));
        }
        Ok(())
    }

    /// Settles January to December of `year` and summarises it.
    ///
    /// # Errors
    ///
    /// Propagates the first error from [`settle_month`](Self::settle_month).
    pub fn run_year(&mut self, year: i32) -> Result<AnnualSettlement> {
        let mut months = Vec::with_capacity(12);
        for period in MonthClock::for_years(year, 1) {
            months.push(self.settle_month(period)?);
        }

        let energy_months: Vec<_> = months.iter().map(|m| m.energy.clone()).collect();
        let financial_months: Vec<MonthlyFinancialResult> =
            months.iter().map(|m| m.financial.clone()).collect();
        let energy = EnergySummary::from_months(&energy_months, self.system.installed_capacity_kw);
        let financial = self
            .finance
            .annual(year, &financial_months, self.horizon_years);
        let units = unit_summaries(&self.units, &months);

        info!(
            year,
            generation_kwh = energy.generation_kwh,
            consumption_kwh = energy.consumption_kwh,
            credits_expired_kwh = energy.credits_expired_kwh,
            economy = financial.economy,
            payback = %financial.payback,
            "year settled"
        );

        Ok(AnnualSettlement {
            year,
            months,
            energy,
            financial,
            units,
        })
    }

    /// Settles `years` consecutive years over the same ledger.
    ///
    /// # Errors
    ///
    /// Propagates the first error from [`run_year`](Self::run_year), and
    /// returns `SettlementError::Validation` if the last year does not fit
    /// in an `i32`.
    pub fn run_years(&mut self, start_year: i32, years: u32) -> Result<Vec<AnnualSettlement>> {
        (0..years)
            .map(|offset| {
                let year = i32::try_from(offset)
                    .ok()
                    .and_then(|offset| start_year.checked_add(offset))
                    .ok_or_else(|| {
                        SettlementError::validation("years", years, "run extends past year i32::MAX")
                    })?;
                self.run_year(year)
            })
            .collect()
    }

    /// Current ledger state.
    pub fn ledger(&self) -> &CreditLedger {
        &self.ledger
    }

    /// Ends the run and hands the ledger back.
    pub fn into_ledger(self) -> CreditLedger {
        self.ledger
    }

    /// Plant configuration in use.
    pub fn system(&self) -> &SystemConfig {
        &self.system
    }

    /// Consuming units in use.
    pub fn units(&self) -> &[ConsumingUnit] {
        &self.units
    }

    /// Tariff flag applied to every month.
    pub fn flag(&self) -> TariffFlag {
        self.flag
    }

    /// ROI/IRR horizon (years).
    pub fn horizon_years(&self) -> u32 {
        self.horizon_years
    }

    /// Financial engine in use.
    pub fn finance(&self) -> &FinancialMetricsEngine {
        &self.finance
    }
}
