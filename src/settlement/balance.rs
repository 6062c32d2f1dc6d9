//! Monthly energy balance between the plant and its consuming units.

use tracing::debug;

use crate::error::{Result, SettlementError};
use crate::model::period::{MonthYear, month_index};
use crate::model::system::SystemConfig;
use crate::model::unit::ConsumingUnit;

use super::types::MonthlyEnergyResult;

/// Converts nominal generation into real generation and compares it with
/// the aggregate billable consumption of the active units.
pub struct EnergyBalanceCalculator<'a> {
    system: &'a SystemConfig,
    units: &'a [ConsumingUnit],
}

impl<'a> EnergyBalanceCalculator<'a> {
    /// Creates a calculator over borrowed plant and unit data.
    pub fn new(system: &'a SystemConfig, units: &'a [ConsumingUnit]) -> Self {
        Self { system, units }
    }

    /// Nominal (configured) generation for a 1-based month.
    ///
    /// # Errors
    ///
    /// Returns `SettlementError::Validation` if `month` is outside `1..=12`.
    pub fn nominal_generation(&self, month: u32) -> Result<f64> {
        Ok(self.system.monthly_generation_kwh[month_index(month)?])
    }

    /// `nominal * efficiency * (1 - losses) * simultaneity`, never negative.
    ///
    /// # Errors
    ///
    /// Returns `SettlementError::Validation` if `month` is outside `1..=12`
    /// or the efficiency is outside `(0, 1]`.
    pub fn real_generation(&self, month: u32) -> Result<f64> {
        let s = self.system;
        if !(s.efficiency > 0.0 && s.efficiency <= 1.0) {
            return Err(SettlementError::validation(
                "efficiency",
                s.efficiency,
                "must be in (0, 1]",
            ));
        }
        let nominal = self.nominal_generation(month)?;
        Ok((nominal * s.efficiency * (1.0 - s.losses) * s.simultaneity).max(0.0))
    }

    /// Sum of consumption over active units.
    ///
    /// # Errors
    ///
    /// Returns `SettlementError::Validation` if `month` is outside `1..=12`.
    pub fn total_consumption(&self, month: u32) -> Result<f64> {
        let idx = month_index(month)?;
        Ok(self
            .units
            .iter()
            .filter(|u| u.active)
            .map(|u| u.consumption(idx))
            .sum())
    }

    /// Sum of connection-class floors over active units.
    ///
    /// # Errors
    ///
    /// Returns `SettlementError::Validation` if `month` is outside `1..=12`.
    pub fn minimum_billable(&self, month: u32) -> Result<f64> {
        month_index(month)?;
        Ok(self.floor_total())
    }

    pub(crate) fn floor_total(&self) -> f64 {
        self.units
            .iter()
            .filter(|u| u.active)
            .map(ConsumingUnit::floor_kwh)
            .sum()
    }

    /// Computes the balance for `period`.
    ///
    /// Billable consumption is never below the aggregate floor, so a month
    /// with tiny usage still settles against the minimum charge. Ledger
    /// columns (`credits_consumed_kwh`, `credits_expired_kwh`) are left at
    /// zero; the settlement run fills them in.
    ///
    /// # Errors
    ///
    /// Propagates validation errors from [`real_generation`](Self::real_generation).
    pub fn balance(&self, period: MonthYear) -> Result<MonthlyEnergyResult> {
        let nominal = self.nominal_generation(period.month)?;
        let generation = self.real_generation(period.month)?;
        let consumption = self.total_consumption(period.month)?;
        let floor = self.minimum_billable(period.month)?;

        let balance = generation - consumption.max(floor);
        let surplus = balance.max(0.0);

        let hours = f64::from(24 * period.days_in_month());
        let capacity_factor = if self.system.installed_capacity_kw > 0.0 {
            (generation / (self.system.installed_capacity_kw * hours)).min(1.0)
        } else {
            0.0
        };
        let real_efficiency = if nominal > 0.0 {
            (generation / nominal).min(1.0)
        } else {
            0.0
        };

        let result = MonthlyEnergyResult {
            period,
            nominal_generation_kwh: nominal,
            generation_kwh: generation,
            consumption_kwh: consumption,
            minimum_billable_kwh: floor,
            balance_kwh: balance,
            credits_generated_kwh: surplus,
            credits_consumed_kwh: 0.0,
            credits_expired_kwh: 0.0,
            grid_injected_kwh: surplus * self.system.grid_injection_pct,
            grid_drawn_kwh: (-balance).max(0.0),
            capacity_factor,
            real_efficiency,
            losses_kwh: (nominal - generation).max(0.0),
        };
        debug!(
            period = %period,
            generation_kwh = generation,
            consumption_kwh = consumption,
            balance_kwh = balance,
            "energy balance"
        );
        Ok(result)
    }
}
