//! Energy pricing under tariff flags.

use serde::Serialize;

use crate::error::{Result, SettlementError, ensure_non_negative};
use crate::model::system::TariffConfig;
use crate::model::tariff_flag::TariffFlag;

/// Itemised cost of a quantity of grid energy.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct CostBreakdown {
    /// Energy priced (kWh).
    pub kwh: f64,
    /// Base energy charge.
    pub energy: f64,
    /// Distribution-use charge.
    pub tusd: f64,
    /// Energy-generation charge.
    pub te: f64,
    /// Flag surcharge.
    pub surcharge: f64,
    /// Tax markup on all of the above.
    pub taxes: f64,
    /// Sum of every component.
    pub total: f64,
}

/// Prices energy for a set of units sharing an aggregate availability floor.
#[derive(Debug, Clone)]
pub struct TariffEngine {
    tariff: TariffConfig,
    availability_kwh: f64,
}

impl TariffEngine {
    /// Creates a pricing engine.
    ///
    /// # Arguments
    ///
    /// * `tariff` - Rates, tax markup and flag surcharges
    /// * `availability_kwh` - Aggregate minimum billable energy of the active units
    ///
    /// # Errors
    ///
    /// Returns `SettlementError::Validation` if any rate, surcharge, the tax
    /// rate or the floor is negative or not finite.
    pub fn new(tariff: TariffConfig, availability_kwh: f64) -> Result<Self> {
        ensure_non_negative("tariff.energy_kwh", tariff.energy_kwh)?;
        ensure_non_negative("tariff.tusd_kwh", tariff.tusd_kwh)?;
        ensure_non_negative("tariff.te_kwh", tariff.te_kwh)?;
        ensure_non_negative("tariff.tax_rate", tariff.tax_rate)?;
        for (name, value) in tariff.surcharges.named() {
            if !value.is_finite() || value < 0.0 {
                return Err(SettlementError::validation(
                    "tariff.surcharges",
                    value,
                    format!("{name} surcharge must be finite and >= 0"),
                ));
            }
        }
        ensure_non_negative("availability_kwh", availability_kwh)?;
        Ok(Self {
            tariff,
            availability_kwh,
        })
    }

    /// Configured rates.
    pub fn tariff(&self) -> &TariffConfig {
        &self.tariff
    }

    /// Per-kWh surcharge for `flag`.
    pub fn surcharge(&self, flag: TariffFlag) -> f64 {
        self.tariff.surcharges.get(flag)
    }

    /// Base energy tariff plus the flag surcharge.
    pub fn effective_tariff(&self, flag: TariffFlag) -> f64 {
        self.tariff.energy_kwh + self.surcharge(flag)
    }

    /// Itemises the cost of `kwh` of grid energy under `flag`.
    ///
    /// # Errors
    ///
    /// Returns `SettlementError::Validation` if `kwh` is negative or not finite.
    pub fn breakdown(&self, kwh: f64, flag: TariffFlag) -> Result<CostBreakdown> {
        ensure_non_negative("kwh", kwh)?;
        let t = &self.tariff;
        let energy = kwh * t.energy_kwh;
        let surcharge = kwh * self.surcharge(flag);
        let tusd = kwh * t.tusd_kwh;
        let te = kwh * t.te_kwh;
        let taxes = (energy + surcharge + tusd + te) * t.tax_rate;
        Ok(CostBreakdown {
            kwh,
            energy,
            tusd,
            te,
            surcharge,
            taxes,
            total: energy + surcharge + tusd + te + taxes,
        })
    }

    /// Full priced cost of the aggregate floor; the least any month can cost.
    pub fn availability_cost(&self, flag: TariffFlag) -> f64 {
        self.breakdown(self.availability_kwh, flag)
            .map(|b| b.total)
            .unwrap_or(0.0)
    }

    /// Bill for `consumption_kwh` with no plant, floored at the availability cost.
    ///
    /// # Errors
    ///
    /// Returns `SettlementError::Validation` if `consumption_kwh` is negative
    /// or not finite.
    pub fn cost_without_system(&self, consumption_kwh: f64, flag: TariffFlag) -> Result<f64> {
        let cost = self.breakdown(consumption_kwh, flag)?.total;
        Ok(cost.max(self.availability_cost(flag)))
    }

    /// Bill for the energy still drawn from the grid, floored at the
    /// availability cost.
    ///
    /// # Errors
    ///
    /// Returns `SettlementError::Validation` if `grid_drawn_kwh` is negative
    /// or not finite.
    pub fn cost_with_system(&self, grid_drawn_kwh: f64, flag: TariffFlag) -> Result<f64> {
        self.cost_without_system(grid_drawn_kwh, flag)
    }

    /// Value of `kwh` of credits: TUSD + TE + surcharge, untaxed.
    pub fn credit_value(&self, kwh: f64, flag: TariffFlag) -> f64 {
        kwh * (self.tariff.tusd_kwh + self.tariff.te_kwh + self.surcharge(flag))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine(floor: f64) -> TariffEngine {
        match TariffEngine::new(TariffConfig::default(), floor) {
            Ok(e) => e,
            Err(e) => panic!("default tariff should be valid: {e}"),
        }
    }

    #[test]
    fn effective_tariff_adds_surcharge() {
        let e = engine(0.0);
        assert_eq!(e.effective_tariff(TariffFlag::None), 0.75);
        assert!((e.effective_tariff(TariffFlag::Red1) - 0.78971).abs() < 1e-12);
    }

    #[test]
    fn breakdown_totals_components_with_tax() {
        let e = engine(0.0);
        let b = e.breakdown(100.0, TariffFlag::None).unwrap_or_default();
        assert!((b.energy - 75.0).abs() < 1e-9);
        assert!((b.tusd - 25.0).abs() < 1e-9);
        assert!((b.te - 50.0).abs() < 1e-9);
        assert_eq!(b.surcharge, 0.0);
        assert!((b.taxes - 37.5).abs() < 1e-9);
        assert!((b.total - 187.5).abs() < 1e-9);
    }

    #[test]
    fn cost_is_floored_at_availability() {
        let e = engine(200.0);
        let floor = e.availability_cost(TariffFlag::None);
        assert!((floor - 375.0).abs() < 1e-9);
        assert_eq!(e.cost_with_system(0.0, TariffFlag::None).ok(), Some(floor));
        let high = e.cost_without_system(1000.0, TariffFlag::None).unwrap_or_default();
        assert!((high - 1875.0).abs() < 1e-9);
    }

    #[test]
    fn flags_raise_cost() {
        let e = engine(0.0);
        let green = e.cost_without_system(500.0, TariffFlag::None).unwrap_or_default();
        let scarcity = e
            .cost_without_system(500.0, TariffFlag::Scarcity)
            .unwrap_or_default();
        assert!(scarcity > green);
    }

    #[test]
    fn credit_value_is_untaxed() {
        let e = engine(0.0);
        assert!((e.credit_value(1000.0, TariffFlag::None) - 750.0).abs() < 1e-9);
        let yellow = e.credit_value(1000.0, TariffFlag::Yellow);
        assert!((yellow - (750.0 + 18.74)).abs() < 1e-9);
    }

    #[test]
    fn rejects_negative_inputs() {
        let e = engine(0.0);
        assert!(e.breakdown(-1.0, TariffFlag::None).is_err());
        let mut tariff = TariffConfig::default();
        tariff.tusd_kwh = -0.1;
        assert!(TariffEngine::new(tariff, 0.0).is_err());
        let mut tariff = TariffConfig::default();
        tariff.surcharges.red_2 = f64::NAN;
        assert!(TariffEngine::new(tariff, 0.0).is_err());
    }
}
