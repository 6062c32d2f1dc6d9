//! Proportional split of a month's credits across consuming units.

use serde::Serialize;

use crate::error::{Result, ensure_non_negative};
use crate::model::period::MonthYear;
use crate::model::unit::{ConnectionClass, ConsumingUnit, active_in_order};

use super::ledger::{CreditLedger, LedgerDraw};

/// Rounds to 2 decimals.
pub(crate) fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// Rounds to 1 decimal.
pub(crate) fn round1(x: f64) -> f64 {
    (x * 10.0).round() / 10.0
}

/// One unit's share of a month's credits. Energy amounts in kWh.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnitAllocation {
    pub unit_id: String,
    pub name: String,
    pub connection: ConnectionClass,
    /// Metered consumption.
    pub gross_kwh: f64,
    /// Connection-class floor, always billed.
    pub floor_kwh: f64,
    /// `max(0, gross - floor)`.
    pub net_kwh: f64,
    /// Share of the month's total net consumption in %, 1 decimal.
    pub share_pct: f64,
    /// Credits granted, 2 decimals.
    pub credits_kwh: f64,
    /// Net consumption not covered by credits, 2 decimals.
    pub amount_to_pay_kwh: f64,
    /// `floor + amount_to_pay`, 2 decimals.
    pub final_bill_kwh: f64,
}

/// Result of splitting one month's credits.
///
/// `credits_granted_kwh` is the sum of the rounded per-unit grants and may
/// differ from `credits_available_kwh` by a few hundredths.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Distribution {
    pub period: MonthYear,
    pub credits_available_kwh: f64,
    /// Part of `credits_available_kwh` covered by the month's own generation
    /// above the floors; the rest comes from the ledger.
    pub from_generation_kwh: f64,
    pub total_net_kwh: f64,
    pub credits_granted_kwh: f64,
    pub allocations: Vec<UnitAllocation>,
}

impl Distribution {
    /// Allocation for `unit_id`, if that unit took part.
    pub fn for_unit(&self, unit_id: &str) -> Option<&UnitAllocation> {
        self.allocations.iter().find(|a| a.unit_id == unit_id)
    }
}

/// Splits credits proportionally to each active unit's net consumption.
///
/// Units are visited in `(priority, id)` order so output is deterministic.
pub struct CreditAllocator<'a> {
    units: &'a [ConsumingUnit],
}

impl<'a> CreditAllocator<'a> {
    /// Creates an allocator over borrowed units.
    pub fn new(units: &'a [ConsumingUnit]) -> Self {
        Self { units }
    }

    /// Splits `credits_available` for `period`.
    ///
    /// When no unit consumes above its floor, nothing is granted and every
    /// unit is billed exactly its floor.
    ///
    /// # Errors
    ///
    /// Returns `SettlementError::Validation` if `credits_available` is
    /// negative or not finite.
    pub fn distribute(&self, period: MonthYear, credits_available: f64) -> Result<Distribution> {
        ensure_non_negative("credits_available", credits_available)?;
        let idx = period.index();
        let units = active_in_order(self.units);
        let total_net: f64 = units.iter().map(|u| u.net_consumption(idx)).sum();

        let allocations: Vec<UnitAllocation> = units
            .iter()
            .map(|u| {
                let net = u.net_consumption(idx);
                let floor = u.floor_kwh();
                let share = if total_net > 0.0 { net / total_net } else { 0.0 };
                let credits = credits_available * share;
                let amount_to_pay = (net - credits).max(0.0);
                UnitAllocation {
                    unit_id: u.id.clone(),
                    name: u.name.clone(),
                    connection: u.connection,
                    gross_kwh: u.consumption(idx),
                    floor_kwh: floor,
                    net_kwh: net,
                    share_pct: round1(share * 100.0),
                    credits_kwh: round2(credits),
                    amount_to_pay_kwh: round2(amount_to_pay),
                    final_bill_kwh: round2(floor + amount_to_pay),
                }
            })
            .collect();

        Ok(Distribution {
            period,
            credits_available_kwh: credits_available,
            from_generation_kwh: 0.0,
            total_net_kwh: total_net,
            credits_granted_kwh: allocations.iter().map(|a| a.credits_kwh).sum(),
            allocations,
        })
    }

    /// Bills every active unit for a month in which no credits are drawn.
    ///
    /// Each unit pays its floor and nothing else.
    pub fn floor_only(&self, period: MonthYear) -> Distribution {
        let idx = period.index();
        let units = active_in_order(self.units);
        let total_net: f64 = units.iter().map(|u| u.net_consumption(idx)).sum();
        let allocations = units
            .iter()
            .map(|u| UnitAllocation {
                unit_id: u.id.clone(),
                name: u.name.clone(),
                connection: u.connection,
                gross_kwh: u.consumption(idx),
                floor_kwh: u.floor_kwh(),
                net_kwh: u.net_consumption(idx),
                share_pct: 0.0,
                credits_kwh: 0.0,
                amount_to_pay_kwh: 0.0,
                final_bill_kwh: round2(u.floor_kwh()),
            })
            .collect();
        Distribution {
            period,
            credits_available_kwh: 0.0,
            from_generation_kwh: 0.0,
            total_net_kwh: total_net,
            credits_granted_kwh: 0.0,
            allocations,
        }
    }

    /// Distributes the month's own generation above the floors plus
    /// `from_ledger` banked credits, then charges the ledger with the part of
    /// the granted sum that generation does not cover.
    ///
    /// # Errors
    ///
    /// Returns `SettlementError::Validation` if either amount is negative or
    /// not finite, and propagates errors from [`CreditLedger::consume`].
    pub fn settle(
        &self,
        period: MonthYear,
        from_generation: f64,
        from_ledger: f64,
        ledger: &mut CreditLedger,
    ) -> Result<(Distribution, LedgerDraw)> {
        ensure_non_negative("from_generation", from_generation)?;
        ensure_non_negative("from_ledger", from_ledger)?;
        let mut distribution = self.distribute(period, from_generation + from_ledger)?;
        distribution.from_generation_kwh = from_generation;
        let charge = (distribution.credits_granted_kwh - from_generation).max(0.0);
        let draw = ledger.consume(charge, period)?;
        Ok((distribution, draw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feb() -> MonthYear {
        MonthYear { year: 2024, month: 2 }
    }

    fn units(kwh: &[(&str, ConnectionClass, f64)]) -> Vec<ConsumingUnit> {
        kwh.iter()
            .enumerate()
            .map(|(i, &(id, class, c))| ConsumingUnit::flat(id, id, class, c, i as u32))
            .collect()
    }

    #[test]
    fn equal_units_split_evenly() {
        let units = units(&[
            ("a", ConnectionClass::ThreePhase, 1000.0),
            ("b", ConnectionClass::ThreePhase, 1000.0),
        ]);
        let d = CreditAllocator::new(&units).distribute(feb(), 2000.0);
        let d = d.ok();
        let a = d.as_ref().and_then(|d| d.for_unit("a"));
        assert_eq!(a.map(|a| a.net_kwh), Some(900.0));
        assert_eq!(a.map(|a| a.credits_kwh), Some(1000.0));
        assert_eq!(a.map(|a| a.amount_to_pay_kwh), Some(0.0));
        assert_eq!(a.map(|a| a.final_bill_kwh), Some(100.0));
        assert_eq!(a.map(|a| a.share_pct), Some(50.0));
        assert_eq!(d.map(|d| d.credits_granted_kwh), Some(2000.0));
    }

    #[test]
    fn zero_net_bills_floor_only() {
        let units = units(&[
            ("a", ConnectionClass::SinglePhase, 20.0),
            ("b", ConnectionClass::ThreePhase, 100.0),
        ]);
        let d = CreditAllocator::new(&units).distribute(feb(), 500.0).ok();
        let d = d.as_ref();
        assert_eq!(d.map(|d| d.total_net_kwh), Some(0.0));
        assert_eq!(d.map(|d| d.credits_granted_kwh), Some(0.0));
        for a in d.map(|d| d.allocations.as_slice()).unwrap_or_default() {
            assert_eq!(a.credits_kwh, 0.0);
            assert_eq!(a.final_bill_kwh, a.floor_kwh);
        }
    }

    #[test]
    fn shares_follow_net_consumption() {
        let units = units(&[
            ("small", ConnectionClass::SinglePhase, 130.0),
            ("large", ConnectionClass::ThreePhase, 400.0),
        ]);
        // nets: 100 and 300
        let d = CreditAllocator::new(&units).distribute(feb(), 200.0).ok();
        let small = d.as_ref().and_then(|d| d.for_unit("small"));
        let large = d.as_ref().and_then(|d| d.for_unit("large"));
        assert_eq!(small.map(|a| a.credits_kwh), Some(50.0));
        assert_eq!(large.map(|a| a.credits_kwh), Some(150.0));
        assert_eq!(small.map(|a| a.amount_to_pay_kwh), Some(50.0));
        assert_eq!(large.map(|a| a.final_bill_kwh), Some(250.0));
        assert_eq!(large.map(|a| a.share_pct), Some(75.0));
    }

    #[test]
    fn rounding_drift_is_not_reconciled() {
        let units = units(&[
            ("a", ConnectionClass::ThreePhase, 200.0),
            ("b", ConnectionClass::ThreePhase, 200.0),
            ("c", ConnectionClass::ThreePhase, 200.0),
        ]);
        let d = CreditAllocator::new(&units).distribute(feb(), 100.0).ok();
        let granted = d.as_ref().map(|d| d.credits_granted_kwh).unwrap_or_default();
        // 3 x 33.33
        assert!((granted - 99.99).abs() < 1e-9);
    }

    #[test]
    fn settle_charges_ledger_with_granted_sum() {
        let units = units(&[
            ("a", ConnectionClass::ThreePhase, 200.0),
            ("b", ConnectionClass::ThreePhase, 200.0),
            ("c", ConnectionClass::ThreePhase, 200.0),
        ]);
        let mut ledger = CreditLedger::new(60);
        assert!(ledger.add_credit(1, 2024, 500.0).is_ok());
        let result = CreditAllocator::new(&units).settle(feb(), 0.0, 100.0, &mut ledger);
        assert!(result.is_ok());
        let draw = result.map(|(_, draw)| draw).unwrap_or_default();
        assert!((draw.consumed_kwh - 99.99).abs() < 1e-9);
        assert!((ledger.available_balance(feb()) - 400.01).abs() < 1e-9);
    }

    #[test]
    fn settle_charges_ledger_only_beyond_own_generation() {
        let units = units(&[
            ("a", ConnectionClass::ThreePhase, 1000.0),
            ("b", ConnectionClass::ThreePhase, 1000.0),
        ]);
        let mut ledger = CreditLedger::new(60);
        assert!(ledger.add_credit(1, 2024, 8000.0).is_ok());
        // 1500 generated, 200 of it billed as floors
        let result = CreditAllocator::new(&units).settle(feb(), 1300.0, 500.0, &mut ledger);
        let (d, draw) = result.unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(d.from_generation_kwh, 1300.0);
        assert_eq!(d.credits_granted_kwh, 1800.0);
        assert_eq!(draw.consumed_kwh, 500.0);
        assert_eq!(ledger.available_balance(feb()), 7500.0);
        for a in &d.allocations {
            assert_eq!(a.amount_to_pay_kwh, 0.0);
            assert_eq!(a.final_bill_kwh, 100.0);
        }
    }

    #[test]
    fn generation_alone_never_touches_ledger() {
        let units = units(&[("a", ConnectionClass::ThreePhase, 1000.0)]);
        let mut ledger = CreditLedger::new(60);
        assert!(ledger.add_credit(1, 2024, 50.0).is_ok());
        let result = CreditAllocator::new(&units).settle(feb(), 400.0, 0.0, &mut ledger);
        let (d, draw) = result.unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(draw.consumed_kwh, 0.0);
        assert_eq!(d.allocations[0].amount_to_pay_kwh, 500.0);
        assert_eq!(ledger.available_balance(feb()), 50.0);
        assert!(
            CreditAllocator::new(&units)
                .settle(feb(), -1.0, 0.0, &mut ledger)
                .is_err()
        );
    }

    #[test]
    fn more_consumption_never_means_fewer_credits() {
        let mut previous = 0.0;
        // 20 and 100 sit at or below the three-phase floor, the rest above it
        for kwh in [0.0, 20.0, 100.0, 101.0, 150.0, 300.0, 1000.0, 5000.0] {
            let units = units(&[
                ("grow", ConnectionClass::ThreePhase, kwh),
                ("fixed1", ConnectionClass::SinglePhase, 230.0),
                ("fixed2", ConnectionClass::TwoPhase, 650.0),
            ]);
            let d = CreditAllocator::new(&units).distribute(feb(), 400.0);
            let d = d.unwrap_or_else(|e| panic!("{e}"));
            let credits = d.for_unit("grow").map_or(-1.0, |a| a.credits_kwh);
            assert!(
                credits >= previous,
                "{kwh} kWh got {credits}, less than {previous}"
            );
            previous = credits;
        }
        assert!(previous > 0.0);
    }

    #[test]
    fn floor_only_grants_nothing() {
        let units = units(&[("a", ConnectionClass::TwoPhase, 900.0)]);
        let d = CreditAllocator::new(&units).floor_only(feb());
        assert_eq!(d.credits_granted_kwh, 0.0);
        assert_eq!(d.allocations[0].final_bill_kwh, 50.0);
        assert_eq!(d.allocations[0].net_kwh, 850.0);
    }

    #[test]
    fn rejects_negative_credits() {
        let units = units(&[("a", ConnectionClass::TwoPhase, 900.0)]);
        assert!(CreditAllocator::new(&units).distribute(feb(), -1.0).is_err());
    }
}
