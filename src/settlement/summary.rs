//! Post-hoc annual summaries and the plain-text report.

use std::fmt;

use crate::model::unit::{ConsumingUnit, active_in_order};

use super::allocator::{round1, round2};
use super::types::{AnnualSettlement, MonthlySettlement, UnitAnnualSummary};

/// Computes per-unit annual totals from a year of monthly settlements.
///
/// Computed post-hoc so the summary always agrees with the monthly records.
///
/// # Arguments
///
/// * `units` - All configured units (inactive ones are skipped)
/// * `months` - Settled months of one year
pub fn unit_summaries(
    units: &[ConsumingUnit],
    months: &[MonthlySettlement],
) -> Vec<UnitAnnualSummary> {
    let active = active_in_order(units);
    let total: f64 = active.iter().map(|u| u.annual_consumption()).sum();

    active
        .into_iter()
        .map(|u| {
            let (credits, billed) = months
                .iter()
                .filter_map(|m| m.distribution.for_unit(&u.id))
                .fold((0.0, 0.0), |(c, b), a| {
                    (c + a.credits_kwh, b + a.final_bill_kwh)
                });
            let consumption = u.annual_consumption();
            UnitAnnualSummary {
                unit_id: u.id.clone(),
                name: u.name.clone(),
                connection: u.connection,
                consumption_kwh: consumption,
                credits_received_kwh: round2(credits),
                billed_kwh: round2(billed),
                consumption_share_pct: if total > 0.0 {
                    round1(consumption / total * 100.0)
                } else {
                    0.0
                },
            }
        })
        .collect()
}

impl fmt::Display for AnnualSettlement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let e = &self.energy;
        let fin = &self.financial;
        writeln!(f, "--- Settlement Report {} ---", self.year)?;
        writeln!(f, "Generation:            {:.2} kWh", e.generation_kwh)?;
        writeln!(f, "Consumption:           {:.2} kWh", e.consumption_kwh)?;
        writeln!(f, "Annual balance:        {:.2} kWh", e.balance_kwh)?;
        writeln!(f, "Credits generated:     {:.2} kWh", e.credits_generated_kwh)?;
        writeln!(f, "Credits consumed:      {:.2} kWh", e.credits_consumed_kwh)?;
        writeln!(f, "Credits expired:       {:.2} kWh", e.credits_expired_kwh)?;
        writeln!(f, "Self-sufficiency:      {:.1}%", e.self_sufficiency_pct)?;
        writeln!(
            f,
            "Capacity factor:       {:.1}%",
            e.mean_capacity_factor * 100.0
        )?;
        writeln!(
            f,
            "Specific yield:        {:.1} kWh/kWp",
            e.specific_yield_kwh_per_kwp
        )?;
        writeln!(f, "Cost without system:   {:.2}", fin.cost_without_system)?;
        writeln!(f, "Cost with system:      {:.2}", fin.cost_with_system)?;
        writeln!(f, "Annual economy:        {:.2}", fin.economy)?;
        writeln!(f, "Payback:               {}", fin.payback)?;
        writeln!(
            f,
            "ROI ({} y):            {:.1}%",
            fin.horizon_years, fin.roi_percent
        )?;
        write!(f, "IRR ({} y):            {}", fin.horizon_years, fin.irr)?;
        for u in &self.units {
            write!(
                f,
                "\n  {:<16} {:>10.1} kWh  credits {:>10.2} kWh  billed {:>10.2} kWh  ({:.1}%)",
                u.name, u.consumption_kwh, u.credits_received_kwh, u.billed_kwh,
                u.consumption_share_pct
            )?;
        }
        Ok(())
    }
}
