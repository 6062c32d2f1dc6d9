//! CSV export for settled months and per-unit allocations.

use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

use crate::settlement::types::MonthlySettlement;

/// Column header for the monthly settlement export.
const MONTHLY_HEADER: &str = "period,flag,generation_kwh,consumption_kwh,minimum_billable_kwh,\
                              balance_kwh,credits_generated_kwh,credits_consumed_kwh,\
                              credits_expired_kwh,grid_injected_kwh,grid_drawn_kwh,\
                              ledger_balance_kwh,capacity_factor,cost_without_system,\
                              cost_with_system,economy,credits_consumed_value";

/// Column header for the per-unit allocation export.
const ALLOCATIONS_HEADER: &str = "period,unit_id,name,connection,gross_kwh,floor_kwh,net_kwh,\
                                  share_pct,credits_kwh,amount_to_pay_kwh,final_bill_kwh";

/// Exports one row per settled month to a CSV file at the given path.
///
/// # Arguments
///
/// * `months` - Settled months, in settlement order
/// * `path` - Output file path
///
/// # Errors
///
/// Returns an `io::Error` if file creation or writing fails.
pub fn export_monthly_csv(months: &[MonthlySettlement], path: &Path) -> io::Result<()> {
    let file = File::create(path)?;
    write_monthly_csv(months, io::BufWriter::new(file))
}

/// Writes one row per settled month as CSV to any writer.
///
/// # Errors
///
/// Returns an `io::Error` if writing fails.
pub fn write_monthly_csv(months: &[MonthlySettlement], writer: impl Write) -> io::Result<()> {
    let mut wtr = csv::WriterBuilder::new().from_writer(writer);
    wtr.write_record(MONTHLY_HEADER.split(',').map(str::trim))?;

    for m in months {
        let e = &m.energy;
        let f = &m.financial;
        wtr.write_record(&[
            e.period.to_string(),
            f.flag.to_string(),
            format!("{:.2}", e.generation_kwh),
            format!("{:.2}", e.consumption_kwh),
            format!("{:.2}", e.minimum_billable_kwh),
            format!("{:.2}", e.balance_kwh),
            format!("{:.2}", e.credits_generated_kwh),
            format!("{:.2}", e.credits_consumed_kwh),
            format!("{:.2}", e.credits_expired_kwh),
            format!("{:.2}", e.grid_injected_kwh),
            format!("{:.2}", e.grid_drawn_kwh),
            format!("{:.2}", m.ledger_balance_kwh),
            format!("{:.4}", e.capacity_factor),
            format!("{:.2}", f.cost_without_system),
            format!("{:.2}", f.cost_with_system),
            format!("{:.2}", f.economy),
            format!("{:.2}", f.credits_consumed_value),
        ])?;
    }

    wtr.flush()?;
    Ok(())
}

/// Exports one row per unit per settled month to a CSV file.
///
/// # Errors
///
/// Returns an `io::Error` if file creation or writing fails.
pub fn export_allocations_csv(months: &[MonthlySettlement], path: &Path) -> io::Result<()> {
    let file = File::create(path)?;
    write_allocations_csv(months, io::BufWriter::new(file))
}

/// Writes one row per unit per settled month as CSV to any writer.
///
/// # Errors
///
/// Returns an `io::Error` if writing fails.
pub fn write_allocations_csv(months: &[MonthlySettlement], writer: impl Write) -> io::Result<()> {
    let mut wtr = csv::WriterBuilder::new().from_writer(writer);
    wtr.write_record(ALLOCATIONS_HEADER.split(',').map(str::trim))?;

    for m in months {
        let period = m.distribution.period.to_string();
        for a in &m.distribution.allocations {
            wtr.write_record(&[
                period.clone(),
                a.unit_id.clone(),
                a.name.clone(),
                a.connection.to_string(),
                format!("{:.2}", a.gross_kwh),
                format!("{:.2}", a.floor_kwh),
                format!("{:.2}", a.net_kwh),
                format!("{:.1}", a.share_pct),
                format!("{:.2}", a.credits_kwh),
                format!("{:.2}", a.amount_to_pay_kwh),
                format!("{:.2}", a.final_bill_kwh),
            ])?;
        }
    }

    wtr.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::system::SystemConfig;
    use crate::model::tariff_flag::TariffFlag;
    use crate::model::unit::{ConnectionClass, ConsumingUnit};
    use crate::settlement::engine::SettlementRun;
    use crate::settlement::ledger::CreditLedger;

    fn settled_year() -> Vec<MonthlySettlement> {
        let system = SystemConfig {
            installed_capacity_kw: 20.0,
            monthly_generation_kwh: [
                3000.0, 3000.0, 2500.0, 2000.0, 1500.0, 1000.0, 1000.0, 1500.0, 2000.0, 2500.0,
                3000.0, 3000.0,
            ],
            ..SystemConfig::default()
        };
        let units = vec![
            ConsumingUnit::flat("u1", "Shop, front", ConnectionClass::ThreePhase, 900.0, 1),
            ConsumingUnit::flat("u2", "House", ConnectionClass::SinglePhase, 300.0, 2),
        ];
        let mut run = SettlementRun::new(system, units, TariffFlag::Yellow, CreditLedger::new(60))
            .unwrap_or_else(|e| panic!("{e}"));
        run.run_year(2024)
            .map(|y| y.months)
            .unwrap_or_else(|e| panic!("{e}"))
    }

    fn render(write: impl Fn(&mut Vec<u8>) -> io::Result<()>) -> String {
        let mut buf = Vec::new();
        write(&mut buf).ok();
        String::from_utf8(buf).unwrap_or_default()
    }

    #[test]
    fn monthly_header_and_row_count() {
        let months = settled_year();
        let output = render(|buf| write_monthly_csv(&months, buf));
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(
            lines[0],
            "period,flag,generation_kwh,consumption_kwh,minimum_billable_kwh,\
             balance_kwh,credits_generated_kwh,credits_consumed_kwh,\
             credits_expired_kwh,grid_injected_kwh,grid_drawn_kwh,\
             ledger_balance_kwh,capacity_factor,cost_without_system,\
             cost_with_system,economy,credits_consumed_value"
        );
        // 1 header + 12 months
        assert_eq!(lines.len(), 13);
        assert!(lines[1].starts_with("01/2024,yellow,"));
    }

    #[test]
    fn allocation_rows_per_unit_and_month() {
        let months = settled_year();
        let output = render(|buf| write_allocations_csv(&months, buf));
        // 1 header + 12 months * 2 units
        assert_eq!(output.lines().count(), 25);

        let mut rdr = csv::ReaderBuilder::new().from_reader(output.as_bytes());
        let records: Vec<csv::StringRecord> = rdr.records().filter_map(|r| r.ok()).collect();
        assert_eq!(records.len(), 24);
        // names with commas are quoted and survive the round trip
        assert_eq!(records[0].get(2), Some("Shop, front"));
        assert_eq!(records[0].get(3), Some("three_phase"));
        for rec in &records {
            for i in 4..11 {
                let val: Result<f64, _> = rec.get(i).unwrap_or("").parse();
                assert!(val.is_ok(), "column {i} should parse as f64");
            }
        }
    }

    #[test]
    fn deterministic_output() {
        let months = settled_year();
        let first = render(|buf| write_monthly_csv(&months, buf));
        let second = render(|buf| write_monthly_csv(&months, buf));
        assert_eq!(first, second);
    }

    #[test]
    fn empty_input_writes_header_only() {
        let output = render(|buf| write_allocations_csv(&[], buf));
        assert_eq!(output.lines().count(), 1);
    }
}
