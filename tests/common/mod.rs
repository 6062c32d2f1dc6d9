//! Shared test fixtures for integration tests.

#![allow(dead_code)]

use solar_credits::model::period::MonthYear;
use solar_credits::model::system::SystemConfig;
use solar_credits::model::tariff_flag::TariffFlag;
use solar_credits::model::unit::{ConnectionClass, ConsumingUnit};
use solar_credits::settlement::engine::SettlementRun;
use solar_credits::settlement::ledger::CreditLedger;

/// Lossless 50 kWp plant: real generation equals the configured values.
pub fn ideal_system(generation: [f64; 12]) -> SystemConfig {
    SystemConfig {
        installed_capacity_kw: 50.0,
        efficiency: 1.0,
        losses: 0.0,
        simultaneity: 1.0,
        monthly_generation_kwh: generation,
        ..SystemConfig::default()
    }
}

/// Generation only in January.
pub fn january_only(kwh: f64) -> [f64; 12] {
    let mut generation = [0.0; 12];
    generation[0] = kwh;
    generation
}

/// Two three-phase units (floor 100 kWh each) with flat consumption.
pub fn two_three_phase_units(kwh: f64) -> Vec<ConsumingUnit> {
    vec![
        ConsumingUnit::flat("A", "Unit A", ConnectionClass::ThreePhase, kwh, 1),
        ConsumingUnit::flat("B", "Unit B", ConnectionClass::ThreePhase, kwh, 2),
    ]
}

/// Settlement run over an empty 60-month ledger with no flag.
pub fn new_run(system: SystemConfig, units: Vec<ConsumingUnit>) -> SettlementRun {
    let validity = system.credit_validity_months;
    SettlementRun::new(system, units, TariffFlag::None, CreditLedger::new(validity))
        .unwrap_or_else(|e| panic!("run should build: {e}"))
}

pub fn my(month: u32, year: i32) -> MonthYear {
    MonthYear { year, month }
}

/// Asserts `a` and `b` agree within `tol`.
pub fn assert_close(a: f64, b: f64, tol: f64, what: &str) {
    assert!(
        (a - b).abs() < tol,
        "{what}: expected {b}, got {a} (tolerance {tol})"
    );
}
