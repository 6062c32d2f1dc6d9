//! TOML-based scenario configuration and preset definitions.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::Result as SettlementResult;
use crate::model::period::{MAX_YEAR, MIN_YEAR, MONTHS};
use crate::model::system::{SystemConfig, TariffConfig};
use crate::model::tariff_flag::TariffFlag;
use crate::model::unit::{ConnectionClass, ConsumingUnit};
use crate::settlement::engine::SettlementRun;
use crate::settlement::ledger::{CreditLedger, MAX_VALIDITY_MONTHS};

/// Top-level scenario configuration parsed from TOML.
///
/// Every section has defaults matching the built-in tariff and plant
/// parameters, but at least one `[[units]]` entry is required for a valid
/// scenario. Load from TOML with [`ScenarioConfig::from_toml_file`] or use a
/// preset via [`ScenarioConfig::from_preset`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScenarioConfig {
    /// Plant, tariff and investment parameters.
    #[serde(default)]
    pub system: SystemConfig,
    /// Settlement period and flag.
    #[serde(default)]
    pub settlement: SettlementConfig,
    /// Consuming units sharing the plant.
    #[serde(default)]
    pub units: Vec<UnitConfig>,
}

/// Settlement period and tariff flag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SettlementConfig {
    /// First calendar year to settle.
    pub start_year: i32,
    /// Number of consecutive years to settle (must be >= 1).
    pub years: u32,
    /// Tariff flag applied to every month.
    pub flag: TariffFlag,
    /// Horizon for ROI and IRR (years, must be >= 1).
    pub horizon_years: u32,
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self {
            start_year: 2024,
            years: 1,
            flag: TariffFlag::None,
            horizon_years: 25,
        }
    }
}

fn default_active() -> bool {
    true
}

/// One `[[units]]` entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UnitConfig {
    /// Meter identifier (non-empty, unique).
    pub id: String,
    /// Display name; defaults to the id.
    #[serde(default)]
    pub name: String,
    /// `"single_phase"`, `"two_phase"` or `"three_phase"`.
    pub connection: ConnectionClass,
    #[serde(default = "default_active")]
    pub active: bool,
    /// Consumption per month, January first (kWh).
    pub consumption_kwh: [f64; MONTHS],
    /// Tie-break ordinal for iteration order.
    #[serde(default)]
    pub priority: u32,
}

impl UnitConfig {
    fn new(
        id: &str,
        name: &str,
        connection: ConnectionClass,
        consumption_kwh: [f64; MONTHS],
        priority: u32,
    ) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            connection,
            active: true,
            consumption_kwh,
            priority,
        }
    }

    fn flat(id: &str, name: &str, connection: ConnectionClass, kwh: f64, priority: u32) -> Self {
        Self::new(id, name, connection, [kwh; MONTHS], priority)
    }

    /// Builds the domain record.
    pub fn to_unit(&self) -> ConsumingUnit {
        let name = if self.name.is_empty() {
            self.id.clone()
        } else {
            self.name.clone()
        };
        ConsumingUnit {
            id: self.id.clone(),
            name,
            connection: self.connection,
            active: self.active,
            monthly_consumption_kwh: self.consumption_kwh,
            priority: self.priority,
        }
    }
}

/// Configuration error with field path and constraint description.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("config error: {field}: {message}")]
pub struct ConfigError {
    /// Dotted field path (e.g., `"system.efficiency"`).
    pub field: String,
    /// Human-readable constraint description.
    pub message: String,
}

impl ConfigError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl ScenarioConfig {
    /// Returns the two-unit example plant.
    pub fn example() -> Self {
        Self {
            system: SystemConfig {
                installed_capacity_kw: 150.0,
                efficiency: 0.82,
                losses: 0.18,
                simultaneity: 0.85,
                monthly_generation_kwh: [
                    12500.0, 11800.0, 13200.0, 12600.0, 11400.0, 10200.0, 11100.0, 12300.0,
                    12000.0, 12800.0, 13100.0, 12400.0,
                ],
                tariff: TariffConfig {
                    energy_kwh: 0.78,
                    ..TariffConfig::default()
                },
                investment_cost: 450_000.0,
                ..SystemConfig::default()
            },
            settlement: SettlementConfig::default(),
            units: example_units(),
        }
    }

    /// Returns the measured plant: 92 kWp shared by nine units.
    pub fn real_plant() -> Self {
        use ConnectionClass::{ThreePhase, TwoPhase};
        Self {
            system: SystemConfig {
                installed_capacity_kw: 92.0,
                efficiency: 1.0,
                monthly_generation_kwh: [
                    15162.0, 12453.0, 12500.0, 10423.0, 9002.4, 6675.0, 8197.0, 9954.0, 11561.0,
                    13234.0, 14000.0, 14606.0,
                ],
                tariff: TariffConfig {
                    energy_kwh: 0.65,
                    ..TariffConfig::default()
                },
                investment_cost: 450_000.0,
                ..SystemConfig::default()
            },
            settlement: SettlementConfig::default(),
            units: vec![
                UnitConfig::flat("112761577", "Lanchonet", ThreePhase, 1739.0, 1),
                UnitConfig::flat("114789592", "My Beach", ThreePhase, 500.0, 2),
                UnitConfig::new(
                    "104775009",
                    "Loja",
                    ThreePhase,
                    [
                        1454.0, 2346.0, 2486.0, 1955.0, 1682.0, 1220.0, 1341.0, 1208.0, 1849.0,
                        1845.0, 2181.0, 2282.0,
                    ],
                    3,
                ),
                UnitConfig::new(
                    "94926239",
                    "Sobreloja",
                    ThreePhase,
                    [
                        701.0, 1944.0, 2184.0, 1824.0, 1646.0, 1115.0, 1186.0, 1014.0, 1504.0,
                        1572.0, 1635.0, 1697.0,
                    ],
                    4,
                ),
                UnitConfig::new(
                    "101839405",
                    "Casa Adriano",
                    TwoPhase,
                    [
                        663.0, 731.0, 847.0, 705.0, 542.0, 352.0, 384.0, 376.0, 539.0, 540.0,
                        452.0, 750.0,
                    ],
                    5,
                ),
                UnitConfig::new(
                    "95268278",
                    "Depósito",
                    ThreePhase,
                    [
                        176.0, 202.0, 387.0, 286.0, 269.0, 213.0, 216.0, 173.0, 185.0, 251.0,
                        245.0, 277.0,
                    ],
                    6,
                ),
                UnitConfig::new(
                    "70796270",
                    "Fernando Lomas",
                    ThreePhase,
                    [
                        650.0, 1239.0, 1307.0, 1082.0, 795.0, 803.0, 519.0, 844.0, 924.0, 971.0,
                        1018.0, 1016.0,
                    ],
                    7,
                ),
                UnitConfig::flat("81788541", "Mário 1", ThreePhase, 1000.0, 8),
                UnitConfig::flat("76103684", "Mário 2", TwoPhase, 500.0, 9),
            ],
        }
    }

    /// Returns the undersized-plant preset: credits run out mid-year.
    pub fn deficit() -> Self {
        Self {
            system: SystemConfig {
                installed_capacity_kw: 25.0,
                monthly_generation_kwh: [
                    3200.0, 3000.0, 2800.0, 2400.0, 2000.0, 1600.0, 1700.0, 2000.0, 2300.0,
                    2600.0, 2900.0, 3100.0,
                ],
                investment_cost: 120_000.0,
                ..SystemConfig::default()
            },
            settlement: SettlementConfig {
                flag: TariffFlag::Red1,
                ..SettlementConfig::default()
            },
            units: example_units(),
        }
    }

    /// Available preset names.
    pub const PRESETS: &[&str] = &["example", "real_plant", "deficit"];

    /// Loads a scenario from a named preset.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the preset name is unknown.
    pub fn from_preset(name: &str) -> Result<Self, ConfigError> {
        match name {
            "example" => Ok(Self::example()),
            "real_plant" => Ok(Self::real_plant()),
            "deficit" => Ok(Self::deficit()),
            _ => Err(ConfigError::new(
                "preset",
                format!(
                    "unknown preset \"{name}\", available: {}",
                    Self::PRESETS.join(", ")
                ),
            )),
        }
    }

    /// Parses a scenario from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the file cannot be read or the TOML is invalid.
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| {
            ConfigError::new("scenario", format!("cannot read \"{}\": {e}", path.display()))
        })?;
        Self::from_toml_str(&content)
    }

    /// Parses a scenario from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the TOML is invalid or contains unknown fields.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        toml::from_str(s).map_err(|e| ConfigError::new("toml", e.to_string()))
    }

    /// Domain records for every configured unit, inactive ones included.
    pub fn consuming_units(&self) -> Vec<ConsumingUnit> {
        self.units.iter().map(UnitConfig::to_unit).collect()
    }

    /// Builds a settlement run for this scenario.
    ///
    /// `ledger` resumes from a saved ledger; `None` starts an empty one with
    /// the configured credit validity.
    ///
    /// # Errors
    ///
    /// Returns `SettlementError::Validation` if the tariff or investment
    /// parameters are invalid, or if `ledger` was saved with a different
    /// credit validity.
    pub fn build_run(&self, ledger: Option<CreditLedger>) -> SettlementResult<SettlementRun> {
        let ledger =
            ledger.unwrap_or_else(|| CreditLedger::new(self.system.credit_validity_months));
        let run = SettlementRun::new(
            self.system.clone(),
            self.consuming_units(),
            self.settlement.flag,
            ledger,
        )?;
        Ok(run.with_horizon(self.settlement.horizon_years))
    }

    /// Validates all fields and returns a list of errors.
    ///
    /// Returns an empty vector if configuration is valid.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();
        let s = &self.system;

        if !(s.efficiency > 0.0 && s.efficiency <= 1.0) {
            errors.push(ConfigError::new("system.efficiency", "must be in (0, 1]"));
        }
        if !(s.losses >= 0.0 && s.losses < 1.0) {
            errors.push(ConfigError::new("system.losses", "must be in [0, 1)"));
        }
        if !(s.simultaneity.is_finite() && s.simultaneity > 0.0) {
            errors.push(ConfigError::new("system.simultaneity", "must be > 0"));
        }
        if !(s.installed_capacity_kw.is_finite() && s.installed_capacity_kw >= 0.0) {
            errors.push(ConfigError::new(
                "system.installed_capacity_kw",
                "must be >= 0",
            ));
        }
        if let Some(month) = first_bad_month(&s.monthly_generation_kwh) {
            errors.push(ConfigError::new(
                "system.monthly_generation_kwh",
                format!("month {month} must be finite and >= 0"),
            ));
        }
        if !(s.investment_cost.is_finite() && s.investment_cost >= 0.0) {
            errors.push(ConfigError::new("system.investment_cost", "must be >= 0"));
        }
        if !(1..=MAX_VALIDITY_MONTHS).contains(&s.credit_validity_months) {
            errors.push(ConfigError::new(
                "system.credit_validity_months",
                format!("must be in [1, {MAX_VALIDITY_MONTHS}]"),
            ));
        }
        if !(0.0..=1.0).contains(&s.grid_injection_pct) {
            errors.push(ConfigError::new(
                "system.grid_injection_pct",
                "must be in [0.0, 1.0]",
            ));
        }

        let t = &s.tariff;
        let rates = [
            ("energy_kwh", t.energy_kwh),
            ("tusd_kwh", t.tusd_kwh),
            ("te_kwh", t.te_kwh),
            ("tax_rate", t.tax_rate),
        ];
        for (name, value) in rates {
            if !(value.is_finite() && value >= 0.0) {
                errors.push(ConfigError::new(
                    format!("system.tariff.{name}"),
                    "must be finite and >= 0",
                ));
            }
        }
        for (name, value) in t.surcharges.named() {
            if !(value.is_finite() && value >= 0.0) {
                errors.push(ConfigError::new(
                    format!("system.tariff.surcharges.{name}"),
                    "must be finite and >= 0",
                ));
            }
        }

        let st = &self.settlement;
        if !(MIN_YEAR..=MAX_YEAR).contains(&st.start_year) {
            errors.push(ConfigError::new(
                "settlement.start_year",
                format!("must be in [{MIN_YEAR}, {MAX_YEAR}]"),
            ));
        }
        if st.years == 0 {
            errors.push(ConfigError::new("settlement.years", "must be >= 1"));
        } else if i64::from(st.start_year) + i64::from(st.years) - 1 > i64::from(MAX_YEAR) {
            errors.push(ConfigError::new(
                "settlement.years",
                format!("last settled year must be <= {MAX_YEAR}"),
            ));
        }
        if st.horizon_years == 0 {
            errors.push(ConfigError::new("settlement.horizon_years", "must be >= 1"));
        }

        if self.units.is_empty() {
            errors.push(ConfigError::new("units", "at least one unit is required"));
        }
        let mut seen = HashSet::new();
        for (i, u) in self.units.iter().enumerate() {
            if u.id.trim().is_empty() {
                errors.push(ConfigError::new(format!("units[{i}].id"), "must not be empty"));
            } else if !seen.insert(u.id.as_str()) {
                errors.push(ConfigError::new(
                    format!("units[{i}].id"),
                    format!("duplicate id \"{}\"", u.id),
                ));
            }
            if let Some(month) = first_bad_month(&u.consumption_kwh) {
                errors.push(ConfigError::new(
                    format!("units[{i}].consumption_kwh"),
                    format!("month {month} must be finite and >= 0"),
                ));
            }
        }

        errors
    }
}

fn example_units() -> Vec<UnitConfig> {
    vec![
        UnitConfig::new(
            "001",
            "Unidade 001",
            ConnectionClass::SinglePhase,
            [
                450.0, 420.0, 480.0, 460.0, 440.0, 500.0, 520.0, 480.0, 450.0, 430.0, 440.0, 460.0,
            ],
            1,
        ),
        UnitConfig::new(
            "002",
            "Unidade 002",
            ConnectionClass::ThreePhase,
            [
                1200.0, 1150.0, 1300.0, 1250.0, 1180.0, 1400.0, 1450.0, 1300.0, 1200.0, 1180.0,
                1220.0, 1280.0,
            ],
            2,
        ),
    ]
}

/// 1-based month of the first negative or non-finite value.
fn first_bad_month(values: &[f64; MONTHS]) -> Option<usize> {
    values
        .iter()
        .position(|v| !(v.is_finite() && *v >= 0.0))
        .map(|i| i + 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn example_preset_valid() {
        let cfg = ScenarioConfig::example();
        let errors = cfg.validate();
        assert!(errors.is_empty(), "example should be valid: {errors:?}");
    }

    #[test]
    fn from_preset_unknown() {
        let err = ScenarioConfig::from_preset("nonexistent");
        assert!(err.is_err());
        let message = err.err().map(|e| e.message).unwrap_or_default();
        assert!(message.contains("unknown preset"));
    }

    #[test]
    fn all_presets_are_valid() {
        for name in ScenarioConfig::PRESETS {
            let cfg = ScenarioConfig::from_preset(name);
            assert!(cfg.is_ok(), "preset \"{name}\" should load");
            let errors = cfg.as_ref().map(|c| c.validate()).unwrap_or_default();
            assert!(
                errors.is_empty(),
                "preset \"{name}\" should be valid: {errors:?}"
            );
        }
    }

    #[test]
    fn valid_toml_parses() {
        let toml = r#"
[system]
installed_capacity_kw = 30.0
efficiency = 0.9
monthly_generation_kwh = [4000, 3900, 3800, 3500, 3000, 2800, 2900, 3200, 3500, 3700, 3900, 4000]
investment_cost = 90000.0
credit_validity_months = 36

[system.tariff]
energy_kwh = 0.70

[system.tariff.surcharges]
yellow = 0.02

[settlement]
start_year = 2025
years = 2
flag = "red_2"

[[units]]
id = "A1"
name = "Bakery"
connection = "three_phase"
consumption_kwh = [900, 900, 900, 900, 900, 900, 900, 900, 900, 900, 900, 900]

[[units]]
id = "B2"
connection = "single_phase"
active = false
consumption_kwh = [80, 80, 80, 80, 80, 80, 80, 80, 80, 80, 80, 80]
priority = 3
"#;
        let cfg = ScenarioConfig::from_toml_str(toml);
        assert!(cfg.is_ok(), "valid TOML should parse: {:?}", cfg.err());
        let cfg = cfg.ok();
        let cfg = cfg.as_ref();
        assert_eq!(cfg.map(|c| c.system.credit_validity_months), Some(36));
        assert_eq!(cfg.map(|c| c.system.tariff.energy_kwh), Some(0.70));
        // untouched tariff fields keep their defaults
        assert_eq!(cfg.map(|c| c.system.tariff.tusd_kwh), Some(0.25));
        assert_eq!(cfg.map(|c| c.system.tariff.surcharges.red_1), Some(0.03971));
        assert_eq!(cfg.map(|c| c.settlement.flag), Some(TariffFlag::Red2));
        assert_eq!(cfg.map(|c| c.settlement.horizon_years), Some(25));
        assert_eq!(cfg.map(|c| c.units.len()), Some(2));

        let units = cfg.map(|c| c.consuming_units()).unwrap_or_default();
        assert_eq!(units[0].name, "Bakery");
        assert_eq!(units[1].name, "B2");
        assert!(!units[1].active);
        assert_eq!(units[1].priority, 3);
        assert!(cfg.map(|c| c.validate().is_empty()).unwrap_or(false));
    }

    #[test]
    fn invalid_toml_unknown_field() {
        let toml = r#"
[system]
efficiency = 0.9
bogus_field = true
"#;
        assert!(ScenarioConfig::from_toml_str(toml).is_err());
    }

    #[test]
    fn unknown_flag_is_rejected() {
        let toml = r#"
[settlement]
flag = "purple"
"#;
        assert!(ScenarioConfig::from_toml_str(toml).is_err());
    }

    #[test]
    fn wrong_month_count_is_rejected() {
        let toml = r#"
[[units]]
id = "A1"
connection = "two_phase"
consumption_kwh = [100, 100, 100]
"#;
        assert!(ScenarioConfig::from_toml_str(toml).is_err());
    }

    #[test]
    fn validation_catches_bad_efficiency() {
        let mut cfg = ScenarioConfig::example();
        cfg.system.efficiency = 0.0;
        let errors = cfg.validate();
        assert!(errors.iter().any(|e| e.field == "system.efficiency"));
        cfg.system.efficiency = 1.1;
        let errors = cfg.validate();
        assert!(errors.iter().any(|e| e.field == "system.efficiency"));
    }

    #[test]
    fn validation_catches_bad_losses_and_injection() {
        let mut cfg = ScenarioConfig::example();
        cfg.system.losses = 1.0;
        cfg.system.grid_injection_pct = 1.5;
        let errors = cfg.validate();
        assert!(errors.iter().any(|e| e.field == "system.losses"));
        assert!(errors.iter().any(|e| e.field == "system.grid_injection_pct"));
    }

    #[test]
    fn validation_catches_negative_rates() {
        let mut cfg = ScenarioConfig::example();
        cfg.system.tariff.te_kwh = -0.5;
        cfg.system.tariff.surcharges.scarcity = -1.0;
        let errors = cfg.validate();
        assert!(errors.iter().any(|e| e.field == "system.tariff.te_kwh"));
        assert!(
            errors
                .iter()
                .any(|e| e.field == "system.tariff.surcharges.scarcity")
        );
    }

    #[test]
    fn validation_catches_unit_problems() {
        let mut cfg = ScenarioConfig::example();
        cfg.units[1].id = cfg.units[0].id.clone();
        cfg.units[0].consumption_kwh[4] = -3.0;
        let errors = cfg.validate();
        assert!(
            errors
                .iter()
                .any(|e| e.field == "units[1].id" && e.message.contains("duplicate"))
        );
        assert!(
            errors
                .iter()
                .any(|e| e.field == "units[0].consumption_kwh" && e.message.contains("month 5"))
        );
    }

    #[test]
    fn validation_requires_units() {
        let cfg = ScenarioConfig::from_toml_str("").unwrap_or_else(|e| panic!("{e}"));
        let errors = cfg.validate();
        assert!(errors.iter().any(|e| e.field == "units"));
    }

    #[test]
    fn validation_catches_zero_years() {
        let mut cfg = ScenarioConfig::example();
        cfg.settlement.years = 0;
        cfg.settlement.horizon_years = 0;
        let errors = cfg.validate();
        assert!(errors.iter().any(|e| e.field == "settlement.years"));
        assert!(errors.iter().any(|e| e.field == "settlement.horizon_years"));
    }

    #[test]
    fn validation_bounds_validity_and_calendar() {
        let mut cfg = ScenarioConfig::example();
        cfg.system.credit_validity_months = 2_147_483_647;
        cfg.settlement.start_year = i32::MAX;
        let errors = cfg.validate();
        assert!(errors.iter().any(|e| e.field == "system.credit_validity_months"));
        assert!(errors.iter().any(|e| e.field == "settlement.start_year"));

        let mut cfg = ScenarioConfig::example();
        cfg.settlement.start_year = 9990;
        cfg.settlement.years = 20;
        let errors = cfg.validate();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "settlement.years");

        let mut cfg = ScenarioConfig::example();
        cfg.system.credit_validity_months = 1200;
        assert!(cfg.validate().is_empty());
    }

    #[test]
    fn real_plant_has_nine_units_and_mixed_months() {
        let cfg = ScenarioConfig::real_plant();
        assert_eq!(cfg.units.len(), 9);
        assert_eq!(cfg.system.installed_capacity_kw, 92.0);
    }

    #[test]
    fn build_run_uses_configured_validity_and_horizon() {
        let mut cfg = ScenarioConfig::example();
        cfg.system.credit_validity_months = 12;
        cfg.settlement.horizon_years = 10;
        let run = cfg.build_run(None).unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(run.ledger().validity_months(), 12);
        assert_eq!(run.horizon_years(), 10);
        assert_eq!(run.units().len(), 2);
    }

    #[test]
    fn deficit_preset_generates_less_than_example() {
        let example = ScenarioConfig::example();
        let deficit = ScenarioConfig::deficit();
        let total = |c: &ScenarioConfig| c.system.monthly_generation_kwh.iter().sum::<f64>();
        assert!(total(&deficit) < total(&example));
        assert_eq!(deficit.settlement.flag, TariffFlag::Red1);
    }
}
