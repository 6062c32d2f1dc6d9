//! Plant and tariff parameters shared by every settlement component.

use serde::{Deserialize, Serialize};

use super::period::MONTHS;
use super::tariff_flag::TariffFlag;

/// Nominal monthly generation used when none is configured (kWh).
pub const DEFAULT_MONTHLY_GENERATION_KWH: [f64; MONTHS] = [
    8500.0, 8200.0, 9100.0, 8800.0, 7900.0, 7200.0, 7800.0, 8600.0, 8400.0, 8900.0, 9200.0, 8700.0,
];

/// Shared plant configuration. Immutable for the duration of a settlement run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SystemConfig {
    /// Installed DC capacity (kWp).
    pub installed_capacity_kw: f64,
    /// System efficiency, in (0, 1].
    pub efficiency: f64,
    /// Loss factor, in [0, 1).
    pub losses: f64,
    /// Simultaneity factor applied to generation.
    pub simultaneity: f64,
    /// Nominal generation per calendar month, January first (kWh).
    pub monthly_generation_kwh: [f64; MONTHS],
    /// Tariff rates and flag surcharges.
    pub tariff: TariffConfig,
    /// Up-front investment (currency).
    pub investment_cost: f64,
    /// Months a credit lot stays usable after generation.
    pub credit_validity_months: u32,
    /// Share of a surplus that is physically injected into the grid, in [0, 1].
    pub grid_injection_pct: f64,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            installed_capacity_kw: 0.0,
            efficiency: 0.85,
            losses: 0.15,
            simultaneity: 0.9,
            monthly_generation_kwh: DEFAULT_MONTHLY_GENERATION_KWH,
            tariff: TariffConfig::default(),
            investment_cost: 0.0,
            credit_validity_months: 60,
            grid_injection_pct: 1.0,
        }
    }
}

/// Regulated tariff components (currency per kWh) and tax markup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TariffConfig {
    /// Base energy tariff.
    pub energy_kwh: f64,
    /// Distribution-use component.
    pub tusd_kwh: f64,
    /// Energy-generation component.
    pub te_kwh: f64,
    /// Markup applied to the sum of all components.
    pub tax_rate: f64,
    /// Per-flag surcharges.
    pub surcharges: FlagSurcharges,
}

impl Default for TariffConfig {
    fn default() -> Self {
        Self {
            energy_kwh: 0.75,
            tusd_kwh: 0.25,
            te_kwh: 0.50,
            tax_rate: 0.25,
            surcharges: FlagSurcharges::default(),
        }
    }
}

/// Surcharge adders per tariff flag (currency per kWh).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FlagSurcharges {
    pub yellow: f64,
    pub red_1: f64,
    pub red_2: f64,
    pub scarcity: f64,
}

impl Default for FlagSurcharges {
    fn default() -> Self {
        Self {
            yellow: 0.01874,
            red_1: 0.03971,
            red_2: 0.09492,
            scarcity: 0.142,
        }
    }
}

impl FlagSurcharges {
    /// Surcharge for `flag`; `TariffFlag::None` is always zero.
    pub fn get(&self, flag: TariffFlag) -> f64 {
        match flag {
            TariffFlag::None => 0.0,
            TariffFlag::Yellow => self.yellow,
            TariffFlag::Red1 => self.red_1,
            TariffFlag::Red2 => self.red_2,
            TariffFlag::Scarcity => self.scarcity,
        }
    }

    /// All configured values paired with their field names.
    pub(crate) fn named(&self) -> [(&'static str, f64); 4] {
        [
            ("yellow", self.yellow),
            ("red_1", self.red_1),
            ("red_2", self.red_2),
            ("scarcity", self.scarcity),
        ]
    }
}
