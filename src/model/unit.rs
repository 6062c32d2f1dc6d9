//! Consuming units that share the plant's output.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

use super::period::MONTHS;

/// Grid connection class of a consuming unit.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ConnectionClass {
    /// Single-phase connection.
    SinglePhase,
    /// Two-phase connection.
    TwoPhase,
    /// Three-phase connection.
    ThreePhase,
}

impl ConnectionClass {
    /// Minimum billable monthly energy for this class (kWh).
    pub fn floor_kwh(self) -> f64 {
        match self {
            ConnectionClass::SinglePhase => 30.0,
            ConnectionClass::TwoPhase => 50.0,
            ConnectionClass::ThreePhase => 100.0,
        }
    }
}

/// A unit (meter) receiving a share of the plant's credits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsumingUnit {
    /// Utility account / meter identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Connection class, determines the billing floor.
    pub connection: ConnectionClass,
    /// Inactive units are ignored by every calculation.
    pub active: bool,
    /// Consumption per calendar month, January first (kWh).
    pub monthly_consumption_kwh: [f64; MONTHS],
    /// Ordinal used to break ties in iteration order.
    pub priority: u32,
}

impl ConsumingUnit {
    /// Creates an active unit with the given monthly consumption.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        connection: ConnectionClass,
        monthly_consumption_kwh: [f64; MONTHS],
        priority: u32,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            connection,
            active: true,
            monthly_consumption_kwh,
            priority,
        }
    }

    /// Creates an active unit consuming the same amount every month.
    pub fn flat(
        id: impl Into<String>,
        name: impl Into<String>,
        connection: ConnectionClass,
        kwh_per_month: f64,
        priority: u32,
    ) -> Self {
        Self::new(id, name, connection, [kwh_per_month; MONTHS], priority)
    }

    /// Minimum billable energy (kWh), independent of month.
    pub fn floor_kwh(&self) -> f64 {
        self.connection.floor_kwh()
    }

    /// Gross consumption for a zero-based month index.
    pub fn consumption(&self, index: usize) -> f64 {
        self.monthly_consumption_kwh[index]
    }

    /// Consumption above the floor for a zero-based month index.
    pub fn net_consumption(&self, index: usize) -> f64 {
        (self.consumption(index) - self.floor_kwh()).max(0.0)
    }

    /// Sum of the twelve monthly values.
    pub fn annual_consumption(&self) -> f64 {
        self.monthly_consumption_kwh.iter().sum()
    }
}

/// Returns the active units in deterministic `(priority, id)` order.
pub fn active_in_order(units: &[ConsumingUnit]) -> Vec<&ConsumingUnit> {
    let mut active: Vec<&ConsumingUnit> = units.iter().filter(|u| u.active).collect();
    active.sort_by(|a, b| a.priority.cmp(&b.priority).then_with(|| a.id.cmp(&b.id)));
    active
}
