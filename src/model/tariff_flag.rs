//! Regulatory surcharge tiers.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

/// Monthly tariff flag set by the regulator.
///
/// Each non-`None` flag adds a fixed per-kWh surcharge on top of the base
/// energy tariff; see [`crate::model::system::FlagSurcharges`].
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TariffFlag {
    /// Green flag, no surcharge.
    #[default]
    None,
    /// Yellow flag.
    Yellow,
    /// Red flag, level 1.
    #[serde(rename = "red_1")]
    #[strum(serialize = "red_1")]
    Red1,
    /// Red flag, level 2.
    #[serde(rename = "red_2")]
    #[strum(serialize = "red_2")]
    Red2,
    /// Water scarcity flag.
    Scarcity,
}
