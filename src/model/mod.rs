//! Input records supplied to the settlement engine.

pub mod period;
pub mod system;
pub mod tariff_flag;
pub mod unit;

pub use period::{MONTHS, MonthYear};
pub use system::{FlagSurcharges, SystemConfig, TariffConfig};
pub use tariff_flag::TariffFlag;
pub use unit::{ConnectionClass, ConsumingUnit};
