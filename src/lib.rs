//! Credit banking and financial settlement for a shared solar plant.

pub mod config;
pub mod error;
pub mod io;
pub mod model;
/// Ledger, allocation, tariff and finance engines plus the monthly run.
pub mod settlement;

#[cfg(feature = "api")]
pub mod api;
