//! Monthly economy and investment metrics (payback, ROI, IRR).

use std::fmt;

use serde::Serialize;
use tracing::warn;

use crate::error::{Result, SettlementError, ensure_non_negative};
use crate::model::tariff_flag::TariffFlag;

use super::tariff::TariffEngine;
use super::types::{AnnualFinancialResult, MonthlyEnergyResult, MonthlyFinancialResult};

/// Default analysis horizon for ROI and IRR (years).
pub const DEFAULT_HORIZON_YEARS: u32 = 25;

const FIRST_YEAR_FACTOR: f64 = 0.975;
const ANNUAL_DEGRADATION: f64 = 0.005;
const MIN_DEGRADATION_FACTOR: f64 = 0.70;

const IRR_INITIAL_GUESS: f64 = 0.10;
const IRR_TOLERANCE: f64 = 1e-4;
const IRR_MAX_ITERATIONS: u32 = 100;
const IRR_MIN_RATE: f64 = -0.5;
const IRR_MAX_RATE: f64 = 1.0;

/// Output fraction in the year with zero-based index `year_index`.
///
/// 0.975 in the first year, 0.5 points less each following year, never
/// below 0.70.
pub fn degradation_factor(year_index: u32) -> f64 {
    (FIRST_YEAR_FACTOR - ANNUAL_DEGRADATION * f64::from(year_index)).max(MIN_DEGRADATION_FACTOR)
}

/// Annual economy over `horizon_years`, each year degraded.
pub fn degraded_economies(annual_economy: f64, horizon_years: u32) -> Vec<f64> {
    (0..horizon_years)
        .map(|y| annual_economy * degradation_factor(y))
        .collect()
}

/// Net present value of `flows` (index 0 undiscounted) at `rate`.
pub fn npv(rate: f64, flows: &[f64]) -> f64 {
    flows
        .iter()
        .enumerate()
        .map(|(t, flow)| flow / (1.0 + rate).powi(t as i32))
        .sum()
}

fn npv_derivative(rate: f64, flows: &[f64]) -> f64 {
    flows
        .iter()
        .enumerate()
        .skip(1)
        .map(|(t, flow)| -(t as f64) * flow / (1.0 + rate).powi(t as i32 + 1))
        .sum()
}

/// Time to recover the investment from annual economy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", content = "years", rename_all = "snake_case")]
pub enum Payback {
    /// Recovered after this many years.
    Years(f64),
    /// Economy is zero or negative; the investment is never recovered.
    NonRecoverable,
}

impl Payback {
    /// Years to payback, `f64::INFINITY` when non-recoverable.
    pub fn years(self) -> f64 {
        match self {
            Payback::Years(y) => y,
            Payback::NonRecoverable => f64::INFINITY,
        }
    }
}

impl fmt::Display for Payback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Payback::Years(y) => write!(f, "{y:.1} years"),
            Payback::NonRecoverable => write!(f, "never"),
        }
    }
}

/// How the IRR search ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IrrStatus {
    /// `|NPV| < 1e-4` at the returned rate.
    Converged,
    /// The derivative became too small to continue; the rate is the last estimate.
    DerivativeVanished,
    /// 100 iterations ran without convergence; the rate is the last estimate.
    IterationCapReached,
    /// Flows do not change sign, so no rate can zero the NPV.
    NoSignChange,
}

/// Result of the Newton-Raphson IRR search. Always approximate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct IrrEstimate {
    /// Rate as a fraction (0.12 = 12 %).
    pub rate: f64,
    /// Newton steps taken.
    pub iterations: u32,
    pub status: IrrStatus,
}

impl IrrEstimate {
    /// Rate in percent.
    pub fn percent(&self) -> f64 {
        self.rate * 100.0
    }

    /// Whether the search met its tolerance.
    pub fn is_converged(&self) -> bool {
        self.status == IrrStatus::Converged
    }
}

impl fmt::Display for IrrEstimate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            IrrStatus::Converged => write!(f, "{:.2}%", self.percent()),
            IrrStatus::NoSignChange => write!(f, "n/a"),
            _ => write!(f, "~{:.2}% (not converged)", self.percent()),
        }
    }
}

/// Solves `NPV(r) = 0` by Newton-Raphson.
///
/// Starts at 10 %, clamps every step to [-50 %, 100 %], stops once
/// `|NPV| < 1e-4`, and gives up after 100 iterations or when `|NPV'| < 1e-4`.
///
/// # Examples
///
/// ```
/// use solar_credits::settlement::finance::irr;
///
/// let est = irr(&[-10_000.0, 3_000.0, 3_000.0, 3_000.0, 3_000.0, 3_000.0]);
/// assert!(est.is_converged());
/// assert!(est.percent() > 8.0 && est.percent() < 16.0);
/// ```
pub fn irr(flows: &[f64]) -> IrrEstimate {
    let has_negative = flows.iter().any(|&f| f < 0.0);
    let has_positive = flows.iter().any(|&f| f > 0.0);
    if !(has_negative && has_positive) {
        return IrrEstimate {
            rate: 0.0,
            iterations: 0,
            status: IrrStatus::NoSignChange,
        };
    }

    let mut rate = IRR_INITIAL_GUESS;
    for iteration in 0..IRR_MAX_ITERATIONS {
        let value = npv(rate, flows);
        if value.abs() < IRR_TOLERANCE {
            return IrrEstimate {
                rate,
                iterations: iteration,
                status: IrrStatus::Converged,
            };
        }
        let slope = npv_derivative(rate, flows);
        if slope.abs() < IRR_TOLERANCE {
            return IrrEstimate {
                rate,
                iterations: iteration,
                status: IrrStatus::DerivativeVanished,
            };
        }
        rate = (rate - value / slope).clamp(IRR_MIN_RATE, IRR_MAX_RATE);
    }

    let status = if npv(rate, flows).abs() < IRR_TOLERANCE {
        IrrStatus::Converged
    } else {
        IrrStatus::IterationCapReached
    };
    IrrEstimate {
        rate,
        iterations: IRR_MAX_ITERATIONS,
        status,
    }
}

/// Turns energy results into money and investment metrics.
#[derive(Debug, Clone)]
pub struct FinancialMetricsEngine {
    tariff: TariffEngine,
    investment_cost: f64,
}

impl FinancialMetricsEngine {
    /// Creates the engine.
    ///
    /// # Errors
    ///
    /// Returns `SettlementError::Validation` if `investment_cost` is not finite.
    pub fn new(tariff: TariffEngine, investment_cost: f64) -> Result<Self> {
        if !investment_cost.is_finite() {
            return Err(SettlementError::validation(
                "investment_cost",
                investment_cost,
                "must be finite",
            ));
        }
        Ok(Self {
            tariff,
            investment_cost,
        })
    }

    /// Pricing engine in use.
    pub fn tariff(&self) -> &TariffEngine {
        &self.tariff
    }

    /// Up-front investment.
    pub fn investment_cost(&self) -> f64 {
        self.investment_cost
    }

    /// Prices one settled month.
    ///
    /// Economy is the bill avoided plus the untaxed value of the credits
    /// drawn this month.
    ///
    /// # Errors
    ///
    /// Returns `SettlementError::Validation` if `credits_consumed_kwh` or any
    /// energy figure is negative or not finite.
    pub fn monthly(
        &self,
        energy: &MonthlyEnergyResult,
        credits_consumed_kwh: f64,
        flag: TariffFlag,
    ) -> Result<MonthlyFinancialResult> {
        ensure_non_negative("credits_consumed_kwh", credits_consumed_kwh)?;
        let no_plant = self.tariff.breakdown(energy.consumption_kwh, flag)?;
        let cost_without = self
            .tariff
            .cost_without_system(energy.consumption_kwh, flag)?;
        let cost_with = self.tariff.cost_with_system(energy.grid_drawn_kwh, flag)?;
        let credits_consumed_value = self.tariff.credit_value(credits_consumed_kwh, flag);

        Ok(MonthlyFinancialResult {
            period: energy.period,
            flag,
            cost_without_system: cost_without,
            cost_with_system: cost_with,
            economy: cost_without - cost_with + credits_consumed_value,
            credits_consumed_value,
            credits_generated_value: self
                .tariff
                .credit_value(energy.credits_generated_kwh, flag),
            flag_surcharge_value: no_plant.surcharge,
            availability_cost: self.tariff.availability_cost(flag),
            taxes: no_plant.taxes,
        })
    }

    /// `investment / annual_economy`.
    ///
    /// A zero or negative investment pays back immediately (0 years).
    ///
    /// # Errors
    ///
    /// Returns `SettlementError::Calculation` when `annual_economy <= 0`.
    pub fn payback_years(&self, annual_economy: f64) -> Result<f64> {
        if self.investment_cost <= 0.0 {
            return Ok(0.0);
        }
        if annual_economy <= 0.0 {
            return Err(SettlementError::Calculation(format!(
                "non-recoverable: annual economy {annual_economy:.2} <= 0"
            )));
        }
        Ok(self.investment_cost / annual_economy)
    }

    /// [`payback_years`](Self::payback_years) with the error mapped to
    /// [`Payback::NonRecoverable`].
    pub fn payback(&self, annual_economy: f64) -> Payback {
        match self.payback_years(annual_economy) {
            Ok(years) => Payback::Years(years),
            Err(e) => {
                warn!(annual_economy, "{e}");
                Payback::NonRecoverable
            }
        }
    }

    /// Return on investment over `horizon_years` with degradation, in %.
    ///
    /// Reported as 0 when there is no investment to return on.
    pub fn roi_percent(&self, annual_economy: f64, horizon_years: u32) -> f64 {
        if self.investment_cost <= 0.0 {
            warn!(
                investment = self.investment_cost,
                "ROI undefined without investment, reporting 0%"
            );
            return 0.0;
        }
        let total: f64 = degraded_economies(annual_economy, horizon_years)
            .iter()
            .sum();
        (total - self.investment_cost) / self.investment_cost * 100.0
    }

    /// Cash flows `[-investment, economy_y1, economy_y2, ...]` with degradation.
    pub fn cash_flows(&self, annual_economy: f64, horizon_years: u32) -> Vec<f64> {
        std::iter::once(-self.investment_cost)
            .chain(degraded_economies(annual_economy, horizon_years))
            .collect()
    }

    /// IRR of [`cash_flows`](Self::cash_flows).
    pub fn irr_percent(&self, annual_economy: f64, horizon_years: u32) -> IrrEstimate {
        let estimate = irr(&self.cash_flows(annual_economy, horizon_years));
        if !estimate.is_converged() {
            warn!(
                status = ?estimate.status,
                rate = estimate.rate,
                iterations = estimate.iterations,
                "IRR search did not converge"
            );
        }
        estimate
    }

    /// Aggregates a year of monthly results and computes the investment metrics.
    ///
    /// # Arguments
    ///
    /// * `year` - Calendar year being summarised
    /// * `months` - Monthly results of that year
    /// * `horizon_years` - Horizon for ROI and IRR
    pub fn annual(
        &self,
        year: i32,
        months: &[MonthlyFinancialResult],
        horizon_years: u32,
    ) -> AnnualFinancialResult {
        let sum = |f: fn(&MonthlyFinancialResult) -> f64| months.iter().map(f).sum::<f64>();
        let economy = sum(|m| m.economy);
        AnnualFinancialResult {
            year,
            cost_without_system: sum(|m| m.cost_without_system),
            cost_with_system: sum(|m| m.cost_with_system),
            economy,
            credits_consumed_value: sum(|m| m.credits_consumed_value),
            credits_generated_value: sum(|m| m.credits_generated_value),
            investment: self.investment_cost,
            payback: self.payback(economy),
            roi_percent: self.roi_percent(economy, horizon_years),
            irr: self.irr_percent(economy, horizon_years),
            horizon_years,
        }
    }
}
