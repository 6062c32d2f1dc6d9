//! Expiring credit pool with oldest-expiry-first consumption.
//!
//! Every surplus month becomes its own [`CreditLot`]. Lots are never merged
//! and never removed: exhausted and expired lots stay in the ledger as an
//! audit trail. All operations are date-relative, so months must be applied
//! in chronological order.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Result, SettlementError};
use crate::model::period::MonthYear;

/// Amounts at or below this are treated as zero.
pub const EPSILON_KWH: f64 = 1e-9;

/// Tolerance used when checking `consumed + remaining == generated`.
const BALANCE_TOLERANCE_KWH: f64 = 1e-6;

/// Longest credit validity a ledger accepts (100 years).
pub const MAX_VALIDITY_MONTHS: u32 = 1200;

/// Checks a credit validity against `1..=MAX_VALIDITY_MONTHS`.
pub(crate) fn check_validity(validity_months: u32) -> Result<()> {
    if !(1..=MAX_VALIDITY_MONTHS).contains(&validity_months) {
        return Err(SettlementError::validation(
            "validity_months",
            validity_months,
            format!("must be in [1, {MAX_VALIDITY_MONTHS}]"),
        ));
    }
    Ok(())
}

/// Last usable month of a lot generated in `generated`.
fn expiry_of(generated: MonthYear, validity_months: u32) -> Result<MonthYear> {
    check_validity(validity_months)?;
    let validity = i32::try_from(validity_months)
        .map_err(|_| SettlementError::validation("validity_months", validity_months, "too large"))?;
    generated.checked_plus_months(validity).ok_or_else(|| {
        SettlementError::validation(
            "expiry",
            generated,
            format!("{validity_months} months later is outside the supported calendar"),
        )
    })
}

/// Lifecycle of a credit lot, derived from its fields.
///
/// `Exhausted` and `Expired` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LotState {
    /// Untouched and usable.
    Active,
    /// Partly drawn, still usable.
    PartiallyConsumed,
    /// Fully drawn.
    Exhausted,
    /// Passed its expiry with a balance left; the balance is forfeited.
    Expired,
}

/// One month's banked surplus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreditLot {
    /// Month the surplus was generated.
    pub generated: MonthYear,
    /// Amount banked (kWh).
    pub generated_kwh: f64,
    /// Amount drawn so far (kWh).
    pub consumed_kwh: f64,
    /// Amount still held (kWh). Kept as-is when the lot expires.
    pub remaining_kwh: f64,
    /// Last month in which the lot can be drawn.
    pub expiry: MonthYear,
    /// False once exhausted or expired.
    pub active: bool,
    /// Month of the most recent draw from this lot.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_drawn: Option<MonthYear>,
}

impl CreditLot {
    fn new(generated: MonthYear, amount_kwh: f64, expiry: MonthYear) -> Self {
        Self {
            generated,
            generated_kwh: amount_kwh,
            consumed_kwh: 0.0,
            remaining_kwh: amount_kwh,
            expiry,
            active: true,
            last_drawn: None,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> LotState {
        match (self.active, self.remaining_kwh > EPSILON_KWH) {
            (false, true) => LotState::Expired,
            (false, false) | (true, false) => LotState::Exhausted,
            (true, true) if self.consumed_kwh > EPSILON_KWH => LotState::PartiallyConsumed,
            (true, true) => LotState::Active,
        }
    }

    /// Whether the lot can be drawn in `as_of`.
    pub fn is_usable(&self, as_of: MonthYear) -> bool {
        self.active && self.expiry >= as_of
    }

    /// Checks the accounting invariants of a single lot.
    ///
    /// # Errors
    ///
    /// Returns `SettlementError::Validation` naming the first violated rule.
    pub fn check(&self) -> Result<()> {
        let amounts = [
            ("generated_kwh", self.generated_kwh),
            ("consumed_kwh", self.consumed_kwh),
            ("remaining_kwh", self.remaining_kwh),
        ];
        for (field, value) in amounts {
            if !value.is_finite() || value < 0.0 {
                return Err(SettlementError::validation(
                    field,
                    value,
                    format!("lot {} must hold a finite amount >= 0", self.generated),
                ));
            }
        }
        let drift = (self.consumed_kwh + self.remaining_kwh - self.generated_kwh).abs();
        if drift > BALANCE_TOLERANCE_KWH * self.generated_kwh.max(1.0) {
            return Err(SettlementError::validation(
                "consumed_kwh",
                self.consumed_kwh,
                format!(
                    "lot {}: consumed + remaining ({:.6}) != generated ({:.6})",
                    self.generated,
                    self.consumed_kwh + self.remaining_kwh,
                    self.generated_kwh
                ),
            ));
        }
        if self.active && self.remaining_kwh <= EPSILON_KWH {
            return Err(SettlementError::validation(
                "active",
                self.active,
                format!("lot {} is active with nothing remaining", self.generated),
            ));
        }
        self.generated.validated()?;
        self.expiry.validated()?;
        if self.expiry < self.generated {
            return Err(SettlementError::validation(
                "expiry",
                self.expiry,
                format!("lot {} expires before it was generated", self.generated),
            ));
        }
        if let Some(drawn) = self.last_drawn {
            drawn.validated()?;
            if drawn < self.generated || drawn > self.expiry {
                return Err(SettlementError::validation(
                    "last_drawn",
                    drawn,
                    format!("lot {} drawn outside its validity", self.generated),
                ));
            }
        }
        Ok(())
    }
}

/// Amount taken from a single lot during a draw.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LotDraw {
    /// Generation month of the lot drawn from.
    pub generated: MonthYear,
    /// Expiry of the lot drawn from.
    pub expiry: MonthYear,
    /// Amount taken (kWh).
    pub amount_kwh: f64,
}

/// Result of [`CreditLedger::consume`]: what was asked, what was supplied,
/// and from which lots.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct LedgerDraw {
    pub requested_kwh: f64,
    pub consumed_kwh: f64,
    pub draws: Vec<LotDraw>,
}

impl LedgerDraw {
    /// Amount requested but not supplied (kWh, >= 0).
    pub fn shortfall_kwh(&self) -> f64 {
        (self.requested_kwh - self.consumed_kwh).max(0.0)
    }

    /// Whether the full request was supplied.
    pub fn is_full(&self) -> bool {
        self.shortfall_kwh() <= EPSILON_KWH
    }

    /// Turns a partial draw into an error for callers that need all-or-nothing.
    ///
    /// The ledger has already been charged with `consumed_kwh` at this point.
    ///
    /// # Errors
    ///
    /// Returns `SettlementError::Ledger` carrying the shortfall.
    pub fn require_full(self) -> Result<Self> {
        if self.is_full() {
            Ok(self)
        } else {
            Err(SettlementError::Ledger {
                requested_kwh: self.requested_kwh,
                available_kwh: self.consumed_kwh,
                shortfall_kwh: self.shortfall_kwh(),
            })
        }
    }
}

/// Pool of credit lots kept in ascending expiry order.
///
/// # Examples
///
/// ```
/// use solar_credits::model::period::MonthYear;
/// use solar_credits::settlement::ledger::CreditLedger;
///
/// let mut ledger = CreditLedger::new(60);
/// ledger.add_credit(1, 2024, 500.0).unwrap();
/// let feb = MonthYear::new(2, 2024).unwrap();
/// let draw = ledger.consume(200.0, feb).unwrap();
/// assert_eq!(draw.consumed_kwh, 200.0);
/// assert_eq!(ledger.available_balance(feb), 300.0);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct CreditLedger {
    lots: Vec<CreditLot>,
    validity_months: u32,
}

impl CreditLedger {
    /// Creates an empty ledger whose new lots stay valid for `validity_months`.
    pub fn new(validity_months: u32) -> Self {
        Self {
            lots: Vec::new(),
            validity_months,
        }
    }

    /// Rebuilds a ledger from persisted lots.
    ///
    /// Lots are re-sorted by expiry (stable, so lots sharing an expiry keep
    /// their stored order).
    ///
    /// # Errors
    ///
    /// Returns `SettlementError::Validation` if `validity_months` is out of
    /// range, if any lot breaks its invariants, or if a lot's expiry is not
    /// `validity_months` after its generation month.
    pub fn from_lots(mut lots: Vec<CreditLot>, validity_months: u32) -> Result<Self> {
        check_validity(validity_months)?;
        for lot in &lots {
            lot.check()?;
            let expected = expiry_of(lot.generated, validity_months)?;
            if lot.expiry != expected {
                return Err(SettlementError::validation(
                    "expiry",
                    lot.expiry,
                    format!(
                        "lot {} should expire in {expected} with a {validity_months}-month validity",
                        lot.generated
                    ),
                ));
            }
        }
        lots.sort_by_key(|lot| lot.expiry);
        Ok(Self {
            lots,
            validity_months,
        })
    }

    /// All lots in expiry order, including exhausted and expired ones.
    pub fn lots(&self) -> &[CreditLot] {
        &self.lots
    }

    /// Validity applied to newly added lots.
    pub fn validity_months(&self) -> u32 {
        self.validity_months
    }

    /// Newest generation month in the ledger, if any.
    pub fn latest_generation(&self) -> Option<MonthYear> {
        self.lots.iter().map(|lot| lot.generated).max()
    }

    /// Newest month in which a lot was banked or drawn from, if any.
    ///
    /// Months with neither a surplus nor a draw leave no trace here.
    pub fn latest_activity(&self) -> Option<MonthYear> {
        self.lots
            .iter()
            .flat_map(|lot| [Some(lot.generated), lot.last_drawn])
            .flatten()
            .max()
    }

    /// Banks `amount_kwh` generated in `month`/`year` as a new lot.
    ///
    /// # Errors
    ///
    /// Returns `SettlementError::Validation` if the month is out of range or
    /// the amount is not a finite positive number.
    pub fn add_credit(&mut self, month: u32, year: i32, amount_kwh: f64) -> Result<()> {
        let generated = MonthYear::new(month, year)?;
        self.add_credit_at(generated, amount_kwh)
    }

    /// Same as [`add_credit`](Self::add_credit) for an already-built month.
    ///
    /// # Errors
    ///
    /// Returns `SettlementError::Validation` if the amount is not a finite
    /// positive number, or if the ledger's validity is out of range or pushes
    /// the expiry past the supported calendar.
    pub fn add_credit_at(&mut self, generated: MonthYear, amount_kwh: f64) -> Result<()> {
        if !amount_kwh.is_finite() || amount_kwh <= 0.0 {
            return Err(SettlementError::validation(
                "amount_kwh",
                amount_kwh,
                "credit amount must be finite and > 0",
            ));
        }
        let generated = generated.validated()?;
        let expiry = expiry_of(generated, self.validity_months)?;
        let lot = CreditLot::new(generated, amount_kwh, expiry);
        debug!(
            generated = %lot.generated,
            expiry = %lot.expiry,
            amount_kwh,
            "credit lot added"
        );
        let at = self.lots.partition_point(|l| l.expiry <= lot.expiry);
        self.lots.insert(at, lot);
        Ok(())
    }

    /// Sum of `remaining_kwh` over lots usable in `as_of`.
    pub fn available_balance(&self, as_of: MonthYear) -> f64 {
        self.lots
            .iter()
            .filter(|lot| lot.is_usable(as_of))
            .map(|lot| lot.remaining_kwh)
            .sum()
    }

    /// Draws up to `amount_kwh`, oldest expiry first.
    ///
    /// Partial fulfilment is not an error: the returned draw reports what was
    /// actually supplied, which is less than requested when the pool runs dry.
    /// Use [`LedgerDraw::require_full`] for strict semantics.
    ///
    /// # Errors
    ///
    /// Returns `SettlementError::Validation` if `amount_kwh` is negative or
    /// not finite. The ledger is untouched in that case.
    pub fn consume(&mut self, amount_kwh: f64, as_of: MonthYear) -> Result<LedgerDraw> {
        if !amount_kwh.is_finite() || amount_kwh < 0.0 {
            return Err(SettlementError::validation(
                "amount_kwh",
                amount_kwh,
                "draw amount must be finite and >= 0",
            ));
        }

        let mut needed = amount_kwh;
        let mut draw = LedgerDraw {
            requested_kwh: amount_kwh,
            ..LedgerDraw::default()
        };

        for lot in self.lots.iter_mut() {
            if needed <= EPSILON_KWH {
                break;
            }
            if !lot.is_usable(as_of) {
                continue;
            }
            let mut take = lot.remaining_kwh.min(needed);
            if lot.remaining_kwh - take <= EPSILON_KWH {
                take = lot.remaining_kwh;
            }
            lot.consumed_kwh += take;
            lot.remaining_kwh -= take;
            lot.last_drawn = Some(as_of);
            if lot.remaining_kwh <= EPSILON_KWH {
                lot.remaining_kwh = 0.0;
                lot.active = false;
            }
            needed = (needed - take).max(0.0);
            draw.consumed_kwh += take;
            draw.draws.push(LotDraw {
                generated: lot.generated,
                expiry: lot.expiry,
                amount_kwh: take,
            });
        }

        debug!(
            as_of = %as_of,
            requested_kwh = amount_kwh,
            consumed_kwh = draw.consumed_kwh,
            shortfall_kwh = draw.shortfall_kwh(),
            lots = draw.draws.len(),
            "ledger draw"
        );
        Ok(draw)
    }

    /// Deactivates every active lot whose expiry is before `as_of`.
    ///
    /// Returns the forfeited kWh. Calling it again for the same `as_of`
    /// forfeits nothing more.
    pub fn expire(&mut self, as_of: MonthYear) -> f64 {
        let mut forfeited = 0.0;
        for lot in self.lots.iter_mut().filter(|l| l.active && l.expiry < as_of) {
            lot.active = false;
            forfeited += lot.remaining_kwh;
            warn!(
                generated = %lot.generated,
                expiry = %lot.expiry,
                forfeited_kwh = lot.remaining_kwh,
                "credit lot expired"
            );
        }
        forfeited
    }

    /// Total kWh lost to expiry across the ledger's history.
    pub fn forfeited_total(&self) -> f64 {
        self.lots
            .iter()
            .filter(|lot| lot.state() == LotState::Expired)
            .map(|lot| lot.remaining_kwh)
            .sum()
    }

    /// Checks every lot and the expiry ordering.
    ///
    /// # Errors
    ///
    /// Returns `SettlementError::Validation` for the first violation found.
    pub fn check_invariants(&self) -> Result<()> {
        for lot in &self.lots {
            lot.check()?;
        }
        if let Some(pair) = self.lots.windows(2).find(|w| w[0].expiry > w[1].expiry) {
            return Err(SettlementError::validation(
                "lots",
                pair[1].expiry,
                "lots must be in ascending expiry order",
            ));
        }
        Ok(())
    }
}
