//! Calendar month arithmetic used to date credit lots and settlement months.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SettlementError};

/// Number of months in a settlement year.
pub const MONTHS: usize = 12;

/// Earliest calendar year accepted for a settlement month.
pub const MIN_YEAR: i32 = 1900;

/// Latest calendar year accepted for a settlement month.
pub const MAX_YEAR: i32 = 9999;

/// A calendar month, ordered chronologically.
///
/// Field order matters: the derived `Ord` compares `year` first, then
/// `month`, which gives chronological ordering.
///
/// # Examples
///
/// ```
/// use solar_credits::model::period::MonthYear;
///
/// let jan = MonthYear::new(1, 2024).unwrap();
/// assert_eq!(jan.plus_months(60), MonthYear::new(1, 2029).unwrap());
/// assert!(jan < jan.next());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MonthYear {
    /// Calendar year.
    pub year: i32,
    /// Month of the year, 1 through 12.
    pub month: u32,
}

impl MonthYear {
    /// Creates a month value.
    ///
    /// # Errors
    ///
    /// Returns `SettlementError::Validation` if `month` is outside `1..=12`
    /// or `year` is outside [`MIN_YEAR`]`..=`[`MAX_YEAR`].
    pub fn new(month: u32, year: i32) -> Result<Self> {
        if !(1..=12).contains(&month) {
            return Err(SettlementError::validation(
                "month",
                month,
                "must be in [1, 12]",
            ));
        }
        if !(MIN_YEAR..=MAX_YEAR).contains(&year) {
            return Err(SettlementError::validation(
                "year",
                year,
                format!("must be in [{MIN_YEAR}, {MAX_YEAR}]"),
            ));
        }
        Ok(Self { year, month })
    }

    /// Re-checks a value that may have been built from its public fields.
    ///
    /// # Errors
    ///
    /// Same as [`new`](Self::new).
    pub fn validated(self) -> Result<Self> {
        Self::new(self.month, self.year)
    }

    /// Returns the month `n` months later (or earlier for negative `n`), or
    /// `None` if the result falls outside the accepted year range.
    pub fn checked_plus_months(self, n: i32) -> Option<Self> {
        let total = i64::from(self.year) * 12 + i64::from(self.month) - 1 + i64::from(n);
        let year = i32::try_from(total.div_euclid(12)).ok()?;
        let month = u32::try_from(total.rem_euclid(12)).ok()? + 1;
        Self::new(month, year).ok()
    }

    /// Returns the month `n` months later (or earlier for negative `n`).
    ///
    /// Saturates at January [`MIN_YEAR`] and December [`MAX_YEAR`].
    pub fn plus_months(self, n: i32) -> Self {
        self.checked_plus_months(n).unwrap_or(if n < 0 {
            Self { year: MIN_YEAR, month: 1 }
        } else {
            Self { year: MAX_YEAR, month: 12 }
        })
    }

    /// The following calendar month.
    pub fn next(self) -> Self {
        self.plus_months(1)
    }

    /// Zero-based index into a 12-element monthly array.
    pub fn index(self) -> usize {
        (self.month - 1) as usize
    }

    /// Number of days in this month, accounting for leap years.
    pub fn days_in_month(self) -> u32 {
        match self.month {
            2 if is_leap_year(self.year) => 29,
            2 => 28,
            4 | 6 | 9 | 11 => 30,
            _ => 31,
        }
    }

    /// Months elapsed from `self` to `later` (negative if `later` is earlier).
    pub fn months_until(self, later: Self) -> i32 {
        (later.year - self.year) * 12 + later.month as i32 - self.month as i32
    }
}

fn is_leap_year(year: i32) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}

impl fmt::Display for MonthYear {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}/{}", self.month, self.year)
    }
}

/// Parses `"MM/YYYY"` (the display form) or `"YYYY-MM"`.
impl FromStr for MonthYear {
    type Err = SettlementError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || SettlementError::validation("period", s, "expected MM/YYYY or YYYY-MM");
        let (month, year) = if let Some((m, y)) = s.split_once('/') {
            (m, y)
        } else if let Some((y, m)) = s.split_once('-') {
            (m, y)
        } else {
            return Err(invalid());
        };
        let month = month.trim().parse::<u32>().map_err(|_| invalid())?;
        let year = year.trim().parse::<i32>().map_err(|_| invalid())?;
        Self::new(month, year)
    }
}

/// Validates a 1-based month number and returns its zero-based index.
pub(crate) fn month_index(month: u32) -> Result<usize> {
    MonthYear::new(month, MIN_YEAR).map(MonthYear::index)
}
