use crate::model::period::MonthYear;

/// A settlement clock that yields consecutive calendar months.
///
/// Months come out in strictly ascending order, which is what the credit
/// ledger requires.
///
/// # Examples
///
/// ```
/// use solar_credits::model::period::MonthYear;
/// use solar_credits::settlement::clock::MonthClock;
///
/// let mut clock = MonthClock::new(MonthYear::new(11, 2024).unwrap(), 3);
/// let mut months = Vec::new();
///
/// clock.run(|m| months.push(m.to_string()));
/// assert_eq!(months, vec!["11/2024", "12/2024", "01/2025"]);
/// ```
pub struct MonthClock {
    /// Next month to yield
    current: MonthYear,
    /// Months left to yield
    remaining: usize,
}

impl MonthClock {
    /// Creates a clock starting at `start` that yields `total` months.
    ///
    /// # Arguments
    ///
    /// * `start` - First month yielded
    /// * `total` - Number of months the clock will yield
    pub fn new(start: MonthYear, total: usize) -> Self {
        Self {
            current: start,
            remaining: total,
        }
    }

    /// A clock over January to December of `year`.
    pub fn for_years(year: i32, years: usize) -> Self {
        Self::new(MonthYear { year, month: 1 }, years * 12)
    }

    /// Advances the clock by one month.
    ///
    /// # Returns
    ///
    /// * `Some(month)` - The current month before advancing
    /// * `None` - If the clock has yielded all its months
    pub fn tick(&mut self) -> Option<MonthYear> {
        if self.remaining > 0 {
            let month = self.current;
            self.current = self.current.next();
            self.remaining -= 1;
            Some(month)
        } else {
            None
        }
    }

    /// Runs a function for each remaining month.
    ///
    /// # Arguments
    ///
    /// * `f` - A function that takes the current month as an argument
    pub fn run(&mut self, mut f: impl FnMut(MonthYear)) {
        while let Some(month) = self.tick() {
            f(month);
        }
    }
}

impl Iterator for MonthClock {
    type Item = MonthYear;

    fn next(&mut self) -> Option<MonthYear> {
        self.tick()
    }
}
