//! Main and comparison interval computation
//!
//! Caller dates are inclusive; backend intervals are half-open, so the main
//! interval is `[start, end + 1 day)`.

use chrono::{Days, Months, NaiveDate, NaiveDateTime, TimeDelta};

use crate::domain::reports::{Comparison, DateRange};

/// Interval used when the caller gives no dates
pub const ALL_TIME_INTERVAL: &str = "1000-01-01T00:00:00Z/3000-01-01T00:00:00Z";

const INTERVAL_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Half-open `[start, end)` range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interval {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl Interval {
    pub fn period(&self) -> TimeDelta {
        self.end - self.start
    }

    /// ISO-8601 `start/end` form
    pub fn to_iso(&self) -> String {
        format!(
            "{}/{}",
            self.start.format(INTERVAL_FORMAT),
            self.end.format(INTERVAL_FORMAT)
        )
    }
}

fn midnight(date: NaiveDate) -> NaiveDateTime {
    date.and_time(chrono::NaiveTime::MIN)
}

/// Calendar unit a comparison steps back by
#[derive(Clone, Copy)]
enum Unit {
    Week,
    Month,
    Year,
}

impl Unit {
    /// Length used to decide between duration-preserving and calendar-aligned shifts
    fn threshold(&self) -> TimeDelta {
        match self {
            Unit::Week => TimeDelta::days(7),
            Unit::Month => TimeDelta::days(28),
            Unit::Year => TimeDelta::days(365),
        }
    }

    /// Step back one unit. Month/year steps clamp to the last valid day.
    fn back(&self, at: NaiveDateTime) -> NaiveDateTime {
        let shifted = match self {
            Unit::Week => at.checked_sub_days(Days::new(7)),
            Unit::Month => at.checked_sub_months(Months::new(1)),
            Unit::Year => at.checked_sub_months(Months::new(12)),
        };
        shifted.unwrap_or(at)
    }
}

/// Compute the main interval and, if requested, the comparison interval
pub fn compute_intervals(range: DateRange, compare: Comparison) -> (Interval, Option<Interval>) {
    let start = midnight(range.start);
    let end = midnight(range.end) + TimeDelta::days(1);
    let main = Interval { start, end };
    let period = main.period();

    let unit = match compare {
        Comparison::None => return (main, None),
        Comparison::PrevDay => {
            return (
                main,
                Some(Interval {
                    start: start - period,
                    end: start,
                }),
            );
        }
        Comparison::PrevWeek => Unit::Week,
        Comparison::PrevMonth => Unit::Month,
        Comparison::PrevYear => Unit::Year,
    };

    let comparison = if period > unit.threshold() {
        let end = unit.back(main.end);
        Interval {
            start: end - period,
            end,
        }
    } else {
        Interval {
            start: unit.back(main.start),
            end: unit.back(main.end),
        }
    };

    (main, Some(comparison))
}

/// Interval strings for a query, main first
pub fn interval_strings(range: Option<DateRange>, compare: Comparison) -> Vec<String> {
    let Some(range) = range else {
        return vec![ALL_TIME_INTERVAL.to_string()];
    };
    let (main, comparison) = compute_intervals(range, compare);
    let mut out = vec![main.to_iso()];
    if let Some(c) = comparison {
        out.push(c.to_iso());
    }
    out
}
