//! Calendar helpers: month/day/week/year bounds, date ranges and shifts.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};

pub fn validate_month(month: i32) -> DomainResult<i32> {
    if (1..=12).contains(&month) {
        Ok(month)
    } else {
        Err(DomainError::validation(format!("month must be 1..=12, got {month}")))
    }
}

pub fn validate_day(day: i32) -> DomainResult<i32> {
    if (1..=31).contains(&day) {
        Ok(day)
    } else {
        Err(DomainError::validation(format!("day must be 1..=31, got {day}")))
    }
}

/// ISO weeks run up to 53.
pub fn validate_week(week: i32) -> DomainResult<i32> {
    if (1..=53).contains(&week) {
        Ok(week)
    } else {
        Err(DomainError::validation(format!("week must be 1..=53, got {week}")))
    }
}

pub fn validate_year(year: i32) -> DomainResult<i32> {
    if (2000..=2100).contains(&year) {
        Ok(year)
    } else {
        Err(DomainError::validation(format!("year must be 2000..=2100, got {year}")))
    }
}

/// A (year, month) pair used to scope monthly sheets.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct YearMonth {
    pub year: i32,
    pub month: i32,
}

impl YearMonth {
    pub fn new(year: i32, month: i32) -> DomainResult<Self> {
        Ok(Self {
            year: validate_year(year)?,
            month: validate_month(month)?,
        })
    }

    pub fn of(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month() as i32,
        }
    }

    /// Resolve optional query values against `today`, the way dashboards ask
    /// for "this month" by omitting them.
    pub fn or_current(year: Option<i32>, month: Option<i32>, today: NaiveDate) -> DomainResult<Self> {
        let current = Self::of(today);
        Self::new(year.unwrap_or(current.year), month.unwrap_or(current.month))
    }
}

/// An inclusive range of calendar days.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> DomainResult<Self> {
        if end < start {
            return Err(DomainError::validation("end date must not precede start date"));
        }
        Ok(Self { start, end })
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    /// Number of calendar days covered, both ends included.
    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }

    /// The `days`-long window ending at `today`.
    pub fn trailing(today: NaiveDate, days: i64) -> Self {
        let days = days.max(1);
        Self {
            start: today - chrono::Duration::days(days - 1),
            end: today,
        }
    }
}

/// Open-ended date bounds used by list filters.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateBounds {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl DateBounds {
    pub fn new(start: Option<NaiveDate>, end: Option<NaiveDate>) -> DomainResult<Self> {
        if let (Some(s), Some(e)) = (start, end) {
            if e < s {
                return Err(DomainError::validation("end date must not precede start date"));
            }
        }
        Ok(Self { start, end })
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start.is_none_or(|s| s <= date) && self.end.is_none_or(|e| date <= e)
    }
}

/// Production shift.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Shift {
    #[default]
    Day,
    Night,
}

impl Shift {
    pub fn as_str(&self) -> &'static str {
        match self {
            Shift::Day => "day",
            Shift::Night => "night",
        }
    }

    pub fn parse(s: &str) -> DomainResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "day" => Ok(Shift::Day),
            "night" => Ok(Shift::Night),
            other => Err(DomainError::validation(format!(
                "shift must be one of: day, night (got {other})"
            ))),
        }
    }
}

impl core::fmt::Display for Shift {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn month_bounds() {
        assert!(validate_month(0).is_err());
        assert!(validate_month(13).is_err());
        assert_eq!(validate_month(12).unwrap(), 12);
    }

    #[test]
    fn year_month_defaults_to_today() {
        let ym = YearMonth::or_current(None, Some(3), d(2024, 7, 9)).unwrap();
        assert_eq!(ym, YearMonth { year: 2024, month: 3 });
    }

    #[test]
    fn date_range_counts_both_ends() {
        let r = DateRange::new(d(2024, 1, 1), d(2024, 1, 1)).unwrap();
        assert_eq!(r.days(), 1);
        let r = DateRange::trailing(d(2024, 1, 30), 30);
        assert_eq!(r.start, d(2024, 1, 1));
        assert_eq!(r.days(), 30);
        assert!(DateRange::new(d(2024, 1, 2), d(2024, 1, 1)).is_err());
    }

    #[test]
    fn open_bounds() {
        let b = DateBounds::new(Some(d(2024, 1, 5)), None).unwrap();
        assert!(!b.contains(d(2024, 1, 4)));
        assert!(b.contains(d(2030, 1, 1)));
        assert!(DateBounds::default().contains(d(1999, 1, 1)));
    }

    #[test]
    fn shift_parsing() {
        assert_eq!(Shift::parse("Night").unwrap(), Shift::Night);
        assert!(Shift::parse("swing").is_err());
        assert_eq!(serde_json::to_string(&Shift::Day).unwrap(), "\"day\"");
    }

    proptest! {
        #[test]
        fn trailing_range_has_requested_length(days in 1i64..400) {
            let r = DateRange::trailing(d(2024, 6, 15), days);
            prop_assert_eq!(r.days(), days);
            prop_assert!(r.contains(d(2024, 6, 15)));
        }
    }
}
