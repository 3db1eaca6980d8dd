use serde::{Deserialize, Serialize};

use datalink_core::period::{validate_week, validate_year};
use datalink_core::{DomainResult, RecordId};

use crate::non_negative;

/// Lost work days recorded for one ISO week.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EhsWeek {
    pub id: RecordId,
    pub week: i32,
    pub year: i32,
    pub lwd: i64,
}

/// A validated week value, keyed by (week, year).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct EhsWeekValue {
    pub week: i32,
    pub year: i32,
    pub lwd: i64,
}

impl EhsWeekValue {
    pub fn into_record(self, id: RecordId) -> EhsWeek {
        EhsWeek {
            id,
            week: self.week,
            year: self.year,
            lwd: self.lwd,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EhsWeekInput {
    pub week: i32,
    /// Omitted on the lost-workday endpoint, which always targets the current year.
    #[serde(default)]
    pub year: Option<i32>,
    pub lwd: i64,
}

impl EhsWeekInput {
    /// Validate and pin the year: `forced_year` wins, then the given year,
    /// then `current_year`.
    pub fn resolve(self, forced_year: Option<i32>, current_year: i32) -> DomainResult<EhsWeekValue> {
        let year = forced_year.or(self.year).unwrap_or(current_year);
        Ok(EhsWeekValue {
            week: validate_week(self.week)?,
            year: validate_year(year)?,
            lwd: non_negative("lwd", self.lwd)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forced_year_overrides_payload() {
        let input = EhsWeekInput {
            week: 10,
            year: Some(2020),
            lwd: 2,
        };
        assert_eq!(
            input.clone().resolve(Some(2024), 2024).unwrap(),
            EhsWeekValue { week: 10, year: 2024, lwd: 2 }
        );
        assert_eq!(input.resolve(None, 2024).unwrap().year, 2020);
    }

    #[test]
    fn missing_year_uses_current() {
        let input = EhsWeekInput {
            week: 1,
            year: None,
            lwd: 0,
        };
        assert_eq!(input.resolve(None, 2025).unwrap().year, 2025);
    }

    #[test]
    fn rejects_bad_week_and_negative_lwd() {
        assert!(EhsWeekInput { week: 54, year: None, lwd: 0 }.resolve(None, 2024).is_err());
        assert!(EhsWeekInput { week: 5, year: None, lwd: -1 }.resolve(None, 2024).is_err());
    }
}
