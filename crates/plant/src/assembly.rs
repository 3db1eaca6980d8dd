use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use datalink_core::{DateBounds, DomainResult, RecordId, Shift};

use crate::{non_negative, required_text};

/// Planned vs. actual units for a line and shift.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssemblyOutput {
    pub id: RecordId,
    pub line: String,
    pub date: NaiveDate,
    pub shift: Shift,
    pub planned: i64,
    pub actual: i64,
}

impl AssemblyOutput {
    /// `actual / planned`, or `None` when nothing was planned.
    pub fn attainment(&self) -> Option<f64> {
        (self.planned > 0).then(|| self.actual as f64 / self.planned as f64)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssemblyInput {
    pub line: String,
    pub date: NaiveDate,
    #[serde(default)]
    pub shift: Shift,
    pub planned: i64,
    pub actual: i64,
}

impl AssemblyInput {
    pub fn validate(self) -> DomainResult<Self> {
        Ok(Self {
            line: required_text("line", &self.line)?,
            date: self.date,
            shift: self.shift,
            planned: non_negative("planned", self.planned)?,
            actual: non_negative("actual", self.actual)?,
        })
    }

    pub fn into_record(self, id: RecordId) -> AssemblyOutput {
        AssemblyOutput {
            id,
            line: self.line,
            date: self.date,
            shift: self.shift,
            planned: self.planned,
            actual: self.actual,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssemblyFilter {
    pub line: Option<String>,
    pub shift: Option<Shift>,
    pub dates: DateBounds,
}

impl AssemblyFilter {
    pub fn matches(&self, r: &AssemblyOutput) -> bool {
        self.line.as_deref().is_none_or(|l| r.line == l)
            && self.shift.is_none_or(|s| r.shift == s)
            && self.dates.contains(r.date)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output(planned: i64, actual: i64) -> AssemblyOutput {
        AssemblyInput {
            line: "A1".into(),
            date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            shift: Shift::Night,
            planned,
            actual,
        }
        .into_record(RecordId::new(1))
    }

    #[test]
    fn attainment_guards_zero_plan() {
        assert_eq!(output(0, 10).attainment(), None);
        assert_eq!(output(200, 150).attainment(), Some(0.75));
    }

    #[test]
    fn filter_matches_line_shift_and_dates() {
        let r = output(1, 1);
        assert!(AssemblyFilter::default().matches(&r));
        assert!(!AssemblyFilter { shift: Some(Shift::Day), ..Default::default() }.matches(&r));
        let later = DateBounds::new(NaiveDate::from_ymd_opt(2024, 3, 2), None).unwrap();
        assert!(!AssemblyFilter { dates: later, ..Default::default() }.matches(&r));
    }
}
