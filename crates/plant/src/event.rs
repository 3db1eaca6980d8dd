use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use datalink_core::{DomainError, DomainResult, RecordId};

use crate::required_text;

/// A dated plant event (audit, visit, shutdown, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: RecordId,
    pub name: String,
    pub department: String,
    pub start_time: NaiveDate,
    pub end_time: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventInput {
    pub name: String,
    pub department: String,
    pub start_time: NaiveDate,
    #[serde(default)]
    pub end_time: Option<NaiveDate>,
}

impl EventInput {
    pub fn validate(self) -> DomainResult<Self> {
        if let Some(end) = self.end_time {
            if end < self.start_time {
                return Err(DomainError::validation("end_time must not precede start_time"));
            }
        }
        Ok(Self {
            name: required_text("name", &self.name)?,
            department: required_text("department", &self.department)?,
            start_time: self.start_time,
            end_time: self.end_time,
        })
    }

    pub fn into_event(self, id: RecordId) -> Event {
        Event {
            id,
            name: self.name,
            department: self.department,
            start_time: self.start_time,
            end_time: self.end_time,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventFilter {
    pub department: Option<String>,
    /// Only events starting on or after this day.
    pub starting_from: Option<NaiveDate>,
}

impl EventFilter {
    pub fn matches(&self, e: &Event) -> bool {
        self.department.as_deref().is_none_or(|d| e.department == d)
            && self.starting_from.is_none_or(|from| e.start_time >= from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, day).unwrap()
    }

    #[test]
    fn end_before_start_is_rejected() {
        let input = EventInput {
            name: "Audit".into(),
            department: "QA".into(),
            start_time: d(10),
            end_time: Some(d(9)),
        };
        assert!(input.validate().is_err());
    }

    #[test]
    fn filter_by_department_and_upcoming() {
        let e = EventInput {
            name: "Audit".into(),
            department: "QA".into(),
            start_time: d(10),
            end_time: None,
        }
        .into_event(RecordId::new(1));

        assert!(EventFilter::default().matches(&e));
        assert!(EventFilter { department: Some("QA".into()), starting_from: Some(d(10)) }.matches(&e));
        assert!(!EventFilter { department: Some("EHS".into()), starting_from: None }.matches(&e));
        assert!(!EventFilter { department: None, starting_from: Some(d(11)) }.matches(&e));
    }
}
