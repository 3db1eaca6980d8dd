use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use datalink_core::{DomainResult, RecordId};

use crate::{non_negative, required_text};

/// Logistics downtime booked against a line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PclRecord {
    pub id: RecordId,
    pub line: String,
    pub downtime_minutes: i64,
    pub date: Option<NaiveDate>,
    pub note: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PclInput {
    pub line: String,
    #[serde(alias = "downtime")]
    pub downtime_minutes: i64,
    #[serde(default)]
    pub date: Option<NaiveDate>,
    #[serde(default)]
    pub note: Option<String>,
}

impl PclInput {
    pub fn validate(self) -> DomainResult<Self> {
        Ok(Self {
            line: required_text("line", &self.line)?,
            downtime_minutes: non_negative("downtime_minutes", self.downtime_minutes)?,
            date: self.date,
            note: self.note.map(|n| n.trim().to_string()).filter(|n| !n.is_empty()),
        })
    }

    pub fn into_record(self, id: RecordId) -> PclRecord {
        PclRecord {
            id,
            line: self.line,
            downtime_minutes: self.downtime_minutes,
            date: self.date,
            note: self.note,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn legacy_downtime_field_is_accepted() {
        let input: PclInput = serde_json::from_value(json!({"line": "L3", "downtime": 45, "note": "  "})).unwrap();
        let input = input.validate().unwrap();
        assert_eq!(input.downtime_minutes, 45);
        assert_eq!(input.note, None);
    }

    #[test]
    fn negative_downtime_is_rejected() {
        let input = PclInput {
            line: "L3".into(),
            downtime_minutes: -5,
            date: None,
            note: None,
        };
        assert!(input.validate().is_err());
    }
}
