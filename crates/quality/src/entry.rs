use serde::{Deserialize, Serialize};

use datalink_core::period::{validate_day, validate_month, validate_year};
use datalink_core::{DomainResult, RecordId};

use crate::{finite, required_text};

/// One day's GP12 (`scrap == false`) or scrap (`scrap == true`) value for a line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QaEntry {
    pub id: RecordId,
    pub line: String,
    pub day: i32,
    pub month: i32,
    pub year: i32,
    pub value: f64,
    #[serde(rename = "scrapflag")]
    pub scrap: bool,
}

/// Natural key: at most one entry per line, day and kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QaKey {
    pub line: String,
    pub day: i32,
    pub month: i32,
    pub year: i32,
    pub scrap: bool,
}

impl QaEntry {
    pub fn key(&self) -> QaKey {
        QaKey {
            line: self.line.clone(),
            day: self.day,
            month: self.month,
            year: self.year,
            scrap: self.scrap,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QaEntryInput {
    pub line: String,
    pub day: i32,
    pub month: i32,
    pub year: i32,
    pub value: f64,
    #[serde(rename = "scrapflag", default)]
    pub scrap: bool,
}

impl QaEntryInput {
    pub fn validate(self) -> DomainResult<Self> {
        Ok(Self {
            line: required_text("line", &self.line)?,
            day: validate_day(self.day)?,
            month: validate_month(self.month)?,
            year: validate_year(self.year)?,
            value: finite("value", self.value)?,
            scrap: self.scrap,
        })
    }

    pub fn key(&self) -> QaKey {
        QaKey {
            line: self.line.clone(),
            day: self.day,
            month: self.month,
            year: self.year,
            scrap: self.scrap,
        }
    }

    pub fn into_entry(self, id: RecordId) -> QaEntry {
        QaEntry {
            id,
            line: self.line,
            day: self.day,
            month: self.month,
            year: self.year,
            value: self.value,
            scrap: self.scrap,
        }
    }
}
