use serde::{Deserialize, Serialize};

use datalink_core::{DomainResult, RecordId, YearMonth};

use crate::{finite, required_text};

/// Monthly production amount for a line, keyed by (line, month, year).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyTotal {
    pub id: RecordId,
    pub line: String,
    pub month: i32,
    pub year: i32,
    pub amount: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyTotalInput {
    pub line: String,
    pub month: i32,
    pub year: i32,
    pub amount: f64,
}

impl MonthlyTotalInput {
    pub fn validate(self) -> DomainResult<Self> {
        YearMonth::new(self.year, self.month)?;
        Ok(Self {
            line: required_text("line", &self.line)?,
            month: self.month,
            year: self.year,
            amount: finite("amount", self.amount)?,
        })
    }

    pub fn key(&self) -> (String, i32, i32) {
        (self.line.clone(), self.month, self.year)
    }

    pub fn into_record(self, id: RecordId) -> MonthlyTotal {
        MonthlyTotal {
            id,
            line: self.line,
            month: self.month,
            year: self.year,
            amount: self.amount,
        }
    }
}

impl MonthlyTotal {
    pub fn key(&self) -> (String, i32, i32) {
        (self.line.clone(), self.month, self.year)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_ignores_amount() {
        let a = MonthlyTotalInput {
            line: " L2".into(),
            month: 1,
            year: 2024,
            amount: 5.0,
        }
        .validate()
        .unwrap();
        let rec = a.clone().into_record(RecordId::new(1));
        assert_eq!(rec.key(), ("L2".to_string(), 1, 2024));
        assert_eq!(a.key(), rec.key());
    }
}
