use serde::{Deserialize, Serialize};

use datalink_core::{DomainResult, RecordId, YearMonth};

use crate::{finite, required_text};

/// One KPI line of a monthly sheet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QaKpi {
    pub id: RecordId,
    pub month: i32,
    pub year: i32,
    pub area: String,
    pub description: String,
    pub new_factory: f64,
    pub old_factory: f64,
    pub total: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KpiItem {
    pub area: String,
    pub description: String,
    #[serde(default)]
    pub new_factory: f64,
    #[serde(default)]
    pub old_factory: f64,
    #[serde(default)]
    pub total: f64,
}

/// A whole month's KPI sheet. Saving a sheet replaces the month atomically.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KpiSheet {
    pub month: i32,
    pub year: i32,
    pub items: Vec<KpiItem>,
}

impl KpiSheet {
    pub fn validate(self) -> DomainResult<Self> {
        YearMonth::new(self.year, self.month)?;
        let items = self
            .items
            .into_iter()
            .map(|i| {
                Ok(KpiItem {
                    area: required_text("area", &i.area)?,
                    description: i.description.trim().to_string(),
                    new_factory: finite("new_factory", i.new_factory)?,
                    old_factory: finite("old_factory", i.old_factory)?,
                    total: finite("total", i.total)?,
                })
            })
            .collect::<DomainResult<Vec<_>>>()?;
        Ok(Self {
            month: self.month,
            year: self.year,
            items,
        })
    }

    pub fn period(&self) -> YearMonth {
        YearMonth {
            year: self.year,
            month: self.month,
        }
    }

    /// Materialize rows, numbering them from `first_id`.
    pub fn into_rows(self, first_id: i64) -> Vec<QaKpi> {
        let (month, year) = (self.month, self.year);
        self.items
            .into_iter()
            .enumerate()
            .map(|(i, item)| QaKpi {
                id: RecordId::new(first_id + i as i64),
                month,
                year,
                area: item.area,
                description: item.description,
                new_factory: item.new_factory,
                old_factory: item.old_factory,
                total: item.total,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn validates_and_numbers_rows() {
        let sheet: KpiSheet = serde_json::from_value(json!({
            "month": 2, "year": 2024,
            "items": [
                {"area": "Assembly", "description": "PPM", "new_factory": 10.0},
                {"area": "Paint", "description": "FTT", "total": 99.0}
            ]
        }))
        .unwrap();
        let rows = sheet.validate().unwrap().into_rows(10);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].id, RecordId::new(11));
        assert_eq!(rows[1].old_factory, 0.0);
        assert_eq!(rows[0].month, 2);
    }

    #[test]
    fn empty_area_is_rejected() {
        let sheet = KpiSheet {
            month: 2,
            year: 2024,
            items: vec![KpiItem {
                area: "".into(),
                description: "x".into(),
                new_factory: 0.0,
                old_factory: 0.0,
                total: 0.0,
            }],
        };
        assert!(sheet.validate().is_err());
    }

    #[test]
    fn empty_sheet_is_allowed() {
        let sheet = KpiSheet {
            month: 2,
            year: 2024,
            items: vec![],
        };
        assert!(sheet.validate().unwrap().items.is_empty());
    }
}
