use serde::{Deserialize, Serialize};

use datalink_core::{DomainError, DomainResult, RecordId, YearMonth};

use crate::finite;

/// Monthly miscellaneous quality figures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QaMisc {
    pub id: RecordId,
    pub month: i32,
    pub year: i32,
    pub supplier_defect: i64,
    pub formal_amount: i64,
    pub informal_amount: i64,
    pub qc_ignore_amount: i64,
    pub scrap_rate_c: f64,
    pub scrap_rate_m: f64,
    pub ftt_tjm: f64,
    pub ftt_tjc: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QaMiscInput {
    pub month: i32,
    pub year: i32,
    #[serde(default)]
    pub supplier_defect: i64,
    #[serde(default)]
    pub formal_amount: i64,
    #[serde(default)]
    pub informal_amount: i64,
    #[serde(default)]
    pub qc_ignore_amount: i64,
    #[serde(default)]
    pub scrap_rate_c: f64,
    #[serde(default)]
    pub scrap_rate_m: f64,
    #[serde(default, alias = "Ftt_tjm")]
    pub ftt_tjm: f64,
    #[serde(default, alias = "Ftt_tjc")]
    pub ftt_tjc: f64,
}

fn count(field: &str, v: i64) -> DomainResult<i64> {
    if v < 0 {
        return Err(DomainError::validation(format!("{field} must be >= 0")));
    }
    Ok(v)
}

fn percent(field: &str, v: f64) -> DomainResult<f64> {
    let v = finite(field, v)?;
    if !(0.0..=100.0).contains(&v) {
        return Err(DomainError::validation(format!("{field} must be within 0..=100")));
    }
    Ok(v)
}

impl QaMiscInput {
    pub fn validate(self) -> DomainResult<Self> {
        YearMonth::new(self.year, self.month)?;
        Ok(Self {
            month: self.month,
            year: self.year,
            supplier_defect: count("supplier_defect", self.supplier_defect)?,
            formal_amount: count("formal_amount", self.formal_amount)?,
            informal_amount: count("informal_amount", self.informal_amount)?,
            qc_ignore_amount: count("qc_ignore_amount", self.qc_ignore_amount)?,
            scrap_rate_c: percent("scrap_rate_c", self.scrap_rate_c)?,
            scrap_rate_m: percent("scrap_rate_m", self.scrap_rate_m)?,
            ftt_tjm: percent("ftt_tjm", self.ftt_tjm)?,
            ftt_tjc: percent("ftt_tjc", self.ftt_tjc)?,
        })
    }

    pub fn into_record(self, id: RecordId) -> QaMisc {
        QaMisc {
            id,
            month: self.month,
            year: self.year,
            supplier_defect: self.supplier_defect,
            formal_amount: self.formal_amount,
            informal_amount: self.informal_amount,
            qc_ignore_amount: self.qc_ignore_amount,
            scrap_rate_c: self.scrap_rate_c,
            scrap_rate_m: self.scrap_rate_m,
            ftt_tjm: self.ftt_tjm,
            ftt_tjc: self.ftt_tjc,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn legacy_capitalized_ftt_fields_are_accepted() {
        let input: QaMiscInput = serde_json::from_value(json!({
            "month": 4, "year": 2024, "Ftt_tjm": 98.5, "ftt_tjc": 97.0
        }))
        .unwrap();
        let input = input.validate().unwrap();
        assert_eq!(input.ftt_tjm, 98.5);
        assert_eq!(input.supplier_defect, 0);
    }

    #[test]
    fn rates_and_counts_are_bounded() {
        let ok: QaMiscInput = serde_json::from_value(json!({"month": 4, "year": 2024})).unwrap();
        assert!(QaMiscInput { scrap_rate_c: 101.0, ..ok.clone() }.validate().is_err());
        assert!(QaMiscInput { formal_amount: -1, ..ok.clone() }.validate().is_err());
        assert!(QaMiscInput { month: 13, ..ok }.validate().is_err());
    }
}
