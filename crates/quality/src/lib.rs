//! `datalink-quality`: quality department data.
//!
//! - GP12 and scrap daily values per line ([`entry`])
//! - monthly miscellaneous quality figures ([`misc`])
//! - monthly KPI sheets ([`kpi`])
//! - monthly production totals per line ([`monthly`])

pub mod entry;
pub mod kpi;
pub mod misc;
pub mod monthly;

pub use entry::{QaEntry, QaEntryInput, QaKey};
pub use kpi::{KpiItem, KpiSheet, QaKpi};
pub use misc::{QaMisc, QaMiscInput};
pub use monthly::{MonthlyTotal, MonthlyTotalInput};

use datalink_core::{DomainError, DomainResult};

pub(crate) fn required_text(field: &str, value: &str) -> DomainResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(DomainError::validation(format!("{field} must not be empty")));
    }
    Ok(trimmed.to_string())
}

pub(crate) fn finite(field: &str, value: f64) -> DomainResult<f64> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(DomainError::validation(format!("{field} must be a finite number")))
    }
}
