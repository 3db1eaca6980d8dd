//! `datalink-plant`: shop-floor records outside quality and maintenance, namely
//! EHS lost-workday weeks, calendar events, logistics (PCL) downtime and
//! assembly output.

pub mod assembly;
pub mod ehs;
pub mod event;
pub mod pcl;

pub use assembly::{AssemblyFilter, AssemblyInput, AssemblyOutput};
pub use ehs::{EhsWeek, EhsWeekInput, EhsWeekValue};
pub use event::{Event, EventFilter, EventInput};
pub use pcl::{PclInput, PclRecord};

use datalink_core::{DomainError, DomainResult};

pub(crate) fn required_text(field: &str, value: &str) -> DomainResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(DomainError::validation(format!("{field} must not be empty")));
    }
    Ok(trimmed.to_string())
}

pub(crate) fn non_negative(field: &str, value: i64) -> DomainResult<i64> {
    if value < 0 {
        return Err(DomainError::validation(format!("{field} must be >= 0")));
    }
    Ok(value)
}
