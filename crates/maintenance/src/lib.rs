//! `datalink-maintenance`: maintenance records and their KPIs.
//!
//! - [`metric`]: daily per-equipment downtime/output metrics
//! - [`downtime`]: downtime tickets with a pending → in progress → closed lifecycle
//! - [`task`]: daily and weekly maintenance task logs
//! - [`kpi`]: availability, OEE, MTTR and MTBF over metric sets

pub mod downtime;
pub mod kpi;
pub mod metric;
pub mod task;

pub use downtime::{DowntimeFilter, DowntimeInput, DowntimeRecord, DowntimeStatus, DowntimeUpdate};
pub use kpi::{EquipmentComparison, KpiFigures, MetricStats, MetricView, MttrMtbfPoint, OeePoint};
pub use metric::{MaintenanceMetric, MetricFilter, MetricInput};
pub use task::{DailyTask, DailyTaskInput, DailyTaskUpdate, TaskFilter, WeeklyTask, WeeklyTaskInput, WeeklyTaskUpdate};

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
