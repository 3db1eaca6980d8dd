use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use datalink_core::{DateBounds, DomainError, DomainResult, RecordId, Shift, UserId};

use crate::kpi::MINUTES_PER_DAY;
use crate::{non_negative, required_text};

/// Downtime and output of one equipment type for one shift of one day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaintenanceMetric {
    pub id: RecordId,
    pub equipment_type: String,
    pub shift: Shift,
    pub date: NaiveDate,
    pub downtime_count: i64,
    pub downtime_minutes: i64,
    pub parts_produced: i64,
    pub user_id: Option<UserId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricInput {
    pub equipment_type: String,
    #[serde(default)]
    pub shift: Shift,
    pub date: NaiveDate,
    #[serde(default)]
    pub downtime_count: i64,
    #[serde(default)]
    pub downtime_minutes: i64,
    #[serde(default)]
    pub parts_produced: i64,
}

impl MetricInput {
    pub fn validate(self) -> DomainResult<Self> {
        let downtime_minutes = non_negative("downtime_minutes", self.downtime_minutes)?;
        if downtime_minutes > MINUTES_PER_DAY {
            return Err(DomainError::validation(format!(
                "downtime_minutes cannot exceed {MINUTES_PER_DAY} per day"
            )));
        }
        Ok(Self {
            equipment_type: required_text("equipment_type", &self.equipment_type)?,
            shift: self.shift,
            date: self.date,
            downtime_count: non_negative("downtime_count", self.downtime_count)?,
            downtime_minutes,
            parts_produced: non_negative("parts_produced", self.parts_produced)?,
        })
    }

    pub fn into_metric(self, id: RecordId, user_id: Option<UserId>, now: DateTime<Utc>) -> MaintenanceMetric {
        MaintenanceMetric {
            id,
            equipment_type: self.equipment_type,
            shift: self.shift,
            date: self.date,
            downtime_count: self.downtime_count,
            downtime_minutes: self.downtime_minutes,
            parts_produced: self.parts_produced,
            user_id,
            created_at: now,
            updated_at: now,
        }
    }
}

impl MaintenanceMetric {
    /// Replace the measured values, keeping identity and creation metadata.
    pub fn apply(&self, input: MetricInput, now: DateTime<Utc>) -> Self {
        Self {
            equipment_type: input.equipment_type,
            shift: input.shift,
            date: input.date,
            downtime_count: input.downtime_count,
            downtime_minutes: input.downtime_minutes,
            parts_produced: input.parts_produced,
            updated_at: now,
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricFilter {
    pub equipment_type: Option<String>,
    pub shift: Option<Shift>,
    pub user_id: Option<UserId>,
    pub dates: DateBounds,
}

impl MetricFilter {
    pub fn matches(&self, m: &MaintenanceMetric) -> bool {
        self.equipment_type.as_deref().is_none_or(|t| m.equipment_type == t)
            && self.shift.is_none_or(|s| m.shift == s)
            && self.user_id.is_none_or(|u| m.user_id == Some(u))
            && self.dates.contains(m.date)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input() -> MetricInput {
        MetricInput {
            equipment_type: "Press".into(),
            shift: Shift::Day,
            date: NaiveDate::from_ymd_opt(2024, 4, 2).unwrap(),
            downtime_count: 2,
            downtime_minutes: 30,
            parts_produced: 500,
        }
    }

    #[test]
    fn downtime_cannot_exceed_a_day() {
        assert!(MetricInput { downtime_minutes: 1441, ..input() }.validate().is_err());
        assert!(MetricInput { downtime_minutes: 1440, ..input() }.validate().is_ok());
        assert!(MetricInput { downtime_count: -1, ..input() }.validate().is_err());
    }

    #[test]
    fn apply_keeps_identity() {
        let t0 = Utc::now();
        let m = input().into_metric(RecordId::new(9), Some(UserId::new(2)), t0);
        let t1 = t0 + chrono::Duration::minutes(5);
        let updated = m.apply(MetricInput { downtime_minutes: 60, ..input() }, t1);
        assert_eq!(updated.id, m.id);
        assert_eq!(updated.created_at, t0);
        assert_eq!(updated.updated_at, t1);
        assert_eq!(updated.downtime_minutes, 60);
        assert_eq!(updated.user_id, Some(UserId::new(2)));
    }

    #[test]
    fn filter_by_user_and_equipment() {
        let m = input().into_metric(RecordId::new(1), Some(UserId::new(2)), Utc::now());
        assert!(MetricFilter { user_id: Some(UserId::new(2)), ..Default::default() }.matches(&m));
        assert!(!MetricFilter { user_id: Some(UserId::new(3)), ..Default::default() }.matches(&m));
        assert!(!MetricFilter { equipment_type: Some("Weld".into()), ..Default::default() }.matches(&m));
    }
}
