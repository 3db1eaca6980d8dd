use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use datalink_core::{DateBounds, DomainError, DomainResult, RecordId, Shift, UserId};

use crate::{non_negative, required_text};

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DowntimeStatus {
    #[default]
    Pending,
    InProgress,
    Closed,
}

impl DowntimeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DowntimeStatus::Pending => "pending",
            DowntimeStatus::InProgress => "in_progress",
            DowntimeStatus::Closed => "closed",
        }
    }

    pub fn parse(s: &str) -> DomainResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "in_progress" => Ok(Self::InProgress),
            "closed" => Ok(Self::Closed),
            other => Err(DomainError::validation(format!(
                "status must be one of: pending, in_progress, closed (got {other})"
            ))),
        }
    }
}

/// A line-stop ticket raised by production and worked by maintenance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DowntimeRecord {
    pub id: RecordId,
    pub line: String,
    pub shift: Shift,
    pub date: NaiveDate,
    pub status: DowntimeStatus,
    pub downtime_minutes: i64,
    pub equipment_name: String,
    pub fault_description: String,
    pub resolution: Option<String>,
    pub reporter_name: String,
    pub maintainer_name: Option<String>,
    pub user_id: Option<UserId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DowntimeInput {
    pub line: String,
    #[serde(default)]
    pub shift: Shift,
    pub date: NaiveDate,
    #[serde(default)]
    pub status: DowntimeStatus,
    #[serde(default)]
    pub downtime_minutes: i64,
    pub equipment_name: String,
    pub fault_description: String,
    #[serde(default)]
    pub resolution: Option<String>,
    pub reporter_name: String,
    #[serde(default)]
    pub maintainer_name: Option<String>,
}

/// Partial update; absent fields keep their value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DowntimeUpdate {
    pub line: Option<String>,
    pub shift: Option<Shift>,
    pub date: Option<NaiveDate>,
    pub status: Option<DowntimeStatus>,
    pub downtime_minutes: Option<i64>,
    pub equipment_name: Option<String>,
    pub fault_description: Option<String>,
    pub resolution: Option<String>,
    pub maintainer_name: Option<String>,
}

fn optional_text(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

impl DowntimeInput {
    pub fn validate(self) -> DomainResult<Self> {
        let input = Self {
            line: required_text("line", &self.line)?,
            shift: self.shift,
            date: self.date,
            status: self.status,
            downtime_minutes: non_negative("downtime_minutes", self.downtime_minutes)?,
            equipment_name: required_text("equipment_name", &self.equipment_name)?,
            fault_description: required_text("fault_description", &self.fault_description)?,
            resolution: optional_text(self.resolution),
            reporter_name: required_text("reporter_name", &self.reporter_name)?,
            maintainer_name: optional_text(self.maintainer_name),
        };
        check_resolution(input.status, &input.resolution)?;
        Ok(input)
    }

    pub fn into_record(self, id: RecordId, user_id: Option<UserId>, now: DateTime<Utc>) -> DowntimeRecord {
        DowntimeRecord {
            id,
            line: self.line,
            shift: self.shift,
            date: self.date,
            status: self.status,
            downtime_minutes: self.downtime_minutes,
            equipment_name: self.equipment_name,
            fault_description: self.fault_description,
            resolution: self.resolution,
            reporter_name: self.reporter_name,
            maintainer_name: self.maintainer_name,
            user_id,
            created_at: now,
            updated_at: now,
        }
    }
}

fn check_resolution(status: DowntimeStatus, resolution: &Option<String>) -> DomainResult<()> {
    if status == DowntimeStatus::Closed && resolution.is_none() {
        return Err(DomainError::invariant("a closed downtime record needs a resolution"));
    }
    Ok(())
}

impl DowntimeRecord {
    pub fn apply(&self, update: DowntimeUpdate, now: DateTime<Utc>) -> DomainResult<Self> {
        let mut next = self.clone();
        if let Some(line) = update.line {
            next.line = required_text("line", &line)?;
        }
        if let Some(shift) = update.shift {
            next.shift = shift;
        }
        if let Some(date) = update.date {
            next.date = date;
        }
        if let Some(status) = update.status {
            next.status = status;
        }
        if let Some(minutes) = update.downtime_minutes {
            next.downtime_minutes = non_negative("downtime_minutes", minutes)?;
        }
        if let Some(name) = update.equipment_name {
            next.equipment_name = required_text("equipment_name", &name)?;
        }
        if let Some(desc) = update.fault_description {
            next.fault_description = required_text("fault_description", &desc)?;
        }
        if update.resolution.is_some() {
            next.resolution = optional_text(update.resolution);
        }
        if update.maintainer_name.is_some() {
            next.maintainer_name = optional_text(update.maintainer_name);
        }
        next.updated_at = now;
        check_resolution(next.status, &next.resolution)?;
        Ok(next)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DowntimeFilter {
    pub line: Option<String>,
    pub shift: Option<Shift>,
    pub status: Option<DowntimeStatus>,
    pub user_id: Option<UserId>,
    pub dates: DateBounds,
}

impl DowntimeFilter {
    pub fn matches(&self, r: &DowntimeRecord) -> bool {
        self.line.as_deref().is_none_or(|l| r.line == l)
            && self.shift.is_none_or(|s| r.shift == s)
            && self.status.is_none_or(|s| r.status == s)
            && self.user_id.is_none_or(|u| r.user_id == Some(u))
            && self.dates.contains(r.date)
    }
}
