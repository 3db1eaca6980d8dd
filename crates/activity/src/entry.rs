use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use datalink_core::{ActivityId, DomainError, DomainResult, UserId};

use crate::time::relative_time;

/// Kind of change; drives the feed icon and color.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ActionType {
    Create,
    Update,
    Delete,
    Upload,
    Export,
    Other,
}

impl ActionType {
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_uppercase().as_str() {
            "CREATE" => Self::Create,
            "UPDATE" => Self::Update,
            "DELETE" => Self::Delete,
            "UPLOAD" => Self::Upload,
            "EXPORT" => Self::Export,
            _ => Self::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "CREATE",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
            Self::Upload => "UPLOAD",
            Self::Export => "EXPORT",
            Self::Other => "OTHER",
        }
    }

    pub fn icon(&self) -> &'static str {
        match self {
            Self::Create => "mdi-plus-circle",
            Self::Update => "mdi-pencil",
            Self::Delete => "mdi-delete",
            Self::Upload => "mdi-cloud-upload",
            Self::Export => "mdi-download",
            Self::Other => "mdi-file-document-edit",
        }
    }

    pub fn color(&self) -> &'static str {
        match self {
            Self::Create => "success",
            Self::Update | Self::Other => "primary",
            Self::Delete => "error",
            Self::Upload => "info",
            Self::Export => "secondary",
        }
    }
}

/// Who performed the change. Anonymous changes are attributed to "system".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Actor {
    pub user_id: Option<UserId>,
    pub name: Option<String>,
    pub department: Option<String>,
}

impl Actor {
    pub fn system() -> Self {
        Self::default()
    }
}

/// A stored activity entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    pub id: ActivityId,
    pub title: String,
    pub action: String,
    pub details: Option<String>,
    pub kind: String,
    pub icon: Option<String>,
    pub color: Option<String>,
    pub target: Option<String>,
    pub changes_before: Option<Value>,
    pub changes_after: Option<Value>,
    pub user_id: Option<UserId>,
    pub user_name: Option<String>,
    pub department: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// An activity ready to be stored (id assigned by storage).
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NewActivity {
    pub title: String,
    pub action: String,
    #[serde(default)]
    pub details: Option<String>,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default)]
    pub changes_before: Option<Value>,
    #[serde(default)]
    pub changes_after: Option<Value>,
    #[serde(skip)]
    pub user_id: Option<UserId>,
    #[serde(skip)]
    pub user_name: Option<String>,
    #[serde(skip)]
    pub department: Option<String>,
}

impl NewActivity {
    pub fn validate(self) -> DomainResult<Self> {
        if self.title.trim().is_empty() {
            return Err(DomainError::validation("title must not be empty"));
        }
        if self.action.trim().is_empty() {
            return Err(DomainError::validation("action must not be empty"));
        }
        if self.kind.trim().is_empty() {
            return Err(DomainError::validation("type must not be empty"));
        }
        Ok(self)
    }

    pub fn attributed_to(mut self, actor: &Actor) -> Self {
        self.user_id = actor.user_id;
        self.user_name = Some(actor.name.clone().unwrap_or_else(|| "system".to_string()));
        self.department = actor.department.clone();
        self
    }

    pub fn into_activity(self, id: ActivityId, created_at: DateTime<Utc>) -> Activity {
        Activity {
            id,
            title: self.title,
            action: self.action,
            details: self.details,
            kind: self.kind,
            icon: self.icon,
            color: self.color,
            target: self.target,
            changes_before: self.changes_before,
            changes_after: self.changes_after,
            user_id: self.user_id,
            user_name: self.user_name,
            department: self.department,
            created_at,
        }
    }
}

/// Builder for module data-change entries (`QA_UPDATE`, `EHS_CREATE`, ...).
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DataChange {
    pub module: String,
    #[serde(rename = "type")]
    pub action_type: String,
    pub title: String,
    #[serde(rename = "description")]
    pub action: String,
    #[serde(default)]
    pub details: Option<String>,
    #[serde(default)]
    pub before: Option<Value>,
    #[serde(default)]
    pub after: Option<Value>,
    #[serde(default)]
    pub target: Option<String>,
}

impl DataChange {
    pub fn new(module: &str, action_type: ActionType, title: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            module: module.to_string(),
            action_type: action_type.as_str().to_string(),
            title: title.into(),
            action: action.into(),
            details: None,
            before: None,
            after: None,
            target: None,
        }
    }

    pub fn details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn before<T: Serialize>(mut self, value: &T) -> Self {
        self.before = serde_json::to_value(value).ok();
        self
    }

    pub fn after<T: Serialize>(mut self, value: &T) -> Self {
        self.after = serde_json::to_value(value).ok();
        self
    }

    pub fn target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn into_new(self, actor: &Actor) -> DomainResult<NewActivity> {
        let module = self.module.trim();
        if module.is_empty() {
            return Err(DomainError::validation("module must not be empty"));
        }
        let action_type = ActionType::parse(&self.action_type);
        let kind = format!("{}_{}", module.to_ascii_uppercase(), self.action_type.trim().to_ascii_uppercase());
        NewActivity {
            title: self.title,
            action: self.action,
            details: self.details,
            kind,
            icon: Some(action_type.icon().to_string()),
            color: Some(action_type.color().to_string()),
            target: Some(self.target.unwrap_or_else(|| format!("/{}", module.to_ascii_lowercase()))),
            changes_before: self.before,
            changes_after: self.after,
            user_id: None,
            user_name: None,
            department: None,
        }
        .attributed_to(actor)
        .validate()
    }
}

/// Longest `days` window the feed accepts (about a century).
pub const MAX_WINDOW_DAYS: i64 = 36_500;

/// Feed query. `days` keeps only entries newer than that many days.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivityFilter {
    pub user_id: Option<UserId>,
    pub department: Option<String>,
    pub kind: Option<String>,
    pub days: Option<i64>,
}

/// Validate a requested `days` window: 1..=[`MAX_WINDOW_DAYS`].
pub fn validate_window(days: i64) -> DomainResult<i64> {
    if (1..=MAX_WINDOW_DAYS).contains(&days) {
        Ok(days)
    } else {
        Err(DomainError::validation(format!(
            "days must be 1..={MAX_WINDOW_DAYS}, got {days}"
        )))
    }
}

impl ActivityFilter {
    /// Oldest timestamp still inside the `days` window.
    ///
    /// `None` when there is no window or it reaches past the representable
    /// range, in which case nothing is cut off.
    pub fn since(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let days = self.days?;
        TimeDelta::try_days(days).and_then(|d| now.checked_sub_signed(d))
    }

    pub fn matches(&self, a: &Activity, now: DateTime<Utc>) -> bool {
        self.user_id.is_none_or(|u| a.user_id == Some(u))
            && self.department.as_deref().is_none_or(|d| a.department.as_deref() == Some(d))
            && self.kind.as_deref().is_none_or(|k| a.kind == k)
            && self.since(now).is_none_or(|since| a.created_at >= since)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Changes {
    pub before: Option<Value>,
    pub after: Option<Value>,
}

/// Feed rendering of an entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActivityView {
    pub id: ActivityId,
    pub title: String,
    pub action: String,
    pub details: Option<String>,
    #[serde(rename = "type")]
    pub kind: String,
    pub icon: Option<String>,
    pub color: Option<String>,
    pub target: Option<String>,
    pub changes: Changes,
    #[serde(rename = "userId")]
    pub user_id: Option<UserId>,
    pub user: Option<String>,
    pub department: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub time: String,
}

impl ActivityView {
    pub fn render(a: Activity, now: DateTime<Utc>) -> Self {
        Self {
            time: relative_time(a.created_at, now),
            id: a.id,
            title: a.title,
            action: a.action,
            details: a.details,
            kind: a.kind,
            icon: a.icon,
            color: a.color,
            target: a.target,
            changes: Changes {
                before: a.changes_before,
                after: a.changes_after,
            },
            user_id: a.user_id,
            user: a.user_name,
            department: a.department,
            timestamp: a.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn actor() -> Actor {
        Actor {
            user_id: Some(UserId::new(3)),
            name: Some("alice".into()),
            department: Some("Quality".into()),
        }
    }

    #[test]
    fn icon_and_color_by_action() {
        assert_eq!(ActionType::parse("create").icon(), "mdi-plus-circle");
        assert_eq!(ActionType::parse("DELETE").color(), "error");
        assert_eq!(ActionType::parse("upload").color(), "info");
        assert_eq!(ActionType::parse("EXPORT").icon(), "mdi-download");
        assert_eq!(ActionType::parse("MERGE").icon(), "mdi-file-document-edit");
        assert_eq!(ActionType::parse("MERGE").color(), "primary");
    }

    #[test]
    fn data_change_fills_kind_target_and_actor() {
        let new = DataChange::new("Qa", ActionType::Update, "Quality data", "updated 3 rows")
            .before(&json!({"value": 1}))
            .after(&json!({"value": 2}))
            .into_new(&actor())
            .unwrap();
        assert_eq!(new.kind, "QA_UPDATE");
        assert_eq!(new.target.as_deref(), Some("/qa"));
        assert_eq!(new.icon.as_deref(), Some("mdi-pencil"));
        assert_eq!(new.user_name.as_deref(), Some("alice"));
        assert_eq!(new.changes_after, Some(json!({"value": 2})));
    }

    #[test]
    fn anonymous_changes_are_attributed_to_system() {
        let new = DataChange::new("EHS", ActionType::Create, "t", "a")
            .target("/ehs/lwd")
            .into_new(&Actor::system())
            .unwrap();
        assert_eq!(new.user_name.as_deref(), Some("system"));
        assert_eq!(new.user_id, None);
        assert_eq!(new.target.as_deref(), Some("/ehs/lwd"));
    }

    #[test]
    fn data_change_wire_shape() {
        let change: DataChange = serde_json::from_value(json!({
            "module": "maint", "type": "DELETE", "title": "Removed", "description": "removed a task"
        }))
        .unwrap();
        let new = change.into_new(&actor()).unwrap();
        assert_eq!(new.kind, "MAINT_DELETE");
        assert_eq!(new.action, "removed a task");
    }

    #[test]
    fn view_shape() {
        let now = Utc::now();
        let a = DataChange::new("QA", ActionType::Create, "t", "a")
            .into_new(&actor())
            .unwrap()
            .into_activity(ActivityId::new(1), now);
        let v = serde_json::to_value(ActivityView::render(a, now)).unwrap();
        assert_eq!(v["type"], "QA_CREATE");
        assert_eq!(v["userId"], 3);
        assert_eq!(v["user"], "alice");
        assert_eq!(v["time"], "just now");
        assert!(v["changes"]["before"].is_null());
    }

    #[test]
    fn filter_by_days_and_department() {
        let now = Utc::now();
        let a = DataChange::new("QA", ActionType::Create, "t", "a")
            .into_new(&actor())
            .unwrap()
            .into_activity(ActivityId::new(1), now - TimeDelta::days(3));
        assert!(ActivityFilter { days: Some(7), ..Default::default() }.matches(&a, now));
        assert!(!ActivityFilter { days: Some(1), ..Default::default() }.matches(&a, now));
        assert!(!ActivityFilter { department: Some("EHS".into()), ..Default::default() }.matches(&a, now));
        assert!(ActivityFilter { kind: Some("QA_CREATE".into()), ..Default::default() }.matches(&a, now));
    }

    #[test]
    fn huge_windows_do_not_overflow() {
        let now = Utc::now();
        let a = DataChange::new("QA", ActionType::Create, "t", "a")
            .into_new(&actor())
            .unwrap()
            .into_activity(ActivityId::new(1), now);
        for days in [1_000_000_000, i64::MAX] {
            let filter = ActivityFilter { days: Some(days), ..Default::default() };
            assert_eq!(filter.since(now), None);
            assert!(filter.matches(&a, now));
        }
    }

    #[test]
    fn window_bounds() {
        assert_eq!(validate_window(30).unwrap(), 30);
        assert_eq!(validate_window(MAX_WINDOW_DAYS).unwrap(), MAX_WINDOW_DAYS);
        assert!(validate_window(0).is_err());
        assert!(validate_window(MAX_WINDOW_DAYS + 1).is_err());
        assert!(validate_window(1_000_000_000).is_err());
    }
}
