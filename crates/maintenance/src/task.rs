//! Maintenance task logs. Weekly tasks also serve as the open-issue list.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use datalink_core::{DomainResult, RecordId, UserId};

use crate::required_text;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyTask {
    pub id: RecordId,
    pub date: NaiveDate,
    pub user_id: UserId,
    pub title: String,
    /// Location or equipment the work was done on.
    pub location: String,
    pub kind: i32,
    pub content: String,
    pub solved: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyTaskInput {
    pub date: NaiveDate,
    pub title: String,
    #[serde(alias = "wheres")]
    pub location: String,
    #[serde(default, alias = "type")]
    pub kind: i32,
    #[serde(alias = "content_daily")]
    pub content: String,
    #[serde(default)]
    pub solved: bool,
}

impl DailyTaskInput {
    pub fn validate(self) -> DomainResult<Self> {
        Ok(Self {
            date: self.date,
            title: required_text("title", &self.title)?,
            location: required_text("location", &self.location)?,
            kind: self.kind,
            content: self.content.trim().to_string(),
            solved: self.solved,
        })
    }

    pub fn into_task(self, id: RecordId, user_id: UserId) -> DailyTask {
        DailyTask {
            id,
            date: self.date,
            user_id,
            title: self.title,
            location: self.location,
            kind: self.kind,
            content: self.content,
            solved: self.solved,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyTaskUpdate {
    pub date: Option<NaiveDate>,
    pub title: Option<String>,
    #[serde(alias = "wheres")]
    pub location: Option<String>,
    #[serde(alias = "type")]
    pub kind: Option<i32>,
    #[serde(alias = "content_daily")]
    pub content: Option<String>,
    pub solved: Option<bool>,
}

impl DailyTask {
    pub fn apply(&self, update: DailyTaskUpdate) -> DomainResult<Self> {
        let mut next = self.clone();
        if let Some(date) = update.date {
            next.date = date;
        }
        if let Some(title) = update.title {
            next.title = required_text("title", &title)?;
        }
        if let Some(location) = update.location {
            next.location = required_text("location", &location)?;
        }
        if let Some(kind) = update.kind {
            next.kind = kind;
        }
        if let Some(content) = update.content {
            next.content = content.trim().to_string();
        }
        if let Some(solved) = update.solved {
            next.solved = solved;
        }
        Ok(next)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeeklyTask {
    pub id: RecordId,
    pub user_id: UserId,
    pub date: NaiveDate,
    pub title: String,
    pub location: String,
    pub content: String,
    /// Free-form severity label.
    pub degree: String,
    pub solved: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeeklyTaskInput {
    #[serde(alias = "date_time")]
    pub date: NaiveDate,
    pub title: String,
    #[serde(alias = "wheres")]
    pub location: String,
    pub content: String,
    #[serde(default)]
    pub degree: String,
    #[serde(default)]
    pub solved: bool,
}

impl WeeklyTaskInput {
    pub fn validate(self) -> DomainResult<Self> {
        Ok(Self {
            date: self.date,
            title: required_text("title", &self.title)?,
            location: required_text("location", &self.location)?,
            content: self.content.trim().to_string(),
            degree: self.degree.trim().to_string(),
            solved: self.solved,
        })
    }

    pub fn into_task(self, id: RecordId, user_id: UserId) -> WeeklyTask {
        WeeklyTask {
            id,
            user_id,
            date: self.date,
            title: self.title,
            location: self.location,
            content: self.content,
            degree: self.degree,
            solved: self.solved,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeeklyTaskUpdate {
    #[serde(alias = "date_time")]
    pub date: Option<NaiveDate>,
    pub title: Option<String>,
    #[serde(alias = "wheres")]
    pub location: Option<String>,
    pub content: Option<String>,
    pub degree: Option<String>,
    pub solved: Option<bool>,
}

impl WeeklyTask {
    pub fn apply(&self, update: WeeklyTaskUpdate) -> DomainResult<Self> {
        let mut next = self.clone();
        if let Some(date) = update.date {
            next.date = date;
        }
        if let Some(title) = update.title {
            next.title = required_text("title", &title)?;
        }
        if let Some(location) = update.location {
            next.location = required_text("location", &location)?;
        }
        if let Some(content) = update.content {
            next.content = content.trim().to_string();
        }
        if let Some(degree) = update.degree {
            next.degree = degree.trim().to_string();
        }
        if let Some(solved) = update.solved {
            next.solved = solved;
        }
        Ok(next)
    }
}

/// Shared filter for both task logs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskFilter {
    pub user_id: Option<UserId>,
    pub start_date: Option<NaiveDate>,
    pub solved: Option<bool>,
}

impl TaskFilter {
    fn matches(&self, user_id: UserId, date: NaiveDate, solved: bool) -> bool {
        self.user_id.is_none_or(|u| u == user_id)
            && self.start_date.is_none_or(|s| date >= s)
            && self.solved.is_none_or(|f| f == solved)
    }

    pub fn matches_daily(&self, t: &DailyTask) -> bool {
        self.matches(t.user_id, t.date, t.solved)
    }

    pub fn matches_weekly(&self, t: &WeeklyTask) -> bool {
        self.matches(t.user_id, t.date, t.solved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn legacy_field_names_are_accepted() {
        let daily: DailyTaskInput = serde_json::from_value(json!({
            "date": "2024-02-01", "title": "Lube", "wheres": "Press 2", "type": 1, "content_daily": "greased"
        }))
        .unwrap();
        let task = daily.validate().unwrap().into_task(RecordId::new(1), UserId::new(3));
        assert_eq!(task.location, "Press 2");
        assert_eq!(task.kind, 1);
        assert!(!task.solved);

        let weekly: WeeklyTaskInput = serde_json::from_value(json!({
            "date_time": "2024-02-01", "title": "Leak", "wheres": "Line 4", "content": "oil", "degree": "high"
        }))
        .unwrap();
        assert_eq!(weekly.date, NaiveDate::from_ymd_opt(2024, 2, 1).unwrap());
    }

    #[test]
    fn update_touches_only_given_fields() {
        let task = WeeklyTaskInput {
            date: NaiveDate::from_ymd_opt(2024, 2, 1).unwrap(),
            title: "Leak".into(),
            location: "Line 4".into(),
            content: "oil".into(),
            degree: "high".into(),
            solved: false,
        }
        .validate()
        .unwrap()
        .into_task(RecordId::new(1), UserId::new(1));
        let next = task
            .apply(WeeklyTaskUpdate {
                solved: Some(true),
                ..Default::default()
            })
            .unwrap();
        assert!(next.solved);
        assert_eq!(next.title, "Leak");
        assert!(task.apply(WeeklyTaskUpdate { title: Some(" ".into()), ..Default::default() }).is_err());
    }

    #[test]
    fn filter_start_date_and_solved() {
        let d = |day| NaiveDate::from_ymd_opt(2024, 2, day).unwrap();
        let f = TaskFilter {
            user_id: None,
            start_date: Some(d(5)),
            solved: Some(false),
        };
        assert!(f.matches(UserId::new(1), d(5), false));
        assert!(!f.matches(UserId::new(1), d(4), false));
        assert!(!f.matches(UserId::new(1), d(6), true));
    }
}
