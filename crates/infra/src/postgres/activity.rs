use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::instrument;

use datalink_activity::{Activity, ActivityFilter, NewActivity};
use datalink_core::{ActivityId, Page};

use super::PostgresStore;
use super::rows::{activity, decode_all, decode_one};
use crate::error::{StoreResult, map_sqlx_error};
use crate::store::{ActivityStore, missing};

#[async_trait]
impl ActivityStore for PostgresStore {
    #[instrument(skip(self, entry), fields(kind = %entry.kind), err)]
    async fn record_activity(&self, entry: NewActivity) -> StoreResult<Activity> {
        let row = sqlx::query(
            r#"
            INSERT INTO activities
                (title, action, details, kind, icon, color, target, changes_before, changes_after,
                 user_id, user_name, department)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING *
            "#,
        )
        .bind(&entry.title)
        .bind(&entry.action)
        .bind(&entry.details)
        .bind(&entry.kind)
        .bind(&entry.icon)
        .bind(&entry.color)
        .bind(&entry.target)
        .bind(&entry.changes_before)
        .bind(&entry.changes_after)
        .bind(entry.user_id.map(i64::from))
        .bind(&entry.user_name)
        .bind(&entry.department)
        .fetch_one(self.pool())
        .await
        .map_err(|e| map_sqlx_error("record_activity", e))?;
        decode_one("record_activity", &row, activity)
    }

    #[instrument(skip(self), err)]
    async fn list_activities(
        &self,
        filter: &ActivityFilter,
        page: Page,
        now: DateTime<Utc>,
    ) -> StoreResult<Vec<Activity>> {
        let since = filter.since(now);
        let rows = sqlx::query(
            r#"
            SELECT * FROM activities
            WHERE ($1::bigint IS NULL OR user_id = $1)
                AND ($2::text IS NULL OR department = $2)
                AND ($3::text IS NULL OR kind = $3)
                AND ($4::timestamptz IS NULL OR created_at >= $4)
            ORDER BY created_at DESC, id DESC
            LIMIT $5 OFFSET $6
            "#,
        )
        .bind(filter.user_id.map(i64::from))
        .bind(filter.department.as_deref())
        .bind(filter.kind.as_deref())
        .bind(since)
        .bind(page.limit)
        .bind(page.skip)
        .fetch_all(self.pool())
        .await
        .map_err(|e| map_sqlx_error("list_activities", e))?;
        decode_all("list_activities", &rows, activity)
    }

    #[instrument(skip(self), err)]
    async fn get_activity(&self, id: ActivityId) -> StoreResult<Activity> {
        let row = sqlx::query("SELECT * FROM activities WHERE id = $1")
            .bind(i64::from(id))
            .fetch_optional(self.pool())
            .await
            .map_err(|e| map_sqlx_error("get_activity", e))?;
        match row {
            Some(row) => decode_one("get_activity", &row, activity),
            None => missing("activity", id),
        }
    }
}
