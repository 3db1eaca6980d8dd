use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgConnection;
use tracing::instrument;

use datalink_core::{Change, Page, RecordId, UserId};
use datalink_maintenance::{
    DailyTask, DailyTaskInput, DailyTaskUpdate, DowntimeFilter, DowntimeInput, DowntimeRecord, DowntimeUpdate,
    MaintenanceMetric, MetricFilter, MetricInput, TaskFilter, WeeklyTask, WeeklyTaskInput, WeeklyTaskUpdate,
};

use super::PostgresStore;
use super::rows::{Decode, daily, decode_all, decode_one, downtime, metric, weekly};
use crate::error::{StoreResult, map_sqlx_error};
use crate::store::{MaintenanceStore, missing};

/// `SELECT * ... WHERE id = $1 FOR UPDATE` inside a transaction.
async fn lock_row<T>(
    conn: &mut PgConnection,
    table: &str,
    what: &str,
    id: RecordId,
    decode: Decode<T>,
) -> StoreResult<T> {
    let sql = format!("SELECT * FROM {table} WHERE id = $1 FOR UPDATE");
    let row = sqlx::query(&sql)
        .bind(i64::from(id))
        .fetch_optional(conn)
        .await
        .map_err(|e| map_sqlx_error(what, e))?;
    match row {
        Some(row) => decode_one(what, &row, decode),
        None => missing(what, id),
    }
}

async fn select_by_id<T>(store: &PostgresStore, table: &str, what: &str, id: RecordId, decode: Decode<T>) -> StoreResult<T> {
    let sql = format!("SELECT * FROM {table} WHERE id = $1");
    let row = sqlx::query(&sql)
        .bind(i64::from(id))
        .fetch_optional(store.pool())
        .await
        .map_err(|e| map_sqlx_error(what, e))?;
    match row {
        Some(row) => decode_one(what, &row, decode),
        None => missing(what, id),
    }
}

async fn delete_by_id<T>(store: &PostgresStore, table: &str, what: &str, id: RecordId, decode: Decode<T>) -> StoreResult<T> {
    let sql = format!("DELETE FROM {table} WHERE id = $1 RETURNING *");
    let row = sqlx::query(&sql)
        .bind(i64::from(id))
        .fetch_optional(store.pool())
        .await
        .map_err(|e| map_sqlx_error(what, e))?;
    match row {
        Some(row) => decode_one(what, &row, decode),
        None => missing(what, id),
    }
}

#[async_trait]
impl MaintenanceStore for PostgresStore {
    // ─── metrics ───

    #[instrument(skip(self), err)]
    async fn create_metric(&self, input: MetricInput, user_id: Option<UserId>) -> StoreResult<MaintenanceMetric> {
        let row = sqlx::query(
            r#"
            INSERT INTO maintenance_metrics
                (equipment_type, shift, date, downtime_count, downtime_minutes, parts_produced, user_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(&input.equipment_type)
        .bind(input.shift.as_str())
        .bind(input.date)
        .bind(input.downtime_count)
        .bind(input.downtime_minutes)
        .bind(input.parts_produced)
        .bind(user_id.map(i64::from))
        .fetch_one(self.pool())
        .await
        .map_err(|e| map_sqlx_error("create_metric", e))?;
        decode_one("create_metric", &row, metric)
    }

    #[instrument(skip(self), err)]
    async fn list_metrics(&self, filter: &MetricFilter, page: Page) -> StoreResult<Vec<MaintenanceMetric>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM maintenance_metrics
            WHERE ($1::text IS NULL OR equipment_type = $1)
                AND ($2::text IS NULL OR shift = $2)
                AND ($3::bigint IS NULL OR user_id = $3)
                AND ($4::date IS NULL OR date >= $4)
                AND ($5::date IS NULL OR date <= $5)
            ORDER BY date DESC, id DESC
            LIMIT $6 OFFSET $7
            "#,
        )
        .bind(filter.equipment_type.as_deref())
        .bind(filter.shift.map(|s| s.as_str()))
        .bind(filter.user_id.map(i64::from))
        .bind(filter.dates.start)
        .bind(filter.dates.end)
        .bind(page.limit)
        .bind(page.skip)
        .fetch_all(self.pool())
        .await
        .map_err(|e| map_sqlx_error("list_metrics", e))?;
        decode_all("list_metrics", &rows, metric)
    }

    #[instrument(skip(self), err)]
    async fn get_metric(&self, id: RecordId) -> StoreResult<MaintenanceMetric> {
        select_by_id(self, "maintenance_metrics", "metric", id, metric).await
    }

    #[instrument(skip(self), err)]
    async fn replace_metric(&self, id: RecordId, input: MetricInput) -> StoreResult<Change<MaintenanceMetric>> {
        let mut tx = self.begin().await?;
        let before = lock_row(&mut tx, "maintenance_metrics", "metric", id, metric).await?;
        let next = before.apply(input, Utc::now());
        let row = sqlx::query(
            r#"
            UPDATE maintenance_metrics SET
                equipment_type = $2, shift = $3, date = $4, downtime_count = $5,
                downtime_minutes = $6, parts_produced = $7, updated_at = $8
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(i64::from(id))
        .bind(&next.equipment_type)
        .bind(next.shift.as_str())
        .bind(next.date)
        .bind(next.downtime_count)
        .bind(next.downtime_minutes)
        .bind(next.parts_produced)
        .bind(next.updated_at)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("replace_metric", e))?;
        let after = decode_one("replace_metric", &row, metric)?;
        tx.commit().await.map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(Change { before, after })
    }

    #[instrument(skip(self), err)]
    async fn delete_metric(&self, id: RecordId) -> StoreResult<MaintenanceMetric> {
        delete_by_id(self, "maintenance_metrics", "metric", id, metric).await
    }

    // ─── downtime records ───

    #[instrument(skip(self), err)]
    async fn create_downtime(&self, input: DowntimeInput, user_id: Option<UserId>) -> StoreResult<DowntimeRecord> {
        let row = sqlx::query(
            r#"
            INSERT INTO downtime_records
                (line, shift, date, status, downtime_minutes, equipment_name, fault_description,
                 resolution, reporter_name, maintainer_name, user_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING *
            "#,
        )
        .bind(&input.line)
        .bind(input.shift.as_str())
        .bind(input.date)
        .bind(input.status.as_str())
        .bind(input.downtime_minutes)
        .bind(&input.equipment_name)
        .bind(&input.fault_description)
        .bind(&input.resolution)
        .bind(&input.reporter_name)
        .bind(&input.maintainer_name)
        .bind(user_id.map(i64::from))
        .fetch_one(self.pool())
        .await
        .map_err(|e| map_sqlx_error("create_downtime", e))?;
        decode_one("create_downtime", &row, downtime)
    }

    #[instrument(skip(self), err)]
    async fn list_downtime(&self, filter: &DowntimeFilter, page: Page) -> StoreResult<Vec<DowntimeRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM downtime_records
            WHERE ($1::text IS NULL OR line = $1)
                AND ($2::text IS NULL OR shift = $2)
                AND ($3::text IS NULL OR status = $3)
                AND ($4::bigint IS NULL OR user_id = $4)
                AND ($5::date IS NULL OR date >= $5)
                AND ($6::date IS NULL OR date <= $6)
            ORDER BY date DESC, id DESC
            LIMIT $7 OFFSET $8
            "#,
        )
        .bind(filter.line.as_deref())
        .bind(filter.shift.map(|s| s.as_str()))
        .bind(filter.status.map(|s| s.as_str()))
        .bind(filter.user_id.map(i64::from))
        .bind(filter.dates.start)
        .bind(filter.dates.end)
        .bind(page.limit)
        .bind(page.skip)
        .fetch_all(self.pool())
        .await
        .map_err(|e| map_sqlx_error("list_downtime", e))?;
        decode_all("list_downtime", &rows, downtime)
    }

    #[instrument(skip(self), err)]
    async fn get_downtime(&self, id: RecordId) -> StoreResult<DowntimeRecord> {
        select_by_id(self, "downtime_records", "downtime record", id, downtime).await
    }

    #[instrument(skip(self), err)]
    async fn update_downtime(&self, id: RecordId, update: DowntimeUpdate) -> StoreResult<Change<DowntimeRecord>> {
        let mut tx = self.begin().await?;
        let before = lock_row(&mut tx, "downtime_records", "downtime record", id, downtime).await?;
        let next = before.apply(update, Utc::now())?;
        let row = sqlx::query(
            r#"
            UPDATE downtime_records SET
                line = $2, shift = $3, date = $4, status = $5, downtime_minutes = $6,
                equipment_name = $7, fault_description = $8, resolution = $9,
                maintainer_name = $10, updated_at = $11
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(i64::from(id))
        .bind(&next.line)
        .bind(next.shift.as_str())
        .bind(next.date)
        .bind(next.status.as_str())
        .bind(next.downtime_minutes)
        .bind(&next.equipment_name)
        .bind(&next.fault_description)
        .bind(&next.resolution)
        .bind(&next.maintainer_name)
        .bind(next.updated_at)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("update_downtime", e))?;
        let after = decode_one("update_downtime", &row, downtime)?;
        tx.commit().await.map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(Change { before, after })
    }

    #[instrument(skip(self), err)]
    async fn delete_downtime(&self, id: RecordId) -> StoreResult<DowntimeRecord> {
        delete_by_id(self, "downtime_records", "downtime record", id, downtime).await
    }

    // ─── daily tasks ───

    #[instrument(skip(self), err)]
    async fn create_daily(&self, input: DailyTaskInput, user_id: UserId) -> StoreResult<DailyTask> {
        let row = sqlx::query(
            r#"
            INSERT INTO daily_tasks (date, user_id, title, location, kind, content, solved)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(input.date)
        .bind(i64::from(user_id))
        .bind(&input.title)
        .bind(&input.location)
        .bind(input.kind)
        .bind(&input.content)
        .bind(input.solved)
        .fetch_one(self.pool())
        .await
        .map_err(|e| map_sqlx_error("create_daily", e))?;
        decode_one("create_daily", &row, daily)
    }

    #[instrument(skip(self), err)]
    async fn list_daily(&self, filter: &TaskFilter, page: Page) -> StoreResult<Vec<DailyTask>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM daily_tasks
            WHERE ($1::bigint IS NULL OR user_id = $1)
                AND ($2::date IS NULL OR date >= $2)
                AND ($3::boolean IS NULL OR solved = $3)
            ORDER BY date DESC, id DESC
            LIMIT $4 OFFSET $5
            "#,
        )
        .bind(filter.user_id.map(i64::from))
        .bind(filter.start_date)
        .bind(filter.solved)
        .bind(page.limit)
        .bind(page.skip)
        .fetch_all(self.pool())
        .await
        .map_err(|e| map_sqlx_error("list_daily", e))?;
        decode_all("list_daily", &rows, daily)
    }

    #[instrument(skip(self), err)]
    async fn get_daily(&self, id: RecordId) -> StoreResult<DailyTask> {
        select_by_id(self, "daily_tasks", "daily task", id, daily).await
    }

    #[instrument(skip(self), err)]
    async fn update_daily(&self, id: RecordId, update: DailyTaskUpdate) -> StoreResult<Change<DailyTask>> {
        let mut tx = self.begin().await?;
        let before = lock_row(&mut tx, "daily_tasks", "daily task", id, daily).await?;
        let next = before.apply(update)?;
        let row = sqlx::query(
            r#"
            UPDATE daily_tasks SET date = $2, title = $3, location = $4, kind = $5, content = $6, solved = $7
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(i64::from(id))
        .bind(next.date)
        .bind(&next.title)
        .bind(&next.location)
        .bind(next.kind)
        .bind(&next.content)
        .bind(next.solved)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("update_daily", e))?;
        let after = decode_one("update_daily", &row, daily)?;
        tx.commit().await.map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(Change { before, after })
    }

    #[instrument(skip(self), err)]
    async fn delete_daily(&self, id: RecordId) -> StoreResult<DailyTask> {
        delete_by_id(self, "daily_tasks", "daily task", id, daily).await
    }

    // ─── weekly tasks ───

    #[instrument(skip(self), err)]
    async fn create_weekly(&self, input: WeeklyTaskInput, user_id: UserId) -> StoreResult<WeeklyTask> {
        let row = sqlx::query(
            r#"
            INSERT INTO weekly_tasks (user_id, date, title, location, content, degree, solved)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(i64::from(user_id))
        .bind(input.date)
        .bind(&input.title)
        .bind(&input.location)
        .bind(&input.content)
        .bind(&input.degree)
        .bind(input.solved)
        .fetch_one(self.pool())
        .await
        .map_err(|e| map_sqlx_error("create_weekly", e))?;
        decode_one("create_weekly", &row, weekly)
    }

    #[instrument(skip(self), err)]
    async fn list_weekly(&self, filter: &TaskFilter, page: Page) -> StoreResult<Vec<WeeklyTask>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM weekly_tasks
            WHERE ($1::bigint IS NULL OR user_id = $1)
                AND ($2::date IS NULL OR date >= $2)
                AND ($3::boolean IS NULL OR solved = $3)
            ORDER BY date DESC, id DESC
            LIMIT $4 OFFSET $5
            "#,
        )
        .bind(filter.user_id.map(i64::from))
        .bind(filter.start_date)
        .bind(filter.solved)
        .bind(page.limit)
        .bind(page.skip)
        .fetch_all(self.pool())
        .await
        .map_err(|e| map_sqlx_error("list_weekly", e))?;
        decode_all("list_weekly", &rows, weekly)
    }

    #[instrument(skip(self), err)]
    async fn get_weekly(&self, id: RecordId) -> StoreResult<WeeklyTask> {
        select_by_id(self, "weekly_tasks", "weekly task", id, weekly).await
    }

    #[instrument(skip(self), err)]
    async fn update_weekly(&self, id: RecordId, update: WeeklyTaskUpdate) -> StoreResult<Change<WeeklyTask>> {
        let mut tx = self.begin().await?;
        let before = lock_row(&mut tx, "weekly_tasks", "weekly task", id, weekly).await?;
        let next = before.apply(update)?;
        let row = sqlx::query(
            r#"
            UPDATE weekly_tasks SET date = $2, title = $3, location = $4, content = $5, degree = $6, solved = $7
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(i64::from(id))
        .bind(next.date)
        .bind(&next.title)
        .bind(&next.location)
        .bind(&next.content)
        .bind(&next.degree)
        .bind(next.solved)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("update_weekly", e))?;
        let after = decode_one("update_weekly", &row, weekly)?;
        tx.commit().await.map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(Change { before, after })
    }

    #[instrument(skip(self), err)]
    async fn delete_weekly(&self, id: RecordId) -> StoreResult<WeeklyTask> {
        delete_by_id(self, "weekly_tasks", "weekly task", id, weekly).await
    }
}
