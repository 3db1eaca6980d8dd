use async_trait::async_trait;
use tracing::instrument;

use datalink_core::{Change, Page, RecordId, UpsertReport};
use datalink_plant::{
    AssemblyFilter, AssemblyInput, AssemblyOutput, EhsWeek, EhsWeekValue, Event, EventFilter, EventInput, PclInput,
    PclRecord,
};

use super::PostgresStore;
use super::rows::{assembly, decode_all, decode_one, ehs_week, event, pcl};
use crate::error::{StoreResult, map_sqlx_error};
use crate::store::{PlantStore, missing};

#[async_trait]
impl PlantStore for PostgresStore {
    #[instrument(skip(self), err)]
    async fn list_ehs(&self, year: Option<i32>) -> StoreResult<Vec<EhsWeek>> {
        let rows = sqlx::query("SELECT * FROM ehs_weeks WHERE ($1::integer IS NULL OR year = $1) ORDER BY year, week")
            .bind(year)
            .fetch_all(self.pool())
            .await
            .map_err(|e| map_sqlx_error("list_ehs", e))?;
        decode_all("list_ehs", &rows, ehs_week)
    }

    #[instrument(skip(self, values), fields(count = values.len()), err)]
    async fn upsert_ehs(&self, values: Vec<EhsWeekValue>) -> StoreResult<UpsertReport<EhsWeek>> {
        let mut tx = self.begin().await?;
        let mut report = UpsertReport::default();
        for value in values {
            let existing = sqlx::query("SELECT * FROM ehs_weeks WHERE week = $1 AND year = $2 FOR UPDATE")
                .bind(value.week)
                .bind(value.year)
                .fetch_optional(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error("upsert_ehs", e))?;
            match existing {
                Some(row) => {
                    let before = decode_one("upsert_ehs", &row, ehs_week)?;
                    let row = sqlx::query("UPDATE ehs_weeks SET lwd = $2 WHERE id = $1 RETURNING *")
                        .bind(i64::from(before.id))
                        .bind(value.lwd)
                        .fetch_one(&mut *tx)
                        .await
                        .map_err(|e| map_sqlx_error("upsert_ehs", e))?;
                    let after = decode_one("upsert_ehs", &row, ehs_week)?;
                    report.updated.push(Change { before, after });
                }
                None => {
                    let row = sqlx::query("INSERT INTO ehs_weeks (week, year, lwd) VALUES ($1, $2, $3) RETURNING *")
                        .bind(value.week)
                        .bind(value.year)
                        .bind(value.lwd)
                        .fetch_one(&mut *tx)
                        .await
                        .map_err(|e| map_sqlx_error("upsert_ehs", e))?;
                    report.created.push(decode_one("upsert_ehs", &row, ehs_week)?);
                }
            }
        }
        tx.commit().await.map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(report)
    }

    // ─── events ───

    #[instrument(skip(self), err)]
    async fn create_event(&self, input: EventInput) -> StoreResult<Event> {
        let row = sqlx::query(
            "INSERT INTO events (name, department, start_time, end_time) VALUES ($1, $2, $3, $4) RETURNING *",
        )
        .bind(&input.name)
        .bind(&input.department)
        .bind(input.start_time)
        .bind(input.end_time)
        .fetch_one(self.pool())
        .await
        .map_err(|e| map_sqlx_error("create_event", e))?;
        decode_one("create_event", &row, event)
    }

    #[instrument(skip(self), err)]
    async fn list_events(&self, filter: &EventFilter, page: Page) -> StoreResult<Vec<Event>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM events
            WHERE ($1::text IS NULL OR department = $1)
                AND ($2::date IS NULL OR start_time >= $2)
            ORDER BY start_time, id
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(filter.department.as_deref())
        .bind(filter.starting_from)
        .bind(page.limit)
        .bind(page.skip)
        .fetch_all(self.pool())
        .await
        .map_err(|e| map_sqlx_error("list_events", e))?;
        decode_all("list_events", &rows, event)
    }

    #[instrument(skip(self), err)]
    async fn get_event(&self, id: RecordId) -> StoreResult<Event> {
        let row = sqlx::query("SELECT * FROM events WHERE id = $1")
            .bind(i64::from(id))
            .fetch_optional(self.pool())
            .await
            .map_err(|e| map_sqlx_error("get_event", e))?;
        match row {
            Some(row) => decode_one("get_event", &row, event),
            None => missing("event", id),
        }
    }

    #[instrument(skip(self), err)]
    async fn replace_event(&self, id: RecordId, input: EventInput) -> StoreResult<Change<Event>> {
        let before = self.get_event(id).await?;
        let row = sqlx::query(
            "UPDATE events SET name = $2, department = $3, start_time = $4, end_time = $5 WHERE id = $1 RETURNING *",
        )
        .bind(i64::from(id))
        .bind(&input.name)
        .bind(&input.department)
        .bind(input.start_time)
        .bind(input.end_time)
        .fetch_optional(self.pool())
        .await
        .map_err(|e| map_sqlx_error("replace_event", e))?;
        match row {
            Some(row) => Ok(Change {
                before,
                after: decode_one("replace_event", &row, event)?,
            }),
            None => missing("event", id),
        }
    }

    #[instrument(skip(self), err)]
    async fn delete_event(&self, id: RecordId) -> StoreResult<Event> {
        let row = sqlx::query("DELETE FROM events WHERE id = $1 RETURNING *")
            .bind(i64::from(id))
            .fetch_optional(self.pool())
            .await
            .map_err(|e| map_sqlx_error("delete_event", e))?;
        match row {
            Some(row) => decode_one("delete_event", &row, event),
            None => missing("event", id),
        }
    }

    // ─── pcl ───

    #[instrument(skip(self), err)]
    async fn create_pcl(&self, input: PclInput) -> StoreResult<PclRecord> {
        let row = sqlx::query(
            "INSERT INTO pcl_records (line, downtime_minutes, date, note) VALUES ($1, $2, $3, $4) RETURNING *",
        )
        .bind(&input.line)
        .bind(input.downtime_minutes)
        .bind(input.date)
        .bind(&input.note)
        .fetch_one(self.pool())
        .await
        .map_err(|e| map_sqlx_error("create_pcl", e))?;
        decode_one("create_pcl", &row, pcl)
    }

    #[instrument(skip(self), err)]
    async fn list_pcl(&self, line: Option<&str>, page: Page) -> StoreResult<Vec<PclRecord>> {
        let rows = sqlx::query(
            "SELECT * FROM pcl_records WHERE ($1::text IS NULL OR line = $1) ORDER BY id DESC LIMIT $2 OFFSET $3",
        )
        .bind(line)
        .bind(page.limit)
        .bind(page.skip)
        .fetch_all(self.pool())
        .await
        .map_err(|e| map_sqlx_error("list_pcl", e))?;
        decode_all("list_pcl", &rows, pcl)
    }

    #[instrument(skip(self), err)]
    async fn get_pcl(&self, id: RecordId) -> StoreResult<PclRecord> {
        let row = sqlx::query("SELECT * FROM pcl_records WHERE id = $1")
            .bind(i64::from(id))
            .fetch_optional(self.pool())
            .await
            .map_err(|e| map_sqlx_error("get_pcl", e))?;
        match row {
            Some(row) => decode_one("get_pcl", &row, pcl),
            None => missing("pcl record", id),
        }
    }

    #[instrument(skip(self), err)]
    async fn replace_pcl(&self, id: RecordId, input: PclInput) -> StoreResult<Change<PclRecord>> {
        let before = self.get_pcl(id).await?;
        let row = sqlx::query(
            "UPDATE pcl_records SET line = $2, downtime_minutes = $3, date = $4, note = $5 WHERE id = $1 RETURNING *",
        )
        .bind(i64::from(id))
        .bind(&input.line)
        .bind(input.downtime_minutes)
        .bind(input.date)
        .bind(&input.note)
        .fetch_optional(self.pool())
        .await
        .map_err(|e| map_sqlx_error("replace_pcl", e))?;
        match row {
            Some(row) => Ok(Change {
                before,
                after: decode_one("replace_pcl", &row, pcl)?,
            }),
            None => missing("pcl record", id),
        }
    }

    #[instrument(skip(self), err)]
    async fn delete_pcl(&self, id: RecordId) -> StoreResult<PclRecord> {
        let row = sqlx::query("DELETE FROM pcl_records WHERE id = $1 RETURNING *")
            .bind(i64::from(id))
            .fetch_optional(self.pool())
            .await
            .map_err(|e| map_sqlx_error("delete_pcl", e))?;
        match row {
            Some(row) => decode_one("delete_pcl", &row, pcl),
            None => missing("pcl record", id),
        }
    }

    // ─── assembly ───

    #[instrument(skip(self), err)]
    async fn create_assembly(&self, input: AssemblyInput) -> StoreResult<AssemblyOutput> {
        let row = sqlx::query(
            "INSERT INTO assembly_output (line, date, shift, planned, actual) VALUES ($1, $2, $3, $4, $5) RETURNING *",
        )
        .bind(&input.line)
        .bind(input.date)
        .bind(input.shift.as_str())
        .bind(input.planned)
        .bind(input.actual)
        .fetch_one(self.pool())
        .await
        .map_err(|e| map_sqlx_error("create_assembly", e))?;
        decode_one("create_assembly", &row, assembly)
    }

    #[instrument(skip(self), err)]
    async fn list_assembly(&self, filter: &AssemblyFilter, page: Page) -> StoreResult<Vec<AssemblyOutput>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM assembly_output
            WHERE ($1::text IS NULL OR line = $1)
                AND ($2::text IS NULL OR shift = $2)
                AND ($3::date IS NULL OR date >= $3)
                AND ($4::date IS NULL OR date <= $4)
            ORDER BY date DESC, id DESC
            LIMIT $5 OFFSET $6
            "#,
        )
        .bind(filter.line.as_deref())
        .bind(filter.shift.map(|s| s.as_str()))
        .bind(filter.dates.start)
        .bind(filter.dates.end)
        .bind(page.limit)
        .bind(page.skip)
        .fetch_all(self.pool())
        .await
        .map_err(|e| map_sqlx_error("list_assembly", e))?;
        decode_all("list_assembly", &rows, assembly)
    }

    #[instrument(skip(self), err)]
    async fn get_assembly(&self, id: RecordId) -> StoreResult<AssemblyOutput> {
        let row = sqlx::query("SELECT * FROM assembly_output WHERE id = $1")
            .bind(i64::from(id))
            .fetch_optional(self.pool())
            .await
            .map_err(|e| map_sqlx_error("get_assembly", e))?;
        match row {
            Some(row) => decode_one("get_assembly", &row, assembly),
            None => missing("assembly record", id),
        }
    }

    #[instrument(skip(self), err)]
    async fn replace_assembly(&self, id: RecordId, input: AssemblyInput) -> StoreResult<Change<AssemblyOutput>> {
        let before = self.get_assembly(id).await?;
        let row = sqlx::query(
            r#"
            UPDATE assembly_output SET line = $2, date = $3, shift = $4, planned = $5, actual = $6
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(i64::from(id))
        .bind(&input.line)
        .bind(input.date)
        .bind(input.shift.as_str())
        .bind(input.planned)
        .bind(input.actual)
        .fetch_optional(self.pool())
        .await
        .map_err(|e| map_sqlx_error("replace_assembly", e))?;
        match row {
            Some(row) => Ok(Change {
                before,
                after: decode_one("replace_assembly", &row, assembly)?,
            }),
            None => missing("assembly record", id),
        }
    }

    #[instrument(skip(self), err)]
    async fn delete_assembly(&self, id: RecordId) -> StoreResult<AssemblyOutput> {
        let row = sqlx::query("DELETE FROM assembly_output WHERE id = $1 RETURNING *")
            .bind(i64::from(id))
            .fetch_optional(self.pool())
            .await
            .map_err(|e| map_sqlx_error("delete_assembly", e))?;
        match row {
            Some(row) => decode_one("delete_assembly", &row, assembly),
            None => missing("assembly record", id),
        }
    }
}
