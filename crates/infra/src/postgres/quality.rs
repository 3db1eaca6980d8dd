use async_trait::async_trait;
use sqlx::{Postgres, Transaction};
use tracing::instrument;

use datalink_core::{Change, RecordId, UpsertReport, YearMonth};
use datalink_quality::{KpiSheet, MonthlyTotal, MonthlyTotalInput, QaEntry, QaEntryInput, QaKpi, QaMisc, QaMiscInput};

use super::PostgresStore;
use super::rows::{decode_all, decode_one, monthly_total, qa_entry, qa_kpi, qa_misc};
use crate::error::{StoreError, StoreResult, map_sqlx_error};
use crate::store::{QualityStore, missing};

#[async_trait]
impl QualityStore for PostgresStore {
    #[instrument(skip(self), err)]
    async fn create_qa(&self, input: QaEntryInput) -> StoreResult<QaEntry> {
        let row = sqlx::query(
            r#"
            INSERT INTO qa_entries (line, day, month, year, value, scrap)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(&input.line)
        .bind(input.day)
        .bind(input.month)
        .bind(input.year)
        .bind(input.value)
        .bind(input.scrap)
        .fetch_one(self.pool())
        .await
        .map_err(|e| map_sqlx_error("create_qa", e))?;
        decode_one("create_qa", &row, qa_entry)
    }

    #[instrument(skip(self), err)]
    async fn list_qa(&self, period: YearMonth, scrap: Option<bool>) -> StoreResult<Vec<QaEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM qa_entries
            WHERE year = $1 AND month = $2 AND ($3::boolean IS NULL OR scrap = $3)
            ORDER BY id
            "#,
        )
        .bind(period.year)
        .bind(period.month)
        .bind(scrap)
        .fetch_all(self.pool())
        .await
        .map_err(|e| map_sqlx_error("list_qa", e))?;
        decode_all("list_qa", &rows, qa_entry)
    }

    #[instrument(skip(self, inputs), fields(count = inputs.len()), err)]
    async fn upsert_qa(&self, inputs: Vec<QaEntryInput>) -> StoreResult<UpsertReport<QaEntry>> {
        let mut tx = self.begin().await?;
        let mut report = UpsertReport::default();
        for input in inputs {
            let existing = sqlx::query(
                r#"
                SELECT * FROM qa_entries
                WHERE line = $1 AND day = $2 AND month = $3 AND year = $4 AND scrap = $5
                FOR UPDATE
                "#,
            )
            .bind(&input.line)
            .bind(input.day)
            .bind(input.month)
            .bind(input.year)
            .bind(input.scrap)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("upsert_qa", e))?;

            match existing {
                Some(row) => {
                    let before = decode_one("upsert_qa", &row, qa_entry)?;
                    let row = sqlx::query("UPDATE qa_entries SET value = $2 WHERE id = $1 RETURNING *")
                        .bind(i64::from(before.id))
                        .bind(input.value)
                        .fetch_one(&mut *tx)
                        .await
                        .map_err(|e| map_sqlx_error("upsert_qa", e))?;
                    let after = decode_one("upsert_qa", &row, qa_entry)?;
                    report.updated.push(Change { before, after });
                }
                None => {
                    let row = sqlx::query(
                        r#"
                        INSERT INTO qa_entries (line, day, month, year, value, scrap)
                        VALUES ($1, $2, $3, $4, $5, $6)
                        RETURNING *
                        "#,
                    )
                    .bind(&input.line)
                    .bind(input.day)
                    .bind(input.month)
                    .bind(input.year)
                    .bind(input.value)
                    .bind(input.scrap)
                    .fetch_one(&mut *tx)
                    .await
                    .map_err(|e| map_sqlx_error("upsert_qa", e))?;
                    report.created.push(decode_one("upsert_qa", &row, qa_entry)?);
                }
            }
        }
        tx.commit().await.map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(report)
    }

    #[instrument(skip(self), err)]
    async fn delete_qa(&self, id: RecordId) -> StoreResult<QaEntry> {
        let row = sqlx::query("DELETE FROM qa_entries WHERE id = $1 RETURNING *")
            .bind(i64::from(id))
            .fetch_optional(self.pool())
            .await
            .map_err(|e| map_sqlx_error("delete_qa", e))?;
        match row {
            Some(row) => decode_one("delete_qa", &row, qa_entry),
            None => missing("qa entry", id),
        }
    }

    #[instrument(skip(self), err)]
    async fn create_qa_misc(&self, input: QaMiscInput) -> StoreResult<QaMisc> {
        let row = sqlx::query(
            r#"
            INSERT INTO qa_misc (month, year, supplier_defect, formal_amount, informal_amount,
                                 qc_ignore_amount, scrap_rate_c, scrap_rate_m, ftt_tjm, ftt_tjc)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING *
            "#,
        )
        .bind(input.month)
        .bind(input.year)
        .bind(input.supplier_defect)
        .bind(input.formal_amount)
        .bind(input.informal_amount)
        .bind(input.qc_ignore_amount)
        .bind(input.scrap_rate_c)
        .bind(input.scrap_rate_m)
        .bind(input.ftt_tjm)
        .bind(input.ftt_tjc)
        .fetch_one(self.pool())
        .await
        .map_err(|e| map_sqlx_error("create_qa_misc", e))?;
        decode_one("create_qa_misc", &row, qa_misc)
    }

    #[instrument(skip(self), err)]
    async fn list_qa_misc(&self, year: Option<i32>, month: Option<i32>) -> StoreResult<Vec<QaMisc>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM qa_misc
            WHERE ($1::integer IS NULL OR year = $1) AND ($2::integer IS NULL OR month = $2)
            ORDER BY id
            "#,
        )
        .bind(year)
        .bind(month)
        .fetch_all(self.pool())
        .await
        .map_err(|e| map_sqlx_error("list_qa_misc", e))?;
        decode_all("list_qa_misc", &rows, qa_misc)
    }

    #[instrument(skip(self), err)]
    async fn replace_qa_misc(&self, id: RecordId, input: QaMiscInput) -> StoreResult<Change<QaMisc>> {
        let mut tx = self.begin().await?;
        let row = sqlx::query("SELECT * FROM qa_misc WHERE id = $1 FOR UPDATE")
            .bind(i64::from(id))
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("replace_qa_misc", e))?;
        let Some(row) = row else {
            return missing("quality figures", id);
        };
        let before = decode_one("replace_qa_misc", &row, qa_misc)?;
        let row = sqlx::query(
            r#"
            UPDATE qa_misc SET
                month = $2, year = $3, supplier_defect = $4, formal_amount = $5, informal_amount = $6,
                qc_ignore_amount = $7, scrap_rate_c = $8, scrap_rate_m = $9, ftt_tjm = $10, ftt_tjc = $11
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(i64::from(id))
        .bind(input.month)
        .bind(input.year)
        .bind(input.supplier_defect)
        .bind(input.formal_amount)
        .bind(input.informal_amount)
        .bind(input.qc_ignore_amount)
        .bind(input.scrap_rate_c)
        .bind(input.scrap_rate_m)
        .bind(input.ftt_tjm)
        .bind(input.ftt_tjc)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("replace_qa_misc", e))?;
        let after = decode_one("replace_qa_misc", &row, qa_misc)?;
        tx.commit().await.map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(Change { before, after })
    }

    #[instrument(skip(self), err)]
    async fn delete_qa_misc(&self, id: RecordId) -> StoreResult<QaMisc> {
        let row = sqlx::query("DELETE FROM qa_misc WHERE id = $1 RETURNING *")
            .bind(i64::from(id))
            .fetch_optional(self.pool())
            .await
            .map_err(|e| map_sqlx_error("delete_qa_misc", e))?;
        match row {
            Some(row) => decode_one("delete_qa_misc", &row, qa_misc),
            None => missing("quality figures", id),
        }
    }

    #[instrument(skip(self), err)]
    async fn kpi_sheet(&self, period: YearMonth) -> StoreResult<Vec<QaKpi>> {
        let rows = sqlx::query("SELECT * FROM qa_kpi WHERE year = $1 AND month = $2 ORDER BY id")
            .bind(period.year)
            .bind(period.month)
            .fetch_all(self.pool())
            .await
            .map_err(|e| map_sqlx_error("kpi_sheet", e))?;
        decode_all("kpi_sheet", &rows, qa_kpi)
    }

    #[instrument(skip(self, sheet), fields(year = sheet.year, month = sheet.month), err)]
    async fn create_kpi_sheet(&self, sheet: KpiSheet) -> StoreResult<Vec<QaKpi>> {
        let mut tx = self.begin().await?;
        lock_kpi_month(&mut tx, &sheet, "create_kpi_sheet").await?;
        let (existing,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM qa_kpi WHERE year = $1 AND month = $2")
            .bind(sheet.year)
            .bind(sheet.month)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("create_kpi_sheet", e))?;
        if existing > 0 {
            return Err(StoreError::Conflict(format!(
                "KPI sheet for {}-{:02} already exists",
                sheet.year, sheet.month
            )));
        }
        let after = insert_kpi_rows(&mut tx, &sheet, "create_kpi_sheet").await?;
        tx.commit().await.map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(after)
    }

    #[instrument(skip(self, sheet), fields(year = sheet.year, month = sheet.month), err)]
    async fn replace_kpi_sheet(&self, sheet: KpiSheet) -> StoreResult<Change<Vec<QaKpi>>> {
        let mut tx = self.begin().await?;
        lock_kpi_month(&mut tx, &sheet, "replace_kpi_sheet").await?;
        let rows = sqlx::query("DELETE FROM qa_kpi WHERE year = $1 AND month = $2 RETURNING *")
            .bind(sheet.year)
            .bind(sheet.month)
            .fetch_all(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("replace_kpi_sheet", e))?;
        let mut before = decode_all("replace_kpi_sheet", &rows, qa_kpi)?;
        before.sort_by_key(|k| k.id);

        let after = insert_kpi_rows(&mut tx, &sheet, "replace_kpi_sheet").await?;
        tx.commit().await.map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(Change { before, after })
    }

    #[instrument(skip(self), err)]
    async fn monthly_totals(&self, period: YearMonth) -> StoreResult<Vec<MonthlyTotal>> {
        let rows = sqlx::query("SELECT * FROM qa_monthly_totals WHERE year = $1 AND month = $2 ORDER BY id")
            .bind(period.year)
            .bind(period.month)
            .fetch_all(self.pool())
            .await
            .map_err(|e| map_sqlx_error("monthly_totals", e))?;
        decode_all("monthly_totals", &rows, monthly_total)
    }

    #[instrument(skip(self, inputs), fields(count = inputs.len()), err)]
    async fn upsert_monthly_totals(&self, inputs: Vec<MonthlyTotalInput>) -> StoreResult<UpsertReport<MonthlyTotal>> {
        let mut tx = self.begin().await?;
        let mut report = UpsertReport::default();
        for input in inputs {
            let existing = sqlx::query(
                "SELECT * FROM qa_monthly_totals WHERE line = $1 AND month = $2 AND year = $3 FOR UPDATE",
            )
            .bind(&input.line)
            .bind(input.month)
            .bind(input.year)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("upsert_monthly_totals", e))?;

            match existing {
                Some(row) => {
                    let before = decode_one("upsert_monthly_totals", &row, monthly_total)?;
                    let row = sqlx::query("UPDATE qa_monthly_totals SET amount = $2 WHERE id = $1 RETURNING *")
                        .bind(i64::from(before.id))
                        .bind(input.amount)
                        .fetch_one(&mut *tx)
                        .await
                        .map_err(|e| map_sqlx_error("upsert_monthly_totals", e))?;
                    let after = decode_one("upsert_monthly_totals", &row, monthly_total)?;
                    report.updated.push(Change { before, after });
                }
                None => {
                    let row = sqlx::query(
                        "INSERT INTO qa_monthly_totals (line, month, year, amount) VALUES ($1, $2, $3, $4) RETURNING *",
                    )
                    .bind(&input.line)
                    .bind(input.month)
                    .bind(input.year)
                    .bind(input.amount)
                    .fetch_one(&mut *tx)
                    .await
                    .map_err(|e| map_sqlx_error("upsert_monthly_totals", e))?;
                    report.created.push(decode_one("upsert_monthly_totals", &row, monthly_total)?);
                }
            }
        }
        tx.commit().await.map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(report)
    }
}

/// Serialize writers of one month's KPI sheet until the transaction ends.
async fn lock_kpi_month(tx: &mut Transaction<'static, Postgres>, sheet: &KpiSheet, operation: &str) -> StoreResult<()> {
    sqlx::query("SELECT pg_advisory_xact_lock(hashtext('qa_kpi'), $1)")
        .bind(sheet.year * 100 + sheet.month)
        .execute(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error(operation, e))?;
    Ok(())
}

async fn insert_kpi_rows(
    tx: &mut Transaction<'static, Postgres>,
    sheet: &KpiSheet,
    operation: &str,
) -> StoreResult<Vec<QaKpi>> {
    let mut rows = Vec::with_capacity(sheet.items.len());
    for item in &sheet.items {
        let row = sqlx::query(
            r#"
            INSERT INTO qa_kpi (month, year, area, description, new_factory, old_factory, total)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(sheet.month)
        .bind(sheet.year)
        .bind(&item.area)
        .bind(&item.description)
        .bind(item.new_factory)
        .bind(item.old_factory)
        .bind(item.total)
        .fetch_one(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error(operation, e))?;
        rows.push(decode_one(operation, &row, qa_kpi)?);
    }
    Ok(rows)
}
