//! Row decoders. Domain types live in other crates, so rows are decoded by
//! hand instead of through `FromRow`.

use core::fmt::Display;

use sqlx::Row;
use sqlx::postgres::PgRow;

use datalink_activity::Activity;
use datalink_auth::{Grant, Permission, RouteEntry};
use datalink_core::{ActivityId, DepartmentId, PermissionId, RecordId, RoleId, RouteId, Shift, UserId};
use datalink_maintenance::{DailyTask, DowntimeRecord, DowntimeStatus, MaintenanceMetric, WeeklyTask};
use datalink_plant::{AssemblyOutput, EhsWeek, Event, PclRecord};
use datalink_quality::{MonthlyTotal, QaEntry, QaKpi, QaMisc};

use crate::error::{StoreResult, map_sqlx_error};
use crate::model::{Department, UserRecord};

pub(super) type Decode<T> = fn(&PgRow) -> Result<T, sqlx::Error>;

pub(super) fn decode_one<T>(operation: &str, row: &PgRow, decode: Decode<T>) -> StoreResult<T> {
    decode(row).map_err(|e| map_sqlx_error(operation, e))
}

pub(super) fn decode_all<T>(operation: &str, rows: &[PgRow], decode: Decode<T>) -> StoreResult<Vec<T>> {
    rows.iter().map(|r| decode_one(operation, r, decode)).collect()
}

fn column_error(column: &str, err: impl Display) -> sqlx::Error {
    sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: err.to_string().into(),
    }
}

fn shift(row: &PgRow, column: &str) -> Result<Shift, sqlx::Error> {
    let raw: String = row.try_get(column)?;
    Shift::parse(&raw).map_err(|e| column_error(column, e))
}

fn record_id(row: &PgRow) -> Result<RecordId, sqlx::Error> {
    Ok(RecordId::new(row.try_get("id")?))
}

fn opt_user(row: &PgRow) -> Result<Option<UserId>, sqlx::Error> {
    Ok(row.try_get::<Option<i64>, _>("user_id")?.map(UserId::new))
}

pub(super) fn department(row: &PgRow) -> Result<Department, sqlx::Error> {
    Ok(Department {
        id: DepartmentId::new(row.try_get("id")?),
        name: row.try_get("name")?,
        description: row.try_get("description")?,
    })
}

/// Expects a `role_ids BIGINT[]` column next to the user columns.
pub(super) fn user(row: &PgRow) -> Result<UserRecord, sqlx::Error> {
    let role_ids: Vec<i64> = row.try_get("role_ids")?;
    Ok(UserRecord {
        id: UserId::new(row.try_get("id")?),
        name: row.try_get("name")?,
        department_id: row.try_get::<Option<i64>, _>("department_id")?.map(DepartmentId::new),
        password_hash: row.try_get("password_hash")?,
        is_active: row.try_get("is_active")?,
        role_ids: role_ids.into_iter().map(RoleId::new).collect(),
        created_at: row.try_get("created_at")?,
    })
}

pub(super) fn permission(row: &PgRow) -> Result<Permission, sqlx::Error> {
    let module: String = row.try_get("module")?;
    let level: String = row.try_get("level")?;
    Ok(Permission {
        id: PermissionId::new(row.try_get("id")?),
        grant: Grant {
            module: module.parse().map_err(|e| column_error("module", e))?,
            level: level.parse().map_err(|e| column_error("level", e))?,
            department_id: row.try_get::<Option<i64>, _>("department_id")?.map(DepartmentId::new),
        },
    })
}

pub(super) fn route(row: &PgRow) -> Result<RouteEntry, sqlx::Error> {
    Ok(RouteEntry {
        id: RouteId::new(row.try_get("id")?),
        path: row.try_get("path")?,
        name: row.try_get("name")?,
        component: row.try_get("component")?,
        meta: row.try_get("meta")?,
        parent_id: row.try_get::<Option<i64>, _>("parent_id")?.map(RouteId::new),
        sort_order: row.try_get("sort_order")?,
    })
}

pub(super) fn qa_entry(row: &PgRow) -> Result<QaEntry, sqlx::Error> {
    Ok(QaEntry {
        id: record_id(row)?,
        line: row.try_get("line")?,
        day: row.try_get("day")?,
        month: row.try_get("month")?,
        year: row.try_get("year")?,
        value: row.try_get("value")?,
        scrap: row.try_get("scrap")?,
    })
}

pub(super) fn qa_misc(row: &PgRow) -> Result<QaMisc, sqlx::Error> {
    Ok(QaMisc {
        id: record_id(row)?,
        month: row.try_get("month")?,
        year: row.try_get("year")?,
        supplier_defect: row.try_get("supplier_defect")?,
        formal_amount: row.try_get("formal_amount")?,
        informal_amount: row.try_get("informal_amount")?,
        qc_ignore_amount: row.try_get("qc_ignore_amount")?,
        scrap_rate_c: row.try_get("scrap_rate_c")?,
        scrap_rate_m: row.try_get("scrap_rate_m")?,
        ftt_tjm: row.try_get("ftt_tjm")?,
        ftt_tjc: row.try_get("ftt_tjc")?,
    })
}

pub(super) fn qa_kpi(row: &PgRow) -> Result<QaKpi, sqlx::Error> {
    Ok(QaKpi {
        id: record_id(row)?,
        month: row.try_get("month")?,
        year: row.try_get("year")?,
        area: row.try_get("area")?,
        description: row.try_get("description")?,
        new_factory: row.try_get("new_factory")?,
        old_factory: row.try_get("old_factory")?,
        total: row.try_get("total")?,
    })
}

pub(super) fn monthly_total(row: &PgRow) -> Result<MonthlyTotal, sqlx::Error> {
    Ok(MonthlyTotal {
        id: record_id(row)?,
        line: row.try_get("line")?,
        month: row.try_get("month")?,
        year: row.try_get("year")?,
        amount: row.try_get("amount")?,
    })
}

pub(super) fn ehs_week(row: &PgRow) -> Result<EhsWeek, sqlx::Error> {
    Ok(EhsWeek {
        id: record_id(row)?,
        week: row.try_get("week")?,
        year: row.try_get("year")?,
        lwd: row.try_get("lwd")?,
    })
}

pub(super) fn event(row: &PgRow) -> Result<Event, sqlx::Error> {
    Ok(Event {
        id: record_id(row)?,
        name: row.try_get("name")?,
        department: row.try_get("department")?,
        start_time: row.try_get("start_time")?,
        end_time: row.try_get("end_time")?,
    })
}

pub(super) fn pcl(row: &PgRow) -> Result<PclRecord, sqlx::Error> {
    Ok(PclRecord {
        id: record_id(row)?,
        line: row.try_get("line")?,
        downtime_minutes: row.try_get("downtime_minutes")?,
        date: row.try_get("date")?,
        note: row.try_get("note")?,
    })
}

pub(super) fn assembly(row: &PgRow) -> Result<AssemblyOutput, sqlx::Error> {
    Ok(AssemblyOutput {
        id: record_id(row)?,
        line: row.try_get("line")?,
        date: row.try_get("date")?,
        shift: shift(row, "shift")?,
        planned: row.try_get("planned")?,
        actual: row.try_get("actual")?,
    })
}

pub(super) fn metric(row: &PgRow) -> Result<MaintenanceMetric, sqlx::Error> {
    Ok(MaintenanceMetric {
        id: record_id(row)?,
        equipment_type: row.try_get("equipment_type")?,
        shift: shift(row, "shift")?,
        date: row.try_get("date")?,
        downtime_count: row.try_get("downtime_count")?,
        downtime_minutes: row.try_get("downtime_minutes")?,
        parts_produced: row.try_get("parts_produced")?,
        user_id: opt_user(row)?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

pub(super) fn downtime(row: &PgRow) -> Result<DowntimeRecord, sqlx::Error> {
    let status: String = row.try_get("status")?;
    Ok(DowntimeRecord {
        id: record_id(row)?,
        line: row.try_get("line")?,
        shift: shift(row, "shift")?,
        date: row.try_get("date")?,
        status: DowntimeStatus::parse(&status).map_err(|e| column_error("status", e))?,
        downtime_minutes: row.try_get("downtime_minutes")?,
        equipment_name: row.try_get("equipment_name")?,
        fault_description: row.try_get("fault_description")?,
        resolution: row.try_get("resolution")?,
        reporter_name: row.try_get("reporter_name")?,
        maintainer_name: row.try_get("maintainer_name")?,
        user_id: opt_user(row)?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

pub(super) fn daily(row: &PgRow) -> Result<DailyTask, sqlx::Error> {
    Ok(DailyTask {
        id: record_id(row)?,
        date: row.try_get("date")?,
        user_id: UserId::new(row.try_get("user_id")?),
        title: row.try_get("title")?,
        location: row.try_get("location")?,
        kind: row.try_get("kind")?,
        content: row.try_get("content")?,
        solved: row.try_get("solved")?,
    })
}

pub(super) fn weekly(row: &PgRow) -> Result<WeeklyTask, sqlx::Error> {
    Ok(WeeklyTask {
        id: record_id(row)?,
        user_id: UserId::new(row.try_get("user_id")?),
        date: row.try_get("date")?,
        title: row.try_get("title")?,
        location: row.try_get("location")?,
        content: row.try_get("content")?,
        degree: row.try_get("degree")?,
        solved: row.try_get("solved")?,
    })
}

pub(super) fn activity(row: &PgRow) -> Result<Activity, sqlx::Error> {
    Ok(Activity {
        id: ActivityId::new(row.try_get("id")?),
        title: row.try_get("title")?,
        action: row.try_get("action")?,
        details: row.try_get("details")?,
        kind: row.try_get("kind")?,
        icon: row.try_get("icon")?,
        color: row.try_get("color")?,
        target: row.try_get("target")?,
        changes_before: row.try_get("changes_before")?,
        changes_after: row.try_get("changes_after")?,
        user_id: opt_user(row)?,
        user_name: row.try_get("user_name")?,
        department: row.try_get("department")?,
        created_at: row.try_get("created_at")?,
    })
}
