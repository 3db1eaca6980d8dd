//! Maintenance: shift metrics and their KPI views, downtime tickets, and the
//! daily/weekly task logs (weekly tasks are also served as "issues").
//! MAINT READ for reads, MAINT WRITE for changes.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query},
    routing::{get, put},
};
use chrono::{Duration, NaiveDate, Utc};

use datalink_activity::{ActionType, DataChange};
use datalink_auth::{Module, PermissionLevel};
use datalink_core::{DateBounds, DateRange, Page, RecordId};
use datalink_maintenance::{
    DailyTaskInput, DailyTaskUpdate, DowntimeFilter, DowntimeInput, DowntimeStatus, DowntimeUpdate, MetricFilter,
    MetricInput, MetricView, TaskFilter, WeeklyTaskInput, WeeklyTaskUpdate, kpi,
};

use crate::app::dto;
use crate::app::errors::{ApiResult, domain_error_to_response, store_error_to_response};
use crate::app::routes::common::{created, dates, no_content, ok, page, shift};
use crate::app::services::AppServices;
use crate::authz::require;
use crate::context::CurrentUser;

pub fn router() -> Router {
    Router::new()
        .route("/metrics", get(list_metrics).post(create_metric))
        .route("/metrics/stats", get(metric_stats))
        .route("/metrics/:id", put(replace_metric).delete(delete_metric))
        .route("/downtime-records", get(list_downtime).post(create_downtime))
        .route(
            "/downtime-records/:id",
            get(get_downtime).put(update_downtime).delete(delete_downtime),
        )
        .route("/charts/oee-trend", get(oee_trend))
        .route("/charts/mttr-mtbf-trend", get(mttr_mtbf_trend))
        .route("/charts/line-comparison", get(line_comparison))
        .route("/daily", get(list_daily).post(create_daily))
        .route("/daily/:id", get(get_daily).put(update_daily).delete(delete_daily))
        .route("/weekly", get(list_weekly).post(create_weekly))
        .route("/weekly/:id", get(get_weekly).put(update_weekly).delete(delete_weekly))
        .route("/issues", get(list_weekly).post(create_weekly))
        .route("/issues/:id", get(get_weekly).put(update_weekly).delete(delete_weekly))
}

const MODULE: &str = "MAINT";
const TARGET: &str = "/maintenance";

/// Window used by stats and charts when the caller gives no dates.
const DEFAULT_WINDOW_DAYS: i64 = 30;

/// Aggregates read every matching row, past the list page cap.
const EVERYTHING: Page = Page { skip: 0, limit: i64::MAX };

fn window(start: Option<NaiveDate>, end: Option<NaiveDate>) -> ApiResult<DateRange> {
    let today = Utc::now().date_naive();
    let end = end.unwrap_or(today);
    let start = start.unwrap_or(end - Duration::days(DEFAULT_WINDOW_DAYS));
    DateRange::new(start, end).map_err(domain_error_to_response)
}

fn metric_filter(q: &dto::MetricQuery) -> ApiResult<MetricFilter> {
    Ok(MetricFilter {
        equipment_type: q.equipment_type.clone().filter(|e| !e.trim().is_empty()),
        shift: shift(q.shift.as_deref())?,
        user_id: q.user_id,
        dates: dates(q.start_date, q.end_date)?,
    })
}

fn task_filter(q: &dto::TaskQuery) -> TaskFilter {
    TaskFilter {
        user_id: q.user_id,
        start_date: q.start_date,
        solved: q.solved,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Metrics
// ─────────────────────────────────────────────────────────────────────────────

pub async fn list_metrics(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(user): Extension<CurrentUser>,
    Query(q): Query<dto::MetricQuery>,
) -> ApiResult {
    require(&user, Module::Maint, PermissionLevel::Read)?;
    let page = page(q.skip, q.limit, 100)?;
    let filter = metric_filter(&q)?;
    let metrics = services
        .store
        .list_metrics(&filter, page)
        .await
        .map_err(store_error_to_response)?;
    let views: Vec<MetricView> = metrics.into_iter().map(MetricView::from).collect();
    Ok(ok(views))
}

pub async fn create_metric(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(user): Extension<CurrentUser>,
    Json(body): Json<MetricInput>,
) -> ApiResult {
    require(&user, Module::Maint, PermissionLevel::Write)?;
    let input = body.validate().map_err(domain_error_to_response)?;

    let metric = services
        .store
        .create_metric(input, Some(user.user_id()))
        .await
        .map_err(store_error_to_response)?;
    tracing::info!(metric_id = %metric.id, equipment = %metric.equipment_type, "maintenance metric created");
    services
        .record(
            &user,
            DataChange::new(
                MODULE,
                ActionType::Create,
                "Created maintenance metric",
                format!("recorded {} on {}", metric.equipment_type, metric.date),
            )
            .after(&metric)
            .target(TARGET),
        )
        .await;
    Ok(created(MetricView::from(metric)))
}

pub async fn replace_metric(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<RecordId>,
    Json(body): Json<MetricInput>,
) -> ApiResult {
    require(&user, Module::Maint, PermissionLevel::Write)?;
    let input = body.validate().map_err(domain_error_to_response)?;

    let change = services
        .store
        .replace_metric(id, input)
        .await
        .map_err(store_error_to_response)?;
    tracing::info!(metric_id = %id, "maintenance metric updated");
    services
        .record(
            &user,
            DataChange::new(
                MODULE,
                ActionType::Update,
                "Updated maintenance metric",
                format!("updated {} on {}", change.after.equipment_type, change.after.date),
            )
            .before(&change.before)
            .after(&change.after)
            .target(TARGET),
        )
        .await;
    Ok(ok(MetricView::from(change.after)))
}

pub async fn delete_metric(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<RecordId>,
) -> ApiResult {
    require(&user, Module::Maint, PermissionLevel::Write)?;
    let removed = services.store.delete_metric(id).await.map_err(store_error_to_response)?;
    tracing::info!(metric_id = %id, "maintenance metric deleted");
    services
        .record(
            &user,
            DataChange::new(
                MODULE,
                ActionType::Delete,
                "Deleted maintenance metric",
                format!("deleted {} on {}", removed.equipment_type, removed.date),
            )
            .before(&removed)
            .target(TARGET),
        )
        .await;
    Ok(no_content())
}

/// GET /maint/metrics/stats: MTTR/MTBF/availability/OEE over the filtered
/// rows, overall and per equipment type. Defaults to the last 30 days.
pub async fn metric_stats(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(user): Extension<CurrentUser>,
    Query(q): Query<dto::MetricQuery>,
) -> ApiResult {
    require(&user, Module::Maint, PermissionLevel::Read)?;
    let range = window(q.start_date, q.end_date)?;
    let filter = MetricFilter {
        dates: DateBounds {
            start: Some(range.start),
            end: Some(range.end),
        },
        ..metric_filter(&q)?
    };
    let metrics = services
        .store
        .list_metrics(&filter, EVERYTHING)
        .await
        .map_err(store_error_to_response)?;
    Ok(ok(kpi::stats(&metrics)))
}

// ─────────────────────────────────────────────────────────────────────────────
// Charts
// ─────────────────────────────────────────────────────────────────────────────

async fn chart_rows(
    services: &AppServices,
    equipment_type: Option<String>,
    range: DateRange,
) -> ApiResult<Vec<datalink_maintenance::MaintenanceMetric>> {
    let filter = MetricFilter {
        equipment_type: equipment_type.filter(|e| !e.trim().is_empty()),
        dates: DateBounds {
            start: Some(range.start),
            end: Some(range.end),
        },
        ..MetricFilter::default()
    };
    services
        .store
        .list_metrics(&filter, EVERYTHING)
        .await
        .map_err(store_error_to_response)
}

pub async fn oee_trend(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(user): Extension<CurrentUser>,
    Query(q): Query<dto::ChartQuery>,
) -> ApiResult {
    require(&user, Module::Maint, PermissionLevel::Read)?;
    let range = window(q.start_date, q.end_date)?;
    let rows = chart_rows(&services, q.equipment_type.clone(), range).await?;
    Ok(ok(serde_json::json!({
        "start_date": range.start,
        "end_date": range.end,
        "equipment_type": q.equipment_type,
        "trend_data": kpi::oee_trend(&rows),
    })))
}

pub async fn mttr_mtbf_trend(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(user): Extension<CurrentUser>,
    Query(q): Query<dto::ChartQuery>,
) -> ApiResult {
    require(&user, Module::Maint, PermissionLevel::Read)?;
    let range = window(q.start_date, q.end_date)?;
    let rows = chart_rows(&services, q.equipment_type.clone(), range).await?;
    Ok(ok(serde_json::json!({
        "start_date": range.start,
        "end_date": range.end,
        "equipment_type": q.equipment_type,
        "trend_data": kpi::mttr_mtbf_trend(&rows),
    })))
}

pub async fn line_comparison(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(user): Extension<CurrentUser>,
    Query(q): Query<dto::ChartQuery>,
) -> ApiResult {
    require(&user, Module::Maint, PermissionLevel::Read)?;
    let range = window(q.start_date, q.end_date)?;
    let rows = chart_rows(&services, None, range).await?;
    Ok(ok(serde_json::json!({
        "start_date": range.start,
        "end_date": range.end,
        "comparison_data": kpi::line_comparison(&rows, range),
    })))
}

// ─────────────────────────────────────────────────────────────────────────────
// Downtime records
// ─────────────────────────────────────────────────────────────────────────────

pub async fn list_downtime(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(user): Extension<CurrentUser>,
    Query(q): Query<dto::DowntimeQuery>,
) -> ApiResult {
    require(&user, Module::Maint, PermissionLevel::Read)?;
    let page = page(q.skip, q.limit, 100)?;
    let filter = DowntimeFilter {
        line: q.line.filter(|l| !l.trim().is_empty()),
        shift: shift(q.shift.as_deref())?,
        status: q
            .status
            .as_deref()
            .map(DowntimeStatus::parse)
            .transpose()
            .map_err(domain_error_to_response)?,
        user_id: q.user_id,
        dates: dates(q.start_date, q.end_date)?,
    };
    let records = services
        .store
        .list_downtime(&filter, page)
        .await
        .map_err(store_error_to_response)?;
    Ok(ok(records))
}

pub async fn get_downtime(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<RecordId>,
) -> ApiResult {
    require(&user, Module::Maint, PermissionLevel::Read)?;
    let record = services.store.get_downtime(id).await.map_err(store_error_to_response)?;
    Ok(ok(record))
}

pub async fn create_downtime(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(user): Extension<CurrentUser>,
    Json(body): Json<DowntimeInput>,
) -> ApiResult {
    require(&user, Module::Maint, PermissionLevel::Write)?;
    let input = body.validate().map_err(domain_error_to_response)?;

    let record = services
        .store
        .create_downtime(input, Some(user.user_id()))
        .await
        .map_err(store_error_to_response)?;
    tracing::info!(downtime_id = %record.id, line = %record.line, "downtime record created");
    services
        .record(
            &user,
            DataChange::new(
                MODULE,
                ActionType::Create,
                "Created downtime record",
                format!("reported {} down on line {}", record.equipment_name, record.line),
            )
            .after(&record)
            .target(TARGET),
        )
        .await;
    Ok(created(record))
}

/// PUT /maint/downtime-records/:id
///
/// Partial update; closing a ticket requires a resolution.
pub async fn update_downtime(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<RecordId>,
    Json(body): Json<DowntimeUpdate>,
) -> ApiResult {
    require(&user, Module::Maint, PermissionLevel::Write)?;

    let change = services
        .store
        .update_downtime(id, body)
        .await
        .map_err(store_error_to_response)?;
    tracing::info!(downtime_id = %id, status = %change.after.status.as_str(), "downtime record updated");
    services
        .record(
            &user,
            DataChange::new(
                MODULE,
                ActionType::Update,
                "Updated downtime record",
                format!("updated downtime on line {}", change.after.line),
            )
            .before(&change.before)
            .after(&change.after)
            .target(TARGET),
        )
        .await;
    Ok(ok(change.after))
}

pub async fn delete_downtime(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<RecordId>,
) -> ApiResult {
    require(&user, Module::Maint, PermissionLevel::Write)?;
    let removed = services
        .store
        .delete_downtime(id)
        .await
        .map_err(store_error_to_response)?;
    tracing::info!(downtime_id = %id, "downtime record deleted");
    services
        .record(
            &user,
            DataChange::new(
                MODULE,
                ActionType::Delete,
                "Deleted downtime record",
                format!("deleted downtime on line {}", removed.line),
            )
            .before(&removed)
            .target(TARGET),
        )
        .await;
    Ok(no_content())
}

// ─────────────────────────────────────────────────────────────────────────────
// Daily tasks
// ─────────────────────────────────────────────────────────────────────────────

pub async fn list_daily(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(user): Extension<CurrentUser>,
    Query(q): Query<dto::TaskQuery>,
) -> ApiResult {
    require(&user, Module::Maint, PermissionLevel::Read)?;
    let page = page(q.skip, q.limit, 100)?;
    let tasks = services
        .store
        .list_daily(&task_filter(&q), page)
        .await
        .map_err(store_error_to_response)?;
    Ok(ok(tasks))
}

pub async fn get_daily(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<RecordId>,
) -> ApiResult {
    require(&user, Module::Maint, PermissionLevel::Read)?;
    let task = services.store.get_daily(id).await.map_err(store_error_to_response)?;
    Ok(ok(task))
}

pub async fn create_daily(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(user): Extension<CurrentUser>,
    Json(body): Json<DailyTaskInput>,
) -> ApiResult {
    require(&user, Module::Maint, PermissionLevel::Write)?;
    let input = body.validate().map_err(domain_error_to_response)?;

    let task = services
        .store
        .create_daily(input, user.user_id())
        .await
        .map_err(store_error_to_response)?;
    tracing::info!(task_id = %task.id, "daily task created");
    services
        .record(
            &user,
            DataChange::new(
                MODULE,
                ActionType::Create,
                "Created daily task",
                format!("created daily task '{}'", task.title),
            )
            .after(&task)
            .target(TARGET),
        )
        .await;
    Ok(created(task))
}

pub async fn update_daily(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<RecordId>,
    Json(body): Json<DailyTaskUpdate>,
) -> ApiResult {
    require(&user, Module::Maint, PermissionLevel::Write)?;

    let change = services
        .store
        .update_daily(id, body)
        .await
        .map_err(store_error_to_response)?;
    tracing::info!(task_id = %id, "daily task updated");
    services
        .record(
            &user,
            DataChange::new(
                MODULE,
                ActionType::Update,
                "Updated daily task",
                format!("updated daily task '{}'", change.after.title),
            )
            .before(&change.before)
            .after(&change.after)
            .target(TARGET),
        )
        .await;
    Ok(ok(change.after))
}

pub async fn delete_daily(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<RecordId>,
) -> ApiResult {
    require(&user, Module::Maint, PermissionLevel::Write)?;
    let removed = services.store.delete_daily(id).await.map_err(store_error_to_response)?;
    tracing::info!(task_id = %id, "daily task deleted");
    services
        .record(
            &user,
            DataChange::new(
                MODULE,
                ActionType::Delete,
                "Deleted daily task",
                format!("deleted daily task '{}'", removed.title),
            )
            .before(&removed)
            .target(TARGET),
        )
        .await;
    Ok(no_content())
}

// ─────────────────────────────────────────────────────────────────────────────
// Weekly tasks / issues
// ─────────────────────────────────────────────────────────────────────────────

pub async fn list_weekly(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(user): Extension<CurrentUser>,
    Query(q): Query<dto::TaskQuery>,
) -> ApiResult {
    require(&user, Module::Maint, PermissionLevel::Read)?;
    let page = page(q.skip, q.limit, 100)?;
    let tasks = services
        .store
        .list_weekly(&task_filter(&q), page)
        .await
        .map_err(store_error_to_response)?;
    Ok(ok(tasks))
}

pub async fn get_weekly(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<RecordId>,
) -> ApiResult {
    require(&user, Module::Maint, PermissionLevel::Read)?;
    let task = services.store.get_weekly(id).await.map_err(store_error_to_response)?;
    Ok(ok(task))
}

pub async fn create_weekly(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(user): Extension<CurrentUser>,
    Json(body): Json<WeeklyTaskInput>,
) -> ApiResult {
    require(&user, Module::Maint, PermissionLevel::Write)?;
    let input = body.validate().map_err(domain_error_to_response)?;

    let task = services
        .store
        .create_weekly(input, user.user_id())
        .await
        .map_err(store_error_to_response)?;
    tracing::info!(task_id = %task.id, "weekly task created");
    services
        .record(
            &user,
            DataChange::new(
                MODULE,
                ActionType::Create,
                "Created weekly task",
                format!("created weekly task '{}'", task.title),
            )
            .after(&task)
            .target(TARGET),
        )
        .await;
    Ok(created(task))
}

pub async fn update_weekly(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<RecordId>,
    Json(body): Json<WeeklyTaskUpdate>,
) -> ApiResult {
    require(&user, Module::Maint, PermissionLevel::Write)?;

    let change = services
        .store
        .update_weekly(id, body)
        .await
        .map_err(store_error_to_response)?;
    tracing::info!(task_id = %id, "weekly task updated");
    services
        .record(
            &user,
            DataChange::new(
                MODULE,
                ActionType::Update,
                "Updated weekly task",
                format!("updated weekly task '{}'", change.after.title),
            )
            .before(&change.before)
            .after(&change.after)
            .target(TARGET),
        )
        .await;
    Ok(ok(change.after))
}

pub async fn delete_weekly(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<RecordId>,
) -> ApiResult {
    require(&user, Module::Maint, PermissionLevel::Write)?;
    let removed = services.store.delete_weekly(id).await.map_err(store_error_to_response)?;
    tracing::info!(task_id = %id, "weekly task deleted");
    services
        .record(
            &user,
            DataChange::new(
                MODULE,
                ActionType::Delete,
                "Deleted weekly task",
                format!("deleted weekly task '{}'", removed.title),
            )
            .before(&removed)
            .target(TARGET),
        )
        .await;
    Ok(no_content())
}
