//! Quality data: GP12/scrap daily entries, monthly misc figures, KPI sheets
//! and monthly production totals. QA READ for reads, QA WRITE for changes.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query},
    routing::{delete, get, put},
};
use chrono::Utc;

use datalink_activity::{ActionType, DataChange};
use datalink_auth::{Module, PermissionLevel};
use datalink_core::{RecordId, YearMonth};
use datalink_quality::{KpiSheet, MonthlyTotalInput, QaEntryInput, QaMiscInput};

use crate::app::dto::{self, OneOrMany};
use crate::app::errors::{ApiResult, bad_request, domain_error_to_response, store_error_to_response};
use crate::app::routes::common::{created, no_content, ok, record_upsert};
use crate::app::services::AppServices;
use crate::authz::require;
use crate::context::CurrentUser;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_entries).post(create_entry).put(upsert_entries))
        .route("/:id", delete(delete_entry))
        .route("/qad", get(list_misc).post(create_misc))
        .route("/qad/:id", put(replace_misc).delete(delete_misc))
        .route("/kpi", get(get_kpi).post(create_kpi).put(replace_kpi))
        .route("/monthly", get(monthly_totals).put(upsert_monthly_totals))
}

const MODULE: &str = "QA";
const TARGET: &str = "/quality";

fn period(q: &dto::MonthQuery) -> ApiResult<YearMonth> {
    YearMonth::or_current(q.year, q.month, Utc::now().date_naive()).map_err(domain_error_to_response)
}

// ─── daily entries ───

pub async fn create_entry(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(user): Extension<CurrentUser>,
    Json(body): Json<QaEntryInput>,
) -> ApiResult {
    require(&user, Module::Qa, PermissionLevel::Write)?;
    let input = body.validate().map_err(domain_error_to_response)?;

    let entry = services.store.create_qa(input).await.map_err(store_error_to_response)?;
    tracing::info!(qa_id = %entry.id, line = %entry.line, "qa entry created");
    services
        .record(
            &user,
            DataChange::new(
                MODULE,
                ActionType::Create,
                "Created quality entry",
                format!("created a quality entry for line {}", entry.line),
            )
            .details(format!("{}-{:02}-{:02}", entry.year, entry.month, entry.day))
            .after(&entry)
            .target(TARGET),
        )
        .await;
    Ok(created(entry))
}

/// GET /qa?year=&month=&scrap= (defaults to the current month, both kinds)
pub async fn list_entries(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(user): Extension<CurrentUser>,
    Query(q): Query<dto::MonthQuery>,
) -> ApiResult {
    require(&user, Module::Qa, PermissionLevel::Read)?;
    let period = period(&q)?;
    let entries = services
        .store
        .list_qa(period, q.scrap)
        .await
        .map_err(store_error_to_response)?;
    Ok(ok(entries))
}

/// PUT /qa: insert or overwrite by (line, day, month, year, scrap).
pub async fn upsert_entries(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(user): Extension<CurrentUser>,
    Json(body): Json<OneOrMany<QaEntryInput>>,
) -> ApiResult {
    require(&user, Module::Qa, PermissionLevel::Write)?;
    let inputs = body
        .into_vec()
        .into_iter()
        .map(QaEntryInput::validate)
        .collect::<Result<Vec<_>, _>>()
        .map_err(domain_error_to_response)?;
    let Some(first) = inputs.first() else {
        return Err(bad_request("no entries given"));
    };
    let details = format!("month {}, year {}", first.month, first.year);

    let report = services.store.upsert_qa(inputs).await.map_err(store_error_to_response)?;
    Ok(record_upsert(&services, &user, MODULE, "quality entries", details, TARGET, &report).await)
}

pub async fn delete_entry(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<RecordId>,
) -> ApiResult {
    require(&user, Module::Qa, PermissionLevel::Write)?;
    let removed = services.store.delete_qa(id).await.map_err(store_error_to_response)?;
    tracing::info!(qa_id = %id, "qa entry deleted");
    services
        .record(
            &user,
            DataChange::new(
                MODULE,
                ActionType::Delete,
                "Deleted quality entry",
                format!("deleted a quality entry for line {}", removed.line),
            )
            .before(&removed)
            .target(TARGET),
        )
        .await;
    Ok(no_content())
}

// ─── monthly misc ───

pub async fn create_misc(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(user): Extension<CurrentUser>,
    Json(body): Json<QaMiscInput>,
) -> ApiResult {
    require(&user, Module::Qa, PermissionLevel::Write)?;
    let input = body.validate().map_err(domain_error_to_response)?;

    let misc = services.store.create_qa_misc(input).await.map_err(store_error_to_response)?;
    tracing::info!(qad_id = %misc.id, "qa misc created");
    services
        .record(
            &user,
            DataChange::new(
                MODULE,
                ActionType::Create,
                "Created monthly quality data",
                format!("created quality figures for {}-{:02}", misc.year, misc.month),
            )
            .after(&misc)
            .target(TARGET),
        )
        .await;
    Ok(created(misc))
}

pub async fn list_misc(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(user): Extension<CurrentUser>,
    Query(q): Query<dto::MonthQuery>,
) -> ApiResult {
    require(&user, Module::Qa, PermissionLevel::Read)?;
    let period = period(&q)?;
    let items = services
        .store
        .list_qa_misc(Some(period.year), Some(period.month))
        .await
        .map_err(store_error_to_response)?;
    Ok(ok(items))
}

pub async fn replace_misc(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<RecordId>,
    Json(body): Json<QaMiscInput>,
) -> ApiResult {
    require(&user, Module::Qa, PermissionLevel::Write)?;
    let input = body.validate().map_err(domain_error_to_response)?;

    let change = services
        .store
        .replace_qa_misc(id, input)
        .await
        .map_err(store_error_to_response)?;
    tracing::info!(qad_id = %id, "qa misc updated");
    services
        .record(
            &user,
            DataChange::new(
                MODULE,
                ActionType::Update,
                "Updated monthly quality data",
                format!("updated quality figures for {}-{:02}", change.after.year, change.after.month),
            )
            .before(&change.before)
            .after(&change.after)
            .target(TARGET),
        )
        .await;
    Ok(ok(change.after))
}

pub async fn delete_misc(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<RecordId>,
) -> ApiResult {
    require(&user, Module::Qa, PermissionLevel::Write)?;
    let removed = services.store.delete_qa_misc(id).await.map_err(store_error_to_response)?;
    tracing::info!(qad_id = %id, "qa misc deleted");
    services
        .record(
            &user,
            DataChange::new(
                MODULE,
                ActionType::Delete,
                "Deleted monthly quality data",
                format!("deleted quality figures for {}-{:02}", removed.year, removed.month),
            )
            .before(&removed)
            .target(TARGET),
        )
        .await;
    Ok(no_content())
}

// ─── KPI sheet ───

pub async fn get_kpi(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(user): Extension<CurrentUser>,
    Query(q): Query<dto::MonthQuery>,
) -> ApiResult {
    require(&user, Module::Qa, PermissionLevel::Read)?;
    let period = period(&q)?;
    let rows = services.store.kpi_sheet(period).await.map_err(store_error_to_response)?;
    Ok(ok(rows))
}

/// POST /qa/kpi: first sheet of a month; an existing sheet is a conflict.
pub async fn create_kpi(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(user): Extension<CurrentUser>,
    Json(body): Json<KpiSheet>,
) -> ApiResult {
    require(&user, Module::Qa, PermissionLevel::Write)?;
    let sheet = body.validate().map_err(domain_error_to_response)?;
    let period = sheet.period();

    let rows = services
        .store
        .create_kpi_sheet(sheet)
        .await
        .map_err(store_error_to_response)?;
    tracing::info!(year = period.year, month = period.month, rows = rows.len(), "kpi sheet created");
    services
        .record(
            &user,
            DataChange::new(
                MODULE,
                ActionType::Create,
                "Created KPI data",
                format!("created {} KPI row(s)", rows.len()),
            )
            .details(format!("month {}, year {}", period.month, period.year))
            .after(&rows)
            .target(TARGET),
        )
        .await;
    Ok(created(rows))
}

/// PUT /qa/kpi: replace the month's sheet.
pub async fn replace_kpi(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(user): Extension<CurrentUser>,
    Json(body): Json<KpiSheet>,
) -> ApiResult {
    require(&user, Module::Qa, PermissionLevel::Write)?;
    let sheet = body.validate().map_err(domain_error_to_response)?;
    let period = sheet.period();

    let change = services
        .store
        .replace_kpi_sheet(sheet)
        .await
        .map_err(store_error_to_response)?;
    tracing::info!(year = period.year, month = period.month, rows = change.after.len(), "kpi sheet replaced");
    services
        .record(
            &user,
            DataChange::new(
                MODULE,
                ActionType::Update,
                "Updated KPI data",
                format!("replaced KPI sheet with {} row(s)", change.after.len()),
            )
            .details(format!("month {}, year {}", period.month, period.year))
            .before(&change.before)
            .after(&change.after)
            .target(TARGET),
        )
        .await;
    Ok(ok(change.after))
}

// ─── monthly totals ───

pub async fn monthly_totals(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(user): Extension<CurrentUser>,
    Query(q): Query<dto::MonthQuery>,
) -> ApiResult {
    require(&user, Module::Qa, PermissionLevel::Read)?;
    let period = period(&q)?;
    let rows = services
        .store
        .monthly_totals(period)
        .await
        .map_err(store_error_to_response)?;
    Ok(ok(rows))
}

pub async fn upsert_monthly_totals(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(user): Extension<CurrentUser>,
    Json(body): Json<OneOrMany<MonthlyTotalInput>>,
) -> ApiResult {
    require(&user, Module::Qa, PermissionLevel::Write)?;
    let inputs = body
        .into_vec()
        .into_iter()
        .map(MonthlyTotalInput::validate)
        .collect::<Result<Vec<_>, _>>()
        .map_err(domain_error_to_response)?;
    let Some(first) = inputs.first() else {
        return Err(bad_request("no totals given"));
    };
    let details = format!("month {}, year {}", first.month, first.year);

    let report = services
        .store
        .upsert_monthly_totals(inputs)
        .await
        .map_err(store_error_to_response)?;
    Ok(record_upsert(&services, &user, MODULE, "monthly totals", details, TARGET, &report).await)
}
