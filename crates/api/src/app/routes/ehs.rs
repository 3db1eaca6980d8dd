use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Query},
    routing::get,
};
use chrono::{Datelike, Utc};

use datalink_auth::{Module, PermissionLevel};
use datalink_plant::EhsWeekInput;

use crate::app::dto::{self, OneOrMany};
use crate::app::errors::{ApiResult, bad_request, domain_error_to_response, store_error_to_response};
use crate::app::routes::common::{ok, record_upsert};
use crate::app::services::AppServices;
use crate::authz::require;
use crate::context::CurrentUser;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_weeks).put(upsert_weeks))
        .route("/lwd", get(list_lwd).put(upsert_lwd))
}

const MODULE: &str = "EHS";
const TARGET: &str = "/ehs";

/// GET /ehs?year= (defaults to the current year)
pub async fn list_weeks(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(user): Extension<CurrentUser>,
    Query(q): Query<dto::YearQuery>,
) -> ApiResult {
    require(&user, Module::Ehs, PermissionLevel::Read)?;
    let year = q.year.unwrap_or_else(|| Utc::now().year());
    let weeks = services.store.list_ehs(Some(year)).await.map_err(store_error_to_response)?;
    Ok(ok(weeks))
}

/// GET /ehs/lwd: the current year only.
pub async fn list_lwd(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(user): Extension<CurrentUser>,
) -> ApiResult {
    require(&user, Module::Ehs, PermissionLevel::Read)?;
    let weeks = services
        .store
        .list_ehs(Some(Utc::now().year()))
        .await
        .map_err(store_error_to_response)?;
    Ok(ok(weeks))
}

/// PUT /ehs: upsert by (week, year); a missing year means the current one.
pub async fn upsert_weeks(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(user): Extension<CurrentUser>,
    Json(body): Json<OneOrMany<EhsWeekInput>>,
) -> ApiResult {
    upsert(&services, &user, body.into_vec(), false, "EHS data").await
}

/// PUT /ehs/lwd: like `PUT /ehs` but every entry lands in the current year.
pub async fn upsert_lwd(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(user): Extension<CurrentUser>,
    Json(body): Json<OneOrMany<EhsWeekInput>>,
) -> ApiResult {
    upsert(&services, &user, body.into_vec(), true, "LWD data").await
}

async fn upsert(
    services: &AppServices,
    user: &CurrentUser,
    entries: Vec<EhsWeekInput>,
    force_current_year: bool,
    noun: &str,
) -> ApiResult {
    require(user, Module::Ehs, PermissionLevel::Write)?;
    if entries.is_empty() {
        return Err(bad_request("no weeks given"));
    }

    let current_year = Utc::now().year();
    let forced = force_current_year.then_some(current_year);
    let values = entries
        .into_iter()
        .map(|e| e.resolve(forced, current_year))
        .collect::<Result<Vec<_>, _>>()
        .map_err(domain_error_to_response)?;
    let details = format!("year {}", values[0].year);

    let report = services.store.upsert_ehs(values).await.map_err(store_error_to_response)?;
    Ok(record_upsert(services, user, MODULE, noun, details, TARGET, &report).await)
}
