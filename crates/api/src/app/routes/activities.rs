//! Activity feed. Reading needs ACTIVITY READ; any signed-in user may post
//! entries, which are always attributed to the caller.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query},
    routing::{get, post},
};
use chrono::Utc;

use datalink_activity::{ActivityFilter, ActivityView, DataChange, NewActivity, validate_window};
use datalink_auth::{Module, PermissionLevel};
use datalink_core::ActivityId;

use crate::app::dto;
use crate::app::errors::{ApiResult, domain_error_to_response, store_error_to_response};
use crate::app::routes::common::{created, ok, page};
use crate::app::services::AppServices;
use crate::authz::require;
use crate::context::CurrentUser;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_activities).post(create_activity))
        .route("/data-change", post(record_data_change))
        .route("/:id", get(get_activity))
}

/// GET /activities?user_id=&department=&type=&days=&skip=&limit=
///
/// `days` must be 1..=36500 when given.
pub async fn list_activities(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(user): Extension<CurrentUser>,
    Query(q): Query<dto::ActivityQuery>,
) -> ApiResult {
    require(&user, Module::Activity, PermissionLevel::Read)?;
    let page = page(q.skip, q.limit, 100)?;
    let days = q
        .days
        .map(validate_window)
        .transpose()
        .map_err(domain_error_to_response)?;
    let filter = ActivityFilter {
        user_id: q.user_id,
        department: q.department.filter(|d| !d.trim().is_empty()),
        kind: q.kind.filter(|k| !k.trim().is_empty()),
        days,
    };

    let now = Utc::now();
    let items = services
        .store
        .list_activities(&filter, page, now)
        .await
        .map_err(store_error_to_response)?;
    let views: Vec<ActivityView> = items.into_iter().map(|a| ActivityView::render(a, now)).collect();
    Ok(ok(views))
}

pub async fn create_activity(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(user): Extension<CurrentUser>,
    Json(body): Json<NewActivity>,
) -> ApiResult {
    let entry = body
        .attributed_to(&user.actor())
        .validate()
        .map_err(domain_error_to_response)?;
    let activity = services
        .store
        .record_activity(entry)
        .await
        .map_err(store_error_to_response)?;
    tracing::info!(activity_id = %activity.id, kind = %activity.kind, "activity posted");
    Ok(created(ActivityView::render(activity, Utc::now())))
}

/// POST /activities/data-change: a module change described by the client;
/// the type becomes `MODULE_ACTION` and icon/color follow the action.
pub async fn record_data_change(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(user): Extension<CurrentUser>,
    Json(body): Json<DataChange>,
) -> ApiResult {
    let entry = body.into_new(&user.actor()).map_err(domain_error_to_response)?;
    let activity = services
        .store
        .record_activity(entry)
        .await
        .map_err(store_error_to_response)?;
    tracing::info!(activity_id = %activity.id, kind = %activity.kind, "data change posted");
    Ok(created(ActivityView::render(activity, Utc::now())))
}

pub async fn get_activity(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<ActivityId>,
) -> ApiResult {
    require(&user, Module::Activity, PermissionLevel::Read)?;
    let activity = services.store.get_activity(id).await.map_err(store_error_to_response)?;
    Ok(ok(ActivityView::render(activity, Utc::now())))
}
