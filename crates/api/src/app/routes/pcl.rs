use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query},
    routing::get,
};

use datalink_activity::{ActionType, DataChange};
use datalink_auth::{Module, PermissionLevel};
use datalink_core::RecordId;
use datalink_plant::PclInput;

use crate::app::dto;
use crate::app::errors::{ApiResult, domain_error_to_response, store_error_to_response};
use crate::app::routes::common::{created, no_content, ok, page};
use crate::app::services::AppServices;
use crate::authz::require;
use crate::context::CurrentUser;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_records).post(create_record))
        .route("/:id", get(get_record).put(replace_record).delete(delete_record))
}

const MODULE: &str = "PCL";
const TARGET: &str = "/pcl";

pub async fn list_records(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(user): Extension<CurrentUser>,
    Query(q): Query<dto::PclQuery>,
) -> ApiResult {
    require(&user, Module::Pcl, PermissionLevel::Read)?;
    let page = page(q.skip, q.limit, 100)?;
    let records = services
        .store
        .list_pcl(q.line.as_deref().filter(|l| !l.trim().is_empty()), page)
        .await
        .map_err(store_error_to_response)?;
    Ok(ok(records))
}

pub async fn create_record(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(user): Extension<CurrentUser>,
    Json(body): Json<PclInput>,
) -> ApiResult {
    require(&user, Module::Pcl, PermissionLevel::Write)?;
    let input = body.validate().map_err(domain_error_to_response)?;

    let record = services.store.create_pcl(input).await.map_err(store_error_to_response)?;
    tracing::info!(pcl_id = %record.id, line = %record.line, "pcl record created");
    services
        .record(
            &user,
            DataChange::new(
                MODULE,
                ActionType::Create,
                "Created logistics downtime",
                format!("logged {} minute(s) on line {}", record.downtime_minutes, record.line),
            )
            .after(&record)
            .target(TARGET),
        )
        .await;
    Ok(created(record))
}

pub async fn get_record(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<RecordId>,
) -> ApiResult {
    require(&user, Module::Pcl, PermissionLevel::Read)?;
    let record = services.store.get_pcl(id).await.map_err(store_error_to_response)?;
    Ok(ok(record))
}

pub async fn replace_record(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<RecordId>,
    Json(body): Json<PclInput>,
) -> ApiResult {
    require(&user, Module::Pcl, PermissionLevel::Write)?;
    let input = body.validate().map_err(domain_error_to_response)?;

    let change = services
        .store
        .replace_pcl(id, input)
        .await
        .map_err(store_error_to_response)?;
    tracing::info!(pcl_id = %id, "pcl record updated");
    services
        .record(
            &user,
            DataChange::new(
                MODULE,
                ActionType::Update,
                "Updated logistics downtime",
                format!("updated downtime on line {}", change.after.line),
            )
            .before(&change.before)
            .after(&change.after)
            .target(TARGET),
        )
        .await;
    Ok(ok(change.after))
}

pub async fn delete_record(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<RecordId>,
) -> ApiResult {
    require(&user, Module::Pcl, PermissionLevel::Write)?;
    let removed = services.store.delete_pcl(id).await.map_err(store_error_to_response)?;
    tracing::info!(pcl_id = %id, "pcl record deleted");
    services
        .record(
            &user,
            DataChange::new(
                MODULE,
                ActionType::Delete,
                "Deleted logistics downtime",
                format!("deleted downtime on line {}", removed.line),
            )
            .before(&removed)
            .target(TARGET),
        )
        .await;
    Ok(no_content())
}
