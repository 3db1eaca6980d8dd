use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query},
    routing::{get, post},
};

use datalink_activity::{ActionType, DataChange};
use datalink_auth::{Module, PermissionLevel};
use datalink_core::DepartmentId;
use datalink_infra::model::DepartmentInput;

use crate::app::dto;
use crate::app::errors::{ApiResult, domain_error_to_response, store_error_to_response};
use crate::app::routes::common::{created, no_content, ok, page};
use crate::app::services::AppServices;
use crate::authz::{require, require_in};
use crate::context::CurrentUser;

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_department).get(list_departments))
        .route(
            "/:id",
            get(get_department).put(update_department).delete(delete_department),
        )
}

pub async fn create_department(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(user): Extension<CurrentUser>,
    Json(body): Json<DepartmentInput>,
) -> ApiResult {
    require(&user, Module::Department, PermissionLevel::Write)?;
    let input = body.validate().map_err(domain_error_to_response)?;

    let department = services
        .store
        .create_department(input)
        .await
        .map_err(store_error_to_response)?;
    tracing::info!(department_id = %department.id, "department created");
    services
        .record(
            &user,
            DataChange::new(
                "DEPARTMENT",
                ActionType::Create,
                "Created department",
                format!("created department {}", department.name),
            )
            .after(&department)
            .target("/departments"),
        )
        .await;
    Ok(created(department))
}

pub async fn list_departments(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(user): Extension<CurrentUser>,
    Query(q): Query<dto::PageQuery>,
) -> ApiResult {
    require(&user, Module::Department, PermissionLevel::Read)?;
    let page = page(q.skip, q.limit, 10)?;
    let items = services
        .store
        .list_departments(page)
        .await
        .map_err(store_error_to_response)?;
    Ok(ok(items))
}

pub async fn get_department(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<DepartmentId>,
) -> ApiResult {
    require_in(&user, Module::Department, PermissionLevel::Read, Some(id))?;
    let department = services.store.get_department(id).await.map_err(store_error_to_response)?;
    Ok(ok(department))
}

pub async fn update_department(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<DepartmentId>,
    Json(body): Json<DepartmentInput>,
) -> ApiResult {
    require_in(&user, Module::Department, PermissionLevel::Write, Some(id))?;
    let input = body.validate().map_err(domain_error_to_response)?;

    let change = services
        .store
        .update_department(id, input)
        .await
        .map_err(store_error_to_response)?;
    tracing::info!(department_id = %id, "department updated");
    services
        .record(
            &user,
            DataChange::new(
                "DEPARTMENT",
                ActionType::Update,
                "Updated department",
                format!("updated department {}", change.after.name),
            )
            .before(&change.before)
            .after(&change.after)
            .target("/departments"),
        )
        .await;
    Ok(ok(change.after))
}

/// DELETE /departments/:id
///
/// Members stay, with no department; scoped permissions go with it.
pub async fn delete_department(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<DepartmentId>,
) -> ApiResult {
    require_in(&user, Module::Department, PermissionLevel::Admin, Some(id))?;

    let removed = services
        .store
        .delete_department(id)
        .await
        .map_err(store_error_to_response)?;
    tracing::info!(department_id = %id, "department deleted");
    services
        .record(
            &user,
            DataChange::new(
                "DEPARTMENT",
                ActionType::Delete,
                "Deleted department",
                format!("deleted department {}", removed.name),
            )
            .before(&removed)
            .target("/departments"),
        )
        .await;
    Ok(no_content())
}
