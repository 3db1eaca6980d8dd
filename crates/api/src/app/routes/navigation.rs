//! Navigation routes: administration (ROUTE READ / ADMIN) and the caller's
//! visible menu tree (any authenticated user).

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    routing::get,
};

use datalink_activity::{ActionType, DataChange};
use datalink_auth::navigation::{accessible_routes, build_route_tree, check_route_access, merge_meta, prepare_route};
use datalink_auth::{Module, PermissionLevel, RouteEntry};
use datalink_core::RouteId;
use datalink_infra::model::RouteInput;

use crate::app::dto;
use crate::app::errors::{ApiResult, domain_error_to_response, store_error_to_response};
use crate::app::routes::common::{created, no_content, ok};
use crate::app::services::AppServices;
use crate::authz::require;
use crate::context::CurrentUser;

pub fn router() -> Router {
    Router::new()
        .route("/routes", get(list_routes).post(create_route))
        .route(
            "/routes/:id",
            get(get_route)
                .put(replace_route)
                .patch(patch_route)
                .delete(delete_route),
        )
        .route("/routes/:id/permissions", get(route_roles).post(set_route_roles))
        .route("/routes/check-access/:id", get(check_access))
        .route("/navigation", get(navigation))
        .route("/permissions/routes", get(navigation))
}

const MODULE: &str = "ROUTE";
const TARGET: &str = "/admin/routes";

pub async fn list_routes(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(user): Extension<CurrentUser>,
) -> ApiResult {
    require(&user, Module::Route, PermissionLevel::Read)?;
    let routes = services.store.list_routes().await.map_err(store_error_to_response)?;
    Ok(ok(routes))
}

pub async fn get_route(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<RouteId>,
) -> ApiResult {
    require(&user, Module::Route, PermissionLevel::Read)?;
    let route = services.store.get_route(id).await.map_err(store_error_to_response)?;
    Ok(ok(route))
}

pub async fn create_route(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(user): Extension<CurrentUser>,
    Json(body): Json<dto::RouteRequest>,
) -> ApiResult {
    require(&user, Module::Route, PermissionLevel::Admin)?;

    let (path, meta) =
        prepare_route(body.path, body.meta, body.path_config.as_ref()).map_err(domain_error_to_response)?;
    let input = RouteInput {
        path,
        name: body.name,
        component: body.component,
        meta,
        parent_id: body.parent_id,
        sort_order: body.sort_order,
    }
    .validate(None)
    .map_err(domain_error_to_response)?;

    let route = services.store.create_route(input).await.map_err(store_error_to_response)?;
    tracing::info!(route_id = %route.id, name = %route.name, "route created");
    services
        .record(
            &user,
            DataChange::new(MODULE, ActionType::Create, "Created route", format!("created route '{}'", route.name))
                .after(&route)
                .target(TARGET),
        )
        .await;
    Ok(created(route))
}

/// PUT /routes/:id
///
/// Replaces every field. Omitted `meta` keeps the stored one, so role
/// grants mirrored into `meta.allowed_roles` survive.
pub async fn replace_route(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<RouteId>,
    Json(body): Json<dto::RouteRequest>,
) -> ApiResult {
    require(&user, Module::Route, PermissionLevel::Admin)?;

    let current = services.store.get_route(id).await.map_err(store_error_to_response)?;
    let meta = body.meta.or(current.meta);
    let (path, meta) = prepare_route(body.path, meta, body.path_config.as_ref()).map_err(domain_error_to_response)?;
    let input = RouteInput {
        path,
        name: body.name,
        component: body.component,
        meta,
        parent_id: body.parent_id,
        sort_order: body.sort_order,
    }
    .validate(Some(id))
    .map_err(domain_error_to_response)?;

    store_replacement(&services, &user, id, input, "Updated route").await
}

/// PATCH /routes/:id: only the fields present change; `meta` is merged key by key.
pub async fn patch_route(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<RouteId>,
    Json(body): Json<dto::RoutePatchRequest>,
) -> ApiResult {
    require(&user, Module::Route, PermissionLevel::Admin)?;

    let current = services.store.get_route(id).await.map_err(store_error_to_response)?;
    let meta = match body.meta {
        Some(patch) => merge_meta(current.meta.clone(), patch).map_err(domain_error_to_response)?,
        None => current.meta.clone().unwrap_or_else(|| serde_json::json!({})),
    };
    let input = RouteInput {
        path: body.path.or(current.path),
        name: body.name.unwrap_or(current.name),
        component: body.component.or(current.component),
        meta,
        parent_id: body.parent_id.unwrap_or(current.parent_id),
        sort_order: body.sort_order.unwrap_or(current.sort_order),
    }
    .validate(Some(id))
    .map_err(domain_error_to_response)?;

    store_replacement(&services, &user, id, input, "Patched route").await
}

async fn store_replacement(
    services: &AppServices,
    user: &CurrentUser,
    id: RouteId,
    input: RouteInput,
    title: &str,
) -> ApiResult {
    let change = services
        .store
        .replace_route(id, input)
        .await
        .map_err(store_error_to_response)?;
    tracing::info!(route_id = %id, "route updated");
    services
        .record(
            user,
            DataChange::new(MODULE, ActionType::Update, title, format!("updated route '{}'", change.after.name))
                .before(&change.before)
                .after(&change.after)
                .target(TARGET),
        )
        .await;
    Ok(ok(change.after))
}

pub async fn delete_route(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<RouteId>,
) -> ApiResult {
    require(&user, Module::Route, PermissionLevel::Admin)?;
    let removed = services.store.delete_route(id).await.map_err(store_error_to_response)?;
    tracing::info!(route_id = %id, "route deleted");
    services
        .record(
            &user,
            DataChange::new(MODULE, ActionType::Delete, "Deleted route", format!("deleted route '{}'", removed.name))
                .before(&removed)
                .target(TARGET),
        )
        .await;
    Ok(no_content())
}

pub async fn route_roles(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<RouteId>,
) -> ApiResult {
    require(&user, Module::Route, PermissionLevel::Read)?;
    let route = services.store.get_route(id).await.map_err(store_error_to_response)?;
    let roles = services.store.route_roles(id).await.map_err(store_error_to_response)?;
    let roles: Vec<dto::RoleSummary> = roles.iter().map(dto::RoleSummary::from).collect();
    Ok(ok(serde_json::json!({
        "route_id": route.id,
        "route_name": route.name,
        "roles": roles,
    })))
}

/// POST /routes/:id/permissions: replace the roles granted this route.
pub async fn set_route_roles(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<RouteId>,
    Json(body): Json<dto::RoleIdsRequest>,
) -> ApiResult {
    require(&user, Module::Route, PermissionLevel::Admin)?;

    let change = services
        .store
        .set_route_roles(id, &body.role_ids)
        .await
        .map_err(store_error_to_response)?;
    tracing::info!(route_id = %id, roles = body.role_ids.len(), "route roles replaced");
    services
        .record(
            &user,
            DataChange::new(
                MODULE,
                ActionType::Update,
                "Assigned route roles",
                format!("granted route '{}' to {} role(s)", change.after.name, body.role_ids.len()),
            )
            .before(&change.before.meta)
            .after(&change.after.meta)
            .target(TARGET),
        )
        .await;
    Ok(ok(change.after))
}

/// GET /routes/check-access/:id, for the caller.
pub async fn check_access(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<RouteId>,
) -> ApiResult {
    let route = services.store.get_route(id).await.map_err(store_error_to_response)?;
    let grants = services.store.route_grants().await.map_err(store_error_to_response)?;
    let granted = grants.get(&id).map(Vec::as_slice).unwrap_or(&[]);
    Ok(ok(check_route_access(&route, user.principal(), granted)))
}

/// GET /navigation and GET /permissions/routes: the caller's menu tree.
pub async fn navigation(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(user): Extension<CurrentUser>,
) -> ApiResult {
    let routes = services.store.list_routes().await.map_err(store_error_to_response)?;
    let grants = services.store.route_grants().await.map_err(store_error_to_response)?;
    let visible: Vec<RouteEntry> = accessible_routes(&routes, user.principal(), &grants);
    tracing::debug!(user_id = %user.user_id(), total = routes.len(), visible = visible.len(), "navigation resolved");
    Ok(ok(build_route_tree(&visible)))
}
