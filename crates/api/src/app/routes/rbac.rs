//! Permission and role administration, plus self-service permission checks.
//!
//! Reads need USER READ, writes USER ADMIN. `check-permission` and
//! `permissions/explain` answer for the caller without any grant.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query},
    routing::{get, post},
};

use datalink_activity::{ActionType, DataChange};
use datalink_auth::{Module, PermissionLevel, explain_authorization, has_permission, is_reserved_role};
use datalink_core::{PermissionId, RoleId};
use datalink_infra::load_principal;
use datalink_infra::model::{NewRole, RoleChanges, validate_role_name};

use crate::app::dto;
use crate::app::errors::{ApiResult, domain_error_to_response, json_error, store_error_to_response};
use crate::app::routes::common::{created, no_content, ok, page};
use crate::app::services::AppServices;
use crate::authz::require;
use crate::context::CurrentUser;

// ─────────────────────────────────────────────────────────────────────────────
// Router
// ─────────────────────────────────────────────────────────────────────────────

pub fn router() -> Router {
    Router::new()
        .route("/permissions", post(create_permission).get(list_permissions))
        .route("/permissions/explain", get(explain))
        .route(
            "/permissions/:id",
            get(get_permission).put(update_permission).delete(delete_permission),
        )
        .route("/roles", post(create_role).get(list_roles))
        .route("/simple-roles", get(simple_roles))
        .route("/roles/:id", get(get_role).put(update_role).delete(delete_role))
        .route("/roles/:id/permissions", post(set_role_permissions))
        .route("/check-permission", post(check_permission))
}

const MODULE: &str = "PERMISSION";
const TARGET: &str = "/admin/permissions";

fn reserved(name: &str) -> axum::response::Response {
    json_error(
        axum::http::StatusCode::CONFLICT,
        "conflict",
        format!("role '{name}' is reserved"),
    )
}

// ─────────────────────────────────────────────────────────────────────────────
// Permissions
// ─────────────────────────────────────────────────────────────────────────────

pub async fn create_permission(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(user): Extension<CurrentUser>,
    Json(body): Json<dto::PermissionRequest>,
) -> ApiResult {
    require(&user, Module::User, PermissionLevel::Admin)?;
    let grant = body.into_grant().map_err(domain_error_to_response)?;

    let permission = services
        .store
        .create_permission(grant)
        .await
        .map_err(store_error_to_response)?;
    tracing::info!(permission_id = %permission.id, code = %permission.code(), "permission created");
    services
        .record(
            &user,
            DataChange::new(
                MODULE,
                ActionType::Create,
                "Created permission",
                format!("created permission {}", permission.code()),
            )
            .after(&permission)
            .target(TARGET),
        )
        .await;
    Ok(created(permission))
}

pub async fn list_permissions(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(user): Extension<CurrentUser>,
    Query(q): Query<dto::PageQuery>,
) -> ApiResult {
    require(&user, Module::User, PermissionLevel::Read)?;
    let page = page(q.skip, q.limit, 100)?;
    let items = services
        .store
        .list_permissions(page)
        .await
        .map_err(store_error_to_response)?;
    Ok(ok(items))
}

pub async fn get_permission(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<PermissionId>,
) -> ApiResult {
    require(&user, Module::User, PermissionLevel::Read)?;
    let permission = services.store.get_permission(id).await.map_err(store_error_to_response)?;
    Ok(ok(permission))
}

pub async fn update_permission(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<PermissionId>,
    Json(body): Json<dto::PermissionRequest>,
) -> ApiResult {
    require(&user, Module::User, PermissionLevel::Admin)?;
    let grant = body.into_grant().map_err(domain_error_to_response)?;

    let change = services
        .store
        .update_permission(id, grant)
        .await
        .map_err(store_error_to_response)?;
    tracing::info!(permission_id = %id, code = %change.after.code(), "permission updated");
    services
        .record(
            &user,
            DataChange::new(
                MODULE,
                ActionType::Update,
                "Updated permission",
                format!("changed permission {} to {}", change.before.code(), change.after.code()),
            )
            .before(&change.before)
            .after(&change.after)
            .target(TARGET),
        )
        .await;
    Ok(ok(change.after))
}

pub async fn delete_permission(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<PermissionId>,
) -> ApiResult {
    require(&user, Module::User, PermissionLevel::Admin)?;
    let removed = services
        .store
        .delete_permission(id)
        .await
        .map_err(store_error_to_response)?;
    tracing::info!(permission_id = %id, "permission deleted");
    services
        .record(
            &user,
            DataChange::new(
                MODULE,
                ActionType::Delete,
                "Deleted permission",
                format!("deleted permission {}", removed.code()),
            )
            .before(&removed)
            .target(TARGET),
        )
        .await;
    Ok(no_content())
}

// ─────────────────────────────────────────────────────────────────────────────
// Roles
// ─────────────────────────────────────────────────────────────────────────────

pub async fn create_role(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(user): Extension<CurrentUser>,
    Json(body): Json<dto::RoleRequest>,
) -> ApiResult {
    require(&user, Module::User, PermissionLevel::Admin)?;
    let name = validate_role_name(&body.name).map_err(domain_error_to_response)?;

    let role = services
        .store
        .create_role(NewRole {
            name,
            description: body.description,
            permission_ids: body.permission_ids,
        })
        .await
        .map_err(store_error_to_response)?;
    tracing::info!(role_id = %role.id, role = %role.name, "role created");
    services
        .record(
            &user,
            DataChange::new(MODULE, ActionType::Create, "Created role", format!("created role '{}'", role.name))
                .after(&role)
                .target(TARGET),
        )
        .await;
    Ok(created(role))
}

pub async fn list_roles(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(user): Extension<CurrentUser>,
    Query(q): Query<dto::PageQuery>,
) -> ApiResult {
    require(&user, Module::User, PermissionLevel::Read)?;
    let page = page(q.skip, q.limit, 100)?;
    let roles = services.store.list_roles(page).await.map_err(store_error_to_response)?;
    Ok(ok(roles))
}

/// GET /simple-roles: `{id, name}` pairs for pickers.
pub async fn simple_roles(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(user): Extension<CurrentUser>,
) -> ApiResult {
    require(&user, Module::User, PermissionLevel::Read)?;
    let roles = services
        .store
        .list_roles(datalink_core::Page::all())
        .await
        .map_err(store_error_to_response)?;
    let items: Vec<dto::RoleSummary> = roles.iter().map(dto::RoleSummary::from).collect();
    Ok(ok(items))
}

pub async fn get_role(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<RoleId>,
) -> ApiResult {
    require(&user, Module::User, PermissionLevel::Read)?;
    let role = services.store.get_role(id).await.map_err(store_error_to_response)?;
    Ok(ok(role))
}

pub async fn update_role(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<RoleId>,
    Json(body): Json<dto::RoleUpdateRequest>,
) -> ApiResult {
    require(&user, Module::User, PermissionLevel::Admin)?;

    let current = services.store.get_role(id).await.map_err(store_error_to_response)?;
    let name = body
        .name
        .as_deref()
        .map(validate_role_name)
        .transpose()
        .map_err(domain_error_to_response)?;
    if let Some(new_name) = &name {
        if *new_name != current.name && is_reserved_role(&current.name) {
            return Err(reserved(&current.name));
        }
    }

    let mut change = services
        .store
        .update_role(
            id,
            RoleChanges {
                name,
                description: body.description,
            },
        )
        .await
        .map_err(store_error_to_response)?;
    if let Some(ids) = body.permission_ids {
        change.after = services
            .store
            .set_role_permissions(id, &ids)
            .await
            .map_err(store_error_to_response)?
            .after;
    }

    tracing::info!(role_id = %id, "role updated");
    services
        .record(
            &user,
            DataChange::new(
                MODULE,
                ActionType::Update,
                "Updated role",
                format!("updated role '{}'", change.after.name),
            )
            .before(&change.before)
            .after(&change.after)
            .target(TARGET),
        )
        .await;
    Ok(ok(change.after))
}

pub async fn delete_role(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<RoleId>,
) -> ApiResult {
    require(&user, Module::User, PermissionLevel::Admin)?;

    let role = services.store.get_role(id).await.map_err(store_error_to_response)?;
    if is_reserved_role(&role.name) {
        tracing::warn!(role = %role.name, "refusing to delete reserved role");
        return Err(reserved(&role.name));
    }

    let removed = services.store.delete_role(id).await.map_err(store_error_to_response)?;
    tracing::info!(role_id = %id, role = %removed.name, "role deleted");
    services
        .record(
            &user,
            DataChange::new(
                MODULE,
                ActionType::Delete,
                "Deleted role",
                format!("deleted role '{}'", removed.name),
            )
            .details(format!("role {}, id {}", removed.name, removed.id))
            .before(&removed)
            .target(TARGET),
        )
        .await;
    Ok(no_content())
}

/// POST /roles/:id/permissions (replaces the role's permissions)
pub async fn set_role_permissions(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<RoleId>,
    Json(body): Json<dto::PermissionIdsRequest>,
) -> ApiResult {
    require(&user, Module::User, PermissionLevel::Admin)?;
    let ids = body.into_ids();

    let change = services
        .store
        .set_role_permissions(id, &ids)
        .await
        .map_err(store_error_to_response)?;
    tracing::info!(role_id = %id, permissions = change.after.permissions.len(), "role permissions replaced");
    services
        .record(
            &user,
            DataChange::new(
                MODULE,
                ActionType::Update,
                "Assigned permissions",
                format!(
                    "assigned {} permission(s) to role '{}'",
                    change.after.permissions.len(),
                    change.after.name
                ),
            )
            .before(&change.before.permissions)
            .after(&change.after.permissions)
            .target(TARGET),
        )
        .await;
    Ok(ok(change.after))
}

// ─────────────────────────────────────────────────────────────────────────────
// Self-service checks
// ─────────────────────────────────────────────────────────────────────────────

/// POST /check-permission
pub async fn check_permission(
    Extension(user): Extension<CurrentUser>,
    Json(body): Json<dto::PermissionCheck>,
) -> ApiResult {
    let (module, level) = body.parse().map_err(domain_error_to_response)?;
    let granted = has_permission(user.principal(), module, level, body.department_id);
    Ok(ok(serde_json::json!({
        "has_permission": granted,
        "user_id": user.user_id(),
        "module": module,
        "level": level,
    })))
}

/// GET /permissions/explain?module=QA&level=WRITE[&department_id=..][&user_id=..]
///
/// Explaining another user's access needs USER READ.
pub async fn explain(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(user): Extension<CurrentUser>,
    Query(q): Query<dto::PermissionCheck>,
) -> ApiResult {
    let (module, level) = q.parse().map_err(domain_error_to_response)?;

    let principal = match q.user_id {
        Some(target) if target != user.user_id() => {
            require(&user, Module::User, PermissionLevel::Read)?;
            load_principal(&*services.store, target)
                .await
                .map_err(store_error_to_response)?
        }
        _ => user.principal().clone(),
    };

    let explanation = explain_authorization(&principal, module, level, q.department_id);
    Ok(ok(explanation))
}
