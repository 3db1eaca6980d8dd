//! Login, the caller's own profile, and user administration.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    Form, Json, Router,
    extract::{Extension, Path, Query},
    response::Response,
    routing::{get, post},
};
use chrono::Utc;

use datalink_activity::{ActionType, DataChange};
use datalink_auth::{Module, PasswordError, PermissionLevel, TokenIssuer, hash_password, verify_password};
use datalink_core::{DepartmentId, Page, UserId};
use datalink_infra::model::{NewUser, UserChanges, UserRecord, validate_user_name};

use crate::app::dto::{self, UserView};
use crate::app::errors::{
    self, ApiResult, bad_request, domain_error_to_response, password_error_to_response, store_error_to_response,
};
use crate::app::routes::common::{created, no_content, ok, page};
use crate::app::services::AppServices;
use crate::authz::{require, require_self_or};
use crate::context::CurrentUser;

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_user).get(list_users))
        .route("/me", get(me))
        .route("/permissions", get(my_permissions))
        .route("/:id", get(get_user).put(update_user).delete(delete_user))
        .route("/:id/roles", post(set_user_roles))
}

// ─── login ───

/// Argon2 runs on the blocking pool, not on the async workers.
async fn hash_off_thread(password: String) -> Result<String, PasswordError> {
    tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| PasswordError::Hash(e.to_string()))?
}

async fn verify_off_thread(password: String, hash: String) -> bool {
    tokio::task::spawn_blocking(move || verify_password(&password, &hash))
        .await
        .unwrap_or_else(|e| {
            tracing::error!(error = %e, "password verification task failed");
            false
        })
}

/// POST /users/token (form: `username`, `password`)
pub async fn login(
    Extension(services): Extension<Arc<AppServices>>,
    Form(form): Form<dto::LoginForm>,
) -> ApiResult {
    let invalid = || errors::unauthenticated("incorrect username or password");

    let user = services
        .store
        .find_user_by_name(form.username.trim())
        .await
        .map_err(store_error_to_response)?
        .ok_or_else(invalid)?;
    if !verify_off_thread(form.password, user.password_hash.clone()).await {
        tracing::warn!(user = %user.name, "login rejected: bad password");
        return Err(invalid());
    }
    if !user.is_active {
        tracing::warn!(user = %user.name, "login rejected: inactive account");
        return Err(errors::unauthenticated("account is inactive"));
    }

    let token = services
        .jwt
        .issue(user.id, &user.name, Utc::now(), services.token_ttl)
        .map_err(|e| {
            tracing::error!(error = %e, "token issuing failed");
            errors::json_error(
                axum::http::StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                "could not issue token",
            )
        })?;

    let roles = services
        .store
        .roles_by_ids(&user.role_ids)
        .await
        .map_err(store_error_to_response)?;
    let department = department_name(&services, user.department_id).await;

    tracing::info!(user_id = %user.id, user = %user.name, "login succeeded");
    Ok(ok(dto::TokenResponse {
        access_token: token,
        token_type: "bearer",
        user_id: user.id,
        user_name: user.name,
        department,
        roles: roles.into_iter().map(|r| r.name).collect(),
    }))
}

// ─── self ───

pub async fn me(Extension(user): Extension<CurrentUser>) -> Response {
    let p = user.principal();
    ok(serde_json::json!({
        "user_id": p.user_id,
        "user_name": p.name,
        "department": user.department(),
        "is_active": p.is_active,
        "roles": p.role_names(),
    }))
}

pub async fn my_permissions(Extension(user): Extension<CurrentUser>) -> Response {
    let p = user.principal();
    let roles: Vec<dto::RoleSummary> = p.roles.iter().map(dto::RoleSummary::from).collect();
    let permissions: Vec<_> = p
        .roles
        .iter()
        .flat_map(|r| r.permissions.iter().map(|perm| perm.grant))
        .collect::<std::collections::BTreeSet<_>>()
        .into_iter()
        .collect();
    ok(serde_json::json!({
        "roles": roles,
        "permissions": permissions,
        "has_qa_read": datalink_auth::has_permission(p, Module::Qa, PermissionLevel::Read, None),
    }))
}

// ─── administration ───

pub async fn create_user(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(user): Extension<CurrentUser>,
    Json(body): Json<dto::CreateUserRequest>,
) -> ApiResult {
    require(&user, Module::User, PermissionLevel::Admin)?;

    let name = validate_user_name(&body.name).map_err(domain_error_to_response)?;
    let password_hash = hash_off_thread(body.password.clone())
        .await
        .map_err(password_error_to_response)?;
    let record = services
        .store
        .create_user(NewUser {
            name,
            password_hash,
            department_id: body.department_id,
            is_active: body.is_active,
            role_ids: body.role_ids,
        })
        .await
        .map_err(store_error_to_response)?;

    let view = user_view(&services, record).await?;
    tracing::info!(user_id = %view.id, "user created");
    services
        .record(
            &user,
            DataChange::new("USER", ActionType::Create, "Created user", format!("created user {}", view.name))
                .after(&view)
                .target("/users"),
        )
        .await;
    Ok(created(view))
}

pub async fn list_users(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(user): Extension<CurrentUser>,
    Query(q): Query<dto::PageQuery>,
) -> ApiResult {
    require(&user, Module::User, PermissionLevel::Read)?;
    let page = page(q.skip, q.limit, 10)?;

    let users = services.store.list_users(page).await.map_err(store_error_to_response)?;
    let departments: HashMap<DepartmentId, String> = services
        .store
        .list_departments(Page::all())
        .await
        .map_err(store_error_to_response)?
        .into_iter()
        .map(|d| (d.id, d.name))
        .collect();
    let roles = services
        .store
        .list_roles(Page::all())
        .await
        .map_err(store_error_to_response)?;

    let views: Vec<UserView> = users
        .into_iter()
        .map(|u| {
            let department = u.department_id.and_then(|d| departments.get(&d).cloned());
            let own: Vec<_> = roles.iter().filter(|r| u.role_ids.contains(&r.id)).cloned().collect();
            UserView::new(u, department, &own)
        })
        .collect();
    Ok(ok(views))
}

pub async fn get_user(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<UserId>,
) -> ApiResult {
    require_self_or(&user, id, PermissionLevel::Read)?;
    let record = services.store.get_user(id).await.map_err(store_error_to_response)?;
    Ok(ok(user_view(&services, record).await?))
}

/// PUT /users/:id
///
/// Users may edit their own name and password; role, department and
/// activation changes need USER ADMIN.
pub async fn update_user(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<UserId>,
    Json(body): Json<dto::UpdateUserRequest>,
) -> ApiResult {
    require_self_or(&user, id, PermissionLevel::Write)?;
    if body.role_ids.is_some() || body.department_id.is_some() || body.is_active.is_some() {
        require(&user, Module::User, PermissionLevel::Admin)?;
    }

    let name = body
        .name
        .as_deref()
        .map(validate_user_name)
        .transpose()
        .map_err(domain_error_to_response)?;
    let password_hash = match body.password.clone() {
        Some(password) => Some(hash_off_thread(password).await.map_err(password_error_to_response)?),
        None => None,
    };

    let change = services
        .store
        .update_user(
            id,
            UserChanges {
                name,
                password_hash,
                department_id: body.department_id,
                is_active: body.is_active,
            },
        )
        .await
        .map_err(store_error_to_response)?;

    let after = match body.role_ids {
        Some(role_ids) => services
            .store
            .set_user_roles(id, &role_ids)
            .await
            .map_err(store_error_to_response)?,
        None => change.after,
    };

    let before = user_view(&services, change.before).await?;
    let after = user_view(&services, after).await?;
    tracing::info!(user_id = %id, "user updated");
    services
        .record(
            &user,
            DataChange::new("USER", ActionType::Update, "Updated user", format!("updated user {}", after.name))
                .before(&before)
                .after(&after)
                .target("/users"),
        )
        .await;
    Ok(ok(after))
}

pub async fn delete_user(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<UserId>,
) -> ApiResult {
    require(&user, Module::User, PermissionLevel::Admin)?;
    if id == user.user_id() {
        return Err(bad_request("you cannot delete your own account"));
    }

    let removed = services.store.delete_user(id).await.map_err(store_error_to_response)?;
    tracing::info!(user_id = %id, "user deleted");
    services
        .record(
            &user,
            DataChange::new("USER", ActionType::Delete, "Deleted user", format!("deleted user {}", removed.name))
                .before(&removed)
                .target("/users"),
        )
        .await;
    Ok(no_content())
}

/// POST /users/:id/roles (replaces the user's roles)
pub async fn set_user_roles(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<UserId>,
    Json(body): Json<dto::RoleIdsRequest>,
) -> ApiResult {
    require(&user, Module::User, PermissionLevel::Admin)?;

    let before = services.store.get_user(id).await.map_err(store_error_to_response)?;
    let updated = services
        .store
        .set_user_roles(id, &body.role_ids)
        .await
        .map_err(store_error_to_response)?;
    let view = user_view(&services, updated).await?;

    tracing::info!(user_id = %id, roles = view.roles.len(), "user roles replaced");
    services
        .record(
            &user,
            DataChange::new(
                "USER",
                ActionType::Update,
                "Assigned roles",
                format!("assigned {} role(s) to {}", view.roles.len(), view.name),
            )
            .before(&before.role_ids)
            .after(&view.roles)
            .target("/users"),
        )
        .await;
    Ok(ok(view))
}

// ─── helpers ───

async fn department_name(services: &AppServices, id: Option<DepartmentId>) -> Option<String> {
    match id {
        Some(id) => services.store.get_department(id).await.ok().map(|d| d.name),
        None => None,
    }
}

async fn user_view(services: &AppServices, record: UserRecord) -> ApiResult<UserView> {
    let roles = services
        .store
        .roles_by_ids(&record.role_ids)
        .await
        .map_err(store_error_to_response)?;
    let department = department_name(services, record.department_id).await;
    Ok(UserView::new(record, department, &roles))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn hashing_round_trips_on_the_blocking_pool() {
        let hash = hash_off_thread("s3cret".to_string()).await.unwrap();
        assert!(verify_off_thread("s3cret".to_string(), hash.clone()).await);
        assert!(!verify_off_thread("wrong".to_string(), hash).await);
    }

    #[tokio::test]
    async fn empty_password_still_rejected() {
        assert_eq!(hash_off_thread(String::new()).await, Err(PasswordError::Empty));
    }
}
