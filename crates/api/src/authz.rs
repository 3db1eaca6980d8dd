//! API-side authorization guard.
//!
//! Handlers call these before touching storage; the policy itself lives in
//! `datalink_auth`.

use axum::response::Response;

use datalink_auth::{Module, PermissionLevel, authorize};
use datalink_core::{DepartmentId, UserId};

use crate::app::errors::authz_error_to_response;
use crate::context::CurrentUser;

pub fn require(user: &CurrentUser, module: Module, level: PermissionLevel) -> Result<(), Response> {
    require_in(user, module, level, None)
}

/// Like [`require`], for an operation on a specific department's data.
pub fn require_in(
    user: &CurrentUser,
    module: Module,
    level: PermissionLevel,
    department: Option<DepartmentId>,
) -> Result<(), Response> {
    authorize(user.principal(), module, level, department).map_err(|e| {
        tracing::warn!(
            user_id = %user.user_id(),
            module = %module,
            level = %level,
            error = %e,
            "authorization denied"
        );
        authz_error_to_response(e)
    })
}

/// Acting on one's own account is always allowed; otherwise `level` on USER.
pub fn require_self_or(user: &CurrentUser, target: UserId, level: PermissionLevel) -> Result<(), Response> {
    if user.user_id() == target {
        return Ok(());
    }
    require(user, Module::User, level)
}
