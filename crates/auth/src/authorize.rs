use std::collections::BTreeSet;

use serde::Serialize;
use thiserror::Error;

use datalink_core::{DepartmentId, UserId};

use crate::permissions::{Grant, Module, PermissionLevel};
use crate::principal::Principal;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("account is inactive")]
    Inactive,

    #[error("forbidden: missing permission '{0}'")]
    Forbidden(String),
}

/// Authorize a principal for `level` on `module`.
///
/// - No IO
/// - No panics
/// - No business logic (pure policy check)
pub fn authorize(
    principal: &Principal,
    module: Module,
    level: PermissionLevel,
    target_department: Option<DepartmentId>,
) -> Result<(), AuthzError> {
    if !principal.is_active {
        return Err(AuthzError::Inactive);
    }
    if granting_grant(principal, module, level, target_department).is_some() {
        Ok(())
    } else {
        Err(AuthzError::Forbidden(Grant::new(module, level).code()))
    }
}

pub fn has_permission(
    principal: &Principal,
    module: Module,
    level: PermissionLevel,
    target_department: Option<DepartmentId>,
) -> bool {
    authorize(principal, module, level, target_department).is_ok()
}

fn granting_grant(
    principal: &Principal,
    module: Module,
    level: PermissionLevel,
    target_department: Option<DepartmentId>,
) -> Option<(String, Grant)> {
    principal.roles.iter().find_map(|role| {
        role.permissions
            .iter()
            .find(|p| p.grant.grants(module, level, target_department, principal.department_id))
            .map(|p| (role.name.clone(), p.grant))
    })
}

/// Deduplicated, sorted grants across all roles of the principal.
pub fn effective_permissions(principal: &Principal) -> Vec<Grant> {
    principal
        .roles
        .iter()
        .flat_map(|r| r.permissions.iter().map(|p| p.grant))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// Authorization Explanation (Audit Trail)
// ─────────────────────────────────────────────────────────────────────────────

/// Detailed explanation of an authorization decision.
#[derive(Debug, Clone, Serialize)]
pub struct AuthorizationExplanation {
    pub required_permission: String,
    pub granted: bool,
    pub reason: String,
    pub principal: PrincipalState,
    pub denial_reason: Option<DenialReason>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PrincipalState {
    pub user_id: UserId,
    pub name: String,
    pub department_id: Option<DepartmentId>,
    pub is_active: bool,
    pub roles: Vec<String>,
    pub effective_permissions: Vec<String>,
    pub is_super_admin: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct DenialReason {
    pub kind: DenialKind,
    pub message: String,
    pub suggestions: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DenialKind {
    Inactive,
    MissingPermission,
    DepartmentScope,
}

/// Explain why an authorization decision was made (or would be made).
///
/// Answers "why was this request allowed/denied?" and, on denial, which
/// roles of the principal come closest.
pub fn explain_authorization(
    principal: &Principal,
    module: Module,
    level: PermissionLevel,
    target_department: Option<DepartmentId>,
) -> AuthorizationExplanation {
    let required = Grant::new(module, level).code();
    let state = PrincipalState {
        user_id: principal.user_id,
        name: principal.name.clone(),
        department_id: principal.department_id,
        is_active: principal.is_active,
        roles: principal.role_names(),
        effective_permissions: effective_permissions(principal)
            .iter()
            .map(|g| match g.department_id {
                Some(d) => format!("{}@{}", g.code(), d),
                None => g.code(),
            })
            .collect(),
        is_super_admin: principal.is_super_admin(),
    };

    if !principal.is_active {
        return AuthorizationExplanation {
            required_permission: required,
            granted: false,
            reason: format!("User '{}' is inactive", principal.name),
            principal: state,
            denial_reason: Some(DenialReason {
                kind: DenialKind::Inactive,
                message: "Inactive accounts are denied every permission".to_string(),
                suggestions: vec!["Re-activate the account".to_string()],
            }),
        };
    }

    if let Some((role, grant)) = granting_grant(principal, module, level, target_department) {
        return AuthorizationExplanation {
            reason: format!("Role '{}' grants '{}' which covers '{}'", role, grant.code(), required),
            required_permission: required,
            granted: true,
            principal: state,
            denial_reason: None,
        };
    }

    // Scoped grants that would match in another department.
    let scoped_elsewhere: Vec<String> = principal
        .roles
        .iter()
        .filter(|r| {
            r.permissions.iter().any(|p| {
                p.grant.department_id.is_some() && p.grant.module.covers(module) && p.grant.level >= level
            })
        })
        .map(|r| r.name.clone())
        .collect();

    let (kind, message) = if scoped_elsewhere.is_empty() {
        (
            DenialKind::MissingPermission,
            format!("Missing required permission: '{}'", required),
        )
    } else {
        (
            DenialKind::DepartmentScope,
            format!(
                "Roles {:?} grant '{}' only within another department",
                scoped_elsewhere, required
            ),
        )
    };

    let mut suggestions = vec![
        format!("Assign a role that grants '{}' or higher", required),
        format!("Add '{}' to one of the user's roles", required),
    ];
    if let Some(best) = principal
        .roles
        .iter()
        .filter(|r| r.permissions.iter().any(|p| p.grant.module.covers(module)))
        .max_by_key(|r| {
            r.permissions
                .iter()
                .filter(|p| p.grant.module.covers(module))
                .map(|p| p.grant.level)
                .max()
        })
    {
        suggestions.insert(
            0,
            format!("Role '{}' already touches {}; raising its level would grant access", best.name, module),
        );
    }

    AuthorizationExplanation {
        required_permission: required.clone(),
        granted: false,
        reason: format!(
            "User '{}' does not hold '{}'. Current permissions: {:?}",
            principal.name, required, state.effective_permissions
        ),
        principal: state,
        denial_reason: Some(DenialReason {
            kind,
            message,
            suggestions,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::permissions::Permission;
    use crate::roles::Role;
    use datalink_core::{PermissionId, RoleId};

    fn principal(grants: Vec<Grant>, department: Option<DepartmentId>) -> Principal {
        Principal {
            user_id: UserId::new(1),
            name: "alice".into(),
            department_id: department,
            is_active: true,
            roles: vec![Role {
                id: RoleId::new(1),
                name: "line_lead".into(),
                description: None,
                permissions: grants
                    .into_iter()
                    .enumerate()
                    .map(|(i, grant)| Permission {
                        id: PermissionId::new(i as i64 + 1),
                        grant,
                    })
                    .collect(),
            }],
        }
    }

    #[test]
    fn grants_with_sufficient_level() {
        let p = principal(vec![Grant::new(Module::Qa, PermissionLevel::Write)], None);
        assert!(authorize(&p, Module::Qa, PermissionLevel::Read, None).is_ok());
        assert_eq!(
            authorize(&p, Module::Qa, PermissionLevel::Admin, None),
            Err(AuthzError::Forbidden("QA:ADMIN".into()))
        );
    }

    #[test]
    fn inactive_principal_is_denied_even_as_super_admin() {
        let mut p = principal(vec![Grant::new(Module::All, PermissionLevel::SuperAdmin)], None);
        p.is_active = false;
        assert_eq!(
            authorize(&p, Module::Qa, PermissionLevel::Read, None),
            Err(AuthzError::Inactive)
        );
    }

    #[test]
    fn principal_without_roles_is_denied() {
        let mut p = principal(vec![], None);
        p.roles.clear();
        assert!(!has_permission(&p, Module::Event, PermissionLevel::Read, None));
    }

    #[test]
    fn scoped_grant_uses_own_department_by_default() {
        let d = DepartmentId::new(4);
        let p = principal(vec![Grant::new(Module::Maint, PermissionLevel::Write).scoped(d)], Some(d));
        assert!(has_permission(&p, Module::Maint, PermissionLevel::Write, None));
        assert!(!has_permission(&p, Module::Maint, PermissionLevel::Write, Some(DepartmentId::new(5))));
    }

    #[test]
    fn effective_permissions_are_deduplicated() {
        let g = Grant::new(Module::Qa, PermissionLevel::Read);
        let mut p = principal(vec![g, g], None);
        p.roles.push(p.roles[0].clone());
        assert_eq!(effective_permissions(&p), vec![g]);
    }

    #[test]
    fn explanation_reports_granting_role() {
        let p = principal(vec![Grant::new(Module::All, PermissionLevel::SuperAdmin)], None);
        let e = explain_authorization(&p, Module::Ehs, PermissionLevel::Write, None);
        assert!(e.granted);
        assert!(e.reason.contains("line_lead"));
        assert!(e.principal.is_super_admin);
    }

    #[test]
    fn explanation_reports_department_scope_denial() {
        let p = principal(
            vec![Grant::new(Module::Qa, PermissionLevel::Admin).scoped(DepartmentId::new(9))],
            Some(DepartmentId::new(1)),
        );
        let e = explain_authorization(&p, Module::Qa, PermissionLevel::Read, None);
        assert!(!e.granted);
        let denial = e.denial_reason.unwrap();
        assert_eq!(denial.kind, DenialKind::DepartmentScope);
        assert_eq!(e.principal.effective_permissions, vec!["QA:ADMIN@9".to_string()]);
    }

    #[test]
    fn explanation_suggests_closest_role() {
        let p = principal(vec![Grant::new(Module::Qa, PermissionLevel::Read)], None);
        let e = explain_authorization(&p, Module::Qa, PermissionLevel::Write, None);
        let denial = e.denial_reason.unwrap();
        assert_eq!(denial.kind, DenialKind::MissingPermission);
        assert!(denial.suggestions[0].contains("line_lead"));
    }
}
