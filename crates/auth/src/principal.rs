use serde::Serialize;

use datalink_core::{DepartmentId, RoleId, UserId};

use crate::roles::Role;

/// A fully resolved principal for authorization decisions.
///
/// Built per request from the stored user and its roles, so role changes take
/// effect without a new token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Principal {
    pub user_id: UserId,
    pub name: String,
    pub department_id: Option<DepartmentId>,
    pub is_active: bool,
    pub roles: Vec<Role>,
}

impl Principal {
    pub fn is_super_admin(&self) -> bool {
        self.roles.iter().any(Role::is_super_admin)
    }

    pub fn role_ids(&self) -> Vec<RoleId> {
        self.roles.iter().map(|r| r.id).collect()
    }

    pub fn role_names(&self) -> Vec<String> {
        self.roles.iter().map(|r| r.name.clone()).collect()
    }
}
