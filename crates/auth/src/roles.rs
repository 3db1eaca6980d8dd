use serde::{Deserialize, Serialize};

use datalink_core::RoleId;

use crate::permissions::{Module, Permission, PermissionLevel};

/// Role names that ship with every installation and cannot be deleted.
pub const SUPER_ADMIN_ROLE: &str = "super_admin";
pub const SYSTEM_ADMIN_ROLE: &str = "system_admin";
pub const DEPARTMENT_ADMIN_ROLE: &str = "department_admin";
pub const USER_ROLE: &str = "user";

pub const RESERVED_ROLES: [&str; 4] = [SUPER_ADMIN_ROLE, SYSTEM_ADMIN_ROLE, DEPARTMENT_ADMIN_ROLE, USER_ROLE];

pub fn is_reserved_role(name: &str) -> bool {
    RESERVED_ROLES.contains(&name)
}

/// RBAC role with its resolved permissions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: RoleId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub permissions: Vec<Permission>,
}

impl Role {
    /// Unscoped check: does any permission of this role reach `level` on `module`?
    pub fn has_permission(&self, module: Module, level: PermissionLevel) -> bool {
        self.permissions
            .iter()
            .any(|p| p.grant.module.covers(module) && p.grant.level >= level)
    }

    pub fn is_super_admin(&self) -> bool {
        self.permissions
            .iter()
            .any(|p| p.grant.module == Module::All && p.grant.level == PermissionLevel::SuperAdmin)
    }
}
