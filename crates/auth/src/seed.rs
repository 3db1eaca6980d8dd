//! Built-in RBAC catalog and default navigation, installed on first start.

use serde_json::{Value, json};

use crate::permissions::{Grant, Module, PermissionLevel};
use crate::roles::{DEPARTMENT_ADMIN_ROLE, SUPER_ADMIN_ROLE, SYSTEM_ADMIN_ROLE, USER_ROLE};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleTemplate {
    pub name: &'static str,
    pub description: &'static str,
    pub grants: Vec<Grant>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Catalog {
    pub permissions: Vec<Grant>,
    pub roles: Vec<RoleTemplate>,
}

const STANDARD_LEVELS: [PermissionLevel; 3] = [PermissionLevel::Read, PermissionLevel::Write, PermissionLevel::Admin];

fn all_levels(modules: &[Module]) -> Vec<Grant> {
    modules
        .iter()
        .flat_map(|m| STANDARD_LEVELS.iter().map(|l| Grant::new(*m, *l)))
        .collect()
}

pub fn default_catalog() -> Catalog {
    let super_admin = Grant::new(Module::All, PermissionLevel::SuperAdmin);

    let mut permissions = vec![super_admin];
    permissions.extend(all_levels(&Module::CONCRETE));

    let department_admin = Module::CONCRETE
        .iter()
        .flat_map(|m| {
            let mut g = vec![Grant::new(*m, PermissionLevel::Read), Grant::new(*m, PermissionLevel::Write)];
            if !matches!(m, Module::User | Module::Department) {
                g.push(Grant::new(*m, PermissionLevel::Admin));
            }
            g
        })
        .collect();

    let roles = vec![
        RoleTemplate {
            name: SUPER_ADMIN_ROLE,
            description: "Unrestricted access to every module",
            grants: vec![super_admin],
        },
        RoleTemplate {
            name: SYSTEM_ADMIN_ROLE,
            description: "Manages users, departments and navigation",
            grants: all_levels(&[Module::User, Module::Department, Module::Route]),
        },
        RoleTemplate {
            name: DEPARTMENT_ADMIN_ROLE,
            description: "Manages data of every business module",
            grants: department_admin,
        },
        RoleTemplate {
            name: USER_ROLE,
            description: "Read-only access to every module",
            grants: Module::CONCRETE
                .iter()
                .map(|m| Grant::new(*m, PermissionLevel::Read))
                .collect(),
        },
    ];

    Catalog { permissions, roles }
}

/// A default navigation entry. `parent` refers to another entry's `path`.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteTemplate {
    pub path: &'static str,
    pub name: &'static str,
    pub component: &'static str,
    pub meta: Value,
    pub parent: Option<&'static str>,
    pub sort_order: i32,
}

fn nav(path: &'static str, name: &'static str, component: &'static str, title: &str, icon: &str, permission: &str, group: &str, sort_order: i32) -> RouteTemplate {
    RouteTemplate {
        path,
        name,
        component,
        meta: json!({
            "title": title,
            "icon": icon,
            "requiresAuth": true,
            "permission": permission,
            "group": group,
            "permissions": [],
        }),
        parent: None,
        sort_order,
    }
}

/// Default navigation; parents precede their children.
pub fn default_routes() -> Vec<RouteTemplate> {
    let child = |mut r: RouteTemplate, parent: &'static str| {
        r.parent = Some(parent);
        r
    };
    vec![
        nav("/dashboard", "Dashboard", "Dashboard", "Home", "mdi-view-dashboard", "*", "main", 0),
        nav("/events", "Events", "Events", "Events", "mdi-calendar-text", "*", "main", 1),
        nav("/quality", "Quality", "Quality", "GP12", "mdi-checkbox-multiple-marked-circle-outline", "QA", "qa", 0),
        nav("/qa_others", "QaOthers", "Qa_others", "Quality misc", "mdi-account-group-outline", "QA", "qa", 1),
        nav("/assy", "Assy", "Assy", "Assembly", "mdi-hammer-wrench", "ASSY", "assy", 0),
        nav("/maintenance", "Maintenance", "Maintenance", "Maintenance", "mdi-wrench", "MAINT", "maint", 0),
        nav("/pcl", "Pcl", "Pcl", "Logistics", "mdi-truck", "PCL", "pcl", 0),
        nav("/ehs", "EHS", "EHS", "EHS", "mdi-security", "EHS", "ehs", 0),
        nav("/admin", "Admin", "Admin", "Administration", "mdi-cog", "USER", "admin", 0),
        child(nav("/admin/users", "AdminUsers", "Admin", "Users", "mdi-account-group", "USER", "admin", 0), "/admin"),
        child(
            nav("/admin/departments", "AdminDepartments", "AdminDepartments", "Departments", "mdi-office-building", "DEPARTMENT", "admin", 1),
            "/admin",
        ),
        child(
            nav("/admin/activities", "AdminActivities", "AdminActivities", "Activity log", "mdi-history", "ACTIVITY", "admin", 2),
            "/admin",
        ),
        child(nav("/admin/routes", "AdminRoutes", "AdminRoutes", "Navigation", "mdi-routes", "ROUTE", "admin", 3), "/admin"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn role<'a>(c: &'a Catalog, name: &str) -> &'a RoleTemplate {
        c.roles.iter().find(|r| r.name == name).unwrap()
    }

    #[test]
    fn catalog_permissions_cover_every_role_grant() {
        let c = default_catalog();
        for r in &c.roles {
            for g in &r.grants {
                assert!(c.permissions.contains(g), "{} missing {}", r.name, g);
            }
        }
        assert_eq!(c.permissions.len(), 1 + Module::CONCRETE.len() * 3);
    }

    #[test]
    fn department_admin_cannot_administer_users() {
        let c = default_catalog();
        let r = role(&c, DEPARTMENT_ADMIN_ROLE);
        assert!(r.grants.contains(&Grant::new(Module::User, PermissionLevel::Write)));
        assert!(!r.grants.contains(&Grant::new(Module::User, PermissionLevel::Admin)));
        assert!(r.grants.contains(&Grant::new(Module::Qa, PermissionLevel::Admin)));
    }

    #[test]
    fn plain_user_only_reads() {
        let c = default_catalog();
        assert!(role(&c, USER_ROLE).grants.iter().all(|g| g.level == PermissionLevel::Read));
    }

    #[test]
    fn route_parents_come_first() {
        let routes = default_routes();
        for (i, r) in routes.iter().enumerate() {
            if let Some(parent) = r.parent {
                assert!(routes[..i].iter().any(|p| p.path == parent));
            }
        }
    }
}
