//! Navigation routes: per-principal visibility and tree assembly.
//!
//! Routes carry a free-form JSON `meta` object owned by the front end. The
//! keys read here are `public`, `permission`, `allowed_roles`, `permissions`
//! and `pathConfig`.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use datalink_core::{DomainError, RoleId, RouteId};

use crate::permissions::{Module, PermissionLevel};
use crate::principal::Principal;

/// A stored navigation route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteEntry {
    pub id: RouteId,
    pub path: Option<String>,
    pub name: String,
    pub component: Option<String>,
    pub meta: Option<Value>,
    pub parent_id: Option<RouteId>,
    pub sort_order: i32,
}

impl RouteEntry {
    fn meta_object(&self) -> Option<&Map<String, Value>> {
        self.meta.as_ref().and_then(Value::as_object)
    }

    pub fn is_public(&self) -> bool {
        self.meta_object()
            .and_then(|m| m.get("public"))
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    pub fn permission_tag(&self) -> Option<&str> {
        self.meta_object()
            .and_then(|m| m.get("permission"))
            .and_then(Value::as_str)
    }

    /// Role ids listed in `meta.allowed_roles`. Entries may be numbers or
    /// numeric strings; anything else is ignored.
    pub fn allowed_roles(&self) -> Vec<RoleId> {
        self.meta_object()
            .and_then(|m| m.get("allowed_roles"))
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|v| match v {
                        Value::Number(n) => n.as_i64(),
                        Value::String(s) => s.trim().parse().ok(),
                        _ => None,
                    })
                    .map(RoleId::new)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn path_config(&self) -> Option<PathConfig> {
        self.meta_object()
            .and_then(|m| m.get("pathConfig"))
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }
}

/// Why a route is (or is not) visible to a principal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessReason {
    SuperAdmin,
    RoleGrant,
    Public,
    AllowedRole,
    ModulePermission,
    Denied,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouteAccess {
    pub route_id: RouteId,
    pub has_access: bool,
    pub reason: AccessReason,
    pub matching_roles: Vec<RoleId>,
}

/// Decide whether `principal` may see `route`.
///
/// `granted_roles` are the roles holding an explicit route grant for this
/// route (the route-permission table).
///
/// Access is granted to super admins, to holders of an explicit grant, to
/// routes with `public: true` or `permission: "*"` (or no `permission` key
/// at all), to roles listed in `allowed_roles`, and finally when
/// `permission` names a module the principal can read.
pub fn check_route_access(route: &RouteEntry, principal: &Principal, granted_roles: &[RoleId]) -> RouteAccess {
    let access = |has_access, reason, matching_roles| RouteAccess {
        route_id: route.id,
        has_access,
        reason,
        matching_roles,
    };

    if principal.is_super_admin() {
        return access(true, AccessReason::SuperAdmin, Vec::new());
    }

    let own: HashSet<RoleId> = principal.role_ids().into_iter().collect();

    let granted: Vec<RoleId> = granted_roles.iter().copied().filter(|r| own.contains(r)).collect();
    if !granted.is_empty() {
        return access(true, AccessReason::RoleGrant, granted);
    }

    if route.is_public() {
        return access(true, AccessReason::Public, Vec::new());
    }

    match route.permission_tag() {
        None | Some("*") => return access(true, AccessReason::Public, Vec::new()),
        Some(_) => {}
    }

    let allowed: Vec<RoleId> = route
        .allowed_roles()
        .into_iter()
        .filter(|r| own.contains(r))
        .collect();
    if !allowed.is_empty() {
        return access(true, AccessReason::AllowedRole, allowed);
    }

    if let Some(module) = route.permission_tag().and_then(|t| t.parse::<Module>().ok()) {
        let matching: Vec<RoleId> = principal
            .roles
            .iter()
            .filter(|r| r.has_permission(module, PermissionLevel::Read))
            .map(|r| r.id)
            .collect();
        if principal.is_active && !matching.is_empty() {
            return access(true, AccessReason::ModulePermission, matching);
        }
    }

    access(false, AccessReason::Denied, Vec::new())
}

/// Filter `routes` down to those the principal may see.
///
/// `grants` maps route id to the roles holding an explicit grant on it.
pub fn accessible_routes(
    routes: &[RouteEntry],
    principal: &Principal,
    grants: &HashMap<RouteId, Vec<RoleId>>,
) -> Vec<RouteEntry> {
    routes
        .iter()
        .filter(|r| {
            let granted = grants.get(&r.id).map(Vec::as_slice).unwrap_or(&[]);
            check_route_access(r, principal, granted).has_access
        })
        .cloned()
        .collect()
}

/// A route with its nested children.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteNode {
    #[serde(flatten)]
    pub route: RouteEntry,
    pub children: Vec<RouteNode>,
}

/// Assemble routes into a forest.
///
/// Roots are routes without a parent. Routes whose parent is not in `routes`
/// are dropped with their subtree. Every level is ordered by `sort_order`,
/// then id.
pub fn build_route_tree(routes: &[RouteEntry]) -> Vec<RouteNode> {
    let mut by_parent: HashMap<Option<RouteId>, Vec<&RouteEntry>> = HashMap::new();
    for r in routes {
        by_parent.entry(r.parent_id).or_default().push(r);
    }

    fn attach(parent: Option<RouteId>, by_parent: &HashMap<Option<RouteId>, Vec<&RouteEntry>>, depth: usize) -> Vec<RouteNode> {
        // A cycle in parent ids cannot reach a root, but guard the recursion anyway.
        if depth > 64 {
            return Vec::new();
        }
        let mut level: Vec<&RouteEntry> = by_parent.get(&parent).cloned().unwrap_or_default();
        level.sort_by_key(|r| (r.sort_order, r.id));
        level
            .into_iter()
            .map(|r| RouteNode {
                route: r.clone(),
                children: attach(Some(r.id), by_parent, depth + 1),
            })
            .collect()
    }

    attach(None, &by_parent, 0)
}

/// One dynamic path parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathParam {
    pub name: String,
    #[serde(default = "default_param_type", rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_true")]
    pub required: bool,
}

fn default_param_type() -> String {
    "string".to_string()
}

fn default_true() -> bool {
    true
}

/// Declarative description of a route path with dynamic segments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PathConfig {
    pub base_path: String,
    #[serde(default)]
    pub has_dynamic_segments: bool,
    #[serde(default)]
    pub params: Vec<PathParam>,
}

impl PathConfig {
    /// Concrete router path, e.g. `/reports/:line/:day?`.
    ///
    /// Returns `None` when the config carries no dynamic segments, in which
    /// case the route keeps whatever path it was given.
    pub fn expand_path(&self) -> Option<String> {
        if !self.has_dynamic_segments || self.params.is_empty() {
            return None;
        }
        let mut path = self.base_path.clone();
        for p in &self.params {
            path.push_str("/:");
            path.push_str(&p.name);
            if !p.required {
                path.push('?');
            }
        }
        Some(path)
    }
}

/// Normalize `meta` for a new or replaced route.
///
/// Ensures an object with a `permissions` array and records `path_config`
/// under `pathConfig`. Returns the effective path.
pub fn prepare_route(
    path: Option<String>,
    meta: Option<Value>,
    path_config: Option<&PathConfig>,
) -> Result<(Option<String>, Value), DomainError> {
    let mut meta = match meta {
        None | Some(Value::Null) => Map::new(),
        Some(Value::Object(m)) => m,
        Some(_) => return Err(DomainError::validation("meta must be a JSON object")),
    };
    meta.entry("permissions").or_insert_with(|| Value::Array(Vec::new()));

    let mut path = path;
    if let Some(cfg) = path_config {
        if cfg.base_path.trim().is_empty() {
            return Err(DomainError::validation("pathConfig.basePath must not be empty"));
        }
        let value = serde_json::to_value(cfg).map_err(|e| DomainError::validation(e.to_string()))?;
        meta.insert("pathConfig".to_string(), value);
        if let Some(expanded) = cfg.expand_path() {
            path = Some(expanded);
        }
    }
    Ok((path, Value::Object(meta)))
}

/// Shallow-merge `patch` into `current` (keys in `patch` win).
pub fn merge_meta(current: Option<Value>, patch: Value) -> Result<Value, DomainError> {
    let Value::Object(patch) = patch else {
        return Err(DomainError::validation("meta must be a JSON object"));
    };
    let mut merged = match current {
        Some(Value::Object(m)) => m,
        _ => Map::new(),
    };
    merged.extend(patch);
    Ok(Value::Object(merged))
}

/// Record the role set in `meta.allowed_roles` (as strings, which is what the
/// front end stores).
pub fn with_allowed_roles(meta: Option<Value>, role_ids: &[RoleId]) -> Value {
    let mut m = match meta {
        Some(Value::Object(m)) => m,
        _ => Map::new(),
    };
    m.insert(
        "allowed_roles".to_string(),
        Value::Array(role_ids.iter().map(|r| Value::String(r.to_string())).collect()),
    );
    Value::Object(m)
}
