//! Identity and navigation records owned by storage.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use datalink_core::{DepartmentId, DomainError, DomainResult, RoleId, RouteId, UserId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Department {
    pub id: DepartmentId,
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepartmentInput {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

impl DepartmentInput {
    pub fn validate(self) -> DomainResult<Self> {
        let name = self.name.trim().to_string();
        if name.is_empty() {
            return Err(DomainError::validation("department name must not be empty"));
        }
        Ok(Self {
            name,
            description: self.description.map(|d| d.trim().to_string()).filter(|d| !d.is_empty()),
        })
    }
}

/// A stored user account. The password hash never leaves the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserRecord {
    pub id: UserId,
    pub name: String,
    pub department_id: Option<DepartmentId>,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub is_active: bool,
    pub role_ids: Vec<RoleId>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    pub name: String,
    pub password_hash: String,
    pub department_id: Option<DepartmentId>,
    pub is_active: bool,
    pub role_ids: Vec<RoleId>,
}

/// Field-wise user update; `None` leaves the field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserChanges {
    pub name: Option<String>,
    pub password_hash: Option<String>,
    pub department_id: Option<DepartmentId>,
    pub is_active: Option<bool>,
}

pub fn validate_user_name(name: &str) -> DomainResult<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(DomainError::validation("user name must not be empty"));
    }
    if name.len() > 50 {
        return Err(DomainError::validation("user name must be at most 50 characters"));
    }
    Ok(name.to_string())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRole {
    pub name: String,
    pub description: Option<String>,
    pub permission_ids: Vec<datalink_core::PermissionId>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoleChanges {
    pub name: Option<String>,
    pub description: Option<String>,
}

pub fn validate_role_name(name: &str) -> DomainResult<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(DomainError::validation("role name must not be empty"));
    }
    Ok(name.to_string())
}

/// A route as written by the navigation endpoints (meta already normalized).
#[derive(Debug, Clone, PartialEq)]
pub struct RouteInput {
    pub path: Option<String>,
    pub name: String,
    pub component: Option<String>,
    pub meta: Value,
    pub parent_id: Option<RouteId>,
    pub sort_order: i32,
}

impl RouteInput {
    pub fn validate(self, id: Option<RouteId>) -> DomainResult<Self> {
        let name = self.name.trim().to_string();
        if name.is_empty() {
            return Err(DomainError::validation("route name must not be empty"));
        }
        if id.is_some() && self.parent_id == id {
            return Err(DomainError::validation("a route cannot be its own parent"));
        }
        let path = self.path.map(|p| p.trim().to_string()).filter(|p| !p.is_empty());
        if let Some(p) = &path {
            if !p.starts_with('/') {
                return Err(DomainError::validation("route path must start with '/'"));
            }
        }
        Ok(Self { path, name, ..self })
    }
}

/// Whether re-parenting `id` under `parent` would make the route its own ancestor.
pub fn creates_cycle(routes: &[datalink_auth::RouteEntry], id: RouteId, parent: Option<RouteId>) -> bool {
    let mut cursor = parent;
    let mut hops = 0;
    while let Some(current) = cursor {
        if current == id || hops > routes.len() {
            return true;
        }
        cursor = routes.iter().find(|r| r.id == current).and_then(|r| r.parent_id);
        hops += 1;
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn password_hash_is_not_serialized() {
        let u = UserRecord {
            id: UserId::new(1),
            name: "a".into(),
            department_id: None,
            password_hash: "$argon2id$secret".into(),
            is_active: true,
            role_ids: vec![],
            created_at: Utc::now(),
        };
        let v = serde_json::to_value(&u).unwrap();
        assert!(v.get("password_hash").is_none());
    }

    #[test]
    fn route_validation() {
        let base = RouteInput {
            path: Some(" /qa ".into()),
            name: "Qa".into(),
            component: None,
            meta: json!({}),
            parent_id: Some(RouteId::new(2)),
            sort_order: 0,
        };
        assert_eq!(base.clone().validate(None).unwrap().path.as_deref(), Some("/qa"));
        assert!(base.clone().validate(Some(RouteId::new(2))).is_err());
        assert!(RouteInput { path: Some("qa".into()), ..base.clone() }.validate(None).is_err());
        assert!(RouteInput { name: " ".into(), ..base }.validate(None).is_err());
    }

    #[test]
    fn cycle_detection_walks_ancestors() {
        let entry = |id: i64, parent: Option<i64>| datalink_auth::RouteEntry {
            id: RouteId::new(id),
            path: None,
            name: format!("r{id}"),
            component: None,
            meta: None,
            parent_id: parent.map(RouteId::new),
            sort_order: 0,
        };
        let routes = vec![entry(1, None), entry(2, Some(1)), entry(3, Some(2))];
        assert!(creates_cycle(&routes, RouteId::new(1), Some(RouteId::new(3))));
        assert!(!creates_cycle(&routes, RouteId::new(3), Some(RouteId::new(1))));
        assert!(!creates_cycle(&routes, RouteId::new(2), None));
    }

    #[test]
    fn user_and_department_names() {
        assert_eq!(validate_user_name(" bob ").unwrap(), "bob");
        assert!(validate_user_name("").is_err());
        assert!(validate_user_name(&"x".repeat(51)).is_err());
        assert!(DepartmentInput { name: " ".into(), description: None }.validate().is_err());
    }
}
