use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use datalink_auth::{Grant, Module, PathConfig, PermissionLevel, Role};
use datalink_core::{DepartmentId, DomainResult, PermissionId, RoleId, RouteId, UserId};
use datalink_infra::model::UserRecord;

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub name: String,
    pub password: String,
    #[serde(default)]
    pub department_id: Option<DepartmentId>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub role_ids: Vec<RoleId>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateUserRequest {
    pub name: Option<String>,
    pub password: Option<String>,
    pub department_id: Option<DepartmentId>,
    pub is_active: Option<bool>,
    pub role_ids: Option<Vec<RoleId>>,
}

#[derive(Debug, Deserialize)]
pub struct RoleIdsRequest {
    pub role_ids: Vec<RoleId>,
}

#[derive(Debug, Deserialize)]
pub struct PermissionRequest {
    pub module: String,
    pub level: String,
    #[serde(default)]
    pub department_id: Option<DepartmentId>,
}

impl PermissionRequest {
    pub fn into_grant(self) -> DomainResult<Grant> {
        let grant = Grant::new(self.module.parse::<Module>()?, self.level.parse::<PermissionLevel>()?);
        Ok(match self.department_id {
            Some(d) => grant.scoped(d),
            None => grant,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct RoleRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub permission_ids: Vec<PermissionId>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RoleUpdateRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub permission_ids: Option<Vec<PermissionId>>,
}

/// Either a bare id array or `{"permission_ids": [...]}`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum PermissionIdsRequest {
    Bare(Vec<PermissionId>),
    Wrapped { permission_ids: Vec<PermissionId> },
}

impl PermissionIdsRequest {
    pub fn into_ids(self) -> Vec<PermissionId> {
        match self {
            PermissionIdsRequest::Bare(ids) | PermissionIdsRequest::Wrapped { permission_ids: ids } => ids,
        }
    }
}

/// Body of `POST /check-permission` and query of `GET /permissions/explain`.
#[derive(Debug, Deserialize)]
pub struct PermissionCheck {
    pub module: String,
    pub level: String,
    #[serde(default)]
    pub department_id: Option<DepartmentId>,
    /// Explain for another user (USER READ required).
    #[serde(default)]
    pub user_id: Option<UserId>,
}

impl PermissionCheck {
    pub fn parse(&self) -> DomainResult<(Module, PermissionLevel)> {
        Ok((self.module.parse()?, self.level.parse()?))
    }
}

#[derive(Debug, Deserialize)]
pub struct RouteRequest {
    #[serde(default)]
    pub path: Option<String>,
    pub name: String,
    #[serde(default)]
    pub component: Option<String>,
    #[serde(default)]
    pub meta: Option<Value>,
    #[serde(default)]
    pub parent_id: Option<RouteId>,
    #[serde(default)]
    pub sort_order: i32,
    #[serde(default, rename = "pathConfig", alias = "path_config")]
    pub path_config: Option<PathConfig>,
}

/// Partial route update. `parent_id: null` detaches the route; an absent
/// field leaves it alone.
#[derive(Debug, Default, Deserialize)]
pub struct RoutePatchRequest {
    pub path: Option<String>,
    pub name: Option<String>,
    pub component: Option<String>,
    pub meta: Option<Value>,
    #[serde(default, deserialize_with = "double_option")]
    pub parent_id: Option<Option<RouteId>>,
    pub sort_order: Option<i32>,
}

fn double_option<'de, D, T>(de: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(de).map(Some)
}

fn default_true() -> bool {
    true
}

/// Accepts either a single JSON object or an array of them.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    Many(Vec<T>),
    One(T),
}

impl<T> OneOrMany<T> {
    pub fn into_vec(self) -> Vec<T> {
        match self {
            OneOrMany::Many(items) => items,
            OneOrMany::One(item) => vec![item],
        }
    }
}

// -------------------------
// Query strings
// -------------------------

#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub skip: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct MonthQuery {
    pub year: Option<i32>,
    pub month: Option<i32>,
    #[serde(alias = "scrapflag")]
    pub scrap: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
pub struct YearQuery {
    pub year: Option<i32>,
}

#[derive(Debug, Default, Deserialize)]
pub struct EventQuery {
    pub department: Option<String>,
    #[serde(default)]
    pub upcoming: bool,
    pub skip: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PclQuery {
    pub line: Option<String>,
    pub skip: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AssemblyQuery {
    pub line: Option<String>,
    pub shift: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub skip: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct MetricQuery {
    pub equipment_type: Option<String>,
    pub shift: Option<String>,
    pub user_id: Option<UserId>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub skip: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DowntimeQuery {
    pub line: Option<String>,
    pub shift: Option<String>,
    pub status: Option<String>,
    pub user_id: Option<UserId>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub skip: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TaskQuery {
    pub user_id: Option<UserId>,
    pub start_date: Option<NaiveDate>,
    pub solved: Option<bool>,
    pub skip: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ChartQuery {
    pub equipment_type: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ActivityQuery {
    pub user_id: Option<UserId>,
    pub department: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub days: Option<i64>,
    pub skip: Option<i64>,
    pub limit: Option<i64>,
}

// -------------------------
// Response DTOs
// -------------------------

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: &'static str,
    pub user_id: UserId,
    pub user_name: String,
    pub department: Option<String>,
    pub roles: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RoleSummary {
    pub id: RoleId,
    pub name: String,
}

impl From<&Role> for RoleSummary {
    fn from(r: &Role) -> Self {
        Self {
            id: r.id,
            name: r.name.clone(),
        }
    }
}

/// A user as shown to clients: department and roles resolved to names.
#[derive(Debug, Clone, Serialize)]
pub struct UserView {
    pub id: UserId,
    pub name: String,
    pub department_id: Option<DepartmentId>,
    pub department: Option<String>,
    pub is_active: bool,
    pub roles: Vec<RoleSummary>,
    pub created_at: DateTime<Utc>,
}

impl UserView {
    pub fn new(user: UserRecord, department: Option<String>, roles: &[Role]) -> Self {
        Self {
            id: user.id,
            name: user.name,
            department_id: user.department_id,
            department,
            is_active: user.is_active,
            roles: roles.iter().map(RoleSummary::from).collect(),
            created_at: user.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn patch_distinguishes_null_from_absent_parent() {
        let absent: RoutePatchRequest = serde_json::from_str(r#"{"name":"x"}"#).unwrap();
        assert_eq!(absent.parent_id, None);

        let detached: RoutePatchRequest = serde_json::from_str(r#"{"parent_id":null}"#).unwrap();
        assert_eq!(detached.parent_id, Some(None));

        let moved: RoutePatchRequest = serde_json::from_str(r#"{"parent_id":4}"#).unwrap();
        assert_eq!(moved.parent_id, Some(Some(RouteId::new(4))));
    }

    #[test]
    fn permission_request_builds_scoped_grant() {
        let req = PermissionRequest {
            module: "qa".into(),
            level: "write".into(),
            department_id: Some(DepartmentId::new(3)),
        };
        let grant = req.into_grant().unwrap();
        assert_eq!(grant.code(), "QA:WRITE");
        assert_eq!(grant.department_id, Some(DepartmentId::new(3)));

        let bad = PermissionRequest {
            module: "FINANCE".into(),
            level: "READ".into(),
            department_id: None,
        };
        assert!(bad.into_grant().is_err());
    }

    #[test]
    fn one_or_many_accepts_both_shapes() {
        let one: OneOrMany<i32> = serde_json::from_str("5").unwrap();
        assert_eq!(one.into_vec(), vec![5]);
        let many: OneOrMany<i32> = serde_json::from_str("[1,2]").unwrap();
        assert_eq!(many.into_vec(), vec![1, 2]);
    }
}
