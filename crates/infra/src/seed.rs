//! First-start installation of the RBAC catalog, default navigation and the
//! optional bootstrap administrator. Safe to run on every start.

use std::collections::HashMap;

use thiserror::Error;
use tracing::{info, warn};

use datalink_auth::roles::SUPER_ADMIN_ROLE;
use datalink_auth::seed::{default_catalog, default_routes};
use datalink_auth::{Grant, PasswordError, hash_password};
use datalink_core::{Page, PermissionId, RouteId};

use crate::error::StoreError;
use crate::model::{NewRole, NewUser, RouteInput};
use crate::store::DataStore;

pub const BOOTSTRAP_ADMIN_NAME: &str = "admin";

#[derive(Debug, Error)]
pub enum SeedError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("bootstrap password: {0}")]
    Password(#[from] PasswordError),

    #[error("bootstrap password hashing task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// What a seeding run changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeedReport {
    pub permissions: usize,
    pub roles: usize,
    pub routes: usize,
    pub admin_created: bool,
}

pub async fn ensure_defaults<S>(store: &S, bootstrap_password: Option<&str>) -> Result<SeedReport, SeedError>
where
    S: DataStore + ?Sized,
{
    let mut report = SeedReport::default();

    if store.count_roles().await? == 0 {
        install_catalog(store, &mut report).await?;
    }

    if store.list_routes().await?.is_empty() {
        report.routes = install_routes(store).await?;
    }

    if let Some(password) = bootstrap_password {
        report.admin_created = ensure_admin(store, password).await?;
    }

    info!(
        permissions = report.permissions,
        roles = report.roles,
        routes = report.routes,
        admin_created = report.admin_created,
        "defaults ensured"
    );
    Ok(report)
}

async fn install_catalog<S>(store: &S, report: &mut SeedReport) -> Result<(), SeedError>
where
    S: DataStore + ?Sized,
{
    let catalog = default_catalog();

    let mut known: HashMap<Grant, PermissionId> = store
        .list_permissions(Page::all())
        .await?
        .into_iter()
        .map(|p| (p.grant, p.id))
        .collect();

    for grant in catalog.permissions {
        if known.contains_key(&grant) {
            continue;
        }
        let created = store.create_permission(grant).await?;
        known.insert(grant, created.id);
        report.permissions += 1;
    }

    for template in catalog.roles {
        let permission_ids = template.grants.iter().filter_map(|g| known.get(g).copied()).collect();
        store
            .create_role(NewRole {
                name: template.name.to_string(),
                description: Some(template.description.to_string()),
                permission_ids,
            })
            .await?;
        report.roles += 1;
    }
    Ok(())
}

async fn install_routes<S>(store: &S) -> Result<usize, SeedError>
where
    S: DataStore + ?Sized,
{
    let mut by_path: HashMap<&'static str, RouteId> = HashMap::new();
    let mut created = 0;
    for template in default_routes() {
        let parent_id = match template.parent {
            Some(parent) => match by_path.get(parent) {
                Some(id) => Some(*id),
                None => {
                    warn!(path = template.path, parent, "default route parent missing; skipped");
                    continue;
                }
            },
            None => None,
        };
        let route = store
            .create_route(RouteInput {
                path: Some(template.path.to_string()),
                name: template.name.to_string(),
                component: Some(template.component.to_string()),
                meta: template.meta,
                parent_id,
                sort_order: template.sort_order,
            })
            .await?;
        by_path.insert(template.path, route.id);
        created += 1;
    }
    Ok(created)
}

async fn ensure_admin<S>(store: &S, password: &str) -> Result<bool, SeedError>
where
    S: DataStore + ?Sized,
{
    if store.find_user_by_name(BOOTSTRAP_ADMIN_NAME).await?.is_some() {
        return Ok(false);
    }
    let roles = store.list_roles(Page::all()).await?;
    let Some(super_admin) = roles.iter().find(|r| r.name == SUPER_ADMIN_ROLE) else {
        warn!("super_admin role missing; bootstrap admin not created");
        return Ok(false);
    };
    let password = password.to_string();
    let password_hash = tokio::task::spawn_blocking(move || hash_password(&password)).await??;
    store
        .create_user(NewUser {
            name: BOOTSTRAP_ADMIN_NAME.to_string(),
            password_hash,
            department_id: None,
            is_active: true,
            role_ids: vec![super_admin.id],
        })
        .await?;
    info!(user = BOOTSTRAP_ADMIN_NAME, "bootstrap admin created");
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryStore;
    use crate::store::{IdentityStore, NavigationStore, load_principal};
    use datalink_auth::{Module, PermissionLevel, verify_password};

    #[tokio::test]
    async fn seeding_is_idempotent() {
        let store = InMemoryStore::new();
        let first = ensure_defaults(&store, None).await.unwrap();
        assert_eq!(first.roles, 4);
        assert_eq!(first.permissions, default_catalog().permissions.len());
        assert_eq!(first.routes, default_routes().len());

        let second = ensure_defaults(&store, None).await.unwrap();
        assert_eq!(second, SeedReport::default());
        assert_eq!(store.count_roles().await.unwrap(), 4);
    }

    #[tokio::test]
    async fn child_routes_point_at_their_parent() {
        let store = InMemoryStore::new();
        ensure_defaults(&store, None).await.unwrap();
        let routes = store.list_routes().await.unwrap();
        let admin = routes.iter().find(|r| r.path.as_deref() == Some("/admin")).unwrap();
        let users = routes.iter().find(|r| r.path.as_deref() == Some("/admin/users")).unwrap();
        assert_eq!(users.parent_id, Some(admin.id));
    }

    #[tokio::test]
    async fn bootstrap_admin_is_super_admin() {
        let store = InMemoryStore::new();
        let report = ensure_defaults(&store, Some("s3cret")).await.unwrap();
        assert!(report.admin_created);

        let admin = store.find_user_by_name(BOOTSTRAP_ADMIN_NAME).await.unwrap().unwrap();
        assert!(verify_password("s3cret", &admin.password_hash));
        let principal = load_principal(&store, admin.id).await.unwrap();
        assert!(principal.is_super_admin());
        assert!(principal.roles[0].has_permission(Module::Qa, PermissionLevel::Admin));

        let again = ensure_defaults(&store, Some("other")).await.unwrap();
        assert!(!again.admin_created);
    }

    #[tokio::test]
    async fn empty_bootstrap_password_surfaces_hash_error() {
        let store = InMemoryStore::new();
        let err = ensure_defaults(&store, Some("")).await.unwrap_err();
        assert!(matches!(err, SeedError::Password(PasswordError::Empty)));
        assert!(store.find_user_by_name(BOOTSTRAP_ADMIN_NAME).await.unwrap().is_none());
    }
}
