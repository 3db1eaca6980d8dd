use std::collections::BTreeMap;

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgConnection, Row};
use tracing::{instrument, warn};

use datalink_auth::{Grant, Permission, Role};
use datalink_core::{Change, DepartmentId, Page, PermissionId, RoleId, UserId};

use super::rows::{decode_all, decode_one, department, permission, user};
use super::{PostgresStore, ids};
use crate::error::{StoreError, StoreResult, map_sqlx_error};
use crate::model::{Department, DepartmentInput, NewRole, NewUser, RoleChanges, UserChanges, UserRecord};
use crate::store::{IdentityStore, missing};

async fn fetch_user(conn: &mut PgConnection, id: UserId) -> StoreResult<Option<UserRecord>> {
    let row = sqlx::query(
        r#"
        SELECT u.id, u.name, u.department_id, u.password_hash, u.is_active, u.created_at,
               ARRAY(SELECT ur.role_id FROM user_roles ur WHERE ur.user_id = u.id ORDER BY ur.role_id) AS role_ids
        FROM users u
        WHERE u.id = $1
        "#,
    )
    .bind(i64::from(id))
    .fetch_optional(conn)
    .await
    .map_err(|e| map_sqlx_error("get_user", e))?;
    row.map(|r| decode_one("get_user", &r, user)).transpose()
}

/// Keep only ids present in `table`, logging the rest.
async fn known_ids(conn: &mut PgConnection, table: &str, requested: &[i64]) -> StoreResult<Vec<i64>> {
    let sql = format!("SELECT id FROM {table} WHERE id = ANY($1) ORDER BY id");
    let rows = sqlx::query(&sql)
        .bind(requested)
        .fetch_all(conn)
        .await
        .map_err(|e| map_sqlx_error("known_ids", e))?;
    let known: Vec<i64> = rows
        .iter()
        .map(|r| r.try_get::<i64, _>("id"))
        .collect::<Result<_, _>>()
        .map_err(|e| map_sqlx_error("known_ids", e))?;
    for id in requested.iter().filter(|id| !known.contains(id)) {
        warn!(table, id, "skipping unknown id");
    }
    Ok(known)
}

/// Attach permissions to role rows (`id`, `name`, `description`).
async fn resolve_roles(conn: &mut PgConnection, role_rows: &[PgRow]) -> StoreResult<Vec<Role>> {
    let mut roles = Vec::with_capacity(role_rows.len());
    for row in role_rows {
        let role = (|| -> Result<Role, sqlx::Error> {
            Ok(Role {
                id: RoleId::new(row.try_get("id")?),
                name: row.try_get("name")?,
                description: row.try_get("description")?,
                permissions: Vec::new(),
            })
        })()
        .map_err(|e| map_sqlx_error("resolve_roles", e))?;
        roles.push(role);
    }
    let role_ids: Vec<i64> = roles.iter().map(|r| i64::from(r.id)).collect();
    let rows = sqlx::query(
        r#"
        SELECT rp.role_id, p.id, p.module, p.level, p.department_id
        FROM role_permissions rp
        JOIN permissions p ON p.id = rp.permission_id
        WHERE rp.role_id = ANY($1)
        ORDER BY p.id
        "#,
    )
    .bind(&role_ids)
    .fetch_all(conn)
    .await
    .map_err(|e| map_sqlx_error("resolve_roles", e))?;

    let mut by_role: BTreeMap<i64, Vec<Permission>> = BTreeMap::new();
    for row in &rows {
        let role_id: i64 = row.try_get("role_id").map_err(|e| map_sqlx_error("resolve_roles", e))?;
        by_role
            .entry(role_id)
            .or_default()
            .push(decode_one("resolve_roles", row, permission)?);
    }
    for role in &mut roles {
        role.permissions = by_role.remove(&i64::from(role.id)).unwrap_or_default();
    }
    Ok(roles)
}

pub(super) async fn fetch_role(conn: &mut PgConnection, id: RoleId) -> StoreResult<Role> {
    let rows = sqlx::query("SELECT id, name, description FROM roles WHERE id = $1")
        .bind(i64::from(id))
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("get_role", e))?;
    match resolve_roles(conn, &rows).await?.pop() {
        Some(role) => Ok(role),
        None => missing("role", id),
    }
}

#[async_trait]
impl IdentityStore for PostgresStore {
    #[instrument(skip(self), err)]
    async fn create_department(&self, input: DepartmentInput) -> StoreResult<Department> {
        let row = sqlx::query("INSERT INTO departments (name, description) VALUES ($1, $2) RETURNING *")
            .bind(&input.name)
            .bind(&input.description)
            .fetch_one(self.pool())
            .await
            .map_err(|e| map_sqlx_error("create_department", e))?;
        decode_one("create_department", &row, department)
    }

    #[instrument(skip(self), err)]
    async fn list_departments(&self, page: Page) -> StoreResult<Vec<Department>> {
        let rows = sqlx::query("SELECT * FROM departments ORDER BY id LIMIT $1 OFFSET $2")
            .bind(page.limit)
            .bind(page.skip)
            .fetch_all(self.pool())
            .await
            .map_err(|e| map_sqlx_error("list_departments", e))?;
        decode_all("list_departments", &rows, department)
    }

    #[instrument(skip(self), err)]
    async fn get_department(&self, id: DepartmentId) -> StoreResult<Department> {
        let row = sqlx::query("SELECT * FROM departments WHERE id = $1")
            .bind(i64::from(id))
            .fetch_optional(self.pool())
            .await
            .map_err(|e| map_sqlx_error("get_department", e))?;
        match row {
            Some(row) => decode_one("get_department", &row, department),
            None => missing("department", id),
        }
    }

    #[instrument(skip(self), err)]
    async fn update_department(&self, id: DepartmentId, input: DepartmentInput) -> StoreResult<Change<Department>> {
        let before = self.get_department(id).await?;
        let row = sqlx::query("UPDATE departments SET name = $2, description = $3 WHERE id = $1 RETURNING *")
            .bind(i64::from(id))
            .bind(&input.name)
            .bind(&input.description)
            .fetch_one(self.pool())
            .await
            .map_err(|e| map_sqlx_error("update_department", e))?;
        let after = decode_one("update_department", &row, department)?;
        Ok(Change { before, after })
    }

    #[instrument(skip(self), err)]
    async fn delete_department(&self, id: DepartmentId) -> StoreResult<Department> {
        let row = sqlx::query("DELETE FROM departments WHERE id = $1 RETURNING *")
            .bind(i64::from(id))
            .fetch_optional(self.pool())
            .await
            .map_err(|e| map_sqlx_error("delete_department", e))?;
        match row {
            Some(row) => decode_one("delete_department", &row, department),
            None => missing("department", id),
        }
    }

    #[instrument(skip(self, user), fields(name = %user.name), err)]
    async fn create_user(&self, user: NewUser) -> StoreResult<UserRecord> {
        let mut tx = self.begin().await?;
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO users (name, department_id, password_hash, is_active) VALUES ($1, $2, $3, $4) RETURNING id",
        )
        .bind(&user.name)
        .bind(user.department_id.map(i64::from))
        .bind(&user.password_hash)
        .bind(user.is_active)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("create_user", e))?;

        let role_ids = known_ids(&mut tx, "roles", &ids(&user.role_ids)).await?;
        sqlx::query("INSERT INTO user_roles (user_id, role_id) SELECT $1, UNNEST($2::bigint[])")
            .bind(id)
            .bind(&role_ids)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("create_user_roles", e))?;

        let created = fetch_user(&mut tx, UserId::new(id)).await?;
        tx.commit().await.map_err(|e| map_sqlx_error("commit_transaction", e))?;
        created.ok_or_else(|| StoreError::Backend("created user vanished".into()))
    }

    #[instrument(skip(self), err)]
    async fn get_user(&self, id: UserId) -> StoreResult<UserRecord> {
        let mut conn = self.conn().await?;
        match fetch_user(&mut conn, id).await? {
            Some(user) => Ok(user),
            None => missing("user", id),
        }
    }

    #[instrument(skip(self), err)]
    async fn find_user_by_name(&self, name: &str) -> StoreResult<Option<UserRecord>> {
        let id: Option<i64> = sqlx::query_scalar("SELECT id FROM users WHERE name = $1")
            .bind(name)
            .fetch_optional(self.pool())
            .await
            .map_err(|e| map_sqlx_error("find_user_by_name", e))?;
        match id {
            Some(id) => {
                let mut conn = self.conn().await?;
                fetch_user(&mut conn, UserId::new(id)).await
            }
            None => Ok(None),
        }
    }

    #[instrument(skip(self), err)]
    async fn list_users(&self, page: Page) -> StoreResult<Vec<UserRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT u.id, u.name, u.department_id, u.password_hash, u.is_active, u.created_at,
                   ARRAY(SELECT ur.role_id FROM user_roles ur WHERE ur.user_id = u.id ORDER BY ur.role_id) AS role_ids
            FROM users u
            ORDER BY u.id
            LIMIT $1 OFFSET $2
            "#,
        )
        .bind(page.limit)
        .bind(page.skip)
        .fetch_all(self.pool())
        .await
        .map_err(|e| map_sqlx_error("list_users", e))?;
        decode_all("list_users", &rows, user)
    }

    #[instrument(skip(self, changes), err)]
    async fn update_user(&self, id: UserId, changes: UserChanges) -> StoreResult<Change<UserRecord>> {
        let mut tx = self.begin().await?;
        let Some(before) = fetch_user(&mut tx, id).await? else {
            return missing("user", id);
        };
        sqlx::query(
            r#"
            UPDATE users SET
                name = COALESCE($2, name),
                department_id = COALESCE($3, department_id),
                password_hash = COALESCE($4, password_hash),
                is_active = COALESCE($5, is_active)
            WHERE id = $1
            "#,
        )
        .bind(i64::from(id))
        .bind(changes.name)
        .bind(changes.department_id.map(i64::from))
        .bind(changes.password_hash)
        .bind(changes.is_active)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("update_user", e))?;
        let after = fetch_user(&mut tx, id).await?;
        tx.commit().await.map_err(|e| map_sqlx_error("commit_transaction", e))?;
        match after {
            Some(after) => Ok(Change { before, after }),
            None => missing("user", id),
        }
    }

    #[instrument(skip(self), err)]
    async fn delete_user(&self, id: UserId) -> StoreResult<UserRecord> {
        let mut tx = self.begin().await?;
        let Some(user) = fetch_user(&mut tx, id).await? else {
            return missing("user", id);
        };
        sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(i64::from(id))
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("delete_user", e))?;
        tx.commit().await.map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(user)
    }

    #[instrument(skip(self), err)]
    async fn set_user_roles(&self, id: UserId, role_ids: &[RoleId]) -> StoreResult<UserRecord> {
        let mut tx = self.begin().await?;
        if fetch_user(&mut tx, id).await?.is_none() {
            return missing("user", id);
        }
        let role_ids = known_ids(&mut tx, "roles", &ids(role_ids)).await?;
        sqlx::query("DELETE FROM user_roles WHERE user_id = $1")
            .bind(i64::from(id))
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("set_user_roles", e))?;
        sqlx::query("INSERT INTO user_roles (user_id, role_id) SELECT $1, UNNEST($2::bigint[])")
            .bind(i64::from(id))
            .bind(&role_ids)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("set_user_roles", e))?;
        let user = fetch_user(&mut tx, id).await?;
        tx.commit().await.map_err(|e| map_sqlx_error("commit_transaction", e))?;
        user.ok_or_else(|| StoreError::not_found(format!("user {id}")))
    }

    #[instrument(skip(self), err)]
    async fn create_permission(&self, grant: Grant) -> StoreResult<Permission> {
        let row = sqlx::query("INSERT INTO permissions (module, level, department_id) VALUES ($1, $2, $3) RETURNING *")
            .bind(grant.module.as_str())
            .bind(grant.level.as_str())
            .bind(grant.department_id.map(i64::from))
            .fetch_one(self.pool())
            .await
            .map_err(|e| map_sqlx_error("create_permission", e))?;
        decode_one("create_permission", &row, permission)
    }

    #[instrument(skip(self), err)]
    async fn list_permissions(&self, page: Page) -> StoreResult<Vec<Permission>> {
        let rows = sqlx::query("SELECT * FROM permissions ORDER BY id LIMIT $1 OFFSET $2")
            .bind(page.limit)
            .bind(page.skip)
            .fetch_all(self.pool())
            .await
            .map_err(|e| map_sqlx_error("list_permissions", e))?;
        decode_all("list_permissions", &rows, permission)
    }

    #[instrument(skip(self), err)]
    async fn get_permission(&self, id: PermissionId) -> StoreResult<Permission> {
        let row = sqlx::query("SELECT * FROM permissions WHERE id = $1")
            .bind(i64::from(id))
            .fetch_optional(self.pool())
            .await
            .map_err(|e| map_sqlx_error("get_permission", e))?;
        match row {
            Some(row) => decode_one("get_permission", &row, permission),
            None => missing("permission", id),
        }
    }

    #[instrument(skip(self), err)]
    async fn update_permission(&self, id: PermissionId, grant: Grant) -> StoreResult<Change<Permission>> {
        let before = self.get_permission(id).await?;
        let row = sqlx::query(
            "UPDATE permissions SET module = $2, level = $3, department_id = $4 WHERE id = $1 RETURNING *",
        )
        .bind(i64::from(id))
        .bind(grant.module.as_str())
        .bind(grant.level.as_str())
        .bind(grant.department_id.map(i64::from))
        .fetch_one(self.pool())
        .await
        .map_err(|e| map_sqlx_error("update_permission", e))?;
        let after = decode_one("update_permission", &row, permission)?;
        Ok(Change { before, after })
    }

    #[instrument(skip(self), err)]
    async fn delete_permission(&self, id: PermissionId) -> StoreResult<Permission> {
        let row = sqlx::query("DELETE FROM permissions WHERE id = $1 RETURNING *")
            .bind(i64::from(id))
            .fetch_optional(self.pool())
            .await
            .map_err(|e| map_sqlx_error("delete_permission", e))?;
        match row {
            Some(row) => decode_one("delete_permission", &row, permission),
            None => missing("permission", id),
        }
    }

    #[instrument(skip(self, role), fields(name = %role.name), err)]
    async fn create_role(&self, role: NewRole) -> StoreResult<Role> {
        let mut tx = self.begin().await?;
        let id: i64 = sqlx::query_scalar("INSERT INTO roles (name, description) VALUES ($1, $2) RETURNING id")
            .bind(&role.name)
            .bind(&role.description)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("create_role", e))?;
        let permission_ids = known_ids(&mut tx, "permissions", &ids(&role.permission_ids)).await?;
        sqlx::query("INSERT INTO role_permissions (role_id, permission_id) SELECT $1, UNNEST($2::bigint[])")
            .bind(id)
            .bind(&permission_ids)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("create_role_permissions", e))?;
        let created = fetch_role(&mut tx, RoleId::new(id)).await?;
        tx.commit().await.map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(created)
    }

    #[instrument(skip(self), err)]
    async fn list_roles(&self, page: Page) -> StoreResult<Vec<Role>> {
        let mut conn = self.conn().await?;
        let rows = sqlx::query("SELECT id, name, description FROM roles ORDER BY id LIMIT $1 OFFSET $2")
            .bind(page.limit)
            .bind(page.skip)
            .fetch_all(&mut *conn)
            .await
            .map_err(|e| map_sqlx_error("list_roles", e))?;
        resolve_roles(&mut conn, &rows).await
    }

    #[instrument(skip(self), err)]
    async fn get_role(&self, id: RoleId) -> StoreResult<Role> {
        let mut conn = self.conn().await?;
        fetch_role(&mut conn, id).await
    }

    #[instrument(skip(self, changes), err)]
    async fn update_role(&self, id: RoleId, changes: RoleChanges) -> StoreResult<Change<Role>> {
        let mut tx = self.begin().await?;
        let before = fetch_role(&mut tx, id).await?;
        sqlx::query("UPDATE roles SET name = COALESCE($2, name), description = COALESCE($3, description) WHERE id = $1")
            .bind(i64::from(id))
            .bind(changes.name)
            .bind(changes.description)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("update_role", e))?;
        let after = fetch_role(&mut tx, id).await?;
        tx.commit().await.map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(Change { before, after })
    }

    #[instrument(skip(self), err)]
    async fn delete_role(&self, id: RoleId) -> StoreResult<Role> {
        let mut tx = self.begin().await?;
        let role = fetch_role(&mut tx, id).await?;
        sqlx::query("DELETE FROM roles WHERE id = $1")
            .bind(i64::from(id))
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("delete_role", e))?;
        tx.commit().await.map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(role)
    }

    #[instrument(skip(self), err)]
    async fn set_role_permissions(&self, id: RoleId, permission_ids: &[PermissionId]) -> StoreResult<Change<Role>> {
        let mut tx = self.begin().await?;
        let before = fetch_role(&mut tx, id).await?;
        let permission_ids = known_ids(&mut tx, "permissions", &ids(permission_ids)).await?;
        sqlx::query("DELETE FROM role_permissions WHERE role_id = $1")
            .bind(i64::from(id))
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("set_role_permissions", e))?;
        sqlx::query("INSERT INTO role_permissions (role_id, permission_id) SELECT $1, UNNEST($2::bigint[])")
            .bind(i64::from(id))
            .bind(&permission_ids)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("set_role_permissions", e))?;
        let after = fetch_role(&mut tx, id).await?;
        tx.commit().await.map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(Change { before, after })
    }

    #[instrument(skip(self), err)]
    async fn roles_by_ids(&self, role_ids: &[RoleId]) -> StoreResult<Vec<Role>> {
        let mut conn = self.conn().await?;
        let rows = sqlx::query("SELECT id, name, description FROM roles WHERE id = ANY($1) ORDER BY id")
            .bind(ids(role_ids))
            .fetch_all(&mut *conn)
            .await
            .map_err(|e| map_sqlx_error("roles_by_ids", e))?;
        resolve_roles(&mut conn, &rows).await
    }

    #[instrument(skip(self), err)]
    async fn count_roles(&self) -> StoreResult<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM roles")
            .fetch_one(self.pool())
            .await
            .map_err(|e| map_sqlx_error("count_roles", e))
    }
}
