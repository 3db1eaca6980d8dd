use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::{PgConnection, Row};
use tracing::instrument;

use datalink_auth::navigation::with_allowed_roles;
use datalink_auth::{Role, RouteEntry};
use datalink_core::{Change, RoleId, RouteId};

use super::identity::fetch_role;
use super::rows::{decode_all, decode_one, route};
use super::{PostgresStore, ids};
use crate::error::{StoreError, StoreResult, map_sqlx_error};
use crate::model::{RouteInput, creates_cycle};
use crate::store::{NavigationStore, missing};

async fn fetch_route(conn: &mut PgConnection, id: RouteId) -> StoreResult<RouteEntry> {
    let row = sqlx::query("SELECT * FROM routes WHERE id = $1")
        .bind(i64::from(id))
        .fetch_optional(conn)
        .await
        .map_err(|e| map_sqlx_error("get_route", e))?;
    match row {
        Some(row) => decode_one("get_route", &row, route),
        None => missing("route", id),
    }
}

async fn all_routes(conn: &mut PgConnection) -> StoreResult<Vec<RouteEntry>> {
    let rows = sqlx::query("SELECT * FROM routes ORDER BY sort_order, id")
        .fetch_all(conn)
        .await
        .map_err(|e| map_sqlx_error("list_routes", e))?;
    decode_all("list_routes", &rows, route)
}

async fn check_parent(conn: &mut PgConnection, id: Option<RouteId>, input: &RouteInput) -> StoreResult<()> {
    let Some(parent) = input.parent_id else {
        return Ok(());
    };
    let routes = all_routes(conn).await?;
    if !routes.iter().any(|r| r.id == parent) {
        return Err(StoreError::Invalid(format!("parent route {parent} does not exist")));
    }
    if let Some(id) = id {
        if creates_cycle(&routes, id, Some(parent)) {
            return Err(StoreError::Invalid("route hierarchy would contain a cycle".into()));
        }
    }
    Ok(())
}

#[async_trait]
impl NavigationStore for PostgresStore {
    #[instrument(skip(self), err)]
    async fn list_routes(&self) -> StoreResult<Vec<RouteEntry>> {
        let mut conn = self.conn().await?;
        all_routes(&mut conn).await
    }

    #[instrument(skip(self), err)]
    async fn get_route(&self, id: RouteId) -> StoreResult<RouteEntry> {
        let mut conn = self.conn().await?;
        fetch_route(&mut conn, id).await
    }

    #[instrument(skip(self), err)]
    async fn create_route(&self, input: RouteInput) -> StoreResult<RouteEntry> {
        let mut tx = self.begin().await?;
        check_parent(&mut tx, None, &input).await?;
        let row = sqlx::query(
            r#"
            INSERT INTO routes (path, name, component, meta, parent_id, sort_order)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(&input.path)
        .bind(&input.name)
        .bind(&input.component)
        .bind(&input.meta)
        .bind(input.parent_id.map(i64::from))
        .bind(input.sort_order)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("create_route", e))?;
        let created = decode_one("create_route", &row, route)?;
        tx.commit().await.map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(created)
    }

    #[instrument(skip(self), err)]
    async fn replace_route(&self, id: RouteId, input: RouteInput) -> StoreResult<Change<RouteEntry>> {
        let mut tx = self.begin().await?;
        let before = fetch_route(&mut tx, id).await?;
        check_parent(&mut tx, Some(id), &input).await?;
        let row = sqlx::query(
            r#"
            UPDATE routes
            SET path = $2, name = $3, component = $4, meta = $5, parent_id = $6, sort_order = $7
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(i64::from(id))
        .bind(&input.path)
        .bind(&input.name)
        .bind(&input.component)
        .bind(&input.meta)
        .bind(input.parent_id.map(i64::from))
        .bind(input.sort_order)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("replace_route", e))?;
        let after = decode_one("replace_route", &row, route)?;
        tx.commit().await.map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(Change { before, after })
    }

    #[instrument(skip(self), err)]
    async fn delete_route(&self, id: RouteId) -> StoreResult<RouteEntry> {
        let mut tx = self.begin().await?;
        let children: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM routes WHERE parent_id = $1")
            .bind(i64::from(id))
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("delete_route", e))?;
        if children > 0 {
            return Err(StoreError::Conflict(format!("route {id} still has child routes")));
        }
        let route = fetch_route(&mut tx, id).await?;
        sqlx::query("DELETE FROM routes WHERE id = $1")
            .bind(i64::from(id))
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("delete_route", e))?;
        tx.commit().await.map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(route)
    }

    #[instrument(skip(self), err)]
    async fn route_grants(&self) -> StoreResult<HashMap<RouteId, Vec<RoleId>>> {
        let rows = sqlx::query("SELECT route_id, role_id FROM route_roles ORDER BY route_id, role_id")
            .fetch_all(self.pool())
            .await
            .map_err(|e| map_sqlx_error("route_grants", e))?;
        let mut grants: HashMap<RouteId, Vec<RoleId>> = HashMap::new();
        for row in &rows {
            let route_id: i64 = row.try_get("route_id").map_err(|e| map_sqlx_error("route_grants", e))?;
            let role_id: i64 = row.try_get("role_id").map_err(|e| map_sqlx_error("route_grants", e))?;
            grants.entry(RouteId::new(route_id)).or_default().push(RoleId::new(role_id));
        }
        Ok(grants)
    }

    #[instrument(skip(self), err)]
    async fn route_roles(&self, id: RouteId) -> StoreResult<Vec<Role>> {
        let mut conn = self.conn().await?;
        fetch_route(&mut conn, id).await?;
        let role_ids: Vec<i64> = sqlx::query_scalar("SELECT role_id FROM route_roles WHERE route_id = $1 ORDER BY role_id")
            .bind(i64::from(id))
            .fetch_all(&mut *conn)
            .await
            .map_err(|e| map_sqlx_error("route_roles", e))?;
        let mut roles = Vec::with_capacity(role_ids.len());
        for role_id in role_ids {
            roles.push(fetch_role(&mut conn, RoleId::new(role_id)).await?);
        }
        Ok(roles)
    }

    #[instrument(skip(self), err)]
    async fn set_route_roles(&self, id: RouteId, role_ids: &[RoleId]) -> StoreResult<Change<RouteEntry>> {
        let mut tx = self.begin().await?;
        let before = fetch_route(&mut tx, id).await?;
        let mut wanted = ids(role_ids);
        wanted.sort_unstable();
        wanted.dedup();
        let known: Vec<i64> = sqlx::query_scalar("SELECT id FROM roles WHERE id = ANY($1)")
            .bind(&wanted)
            .fetch_all(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("set_route_roles", e))?;
        if let Some(unknown) = wanted.iter().find(|id| !known.contains(id)) {
            return Err(StoreError::Invalid(format!("role {unknown} does not exist")));
        }
        sqlx::query("DELETE FROM route_roles WHERE route_id = $1")
            .bind(i64::from(id))
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("set_route_roles", e))?;
        sqlx::query("INSERT INTO route_roles (route_id, role_id) SELECT $1, UNNEST($2::bigint[])")
            .bind(i64::from(id))
            .bind(&wanted)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("set_route_roles", e))?;

        let granted: Vec<RoleId> = wanted.into_iter().map(RoleId::new).collect();
        let meta = with_allowed_roles(before.meta.clone(), &granted);
        let row = sqlx::query("UPDATE routes SET meta = $2 WHERE id = $1 RETURNING *")
            .bind(i64::from(id))
            .bind(&meta)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("set_route_roles", e))?;
        let after = decode_one("set_route_roles", &row, route)?;
        tx.commit().await.map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(Change { before, after })
    }
}
