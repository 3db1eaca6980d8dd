//! In-memory store for tests and database-less development.
//!
//! All tables live behind one `RwLock`, so every operation is atomic with
//! respect to the others. Ids come from a single monotonic counter.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::warn;

use datalink_activity::{Activity, ActivityFilter, NewActivity};
use datalink_auth::navigation::with_allowed_roles;
use datalink_auth::{Grant, Permission, Role, RouteEntry};
use datalink_core::{
    ActivityId, Change, DepartmentId, Page, PermissionId, RecordId, RoleId, RouteId, UpsertReport, UserId, YearMonth,
};
use datalink_maintenance::{
    DailyTask, DailyTaskInput, DailyTaskUpdate, DowntimeFilter, DowntimeInput, DowntimeRecord, DowntimeUpdate,
    MaintenanceMetric, MetricFilter, MetricInput, TaskFilter, WeeklyTask, WeeklyTaskInput, WeeklyTaskUpdate,
};
use datalink_plant::{
    AssemblyFilter, AssemblyInput, AssemblyOutput, EhsWeek, EhsWeekValue, Event, EventFilter, EventInput, PclInput,
    PclRecord,
};
use datalink_quality::{KpiSheet, MonthlyTotal, MonthlyTotalInput, QaEntry, QaEntryInput, QaKpi, QaMisc, QaMiscInput};

use crate::error::{StoreError, StoreResult};
use crate::model::{
    Department, DepartmentInput, NewRole, NewUser, RoleChanges, RouteInput, UserChanges, UserRecord, creates_cycle,
};
use crate::store::{
    ActivityStore, IdentityStore, MaintenanceStore, NavigationStore, PlantStore, QualityStore, missing,
};

#[derive(Debug, Clone)]
struct RoleRow {
    id: RoleId,
    name: String,
    description: Option<String>,
    permission_ids: Vec<PermissionId>,
}

#[derive(Debug, Default)]
struct Tables {
    next_id: i64,
    departments: BTreeMap<DepartmentId, Department>,
    users: BTreeMap<UserId, UserRecord>,
    permissions: BTreeMap<PermissionId, Permission>,
    roles: BTreeMap<RoleId, RoleRow>,
    routes: BTreeMap<RouteId, RouteEntry>,
    route_roles: BTreeMap<RouteId, Vec<RoleId>>,
    qa: BTreeMap<RecordId, QaEntry>,
    qa_misc: BTreeMap<RecordId, QaMisc>,
    qa_kpi: BTreeMap<RecordId, QaKpi>,
    monthly: BTreeMap<RecordId, MonthlyTotal>,
    ehs: BTreeMap<RecordId, EhsWeek>,
    events: BTreeMap<RecordId, Event>,
    pcl: BTreeMap<RecordId, PclRecord>,
    assembly: BTreeMap<RecordId, AssemblyOutput>,
    metrics: BTreeMap<RecordId, MaintenanceMetric>,
    downtime: BTreeMap<RecordId, DowntimeRecord>,
    daily: BTreeMap<RecordId, DailyTask>,
    weekly: BTreeMap<RecordId, WeeklyTask>,
    activities: BTreeMap<ActivityId, Activity>,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn insert_kpi_rows(&mut self, sheet: KpiSheet) -> Vec<QaKpi> {
        let first_id = self.next_id + 1;
        self.next_id += sheet.items.len() as i64;
        let rows = sheet.into_rows(first_id);
        for row in &rows {
            self.qa_kpi.insert(row.id, row.clone());
        }
        rows
    }

    fn resolve_role(&self, row: &RoleRow) -> Role {
        Role {
            id: row.id,
            name: row.name.clone(),
            description: row.description.clone(),
            permissions: row
                .permission_ids
                .iter()
                .filter_map(|id| self.permissions.get(id).cloned())
                .collect(),
        }
    }

    fn role(&self, id: RoleId) -> StoreResult<Role> {
        match self.roles.get(&id) {
            Some(row) => Ok(self.resolve_role(row)),
            None => missing("role", id),
        }
    }

    fn known_permissions(&self, ids: &[PermissionId]) -> Vec<PermissionId> {
        let set: BTreeSet<PermissionId> = ids
            .iter()
            .copied()
            .filter(|id| {
                let known = self.permissions.contains_key(id);
                if !known {
                    warn!(permission_id = %id, "skipping unknown permission");
                }
                known
            })
            .collect();
        set.into_iter().collect()
    }

    fn known_roles(&self, ids: &[RoleId]) -> Vec<RoleId> {
        let set: BTreeSet<RoleId> = ids
            .iter()
            .copied()
            .filter(|id| {
                let known = self.roles.contains_key(id);
                if !known {
                    warn!(role_id = %id, "skipping unknown role");
                }
                known
            })
            .collect();
        set.into_iter().collect()
    }

    fn check_department(&self, id: Option<DepartmentId>) -> StoreResult<()> {
        match id {
            Some(id) if !self.departments.contains_key(&id) => {
                Err(StoreError::Invalid(format!("department {id} does not exist")))
            }
            _ => Ok(()),
        }
    }

    fn check_route_parent(&self, id: Option<RouteId>, input: &RouteInput) -> StoreResult<()> {
        if let Some(parent) = input.parent_id {
            if !self.routes.contains_key(&parent) {
                return Err(StoreError::Invalid(format!("parent route {parent} does not exist")));
            }
            if let Some(id) = id {
                let routes: Vec<RouteEntry> = self.routes.values().cloned().collect();
                if creates_cycle(&routes, id, Some(parent)) {
                    return Err(StoreError::Invalid("route hierarchy would contain a cycle".into()));
                }
            }
        }
        if let Some(path) = &input.path {
            let taken = self
                .routes
                .values()
                .any(|r| Some(r.id) != id && r.path.as_deref() == Some(path.as_str()));
            if taken {
                return Err(StoreError::Conflict(format!("route path '{path}' already exists")));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, Tables>> {
        self.tables
            .read()
            .map_err(|_| StoreError::Backend("in-memory store lock poisoned".into()))
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, Tables>> {
        self.tables
            .write()
            .map_err(|_| StoreError::Backend("in-memory store lock poisoned".into()))
    }
}

fn fetch<K: Ord + Copy + core::fmt::Display, V: Clone>(map: &BTreeMap<K, V>, what: &str, id: K) -> StoreResult<V> {
    match map.get(&id) {
        Some(v) => Ok(v.clone()),
        None => missing(what, id),
    }
}

fn take<K: Ord + Copy + core::fmt::Display, V>(map: &mut BTreeMap<K, V>, what: &str, id: K) -> StoreResult<V> {
    match map.remove(&id) {
        Some(v) => Ok(v),
        None => missing(what, id),
    }
}

/// Store `next` under `id`, returning the before/after pair.
fn swap<K: Ord + Copy + core::fmt::Display, V: Clone>(
    map: &mut BTreeMap<K, V>,
    what: &str,
    id: K,
    next: V,
) -> StoreResult<Change<V>> {
    match map.get_mut(&id) {
        Some(slot) => {
            let before = std::mem::replace(slot, next.clone());
            Ok(Change { before, after: next })
        }
        None => missing(what, id),
    }
}

/// Newest date first, then id descending.
fn newest_first<T>(items: &mut [T], key: impl Fn(&T) -> (chrono::NaiveDate, RecordId)) {
    items.sort_by(|a, b| key(b).cmp(&key(a)));
}

// ─────────────────────────────────────────────────────────────────────────────
// Identity
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait]
impl IdentityStore for InMemoryStore {
    async fn create_department(&self, input: DepartmentInput) -> StoreResult<Department> {
        let mut t = self.write()?;
        if t.departments.values().any(|d| d.name == input.name) {
            return Err(StoreError::Conflict(format!("department '{}' already exists", input.name)));
        }
        let id = DepartmentId::new(t.next_id());
        let department = Department {
            id,
            name: input.name,
            description: input.description,
        };
        t.departments.insert(id, department.clone());
        Ok(department)
    }

    async fn list_departments(&self, page: Page) -> StoreResult<Vec<Department>> {
        Ok(page.apply(self.read()?.departments.values().cloned()))
    }

    async fn get_department(&self, id: DepartmentId) -> StoreResult<Department> {
        fetch(&self.read()?.departments, "department", id)
    }

    async fn update_department(&self, id: DepartmentId, input: DepartmentInput) -> StoreResult<Change<Department>> {
        let mut t = self.write()?;
        if t.departments.values().any(|d| d.id != id && d.name == input.name) {
            return Err(StoreError::Conflict(format!("department '{}' already exists", input.name)));
        }
        let next = Department {
            id,
            name: input.name,
            description: input.description,
        };
        swap(&mut t.departments, "department", id, next)
    }

    async fn delete_department(&self, id: DepartmentId) -> StoreResult<Department> {
        let mut t = self.write()?;
        let department = take(&mut t.departments, "department", id)?;
        for user in t.users.values_mut() {
            if user.department_id == Some(id) {
                user.department_id = None;
            }
        }
        let scoped: Vec<PermissionId> = t
            .permissions
            .values()
            .filter(|p| p.grant.department_id == Some(id))
            .map(|p| p.id)
            .collect();
        for pid in &scoped {
            t.permissions.remove(pid);
        }
        for role in t.roles.values_mut() {
            role.permission_ids.retain(|p| !scoped.contains(p));
        }
        Ok(department)
    }

    async fn create_user(&self, user: NewUser) -> StoreResult<UserRecord> {
        let mut t = self.write()?;
        if t.users.values().any(|u| u.name == user.name) {
            return Err(StoreError::Conflict(format!("user '{}' already exists", user.name)));
        }
        t.check_department(user.department_id)?;
        let role_ids = t.known_roles(&user.role_ids);
        let id = UserId::new(t.next_id());
        let record = UserRecord {
            id,
            name: user.name,
            department_id: user.department_id,
            password_hash: user.password_hash,
            is_active: user.is_active,
            role_ids,
            created_at: Utc::now(),
        };
        t.users.insert(id, record.clone());
        Ok(record)
    }

    async fn get_user(&self, id: UserId) -> StoreResult<UserRecord> {
        fetch(&self.read()?.users, "user", id)
    }

    async fn find_user_by_name(&self, name: &str) -> StoreResult<Option<UserRecord>> {
        Ok(self.read()?.users.values().find(|u| u.name == name).cloned())
    }

    async fn list_users(&self, page: Page) -> StoreResult<Vec<UserRecord>> {
        Ok(page.apply(self.read()?.users.values().cloned()))
    }

    async fn update_user(&self, id: UserId, changes: UserChanges) -> StoreResult<Change<UserRecord>> {
        let mut t = self.write()?;
        let mut next = fetch(&t.users, "user", id)?;
        if let Some(name) = changes.name {
            if t.users.values().any(|u| u.id != id && u.name == name) {
                return Err(StoreError::Conflict(format!("user '{name}' already exists")));
            }
            next.name = name;
        }
        if let Some(department_id) = changes.department_id {
            t.check_department(Some(department_id))?;
            next.department_id = Some(department_id);
        }
        if let Some(hash) = changes.password_hash {
            next.password_hash = hash;
        }
        if let Some(active) = changes.is_active {
            next.is_active = active;
        }
        swap(&mut t.users, "user", id, next)
    }

    async fn delete_user(&self, id: UserId) -> StoreResult<UserRecord> {
        take(&mut self.write()?.users, "user", id)
    }

    async fn set_user_roles(&self, id: UserId, role_ids: &[RoleId]) -> StoreResult<UserRecord> {
        let mut t = self.write()?;
        let role_ids = t.known_roles(role_ids);
        match t.users.get_mut(&id) {
            Some(user) => {
                user.role_ids = role_ids;
                Ok(user.clone())
            }
            None => missing("user", id),
        }
    }

    async fn create_permission(&self, grant: Grant) -> StoreResult<Permission> {
        let mut t = self.write()?;
        if t.permissions.values().any(|p| p.grant == grant) {
            return Err(StoreError::Conflict(format!("permission {grant} already exists")));
        }
        t.check_department(grant.department_id)?;
        let id = PermissionId::new(t.next_id());
        let permission = Permission { id, grant };
        t.permissions.insert(id, permission.clone());
        Ok(permission)
    }

    async fn list_permissions(&self, page: Page) -> StoreResult<Vec<Permission>> {
        Ok(page.apply(self.read()?.permissions.values().cloned()))
    }

    async fn get_permission(&self, id: PermissionId) -> StoreResult<Permission> {
        fetch(&self.read()?.permissions, "permission", id)
    }

    async fn update_permission(&self, id: PermissionId, grant: Grant) -> StoreResult<Change<Permission>> {
        let mut t = self.write()?;
        if t.permissions.values().any(|p| p.id != id && p.grant == grant) {
            return Err(StoreError::Conflict(format!("permission {grant} already exists")));
        }
        t.check_department(grant.department_id)?;
        swap(&mut t.permissions, "permission", id, Permission { id, grant })
    }

    async fn delete_permission(&self, id: PermissionId) -> StoreResult<Permission> {
        let mut t = self.write()?;
        let permission = take(&mut t.permissions, "permission", id)?;
        for role in t.roles.values_mut() {
            role.permission_ids.retain(|p| *p != id);
        }
        Ok(permission)
    }

    async fn create_role(&self, role: NewRole) -> StoreResult<Role> {
        let mut t = self.write()?;
        if t.roles.values().any(|r| r.name == role.name) {
            return Err(StoreError::Conflict(format!("role '{}' already exists", role.name)));
        }
        let permission_ids = t.known_permissions(&role.permission_ids);
        let id = RoleId::new(t.next_id());
        let row = RoleRow {
            id,
            name: role.name,
            description: role.description,
            permission_ids,
        };
        let resolved = t.resolve_role(&row);
        t.roles.insert(id, row);
        Ok(resolved)
    }

    async fn list_roles(&self, page: Page) -> StoreResult<Vec<Role>> {
        let t = self.read()?;
        Ok(page.apply(t.roles.values().map(|r| t.resolve_role(r))))
    }

    async fn get_role(&self, id: RoleId) -> StoreResult<Role> {
        self.read()?.role(id)
    }

    async fn update_role(&self, id: RoleId, changes: RoleChanges) -> StoreResult<Change<Role>> {
        let mut t = self.write()?;
        let before = t.role(id)?;
        if let Some(name) = &changes.name {
            if t.roles.values().any(|r| r.id != id && &r.name == name) {
                return Err(StoreError::Conflict(format!("role '{name}' already exists")));
            }
        }
        let Some(row) = t.roles.get_mut(&id) else {
            return missing("role", id);
        };
        if let Some(name) = changes.name {
            row.name = name;
        }
        if let Some(description) = changes.description {
            row.description = Some(description);
        }
        let after = t.role(id)?;
        Ok(Change { before, after })
    }

    async fn delete_role(&self, id: RoleId) -> StoreResult<Role> {
        let mut t = self.write()?;
        let role = t.role(id)?;
        t.roles.remove(&id);
        for user in t.users.values_mut() {
            user.role_ids.retain(|r| *r != id);
        }
        for grants in t.route_roles.values_mut() {
            grants.retain(|r| *r != id);
        }
        Ok(role)
    }

    async fn set_role_permissions(&self, id: RoleId, permission_ids: &[PermissionId]) -> StoreResult<Change<Role>> {
        let mut t = self.write()?;
        let before = t.role(id)?;
        let permission_ids = t.known_permissions(permission_ids);
        if let Some(row) = t.roles.get_mut(&id) {
            row.permission_ids = permission_ids;
        }
        let after = t.role(id)?;
        Ok(Change { before, after })
    }

    async fn roles_by_ids(&self, ids: &[RoleId]) -> StoreResult<Vec<Role>> {
        let t = self.read()?;
        let wanted: BTreeSet<RoleId> = ids.iter().copied().collect();
        Ok(wanted
            .into_iter()
            .filter_map(|id| t.roles.get(&id).map(|r| t.resolve_role(r)))
            .collect())
    }

    async fn count_roles(&self) -> StoreResult<i64> {
        Ok(self.read()?.roles.len() as i64)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Navigation
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait]
impl NavigationStore for InMemoryStore {
    async fn list_routes(&self) -> StoreResult<Vec<RouteEntry>> {
        let mut routes: Vec<RouteEntry> = self.read()?.routes.values().cloned().collect();
        routes.sort_by_key(|r| (r.sort_order, r.id));
        Ok(routes)
    }

    async fn get_route(&self, id: RouteId) -> StoreResult<RouteEntry> {
        fetch(&self.read()?.routes, "route", id)
    }

    async fn create_route(&self, input: RouteInput) -> StoreResult<RouteEntry> {
        let mut t = self.write()?;
        t.check_route_parent(None, &input)?;
        let id = RouteId::new(t.next_id());
        let route = RouteEntry {
            id,
            path: input.path,
            name: input.name,
            component: input.component,
            meta: Some(input.meta),
            parent_id: input.parent_id,
            sort_order: input.sort_order,
        };
        t.routes.insert(id, route.clone());
        Ok(route)
    }

    async fn replace_route(&self, id: RouteId, input: RouteInput) -> StoreResult<Change<RouteEntry>> {
        let mut t = self.write()?;
        if !t.routes.contains_key(&id) {
            return missing("route", id);
        }
        t.check_route_parent(Some(id), &input)?;
        let next = RouteEntry {
            id,
            path: input.path,
            name: input.name,
            component: input.component,
            meta: Some(input.meta),
            parent_id: input.parent_id,
            sort_order: input.sort_order,
        };
        swap(&mut t.routes, "route", id, next)
    }

    async fn delete_route(&self, id: RouteId) -> StoreResult<RouteEntry> {
        let mut t = self.write()?;
        if t.routes.values().any(|r| r.parent_id == Some(id)) {
            return Err(StoreError::Conflict(format!("route {id} still has child routes")));
        }
        let route = take(&mut t.routes, "route", id)?;
        t.route_roles.remove(&id);
        Ok(route)
    }

    async fn route_grants(&self) -> StoreResult<HashMap<RouteId, Vec<RoleId>>> {
        Ok(self
            .read()?
            .route_roles
            .iter()
            .filter(|(_, roles)| !roles.is_empty())
            .map(|(id, roles)| (*id, roles.clone()))
            .collect())
    }

    async fn route_roles(&self, id: RouteId) -> StoreResult<Vec<Role>> {
        let t = self.read()?;
        if !t.routes.contains_key(&id) {
            return missing("route", id);
        }
        let ids = t.route_roles.get(&id).cloned().unwrap_or_default();
        ids.into_iter().map(|r| t.role(r)).collect()
    }

    async fn set_route_roles(&self, id: RouteId, role_ids: &[RoleId]) -> StoreResult<Change<RouteEntry>> {
        let mut t = self.write()?;
        let current = fetch(&t.routes, "route", id)?;
        if let Some(unknown) = role_ids.iter().find(|r| !t.roles.contains_key(r)) {
            return Err(StoreError::Invalid(format!("role {unknown} does not exist")));
        }
        let ids: Vec<RoleId> = role_ids.iter().copied().collect::<BTreeSet<_>>().into_iter().collect();
        let next = RouteEntry {
            meta: Some(with_allowed_roles(current.meta.clone(), &ids)),
            ..current
        };
        t.route_roles.insert(id, ids);
        swap(&mut t.routes, "route", id, next)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Quality
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait]
impl QualityStore for InMemoryStore {
    async fn create_qa(&self, input: QaEntryInput) -> StoreResult<QaEntry> {
        let mut t = self.write()?;
        let key = input.key();
        if t.qa.values().any(|e| e.key() == key) {
            return Err(StoreError::Conflict(format!(
                "entry for line '{}' on {}-{}-{} already exists",
                key.line, key.year, key.month, key.day
            )));
        }
        let entry = input.into_entry(RecordId::new(t.next_id()));
        t.qa.insert(entry.id, entry.clone());
        Ok(entry)
    }

    async fn list_qa(&self, period: YearMonth, scrap: Option<bool>) -> StoreResult<Vec<QaEntry>> {
        Ok(self
            .read()?
            .qa
            .values()
            .filter(|e| e.year == period.year && e.month == period.month)
            .filter(|e| scrap.is_none_or(|s| e.scrap == s))
            .cloned()
            .collect())
    }

    async fn upsert_qa(&self, inputs: Vec<QaEntryInput>) -> StoreResult<UpsertReport<QaEntry>> {
        let mut t = self.write()?;
        let mut report = UpsertReport::default();
        for input in inputs {
            let key = input.key();
            match t.qa.values().find(|e| e.key() == key).map(|e| e.id) {
                Some(id) => {
                    let next = input.into_entry(id);
                    report.updated.push(swap(&mut t.qa, "qa entry", id, next)?);
                }
                None => {
                    let entry = input.into_entry(RecordId::new(t.next_id()));
                    t.qa.insert(entry.id, entry.clone());
                    report.created.push(entry);
                }
            }
        }
        Ok(report)
    }

    async fn delete_qa(&self, id: RecordId) -> StoreResult<QaEntry> {
        take(&mut self.write()?.qa, "qa entry", id)
    }

    async fn create_qa_misc(&self, input: QaMiscInput) -> StoreResult<QaMisc> {
        let mut t = self.write()?;
        if t.qa_misc.values().any(|m| m.year == input.year && m.month == input.month) {
            return Err(StoreError::Conflict(format!(
                "quality figures for {}-{:02} already exist",
                input.year, input.month
            )));
        }
        let record = input.into_record(RecordId::new(t.next_id()));
        t.qa_misc.insert(record.id, record.clone());
        Ok(record)
    }

    async fn list_qa_misc(&self, year: Option<i32>, month: Option<i32>) -> StoreResult<Vec<QaMisc>> {
        Ok(self
            .read()?
            .qa_misc
            .values()
            .filter(|m| year.is_none_or(|y| m.year == y) && month.is_none_or(|mo| m.month == mo))
            .cloned()
            .collect())
    }

    async fn replace_qa_misc(&self, id: RecordId, input: QaMiscInput) -> StoreResult<Change<QaMisc>> {
        let mut t = self.write()?;
        if t.qa_misc
            .values()
            .any(|m| m.id != id && m.year == input.year && m.month == input.month)
        {
            return Err(StoreError::Conflict(format!(
                "quality figures for {}-{:02} already exist",
                input.year, input.month
            )));
        }
        swap(&mut t.qa_misc, "quality figures", id, input.into_record(id))
    }

    async fn delete_qa_misc(&self, id: RecordId) -> StoreResult<QaMisc> {
        take(&mut self.write()?.qa_misc, "quality figures", id)
    }

    async fn kpi_sheet(&self, period: YearMonth) -> StoreResult<Vec<QaKpi>> {
        Ok(self
            .read()?
            .qa_kpi
            .values()
            .filter(|k| k.year == period.year && k.month == period.month)
            .cloned()
            .collect())
    }

    async fn create_kpi_sheet(&self, sheet: KpiSheet) -> StoreResult<Vec<QaKpi>> {
        let mut t = self.write()?;
        let period = sheet.period();
        if t.qa_kpi.values().any(|k| k.year == period.year && k.month == period.month) {
            return Err(StoreError::Conflict(format!(
                "KPI sheet for {}-{:02} already exists",
                period.year, period.month
            )));
        }
        Ok(t.insert_kpi_rows(sheet))
    }

    async fn replace_kpi_sheet(&self, sheet: KpiSheet) -> StoreResult<Change<Vec<QaKpi>>> {
        let mut t = self.write()?;
        let period = sheet.period();
        let before: Vec<QaKpi> = t
            .qa_kpi
            .values()
            .filter(|k| k.year == period.year && k.month == period.month)
            .cloned()
            .collect();
        for row in &before {
            t.qa_kpi.remove(&row.id);
        }
        let after = t.insert_kpi_rows(sheet);
        Ok(Change { before, after })
    }

    async fn monthly_totals(&self, period: YearMonth) -> StoreResult<Vec<MonthlyTotal>> {
        Ok(self
            .read()?
            .monthly
            .values()
            .filter(|m| m.year == period.year && m.month == period.month)
            .cloned()
            .collect())
    }

    async fn upsert_monthly_totals(&self, inputs: Vec<MonthlyTotalInput>) -> StoreResult<UpsertReport<MonthlyTotal>> {
        let mut t = self.write()?;
        let mut report = UpsertReport::default();
        for input in inputs {
            let key = input.key();
            match t.monthly.values().find(|m| m.key() == key).map(|m| m.id) {
                Some(id) => {
                    let next = input.into_record(id);
                    report.updated.push(swap(&mut t.monthly, "monthly total", id, next)?);
                }
                None => {
                    let record = input.into_record(RecordId::new(t.next_id()));
                    t.monthly.insert(record.id, record.clone());
                    report.created.push(record);
                }
            }
        }
        Ok(report)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Plant
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait]
impl PlantStore for InMemoryStore {
    async fn list_ehs(&self, year: Option<i32>) -> StoreResult<Vec<EhsWeek>> {
        let mut weeks: Vec<EhsWeek> = self
            .read()?
            .ehs
            .values()
            .filter(|w| year.is_none_or(|y| w.year == y))
            .cloned()
            .collect();
        weeks.sort_by_key(|w| (w.year, w.week));
        Ok(weeks)
    }

    async fn upsert_ehs(&self, values: Vec<EhsWeekValue>) -> StoreResult<UpsertReport<EhsWeek>> {
        let mut t = self.write()?;
        let mut report = UpsertReport::default();
        for value in values {
            match t
                .ehs
                .values()
                .find(|w| w.week == value.week && w.year == value.year)
                .map(|w| w.id)
            {
                Some(id) => {
                    let next = value.into_record(id);
                    report.updated.push(swap(&mut t.ehs, "ehs week", id, next)?);
                }
                None => {
                    let week = value.into_record(RecordId::new(t.next_id()));
                    t.ehs.insert(week.id, week.clone());
                    report.created.push(week);
                }
            }
        }
        Ok(report)
    }

    async fn create_event(&self, input: EventInput) -> StoreResult<Event> {
        let mut t = self.write()?;
        let event = input.into_event(RecordId::new(t.next_id()));
        t.events.insert(event.id, event.clone());
        Ok(event)
    }

    async fn list_events(&self, filter: &EventFilter, page: Page) -> StoreResult<Vec<Event>> {
        let mut events: Vec<Event> = self
            .read()?
            .events
            .values()
            .filter(|e| filter.matches(e))
            .cloned()
            .collect();
        events.sort_by_key(|e| (e.start_time, e.id));
        Ok(page.apply(events))
    }

    async fn get_event(&self, id: RecordId) -> StoreResult<Event> {
        fetch(&self.read()?.events, "event", id)
    }

    async fn replace_event(&self, id: RecordId, input: EventInput) -> StoreResult<Change<Event>> {
        swap(&mut self.write()?.events, "event", id, input.into_event(id))
    }

    async fn delete_event(&self, id: RecordId) -> StoreResult<Event> {
        take(&mut self.write()?.events, "event", id)
    }

    async fn create_pcl(&self, input: PclInput) -> StoreResult<PclRecord> {
        let mut t = self.write()?;
        let record = input.into_record(RecordId::new(t.next_id()));
        t.pcl.insert(record.id, record.clone());
        Ok(record)
    }

    async fn list_pcl(&self, line: Option<&str>, page: Page) -> StoreResult<Vec<PclRecord>> {
        Ok(page.apply(
            self.read()?
                .pcl
                .values()
                .rev()
                .filter(|r| line.is_none_or(|l| r.line == l))
                .cloned(),
        ))
    }

    async fn get_pcl(&self, id: RecordId) -> StoreResult<PclRecord> {
        fetch(&self.read()?.pcl, "pcl record", id)
    }

    async fn replace_pcl(&self, id: RecordId, input: PclInput) -> StoreResult<Change<PclRecord>> {
        swap(&mut self.write()?.pcl, "pcl record", id, input.into_record(id))
    }

    async fn delete_pcl(&self, id: RecordId) -> StoreResult<PclRecord> {
        take(&mut self.write()?.pcl, "pcl record", id)
    }

    async fn create_assembly(&self, input: AssemblyInput) -> StoreResult<AssemblyOutput> {
        let mut t = self.write()?;
        let record = input.into_record(RecordId::new(t.next_id()));
        t.assembly.insert(record.id, record.clone());
        Ok(record)
    }

    async fn list_assembly(&self, filter: &AssemblyFilter, page: Page) -> StoreResult<Vec<AssemblyOutput>> {
        let mut rows: Vec<AssemblyOutput> = self
            .read()?
            .assembly
            .values()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect();
        newest_first(&mut rows, |r| (r.date, r.id));
        Ok(page.apply(rows))
    }

    async fn get_assembly(&self, id: RecordId) -> StoreResult<AssemblyOutput> {
        fetch(&self.read()?.assembly, "assembly record", id)
    }

    async fn replace_assembly(&self, id: RecordId, input: AssemblyInput) -> StoreResult<Change<AssemblyOutput>> {
        swap(&mut self.write()?.assembly, "assembly record", id, input.into_record(id))
    }

    async fn delete_assembly(&self, id: RecordId) -> StoreResult<AssemblyOutput> {
        take(&mut self.write()?.assembly, "assembly record", id)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Maintenance
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait]
impl MaintenanceStore for InMemoryStore {
    async fn create_metric(&self, input: MetricInput, user_id: Option<UserId>) -> StoreResult<MaintenanceMetric> {
        let mut t = self.write()?;
        let metric = input.into_metric(RecordId::new(t.next_id()), user_id, Utc::now());
        t.metrics.insert(metric.id, metric.clone());
        Ok(metric)
    }

    async fn list_metrics(&self, filter: &MetricFilter, page: Page) -> StoreResult<Vec<MaintenanceMetric>> {
        let mut rows: Vec<MaintenanceMetric> = self
            .read()?
            .metrics
            .values()
            .filter(|m| filter.matches(m))
            .cloned()
            .collect();
        newest_first(&mut rows, |m| (m.date, m.id));
        Ok(page.apply(rows))
    }

    async fn get_metric(&self, id: RecordId) -> StoreResult<MaintenanceMetric> {
        fetch(&self.read()?.metrics, "metric", id)
    }

    async fn replace_metric(&self, id: RecordId, input: MetricInput) -> StoreResult<Change<MaintenanceMetric>> {
        let mut t = self.write()?;
        let next = fetch(&t.metrics, "metric", id)?.apply(input, Utc::now());
        swap(&mut t.metrics, "metric", id, next)
    }

    async fn delete_metric(&self, id: RecordId) -> StoreResult<MaintenanceMetric> {
        take(&mut self.write()?.metrics, "metric", id)
    }

    async fn create_downtime(&self, input: DowntimeInput, user_id: Option<UserId>) -> StoreResult<DowntimeRecord> {
        let mut t = self.write()?;
        let record = input.into_record(RecordId::new(t.next_id()), user_id, Utc::now());
        t.downtime.insert(record.id, record.clone());
        Ok(record)
    }

    async fn list_downtime(&self, filter: &DowntimeFilter, page: Page) -> StoreResult<Vec<DowntimeRecord>> {
        let mut rows: Vec<DowntimeRecord> = self
            .read()?
            .downtime
            .values()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect();
        newest_first(&mut rows, |r| (r.date, r.id));
        Ok(page.apply(rows))
    }

    async fn get_downtime(&self, id: RecordId) -> StoreResult<DowntimeRecord> {
        fetch(&self.read()?.downtime, "downtime record", id)
    }

    async fn update_downtime(&self, id: RecordId, update: DowntimeUpdate) -> StoreResult<Change<DowntimeRecord>> {
        let mut t = self.write()?;
        let next = fetch(&t.downtime, "downtime record", id)?.apply(update, Utc::now())?;
        swap(&mut t.downtime, "downtime record", id, next)
    }

    async fn delete_downtime(&self, id: RecordId) -> StoreResult<DowntimeRecord> {
        take(&mut self.write()?.downtime, "downtime record", id)
    }

    async fn create_daily(&self, input: DailyTaskInput, user_id: UserId) -> StoreResult<DailyTask> {
        let mut t = self.write()?;
        let task = input.into_task(RecordId::new(t.next_id()), user_id);
        t.daily.insert(task.id, task.clone());
        Ok(task)
    }

    async fn list_daily(&self, filter: &TaskFilter, page: Page) -> StoreResult<Vec<DailyTask>> {
        let mut rows: Vec<DailyTask> = self
            .read()?
            .daily
            .values()
            .filter(|d| filter.matches_daily(d))
            .cloned()
            .collect();
        newest_first(&mut rows, |d| (d.date, d.id));
        Ok(page.apply(rows))
    }

    async fn get_daily(&self, id: RecordId) -> StoreResult<DailyTask> {
        fetch(&self.read()?.daily, "daily task", id)
    }

    async fn update_daily(&self, id: RecordId, update: DailyTaskUpdate) -> StoreResult<Change<DailyTask>> {
        let mut t = self.write()?;
        let next = fetch(&t.daily, "daily task", id)?.apply(update)?;
        swap(&mut t.daily, "daily task", id, next)
    }

    async fn delete_daily(&self, id: RecordId) -> StoreResult<DailyTask> {
        take(&mut self.write()?.daily, "daily task", id)
    }

    async fn create_weekly(&self, input: WeeklyTaskInput, user_id: UserId) -> StoreResult<WeeklyTask> {
        let mut t = self.write()?;
        let task = input.into_task(RecordId::new(t.next_id()), user_id);
        t.weekly.insert(task.id, task.clone());
        Ok(task)
    }

    async fn list_weekly(&self, filter: &TaskFilter, page: Page) -> StoreResult<Vec<WeeklyTask>> {
        let mut rows: Vec<WeeklyTask> = self
            .read()?
            .weekly
            .values()
            .filter(|w| filter.matches_weekly(w))
            .cloned()
            .collect();
        newest_first(&mut rows, |w| (w.date, w.id));
        Ok(page.apply(rows))
    }

    async fn get_weekly(&self, id: RecordId) -> StoreResult<WeeklyTask> {
        fetch(&self.read()?.weekly, "weekly task", id)
    }

    async fn update_weekly(&self, id: RecordId, update: WeeklyTaskUpdate) -> StoreResult<Change<WeeklyTask>> {
        let mut t = self.write()?;
        let next = fetch(&t.weekly, "weekly task", id)?.apply(update)?;
        swap(&mut t.weekly, "weekly task", id, next)
    }

    async fn delete_weekly(&self, id: RecordId) -> StoreResult<WeeklyTask> {
        take(&mut self.write()?.weekly, "weekly task", id)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Activity
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait]
impl ActivityStore for InMemoryStore {
    async fn record_activity(&self, activity: NewActivity) -> StoreResult<Activity> {
        let mut t = self.write()?;
        let activity = activity.into_activity(ActivityId::new(t.next_id()), Utc::now());
        t.activities.insert(activity.id, activity.clone());
        Ok(activity)
    }

    async fn list_activities(
        &self,
        filter: &ActivityFilter,
        page: Page,
        now: DateTime<Utc>,
    ) -> StoreResult<Vec<Activity>> {
        let mut rows: Vec<Activity> = self
            .read()?
            .activities
            .values()
            .filter(|a| filter.matches(a, now))
            .cloned()
            .collect();
        rows.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        Ok(page.apply(rows))
    }

    async fn get_activity(&self, id: ActivityId) -> StoreResult<Activity> {
        fetch(&self.read()?.activities, "activity", id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use datalink_auth::{Module, PermissionLevel};
    use datalink_core::Shift;
    use serde_json::json;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    fn new_user(name: &str) -> NewUser {
        NewUser {
            name: name.into(),
            password_hash: "hash".into(),
            department_id: None,
            is_active: true,
            role_ids: vec![],
        }
    }

    fn route(path: &str, parent: Option<RouteId>) -> RouteInput {
        RouteInput {
            path: Some(path.into()),
            name: path.trim_start_matches('/').into(),
            component: None,
            meta: json!({ "permissions": [] }),
            parent_id: parent,
            sort_order: 0,
        }
    }

    #[tokio::test]
    async fn user_names_are_unique() {
        let store = InMemoryStore::new();
        store.create_user(new_user("ana")).await.unwrap();
        let err = store.create_user(new_user("ana")).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn user_department_must_exist() {
        let store = InMemoryStore::new();
        let mut user = new_user("ana");
        user.department_id = Some(DepartmentId::new(99));
        assert!(matches!(store.create_user(user).await, Err(StoreError::Invalid(_))));
    }

    #[tokio::test]
    async fn unknown_roles_are_skipped_and_roles_replaced() {
        let store = InMemoryStore::new();
        let role = store
            .create_role(NewRole {
                name: "qa".into(),
                description: None,
                permission_ids: vec![],
            })
            .await
            .unwrap();
        let user = store.create_user(new_user("ana")).await.unwrap();
        let updated = store
            .set_user_roles(user.id, &[role.id, RoleId::new(404), role.id])
            .await
            .unwrap();
        assert_eq!(updated.role_ids, vec![role.id]);
        let cleared = store.set_user_roles(user.id, &[]).await.unwrap();
        assert!(cleared.role_ids.is_empty());
    }

    #[tokio::test]
    async fn deleting_permission_removes_it_from_roles() {
        let store = InMemoryStore::new();
        let p = store
            .create_permission(Grant::new(Module::Qa, PermissionLevel::Read))
            .await
            .unwrap();
        let role = store
            .create_role(NewRole {
                name: "qa".into(),
                description: None,
                permission_ids: vec![p.id],
            })
            .await
            .unwrap();
        assert_eq!(role.permissions.len(), 1);
        store.delete_permission(p.id).await.unwrap();
        assert!(store.get_role(role.id).await.unwrap().permissions.is_empty());
    }

    #[tokio::test]
    async fn duplicate_grants_conflict() {
        let store = InMemoryStore::new();
        let grant = Grant::new(Module::Ehs, PermissionLevel::Write);
        store.create_permission(grant).await.unwrap();
        assert!(matches!(store.create_permission(grant).await, Err(StoreError::Conflict(_))));
    }

    #[tokio::test]
    async fn role_deletion_cascades_to_users() {
        let store = InMemoryStore::new();
        let role = store
            .create_role(NewRole {
                name: "temp".into(),
                description: None,
                permission_ids: vec![],
            })
            .await
            .unwrap();
        let mut user = new_user("ana");
        user.role_ids = vec![role.id];
        let user = store.create_user(user).await.unwrap();
        store.delete_role(role.id).await.unwrap();
        assert!(store.get_user(user.id).await.unwrap().role_ids.is_empty());
    }

    #[tokio::test]
    async fn routes_refuse_delete_with_children_and_duplicate_paths() {
        let store = InMemoryStore::new();
        let admin = store.create_route(route("/admin", None)).await.unwrap();
        store.create_route(route("/admin/users", Some(admin.id))).await.unwrap();
        assert!(matches!(store.delete_route(admin.id).await, Err(StoreError::Conflict(_))));
        assert!(matches!(
            store.create_route(route("/admin", None)).await,
            Err(StoreError::Conflict(_))
        ));
        assert!(matches!(
            store.create_route(route("/x", Some(RouteId::new(999)))).await,
            Err(StoreError::Invalid(_))
        ));
    }

    #[tokio::test]
    async fn route_roles_are_mirrored_into_meta() {
        let store = InMemoryStore::new();
        let r = store.create_route(route("/qa", None)).await.unwrap();
        let role = store
            .create_role(NewRole {
                name: "qa".into(),
                description: None,
                permission_ids: vec![],
            })
            .await
            .unwrap();
        let change = store.set_route_roles(r.id, &[role.id]).await.unwrap();
        assert_eq!(change.after.allowed_roles(), vec![role.id]);
        assert_eq!(store.route_grants().await.unwrap()[&r.id], vec![role.id]);
        assert!(matches!(
            store.set_route_roles(r.id, &[RoleId::new(999)]).await,
            Err(StoreError::Invalid(_))
        ));
    }

    #[tokio::test]
    async fn qa_upsert_reports_created_and_updated() {
        let store = InMemoryStore::new();
        let input = |value: f64| QaEntryInput {
            line: "L1".into(),
            day: 4,
            month: 3,
            year: 2024,
            value,
            scrap: false,
        };
        let first = store.upsert_qa(vec![input(1.0)]).await.unwrap();
        assert_eq!(first.created.len(), 1);
        let second = store.upsert_qa(vec![input(2.0)]).await.unwrap();
        assert!(second.created.is_empty());
        assert_eq!(second.updated[0].before.value, 1.0);
        assert_eq!(second.updated[0].after.value, 2.0);
        assert!(matches!(store.create_qa(input(3.0)).await, Err(StoreError::Conflict(_))));

        let march = YearMonth::new(2024, 3).unwrap();
        assert_eq!(store.list_qa(march, Some(false)).await.unwrap().len(), 1);
        assert!(store.list_qa(march, Some(true)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn kpi_sheet_replaces_month() {
        let store = InMemoryStore::new();
        let sheet = |n: usize| KpiSheet {
            month: 5,
            year: 2024,
            items: (0..n)
                .map(|i| datalink_quality::KpiItem {
                    area: format!("A{i}"),
                    description: String::new(),
                    new_factory: 1.0,
                    old_factory: 2.0,
                    total: 3.0,
                })
                .collect(),
        };
        store.replace_kpi_sheet(sheet(3)).await.unwrap();
        let change = store.replace_kpi_sheet(sheet(2)).await.unwrap();
        assert_eq!(change.before.len(), 3);
        assert_eq!(change.after.len(), 2);
        let may = YearMonth::new(2024, 5).unwrap();
        assert_eq!(store.kpi_sheet(may).await.unwrap(), change.after);
    }

    #[tokio::test]
    async fn events_are_ordered_by_start_and_filtered() {
        let store = InMemoryStore::new();
        for (name, day) in [("late", 20), ("early", 2), ("mid", 10)] {
            store
                .create_event(EventInput {
                    name: name.into(),
                    department: "QA".into(),
                    start_time: date(day),
                    end_time: None,
                })
                .await
                .unwrap();
        }
        let filter = EventFilter {
            department: Some("QA".into()),
            starting_from: Some(date(5)),
        };
        let names: Vec<String> = store
            .list_events(&filter, Page::all())
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(names, vec!["mid", "late"]);
    }

    #[tokio::test]
    async fn closing_downtime_without_resolution_is_rejected() {
        let store = InMemoryStore::new();
        let record = store
            .create_downtime(
                DowntimeInput {
                    line: "L1".into(),
                    shift: Shift::Night,
                    date: date(1),
                    status: Default::default(),
                    downtime_minutes: 30,
                    equipment_name: "press".into(),
                    fault_description: "jam".into(),
                    resolution: None,
                    reporter_name: "op".into(),
                    maintainer_name: None,
                },
                None,
            )
            .await
            .unwrap();
        let close = DowntimeUpdate {
            status: Some(datalink_maintenance::DowntimeStatus::Closed),
            ..Default::default()
        };
        assert!(matches!(
            store.update_downtime(record.id, close).await,
            Err(StoreError::Invalid(_))
        ));
    }

    #[tokio::test]
    async fn activities_newest_first() {
        let store = InMemoryStore::new();
        for title in ["one", "two"] {
            store
                .record_activity(NewActivity {
                    title: title.into(),
                    action: "did".into(),
                    details: None,
                    kind: "QA_CREATE".into(),
                    icon: None,
                    color: None,
                    target: None,
                    changes_before: None,
                    changes_after: None,
                    user_id: None,
                    user_name: Some("system".into()),
                    department: None,
                })
                .await
                .unwrap();
        }
        let list = store
            .list_activities(&ActivityFilter::default(), Page::all(), Utc::now())
            .await
            .unwrap();
        assert_eq!(list[0].title, "two");
    }

    #[tokio::test]
    async fn kpi_create_refuses_existing_month() {
        let store = InMemoryStore::new();
        let sheet = || KpiSheet {
            month: 6,
            year: 2024,
            items: vec![datalink_quality::KpiItem {
                area: "Press".into(),
                description: String::new(),
                new_factory: 1.0,
                old_factory: 1.0,
                total: 2.0,
            }],
        };
        assert_eq!(store.create_kpi_sheet(sheet()).await.unwrap().len(), 1);
        assert!(matches!(store.create_kpi_sheet(sheet()).await, Err(StoreError::Conflict(_))));
        let june = YearMonth::new(2024, 6).unwrap();
        assert_eq!(store.kpi_sheet(june).await.unwrap().len(), 1);
    }

    fn misc(month: i32) -> QaMiscInput {
        QaMiscInput {
            month,
            year: 2024,
            supplier_defect: 2,
            formal_amount: 10,
            informal_amount: 4,
            qc_ignore_amount: 0,
            scrap_rate_c: 1.5,
            scrap_rate_m: 0.5,
            ftt_tjm: 98.0,
            ftt_tjc: 97.0,
        }
    }

    #[tokio::test]
    async fn one_misc_sheet_per_month() {
        let store = InMemoryStore::new();
        let march = store.create_qa_misc(misc(3)).await.unwrap();
        assert!(matches!(store.create_qa_misc(misc(3)).await, Err(StoreError::Conflict(_))));
        let april = store.create_qa_misc(misc(4)).await.unwrap();

        // Moving April onto March collides; rewriting March in place does not.
        assert!(matches!(
            store.replace_qa_misc(april.id, misc(3)).await,
            Err(StoreError::Conflict(_))
        ));
        let mut revised = misc(3);
        revised.supplier_defect = 7;
        let change = store.replace_qa_misc(march.id, revised).await.unwrap();
        assert_eq!(change.before.supplier_defect, 2);
        assert_eq!(change.after.supplier_defect, 7);

        assert_eq!(store.list_qa_misc(Some(2024), Some(4)).await.unwrap(), vec![april]);
        assert_eq!(store.list_qa_misc(Some(2024), None).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn monthly_totals_upsert_by_line_and_month() {
        let store = InMemoryStore::new();
        let total = |line: &str, month: i32, amount: f64| MonthlyTotalInput {
            line: line.into(),
            month,
            year: 2024,
            amount,
        };
        let first = store
            .upsert_monthly_totals(vec![total("L1", 2, 10.0), total("L2", 2, 20.0)])
            .await
            .unwrap();
        assert_eq!(first.created.len(), 2);
        assert!(first.updated.is_empty());

        let second = store
            .upsert_monthly_totals(vec![total("L1", 2, 15.0), total("L1", 3, 5.0)])
            .await
            .unwrap();
        assert_eq!(second.created.len(), 1);
        assert_eq!(second.created[0].month, 3);
        assert_eq!(second.updated.len(), 1);
        assert_eq!(second.updated[0].before.amount, 10.0);
        assert_eq!(second.updated[0].after.amount, 15.0);
        assert_eq!(second.updated[0].after.id, first.created[0].id);

        let feb = store.monthly_totals(YearMonth::new(2024, 2).unwrap()).await.unwrap();
        assert_eq!(feb.len(), 2);
        assert!(feb.iter().any(|m| m.line == "L1" && m.amount == 15.0));
    }

    #[tokio::test]
    async fn daily_tasks_crud_and_filters() {
        let store = InMemoryStore::new();
        let ana = UserId::new(1);
        let ben = UserId::new(2);
        let task = |day: u32, solved: bool| DailyTaskInput {
            date: date(day),
            title: format!("check {day}"),
            location: "press 3".into(),
            kind: 1,
            content: "oil".into(),
            solved,
        };
        let open = store.create_daily(task(5, false), ana).await.unwrap();
        store.create_daily(task(9, true), ana).await.unwrap();
        store.create_daily(task(12, false), ben).await.unwrap();

        let titles = |rows: Vec<DailyTask>| rows.into_iter().map(|t| t.title).collect::<Vec<_>>();
        let filter = TaskFilter {
            user_id: Some(ana),
            ..Default::default()
        };
        assert_eq!(
            titles(store.list_daily(&filter, Page::all()).await.unwrap()),
            vec!["check 9", "check 5"]
        );
        let unsolved_since = TaskFilter {
            start_date: Some(date(6)),
            solved: Some(false),
            ..Default::default()
        };
        assert_eq!(
            titles(store.list_daily(&unsolved_since, Page::all()).await.unwrap()),
            vec!["check 12"]
        );

        let update = DailyTaskUpdate {
            solved: Some(true),
            ..Default::default()
        };
        let change = store.update_daily(open.id, update).await.unwrap();
        assert!(!change.before.solved);
        assert!(change.after.solved);
        assert_eq!(store.get_daily(open.id).await.unwrap(), change.after);

        store.delete_daily(open.id).await.unwrap();
        assert!(matches!(store.get_daily(open.id).await, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn activity_window_counts_back_from_now() {
        let store = InMemoryStore::new();
        store
            .record_activity(NewActivity {
                title: "entry".into(),
                action: "did".into(),
                details: None,
                kind: "QA_CREATE".into(),
                icon: None,
                color: None,
                target: None,
                changes_before: None,
                changes_after: None,
                user_id: None,
                user_name: Some("system".into()),
                department: None,
            })
            .await
            .unwrap();
        let later = Utc::now() + chrono::TimeDelta::days(10);
        for (days, expected) in [(7, 0), (30, 1), (i64::MAX, 1)] {
            let filter = ActivityFilter {
                days: Some(days),
                ..Default::default()
            };
            let rows = store.list_activities(&filter, Page::all(), later).await.unwrap();
            assert_eq!(rows.len(), expected, "days={days}");
        }
    }

    #[tokio::test]
    async fn missing_records_are_not_found() {
        let store = InMemoryStore::new();
        assert!(matches!(store.get_event(RecordId::new(1)).await, Err(StoreError::NotFound(_))));
        assert!(matches!(store.delete_pcl(RecordId::new(1)).await, Err(StoreError::NotFound(_))));
        assert!(matches!(store.get_user(UserId::new(1)).await, Err(StoreError::NotFound(_))));
    }
}
