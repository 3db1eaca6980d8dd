//! Storage ports.
//!
//! Every backend implements the same async traits; handlers only ever see
//! `Arc<dyn DataStore>`. Updates return the before/after pair so callers can
//! log the change, deletes return the removed record.

use std::collections::HashMap;

use async_trait::async_trait;

use datalink_activity::{Activity, ActivityFilter, NewActivity};
use datalink_auth::{Grant, Permission, Principal, Role, RouteEntry};
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
use crate::model::{Department, DepartmentInput, NewRole, NewUser, RoleChanges, RouteInput, UserChanges, UserRecord};

#[async_trait]
pub trait IdentityStore: Send + Sync {
    // ─── departments ───
    async fn create_department(&self, input: DepartmentInput) -> StoreResult<Department>;
    async fn list_departments(&self, page: Page) -> StoreResult<Vec<Department>>;
    async fn get_department(&self, id: DepartmentId) -> StoreResult<Department>;
    async fn update_department(&self, id: DepartmentId, input: DepartmentInput) -> StoreResult<Change<Department>>;
    /// Users of the department keep existing with no department.
    async fn delete_department(&self, id: DepartmentId) -> StoreResult<Department>;

    // ─── users ───
    async fn create_user(&self, user: NewUser) -> StoreResult<UserRecord>;
    async fn get_user(&self, id: UserId) -> StoreResult<UserRecord>;
    async fn find_user_by_name(&self, name: &str) -> StoreResult<Option<UserRecord>>;
    async fn list_users(&self, page: Page) -> StoreResult<Vec<UserRecord>>;
    async fn update_user(&self, id: UserId, changes: UserChanges) -> StoreResult<Change<UserRecord>>;
    async fn delete_user(&self, id: UserId) -> StoreResult<UserRecord>;
    /// Replace the user's roles. Unknown role ids are skipped.
    async fn set_user_roles(&self, id: UserId, role_ids: &[RoleId]) -> StoreResult<UserRecord>;

    // ─── permissions ───
    async fn create_permission(&self, grant: Grant) -> StoreResult<Permission>;
    async fn list_permissions(&self, page: Page) -> StoreResult<Vec<Permission>>;
    async fn get_permission(&self, id: PermissionId) -> StoreResult<Permission>;
    async fn update_permission(&self, id: PermissionId, grant: Grant) -> StoreResult<Change<Permission>>;
    async fn delete_permission(&self, id: PermissionId) -> StoreResult<Permission>;

    // ─── roles ───
    async fn create_role(&self, role: NewRole) -> StoreResult<Role>;
    async fn list_roles(&self, page: Page) -> StoreResult<Vec<Role>>;
    async fn get_role(&self, id: RoleId) -> StoreResult<Role>;
    async fn update_role(&self, id: RoleId, changes: RoleChanges) -> StoreResult<Change<Role>>;
    async fn delete_role(&self, id: RoleId) -> StoreResult<Role>;
    /// Replace the role's permissions. Unknown permission ids are skipped.
    async fn set_role_permissions(&self, id: RoleId, permission_ids: &[PermissionId]) -> StoreResult<Change<Role>>;
    /// Resolve roles in id order; ids that do not exist are ignored.
    async fn roles_by_ids(&self, ids: &[RoleId]) -> StoreResult<Vec<Role>>;
    async fn count_roles(&self) -> StoreResult<i64>;
}

#[async_trait]
pub trait NavigationStore: Send + Sync {
    /// All routes ordered by `(sort_order, id)`.
    async fn list_routes(&self) -> StoreResult<Vec<RouteEntry>>;
    async fn get_route(&self, id: RouteId) -> StoreResult<RouteEntry>;
    /// Paths are unique; the parent must exist.
    async fn create_route(&self, input: RouteInput) -> StoreResult<RouteEntry>;
    async fn replace_route(&self, id: RouteId, input: RouteInput) -> StoreResult<Change<RouteEntry>>;
    /// Refuses to delete a route that still has children.
    async fn delete_route(&self, id: RouteId) -> StoreResult<RouteEntry>;
    /// Role grants per route, for visibility checks.
    async fn route_grants(&self) -> StoreResult<HashMap<RouteId, Vec<RoleId>>>;
    async fn route_roles(&self, id: RouteId) -> StoreResult<Vec<Role>>;
    /// Replace the route's role grants and mirror them into `meta.allowed_roles`.
    /// Unknown role ids are rejected.
    async fn set_route_roles(&self, id: RouteId, role_ids: &[RoleId]) -> StoreResult<Change<RouteEntry>>;
}

#[async_trait]
pub trait QualityStore: Send + Sync {
    /// Fails with `Conflict` when an entry with the same natural key exists.
    async fn create_qa(&self, input: QaEntryInput) -> StoreResult<QaEntry>;
    async fn list_qa(&self, period: YearMonth, scrap: Option<bool>) -> StoreResult<Vec<QaEntry>>;
    /// Insert or overwrite by natural key.
    async fn upsert_qa(&self, inputs: Vec<QaEntryInput>) -> StoreResult<UpsertReport<QaEntry>>;
    async fn delete_qa(&self, id: RecordId) -> StoreResult<QaEntry>;

    /// One misc record per month.
    async fn create_qa_misc(&self, input: QaMiscInput) -> StoreResult<QaMisc>;
    async fn list_qa_misc(&self, year: Option<i32>, month: Option<i32>) -> StoreResult<Vec<QaMisc>>;
    async fn replace_qa_misc(&self, id: RecordId, input: QaMiscInput) -> StoreResult<Change<QaMisc>>;
    async fn delete_qa_misc(&self, id: RecordId) -> StoreResult<QaMisc>;

    async fn kpi_sheet(&self, period: YearMonth) -> StoreResult<Vec<QaKpi>>;
    /// Store the month's first sheet; `Conflict` when the month already has rows.
    async fn create_kpi_sheet(&self, sheet: KpiSheet) -> StoreResult<Vec<QaKpi>>;
    /// Replace the whole month atomically.
    async fn replace_kpi_sheet(&self, sheet: KpiSheet) -> StoreResult<Change<Vec<QaKpi>>>;

    async fn monthly_totals(&self, period: YearMonth) -> StoreResult<Vec<MonthlyTotal>>;
    async fn upsert_monthly_totals(&self, inputs: Vec<MonthlyTotalInput>) -> StoreResult<UpsertReport<MonthlyTotal>>;
}

#[async_trait]
pub trait PlantStore: Send + Sync {
    async fn list_ehs(&self, year: Option<i32>) -> StoreResult<Vec<EhsWeek>>;
    /// Insert or overwrite by `(week, year)`.
    async fn upsert_ehs(&self, values: Vec<EhsWeekValue>) -> StoreResult<UpsertReport<EhsWeek>>;

    async fn create_event(&self, input: EventInput) -> StoreResult<Event>;
    /// Ordered by start date, then id.
    async fn list_events(&self, filter: &EventFilter, page: Page) -> StoreResult<Vec<Event>>;
    async fn get_event(&self, id: RecordId) -> StoreResult<Event>;
    async fn replace_event(&self, id: RecordId, input: EventInput) -> StoreResult<Change<Event>>;
    async fn delete_event(&self, id: RecordId) -> StoreResult<Event>;

    async fn create_pcl(&self, input: PclInput) -> StoreResult<PclRecord>;
    async fn list_pcl(&self, line: Option<&str>, page: Page) -> StoreResult<Vec<PclRecord>>;
    async fn get_pcl(&self, id: RecordId) -> StoreResult<PclRecord>;
    async fn replace_pcl(&self, id: RecordId, input: PclInput) -> StoreResult<Change<PclRecord>>;
    async fn delete_pcl(&self, id: RecordId) -> StoreResult<PclRecord>;

    async fn create_assembly(&self, input: AssemblyInput) -> StoreResult<AssemblyOutput>;
    /// Newest date first.
    async fn list_assembly(&self, filter: &AssemblyFilter, page: Page) -> StoreResult<Vec<AssemblyOutput>>;
    async fn get_assembly(&self, id: RecordId) -> StoreResult<AssemblyOutput>;
    async fn replace_assembly(&self, id: RecordId, input: AssemblyInput) -> StoreResult<Change<AssemblyOutput>>;
    async fn delete_assembly(&self, id: RecordId) -> StoreResult<AssemblyOutput>;
}

/// Maintenance records. Every list is ordered newest date first, then by id descending.
#[async_trait]
pub trait MaintenanceStore: Send + Sync {
    async fn create_metric(&self, input: MetricInput, user_id: Option<UserId>) -> StoreResult<MaintenanceMetric>;
    async fn list_metrics(&self, filter: &MetricFilter, page: Page) -> StoreResult<Vec<MaintenanceMetric>>;
    async fn get_metric(&self, id: RecordId) -> StoreResult<MaintenanceMetric>;
    async fn replace_metric(&self, id: RecordId, input: MetricInput) -> StoreResult<Change<MaintenanceMetric>>;
    async fn delete_metric(&self, id: RecordId) -> StoreResult<MaintenanceMetric>;

    async fn create_downtime(&self, input: DowntimeInput, user_id: Option<UserId>) -> StoreResult<DowntimeRecord>;
    async fn list_downtime(&self, filter: &DowntimeFilter, page: Page) -> StoreResult<Vec<DowntimeRecord>>;
    async fn get_downtime(&self, id: RecordId) -> StoreResult<DowntimeRecord>;
    async fn update_downtime(&self, id: RecordId, update: DowntimeUpdate) -> StoreResult<Change<DowntimeRecord>>;
    async fn delete_downtime(&self, id: RecordId) -> StoreResult<DowntimeRecord>;

    async fn create_daily(&self, input: DailyTaskInput, user_id: UserId) -> StoreResult<DailyTask>;
    async fn list_daily(&self, filter: &TaskFilter, page: Page) -> StoreResult<Vec<DailyTask>>;
    async fn get_daily(&self, id: RecordId) -> StoreResult<DailyTask>;
    async fn update_daily(&self, id: RecordId, update: DailyTaskUpdate) -> StoreResult<Change<DailyTask>>;
    async fn delete_daily(&self, id: RecordId) -> StoreResult<DailyTask>;

    async fn create_weekly(&self, input: WeeklyTaskInput, user_id: UserId) -> StoreResult<WeeklyTask>;
    async fn list_weekly(&self, filter: &TaskFilter, page: Page) -> StoreResult<Vec<WeeklyTask>>;
    async fn get_weekly(&self, id: RecordId) -> StoreResult<WeeklyTask>;
    async fn update_weekly(&self, id: RecordId, update: WeeklyTaskUpdate) -> StoreResult<Change<WeeklyTask>>;
    async fn delete_weekly(&self, id: RecordId) -> StoreResult<WeeklyTask>;
}

#[async_trait]
pub trait ActivityStore: Send + Sync {
    async fn record_activity(&self, activity: NewActivity) -> StoreResult<Activity>;
    /// Newest first. `now` anchors the `days` window of the filter.
    async fn list_activities(
        &self,
        filter: &ActivityFilter,
        page: Page,
        now: chrono::DateTime<chrono::Utc>,
    ) -> StoreResult<Vec<Activity>>;
    async fn get_activity(&self, id: ActivityId) -> StoreResult<Activity>;
}

/// Everything the HTTP layer needs from storage.
pub trait DataStore:
    IdentityStore + NavigationStore + QualityStore + PlantStore + MaintenanceStore + ActivityStore
{
}

impl<T> DataStore for T where
    T: IdentityStore + NavigationStore + QualityStore + PlantStore + MaintenanceStore + ActivityStore
{
}

/// Resolve the authorization principal for a user id.
///
/// Missing users surface as `NotFound`; role lookups go through storage on
/// every call so role changes apply immediately.
pub async fn load_principal<S>(store: &S, user_id: UserId) -> StoreResult<Principal>
where
    S: IdentityStore + ?Sized,
{
    let user = store.get_user(user_id).await?;
    let roles = store.roles_by_ids(&user.role_ids).await?;
    Ok(Principal {
        user_id: user.id,
        name: user.name,
        department_id: user.department_id,
        is_active: user.is_active,
        roles,
    })
}

pub(crate) fn missing<T>(what: &str, id: impl core::fmt::Display) -> StoreResult<T> {
    Err(StoreError::not_found(format!("{what} {id}")))
}
