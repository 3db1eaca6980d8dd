use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query},
    routing::get,
};
use chrono::Utc;

use datalink_activity::{ActionType, DataChange};
use datalink_auth::{Module, PermissionLevel};
use datalink_core::RecordId;
use datalink_plant::{EventFilter, EventInput};

use crate::app::dto;
use crate::app::errors::{ApiResult, domain_error_to_response, store_error_to_response};
use crate::app::routes::common::{created, no_content, ok, page};
use crate::app::services::AppServices;
use crate::authz::require;
use crate::context::CurrentUser;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_events).post(create_event))
        .route("/:id", get(get_event).put(replace_event).delete(delete_event))
}

const MODULE: &str = "EVENT";
const TARGET: &str = "/events";

/// GET /events?department=&upcoming=true&skip=&limit=
pub async fn list_events(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(user): Extension<CurrentUser>,
    Query(q): Query<dto::EventQuery>,
) -> ApiResult {
    require(&user, Module::Event, PermissionLevel::Read)?;
    let page = page(q.skip, q.limit, 100)?;
    let filter = EventFilter {
        department: q.department.filter(|d| !d.trim().is_empty()),
        starting_from: q.upcoming.then(|| Utc::now().date_naive()),
    };
    let events = services
        .store
        .list_events(&filter, page)
        .await
        .map_err(store_error_to_response)?;
    Ok(ok(events))
}

pub async fn create_event(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(user): Extension<CurrentUser>,
    Json(body): Json<EventInput>,
) -> ApiResult {
    require(&user, Module::Event, PermissionLevel::Write)?;
    let input = body.validate().map_err(domain_error_to_response)?;

    let event = services.store.create_event(input).await.map_err(store_error_to_response)?;
    tracing::info!(event_id = %event.id, "event created");
    services
        .record(
            &user,
            DataChange::new(MODULE, ActionType::Create, "Created event", format!("created event '{}'", event.name))
                .details(format!("department {}", event.department))
                .after(&event)
                .target(TARGET),
        )
        .await;
    Ok(created(event))
}

pub async fn get_event(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<RecordId>,
) -> ApiResult {
    require(&user, Module::Event, PermissionLevel::Read)?;
    let event = services.store.get_event(id).await.map_err(store_error_to_response)?;
    Ok(ok(event))
}

pub async fn replace_event(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<RecordId>,
    Json(body): Json<EventInput>,
) -> ApiResult {
    require(&user, Module::Event, PermissionLevel::Write)?;
    let input = body.validate().map_err(domain_error_to_response)?;

    let change = services
        .store
        .replace_event(id, input)
        .await
        .map_err(store_error_to_response)?;
    tracing::info!(event_id = %id, "event updated");
    services
        .record(
            &user,
            DataChange::new(
                MODULE,
                ActionType::Update,
                "Updated event",
                format!("updated event '{}'", change.after.name),
            )
            .before(&change.before)
            .after(&change.after)
            .target(TARGET),
        )
        .await;
    Ok(ok(change.after))
}

pub async fn delete_event(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<RecordId>,
) -> ApiResult {
    require(&user, Module::Event, PermissionLevel::Write)?;
    let removed = services.store.delete_event(id).await.map_err(store_error_to_response)?;
    tracing::info!(event_id = %id, "event deleted");
    services
        .record(
            &user,
            DataChange::new(
                MODULE,
                ActionType::Delete,
                "Deleted event",
                format!("deleted event '{}'", removed.name),
            )
            .before(&removed)
            .target(TARGET),
        )
        .await;
    Ok(no_content())
}
