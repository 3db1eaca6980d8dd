use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query},
    routing::get,
};
use serde::Serialize;

use datalink_activity::{ActionType, DataChange};
use datalink_auth::{Module, PermissionLevel};
use datalink_core::RecordId;
use datalink_plant::{AssemblyFilter, AssemblyInput, AssemblyOutput};

use crate::app::dto;
use crate::app::errors::{ApiResult, domain_error_to_response, store_error_to_response};
use crate::app::routes::common::{created, dates, no_content, ok, page, shift};
use crate::app::services::AppServices;
use crate::authz::require;
use crate::context::CurrentUser;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_output).post(create_output))
        .route("/:id", get(get_output).put(replace_output).delete(delete_output))
}

const MODULE: &str = "ASSY";
const TARGET: &str = "/assembly";

/// A record plus its attainment (actual / planned).
#[derive(Debug, Serialize)]
pub struct OutputView {
    #[serde(flatten)]
    pub output: AssemblyOutput,
    pub attainment: Option<f64>,
}

impl From<AssemblyOutput> for OutputView {
    fn from(output: AssemblyOutput) -> Self {
        Self {
            attainment: output.attainment(),
            output,
        }
    }
}

pub async fn list_output(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(user): Extension<CurrentUser>,
    Query(q): Query<dto::AssemblyQuery>,
) -> ApiResult {
    require(&user, Module::Assy, PermissionLevel::Read)?;
    let page = page(q.skip, q.limit, 100)?;
    let filter = AssemblyFilter {
        line: q.line.filter(|l| !l.trim().is_empty()),
        shift: shift(q.shift.as_deref())?,
        dates: dates(q.start_date, q.end_date)?,
    };
    let rows = services
        .store
        .list_assembly(&filter, page)
        .await
        .map_err(store_error_to_response)?;
    let views: Vec<OutputView> = rows.into_iter().map(OutputView::from).collect();
    Ok(ok(views))
}

pub async fn create_output(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(user): Extension<CurrentUser>,
    Json(body): Json<AssemblyInput>,
) -> ApiResult {
    require(&user, Module::Assy, PermissionLevel::Write)?;
    let input = body.validate().map_err(domain_error_to_response)?;

    let output = services
        .store
        .create_assembly(input)
        .await
        .map_err(store_error_to_response)?;
    tracing::info!(assy_id = %output.id, line = %output.line, "assembly output created");
    services
        .record(
            &user,
            DataChange::new(
                MODULE,
                ActionType::Create,
                "Created assembly output",
                format!("recorded output for line {} on {}", output.line, output.date),
            )
            .after(&output)
            .target(TARGET),
        )
        .await;
    Ok(created(OutputView::from(output)))
}

pub async fn get_output(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<RecordId>,
) -> ApiResult {
    require(&user, Module::Assy, PermissionLevel::Read)?;
    let output = services.store.get_assembly(id).await.map_err(store_error_to_response)?;
    Ok(ok(OutputView::from(output)))
}

pub async fn replace_output(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<RecordId>,
    Json(body): Json<AssemblyInput>,
) -> ApiResult {
    require(&user, Module::Assy, PermissionLevel::Write)?;
    let input = body.validate().map_err(domain_error_to_response)?;

    let change = services
        .store
        .replace_assembly(id, input)
        .await
        .map_err(store_error_to_response)?;
    tracing::info!(assy_id = %id, "assembly output updated");
    services
        .record(
            &user,
            DataChange::new(
                MODULE,
                ActionType::Update,
                "Updated assembly output",
                format!("updated output for line {} on {}", change.after.line, change.after.date),
            )
            .before(&change.before)
            .after(&change.after)
            .target(TARGET),
        )
        .await;
    Ok(ok(OutputView::from(change.after)))
}

pub async fn delete_output(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<RecordId>,
) -> ApiResult {
    require(&user, Module::Assy, PermissionLevel::Write)?;
    let removed = services
        .store
        .delete_assembly(id)
        .await
        .map_err(store_error_to_response)?;
    tracing::info!(assy_id = %id, "assembly output deleted");
    services
        .record(
            &user,
            DataChange::new(
                MODULE,
                ActionType::Delete,
                "Deleted assembly output",
                format!("deleted output for line {} on {}", removed.line, removed.date),
            )
            .before(&removed)
            .target(TARGET),
        )
        .await;
    Ok(no_content())
}
