use axum::{Json, http::StatusCode, response::IntoResponse, response::Response};
use chrono::NaiveDate;
use serde::Serialize;

use datalink_activity::{ActionType, DataChange};
use datalink_core::{DateBounds, Page, Shift, UpsertReport};

use crate::app::errors::{ApiResult, domain_error_to_response};
use crate::app::services::AppServices;
use crate::context::CurrentUser;

pub fn page(skip: Option<i64>, limit: Option<i64>, default_limit: i64) -> ApiResult<Page> {
    Page::from_query(skip, limit, default_limit).map_err(domain_error_to_response)
}

pub fn shift(raw: Option<&str>) -> ApiResult<Option<Shift>> {
    raw.map(Shift::parse).transpose().map_err(domain_error_to_response)
}

pub fn dates(start: Option<NaiveDate>, end: Option<NaiveDate>) -> ApiResult<DateBounds> {
    DateBounds::new(start, end).map_err(domain_error_to_response)
}

pub fn ok<T: Serialize>(value: T) -> Response {
    (StatusCode::OK, Json(value)).into_response()
}

pub fn created<T: Serialize>(value: T) -> Response {
    (StatusCode::CREATED, Json(value)).into_response()
}

pub fn no_content() -> Response {
    StatusCode::NO_CONTENT.into_response()
}

/// Log both halves of a bulk upsert (one entry each, when non-empty) and
/// answer with the counts.
pub async fn record_upsert<T: Serialize>(
    services: &AppServices,
    user: &CurrentUser,
    module: &str,
    noun: &str,
    details: String,
    target: &str,
    report: &UpsertReport<T>,
) -> Response {
    if !report.updated.is_empty() {
        let before: Vec<&T> = report.updated.iter().map(|c| &c.before).collect();
        let after: Vec<&T> = report.updated.iter().map(|c| &c.after).collect();
        let change = DataChange::new(
            module,
            ActionType::Update,
            format!("Updated {noun}"),
            format!("updated {} {noun} record(s)", report.updated.len()),
        )
        .details(details.clone())
        .before(&before)
        .after(&after)
        .target(target);
        services.record(user, change).await;
    }
    if !report.created.is_empty() {
        let change = DataChange::new(
            module,
            ActionType::Create,
            format!("Created {noun}"),
            format!("created {} {noun} record(s)", report.created.len()),
        )
        .details(details)
        .after(&report.created)
        .target(target);
        services.record(user, change).await;
    }
    tracing::info!(
        module,
        created = report.created.len(),
        updated = report.updated.len(),
        "bulk upsert applied"
    );
    ok(serde_json::json!({
        "message": format!("{noun} saved"),
        "created": report.created.len(),
        "updated": report.updated.len(),
    }))
}
