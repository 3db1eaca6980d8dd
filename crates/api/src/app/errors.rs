use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use datalink_auth::{AuthzError, PasswordError};
use datalink_core::DomainError;
use datalink_infra::StoreError;

/// Handlers return the error response itself so `?` works on every step.
pub type ApiResult<T = Response> = Result<T, Response>;

pub fn json_error(status: StatusCode, code: &'static str, message: impl Into<String>) -> Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

pub fn store_error_to_response(err: StoreError) -> Response {
    match err {
        StoreError::NotFound(msg) => json_error(StatusCode::NOT_FOUND, "not_found", msg),
        StoreError::Conflict(msg) => json_error(StatusCode::CONFLICT, "conflict", msg),
        StoreError::Invalid(msg) => json_error(StatusCode::BAD_REQUEST, "validation_error", msg),
        StoreError::Backend(msg) => {
            tracing::error!(error = %msg, "storage failure");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", "storage failure")
        }
    }
}

pub fn domain_error_to_response(err: DomainError) -> Response {
    match err {
        DomainError::Validation(msg) => json_error(StatusCode::BAD_REQUEST, "validation_error", msg),
        DomainError::InvariantViolation(msg) => json_error(StatusCode::BAD_REQUEST, "invariant_violation", msg),
        DomainError::InvalidId(msg) => json_error(StatusCode::BAD_REQUEST, "invalid_id", msg),
    }
}

pub fn authz_error_to_response(err: AuthzError) -> Response {
    json_error(StatusCode::FORBIDDEN, "forbidden", err.to_string())
}

pub fn password_error_to_response(err: PasswordError) -> Response {
    match err {
        PasswordError::Empty => json_error(StatusCode::BAD_REQUEST, "validation_error", err.to_string()),
        PasswordError::Hash(msg) => {
            tracing::error!(error = %msg, "password hashing failed");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", "password hashing failed")
        }
    }
}

pub fn unauthenticated(message: impl Into<String>) -> Response {
    json_error(StatusCode::UNAUTHORIZED, "unauthenticated", message)
}

pub fn bad_request(message: impl Into<String>) -> Response {
    json_error(StatusCode::BAD_REQUEST, "validation_error", message)
}
