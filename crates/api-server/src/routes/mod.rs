//! Route handlers

pub mod agents;
pub mod events;
pub mod health;
pub mod session;
pub mod tools;

use axum::{http::StatusCode, Json};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

pub type RouteError = (StatusCode, Json<ErrorResponse>);

pub(crate) fn error_response(status: StatusCode, error: impl Into<String>) -> RouteError {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
        }),
    )
}

pub(crate) fn bad_request(error: impl Into<String>) -> RouteError {
    error_response(StatusCode::BAD_REQUEST, error)
}

pub(crate) fn not_found(error: impl Into<String>) -> RouteError {
    error_response(StatusCode::NOT_FOUND, error)
}

pub(crate) fn internal_error(error: impl std::fmt::Display) -> RouteError {
    error_response(StatusCode::INTERNAL_SERVER_ERROR, error.to_string())
}
