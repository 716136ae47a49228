//! Error codes and the JSON error response.
//!
//! ERROR HANDLING
//! ==============
//! Services return their own `thiserror` enums and tag each variant with a
//! stable code through [`ErrorCode`]. Routes pick the HTTP status and turn
//! the error into an [`ApiError`]. Database failures are logged here and
//! reach the client only as a generic 500.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::Serialize;

/// Stable, grepable code for an error variant.
pub trait ErrorCode {
    fn error_code(&self) -> &'static str;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
}

#[derive(Serialize)]
struct ApiErrorBody<'a> {
    code: &'static str,
    message: &'a str,
    status: u16,
}

impl ApiError {
    #[must_use]
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self { status, code, message: message.into() }
    }

    /// Build from a coded error, using its `Display` text as the message.
    #[must_use]
    pub fn from_coded<E>(status: StatusCode, err: &E) -> Self
    where
        E: ErrorCode + std::fmt::Display,
    {
        Self::new(status, err.error_code(), err.to_string())
    }

    #[must_use]
    pub fn bad_request(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, code, message)
    }

    #[must_use]
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "unauthorized", message)
    }

    #[must_use]
    pub fn not_found(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, code, message)
    }

    /// Log `err` and return an opaque 500.
    pub fn internal(err: &impl std::fmt::Display) -> Self {
        tracing::error!(error = %err, "internal error");
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal_server_error", "Internal Server Error")
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        Self::internal(&err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ApiErrorBody { code: self.code, message: &self.message, status: self.status.as_u16() };
        (self.status, Json(body)).into_response()
    }
}
