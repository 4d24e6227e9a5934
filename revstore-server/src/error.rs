//! HTTP error mapping
//!
//! Engine errors carry their own kinds; this module translates them to HTTP
//! statuses and a JSON error envelope. Internal failures are logged in full
//! and reported with a safe message.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use revstore_core::Error;

/// A handler-level error with its HTTP status.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    pub fn internal(detail: impl std::fmt::Display) -> Self {
        tracing::error!(error = %detail, "Internal server error");
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: "internal server error".to_string(),
        }
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        match &err {
            Error::InvalidArgument(message) => Self {
                status: StatusCode::BAD_REQUEST,
                message: message.clone(),
            },
            Error::NotFound(message) => Self {
                status: StatusCode::NOT_FOUND,
                message: message.clone(),
            },
            _ => Self::internal(err),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(json!({
                "status": "ERROR",
                "message": self.message,
            })),
        )
            .into_response()
    }
}
