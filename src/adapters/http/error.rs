//! HTTP error mapping.
//!
//! Internal error types never cross the HTTP boundary; everything maps
//! to a small vocabulary of codes with a short message.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

/// External-facing error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiErrorCode {
    BadRequest,
    NotFound,
    Unauthorized,
    Internal,
    Deadline,
}

/// The error body every failing endpoint returns.
#[derive(Debug, Clone, Serialize)]
pub struct ApiError {
    pub error: ApiErrorCode,
    pub message: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            error: ApiErrorCode::BadRequest,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            error: ApiErrorCode::NotFound,
            message: message.into(),
        }
    }

    pub fn unauthorized() -> Self {
        Self {
            error: ApiErrorCode::Unauthorized,
            message: "invalid or missing bearer token".to_string(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            error: ApiErrorCode::Internal,
            message: message.into(),
        }
    }

    pub fn deadline() -> Self {
        Self {
            error: ApiErrorCode::Deadline,
            message: "request deadline exceeded".to_string(),
        }
    }

    fn status(&self) -> StatusCode {
        match self.error {
            ApiErrorCode::BadRequest => StatusCode::BAD_REQUEST,
            ApiErrorCode::NotFound => StatusCode::NOT_FOUND,
            ApiErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            ApiErrorCode::Deadline => StatusCode::GATEWAY_TIMEOUT,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(self)).into_response()
    }
}
