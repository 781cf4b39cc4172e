//! Optional bearer-token authentication.
//!
//! When no token is configured the middleware is a pass-through; the
//! `Authorization` header is then ignored entirely.

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;

use super::error::ApiError;
use super::handlers::HttpState;

/// Checks `Authorization: Bearer <token>` against the configured token.
pub async fn require_bearer(
    State(state): State<HttpState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(expected) = &state.bearer_token else {
        return Ok(next.run(request).await);
    };

    let provided = request
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "));

    match provided {
        Some(token) if token == expected.as_str() => Ok(next.run(request).await),
        _ => Err(ApiError::unauthorized()),
    }
}
