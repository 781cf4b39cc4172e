//! Route definitions for the engine's HTTP surface.

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use super::auth::require_bearer;
use super::handlers::{
    chat, get_goal, health, list_goals, list_tools, submit_goal, HttpState,
};

/// Builds the full router.
///
/// # Endpoints
///
/// - `POST /api/v1/goals` - submit a goal (sync or async)
/// - `GET  /api/v1/goals/:id` - fetch a goal's execution record
/// - `GET  /api/v1/goals` - recent goals, newest first
/// - `POST /api/v1/chat` - synchronous chat-style submission
/// - `GET  /api/v1/tools` - known tools
/// - `GET  /api/v1/health` - liveness and uptime
pub fn router(state: HttpState) -> Router {
    Router::new()
        .route("/api/v1/goals", post(submit_goal).get(list_goals))
        .route("/api/v1/goals/:id", get(get_goal))
        .route("/api/v1/chat", post(chat))
        .route("/api/v1/tools", get(list_tools))
        .route("/api/v1/health", get(health))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            require_bearer,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
