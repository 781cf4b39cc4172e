//! HTTP handlers connecting axum routes to the engine.

use axum::extract::{Json, Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::application::orchestrator::Orchestrator;
use crate::application::registry::ToolRegistry;
use crate::domain::foundation::GoalId;
use crate::ports::ExecutionStore;

use super::dto::{
    ChatRequest, ExecutionRecordResponse, HealthResponse, ListGoalsQuery, SubmitGoalRequest,
    SubmitGoalResponse, ToolSummary,
};
use super::error::ApiError;

/// Shared state for all routes.
#[derive(Clone)]
pub struct HttpState {
    pub orchestrator: Arc<Orchestrator>,
    pub execution_store: Arc<dyn ExecutionStore>,
    pub registry: Arc<ToolRegistry>,
    pub bearer_token: Option<String>,
    pub request_timeout: Duration,
    pub started_at: Instant,
}

impl HttpState {
    pub fn new(
        orchestrator: Arc<Orchestrator>,
        execution_store: Arc<dyn ExecutionStore>,
        registry: Arc<ToolRegistry>,
        bearer_token: Option<String>,
        request_timeout: Duration,
    ) -> Self {
        Self {
            orchestrator,
            execution_store,
            registry,
            bearer_token,
            request_timeout,
            started_at: Instant::now(),
        }
    }
}

/// POST /api/v1/goals
pub async fn submit_goal(
    State(state): State<HttpState>,
    Json(request): Json<SubmitGoalRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let goal = request.goal.trim().to_string();
    if goal.is_empty() {
        return Err(ApiError::bad_request("goal cannot be empty"));
    }

    if request.async_mode {
        let goal_id = GoalId::new();
        let orchestrator = Arc::clone(&state.orchestrator);
        let spawned_goal = goal.clone();
        tokio::spawn(async move {
            orchestrator.process_goal(goal_id, &spawned_goal, None).await;
        });
        return Ok((
            StatusCode::ACCEPTED,
            Json(SubmitGoalResponse::pending(goal_id, goal)),
        ));
    }

    let outcome = state
        .orchestrator
        .process_with_deadline(&goal, Some(state.request_timeout))
        .await;
    if outcome.error.as_deref() == Some("deadline") {
        return Err(ApiError::deadline());
    }
    Ok((
        StatusCode::OK,
        Json(SubmitGoalResponse::from_outcome(goal, outcome)),
    ))
}

/// GET /api/v1/goals/:id
pub async fn get_goal(
    State(state): State<HttpState>,
    Path(id): Path<String>,
) -> Result<Json<ExecutionRecordResponse>, ApiError> {
    let goal_id = GoalId::from_str(&id)
        .map_err(|_| ApiError::bad_request("invalid goal id format"))?;

    let execution = state
        .execution_store
        .get_execution_by_goal(&goal_id)
        .await
        .map_err(|_| ApiError::internal("failed to read execution record"))?
        .ok_or_else(|| ApiError::not_found(format!("goal {} not found", goal_id)))?;

    Ok(Json(execution.into()))
}

/// GET /api/v1/goals?limit=N
pub async fn list_goals(
    State(state): State<HttpState>,
    Query(query): Query<ListGoalsQuery>,
) -> Result<Json<Vec<ExecutionRecordResponse>>, ApiError> {
    let limit = query.limit.clamp(1, 200);
    let executions = state
        .execution_store
        .get_recent_executions(limit)
        .await
        .map_err(|_| ApiError::internal("failed to list executions"))?;
    Ok(Json(executions.into_iter().map(Into::into).collect()))
}

/// POST /api/v1/chat
pub async fn chat(
    State(state): State<HttpState>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<SubmitGoalResponse>, ApiError> {
    let message = request.message.trim().to_string();
    if message.is_empty() {
        return Err(ApiError::bad_request("message cannot be empty"));
    }

    let outcome = state
        .orchestrator
        .process_with_deadline(&message, Some(state.request_timeout))
        .await;
    if outcome.error.as_deref() == Some("deadline") {
        return Err(ApiError::deadline());
    }
    Ok(Json(SubmitGoalResponse::from_outcome(message, outcome)))
}

/// GET /api/v1/tools
pub async fn list_tools(State(state): State<HttpState>) -> Json<Vec<ToolSummary>> {
    let tools = state
        .registry
        .definitions()
        .into_iter()
        .map(|d| ToolSummary {
            name: d.name,
            description: d.description,
        })
        .collect();
    Json(tools)
}

/// GET /api/v1/health
pub async fn health(State(state): State<HttpState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds: state.started_at.elapsed().as_secs(),
    })
}
