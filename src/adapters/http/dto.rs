//! Request and response bodies for the HTTP surface.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::goal::{GoalExecution, GoalOutcome};

/// POST /api/v1/goals
#[derive(Debug, Deserialize)]
pub struct SubmitGoalRequest {
    pub goal: String,
    #[serde(default)]
    pub async_mode: bool,
}

/// Response to goal submission.
#[derive(Debug, Serialize)]
pub struct SubmitGoalResponse {
    pub goal_id: String,
    pub status: String,
    pub goal: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SubmitGoalResponse {
    pub fn pending(goal_id: impl ToString, goal: impl Into<String>) -> Self {
        Self {
            goal_id: goal_id.to_string(),
            status: "processing".to_string(),
            goal: goal.into(),
            result: None,
            response: None,
            error: None,
        }
    }

    pub fn from_outcome(goal: impl Into<String>, outcome: GoalOutcome) -> Self {
        Self {
            goal_id: outcome.goal_id.to_string(),
            status: if outcome.success {
                "completed".to_string()
            } else {
                "failed".to_string()
            },
            goal: goal.into(),
            result: outcome.result,
            response: outcome.response,
            error: outcome.error,
        }
    }
}

/// POST /api/v1/chat
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
}

/// The stable execution-record shape.
#[derive(Debug, Serialize)]
pub struct ExecutionRecordResponse {
    pub execution_id: String,
    pub goal_id: String,
    pub goal_text: String,
    pub intent: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<i64>,
    pub metadata: Value,
    pub created_at: String,
}

impl From<GoalExecution> for ExecutionRecordResponse {
    fn from(execution: GoalExecution) -> Self {
        Self {
            execution_id: execution.execution_id.to_string(),
            goal_id: execution.goal_id.to_string(),
            goal_text: execution.goal_text,
            intent: execution.intent.as_str().to_string(),
            success: execution.success,
            error: execution.error,
            duration_ms: execution.duration_ms,
            metadata: execution.metadata,
            created_at: execution.created_at.to_rfc3339(),
        }
    }
}

/// GET /api/v1/goals
#[derive(Debug, Deserialize)]
pub struct ListGoalsQuery {
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    20
}

/// One entry of GET /api/v1/tools.
#[derive(Debug, Serialize)]
pub struct ToolSummary {
    pub name: String,
    pub description: String,
}

/// GET /api/v1/health
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub uptime_seconds: u64,
}
