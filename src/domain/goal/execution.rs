//! Goal and tool execution records.
//!
//! A `GoalExecution` is created when a goal enters the pipeline and
//! finalised exactly once when the pipeline returns or fails. Every
//! `ToolExecutionRecord` belongs to an existing goal execution, one row
//! per attempted invocation (retries included).

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::foundation::{ExecutionId, GoalId, Timestamp};

use super::Intent;

/// Durable record of one goal run through the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoalExecution {
    pub execution_id: ExecutionId,
    pub goal_id: GoalId,
    pub goal_text: String,
    pub intent: Intent,
    pub success: bool,
    pub error: Option<String>,
    pub duration_ms: Option<i64>,
    pub metadata: Value,
    pub created_at: Timestamp,
}

impl GoalExecution {
    /// Creates the initial record at goal entry. Finalisation happens in
    /// the store, never by mutating a returned record.
    pub fn started(goal_id: GoalId, goal_text: impl Into<String>) -> Self {
        Self {
            execution_id: ExecutionId::new(),
            goal_id,
            goal_text: goal_text.into(),
            intent: Intent::Unknown,
            success: false,
            error: None,
            duration_ms: None,
            metadata: Value::Object(serde_json::Map::new()),
            created_at: Timestamp::now(),
        }
    }
}

/// One attempted tool invocation within a goal execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolExecutionRecord {
    pub execution_id: ExecutionId,
    pub tool_name: String,
    pub parameters: Value,
    pub result: Option<Value>,
    pub success: bool,
    pub error: Option<String>,
    pub duration_ms: Option<i64>,
    pub executed_at: Timestamp,
}

impl ToolExecutionRecord {
    /// Builds a success record.
    pub fn succeeded(
        execution_id: ExecutionId,
        tool_name: impl Into<String>,
        parameters: Value,
        result: Value,
        duration_ms: i64,
    ) -> Self {
        Self {
            execution_id,
            tool_name: tool_name.into(),
            parameters,
            result: Some(result),
            success: true,
            error: None,
            duration_ms: Some(duration_ms),
            executed_at: Timestamp::now(),
        }
    }

    /// Builds a failure record.
    pub fn failed(
        execution_id: ExecutionId,
        tool_name: impl Into<String>,
        parameters: Value,
        error: impl Into<String>,
        duration_ms: i64,
    ) -> Self {
        Self {
            execution_id,
            tool_name: tool_name.into(),
            parameters,
            result: None,
            success: false,
            error: Some(error.into()),
            duration_ms: Some(duration_ms),
            executed_at: Timestamp::now(),
        }
    }
}

/// The caller-facing result of `Orchestrator::process`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoalOutcome {
    pub goal_id: GoalId,
    pub execution_id: ExecutionId,
    pub intent: Intent,
    pub success: bool,
    /// Structured tool result, present on the tool-use branch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Free-text answer, present on the generative branch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn started_execution_is_unfinalised() {
        let exec = GoalExecution::started(GoalId::new(), "tell me a joke");
        assert_eq!(exec.intent, Intent::Unknown);
        assert!(!exec.success);
        assert!(exec.duration_ms.is_none());
        assert!(exec.metadata.is_object());
    }

    #[test]
    fn succeeded_tool_record_carries_result() {
        let rec = ToolExecutionRecord::succeeded(
            ExecutionId::new(),
            "hello_world",
            serde_json::json!({}),
            serde_json::json!({"message": "Hello, World!"}),
            12,
        );
        assert!(rec.success);
        assert!(rec.error.is_none());
        assert_eq!(rec.result.unwrap()["message"], "Hello, World!");
    }

    #[test]
    fn failed_tool_record_carries_error() {
        let rec = ToolExecutionRecord::failed(
            ExecutionId::new(),
            "strava_get_my_activities",
            serde_json::json!({"limit": 5}),
            "TimeoutError: Connection timeout",
            5021,
        );
        assert!(!rec.success);
        assert!(rec.result.is_none());
        assert!(rec.error.unwrap().contains("Timeout"));
    }
}
