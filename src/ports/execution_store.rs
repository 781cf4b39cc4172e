//! Execution Store Port - durable record of every goal and tool execution.
//!
//! The store is append-mostly: goal executions are created at goal entry
//! and finalised exactly once; tool executions and feedback are appended;
//! statistics are recomputed by an idempotent rollup.
//!
//! # Ordering
//!
//! Within one goal, the goal execution row exists before any tool
//! execution row referencing it, and the finalising update is the last
//! write.

use async_trait::async_trait;
use chrono::Duration;
use serde_json::Value;
use thiserror::Error;

use crate::domain::foundation::{ExecutionId, GoalId, Rating, Timestamp, ValidationError};
use crate::domain::goal::{GoalExecution, Intent, ToolExecutionRecord};
use crate::domain::tooling::ToolStatistics;

/// Errors raised by execution-store operations.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// Connection acquisition or query failure.
    #[error("database error: {0}")]
    Database(String),

    /// Input rejected before any write happened.
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Referenced row does not exist.
    #[error("not found: {0}")]
    NotFound(String),
}

impl StoreError {
    pub fn database(message: impl Into<String>) -> Self {
        Self::Database(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }
}

/// A record of a tool being created or replaced by the forge.
#[derive(Debug, Clone)]
pub struct ToolCreationEvent {
    pub tool_name: String,
    pub entry_point: String,
    pub goal_text: String,
    pub generated_code: String,
    pub validation_passed: bool,
    pub validation_errors: Vec<String>,
    pub created_by: String,
}

/// Aggregates for a tool within a time window (used for version metrics
/// and degradation trends).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ToolWindowMetrics {
    pub total: i64,
    pub successes: i64,
    pub avg_duration_ms: Option<f64>,
}

impl ToolWindowMetrics {
    pub fn success_rate(&self) -> f64 {
        if self.total > 0 {
            self.successes as f64 / self.total as f64
        } else {
            0.0
        }
    }
}

/// Port over the durable execution record.
#[async_trait]
pub trait ExecutionStore: Send + Sync {
    /// Inserts the initial goal execution row. Must commit before returning.
    async fn store_execution(&self, execution: &GoalExecution) -> Result<ExecutionId, StoreError>;

    /// Finalises a goal execution with its outcome. The row is never
    /// mutated after this.
    async fn finalize_execution(
        &self,
        execution_id: &ExecutionId,
        intent: Intent,
        success: bool,
        error: Option<String>,
        duration_ms: i64,
    ) -> Result<(), StoreError>;

    /// Appends one tool execution attempt under an existing goal execution.
    async fn store_tool_execution(&self, record: &ToolExecutionRecord) -> Result<(), StoreError>;

    /// Stores user feedback. At most one row per execution.
    async fn store_feedback(
        &self,
        execution_id: &ExecutionId,
        rating: Rating,
        text: Option<String>,
    ) -> Result<(), StoreError>;

    /// Records a tool-creation event from the forge.
    async fn store_tool_creation(&self, event: &ToolCreationEvent) -> Result<(), StoreError>;

    /// Fetches a goal execution by id.
    async fn get_execution(
        &self,
        execution_id: &ExecutionId,
    ) -> Result<Option<GoalExecution>, StoreError>;

    /// Fetches a goal execution by its goal id.
    async fn get_execution_by_goal(
        &self,
        goal_id: &GoalId,
    ) -> Result<Option<GoalExecution>, StoreError>;

    /// Rolled-up statistics for one tool, if it has any.
    async fn get_tool_statistics(
        &self,
        tool_name: &str,
    ) -> Result<Option<ToolStatistics>, StoreError>;

    /// Best tools by success rate, requiring a minimum execution count.
    async fn get_top_tools(
        &self,
        limit: usize,
        min_executions: i64,
    ) -> Result<Vec<ToolStatistics>, StoreError>;

    /// Most recent goal executions, newest first.
    async fn get_recent_executions(&self, limit: usize)
        -> Result<Vec<GoalExecution>, StoreError>;

    /// Tool executions for one tool inside a recent window, newest first.
    async fn get_recent_tool_executions(
        &self,
        tool_name: &str,
        window: Duration,
        limit: usize,
    ) -> Result<Vec<ToolExecutionRecord>, StoreError>;

    /// Most recent failed tool executions across all tools.
    async fn get_recent_failures(
        &self,
        limit: usize,
    ) -> Result<Vec<ToolExecutionRecord>, StoreError>;

    /// Tool executions slower than a threshold.
    async fn get_slow_executions(
        &self,
        threshold_ms: i64,
        limit: usize,
    ) -> Result<Vec<ToolExecutionRecord>, StoreError>;

    /// Per-tool aggregates computed from raw rows (always fresh).
    async fn get_tool_performance_view(&self) -> Result<Vec<ToolStatistics>, StoreError>;

    /// Overall success rate, optionally filtered by intent.
    async fn get_success_rate(&self, intent: Option<Intent>) -> Result<f64, StoreError>;

    /// Aggregates for one tool since a point in time.
    async fn get_tool_metrics_since(
        &self,
        tool_name: &str,
        since: Timestamp,
    ) -> Result<ToolWindowMetrics, StoreError>;

    /// Idempotent rollup of the `tool_statistics` aggregates.
    async fn update_statistics(&self) -> Result<(), StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_metrics_success_rate() {
        let m = ToolWindowMetrics {
            total: 4,
            successes: 3,
            avg_duration_ms: Some(10.0),
        };
        assert!((m.success_rate() - 0.75).abs() < 1e-9);
        assert_eq!(ToolWindowMetrics::default().success_rate(), 0.0);
    }

    #[test]
    fn store_error_constructors() {
        assert!(matches!(
            StoreError::database("boom"),
            StoreError::Database(_)
        ));
        assert!(matches!(
            StoreError::not_found("missing"),
            StoreError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn execution_store_trait_is_send_sync() {
        fn assert_send_sync<T: Send + Sync + ?Sized>() {}
        assert_send_sync::<dyn ExecutionStore>();
    }
}
