//! In-memory implementation of ExecutionStore for tests.
//!
//! Mirrors the Postgres adapter's contract with deterministic, lock-based
//! state. Production code uses `PgExecutionStore`.

use async_trait::async_trait;
use chrono::Duration;
use std::collections::HashMap;
use std::sync::Mutex;

use crate::domain::foundation::{ExecutionId, GoalId, Rating, Timestamp};
use crate::domain::goal::{Feedback, GoalExecution, Intent, ToolExecutionRecord};
use crate::domain::tooling::ToolStatistics;
use crate::ports::{
    ExecutionStore, StoreError, ToolCreationEvent, ToolWindowMetrics,
};

#[derive(Default)]
struct Inner {
    executions: Vec<GoalExecution>,
    tool_executions: Vec<ToolExecutionRecord>,
    feedback: Vec<Feedback>,
    tool_creations: Vec<ToolCreationEvent>,
    statistics: HashMap<String, ToolStatistics>,
}

/// In-memory execution store.
///
/// # Panics
///
/// Methods panic if the internal lock is poisoned. Acceptable for test
/// code; production uses the Postgres adapter.
#[derive(Default)]
pub struct InMemoryExecutionStore {
    inner: Mutex<Inner>,
}

impl InMemoryExecutionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored goal executions (test helper).
    pub fn execution_count(&self) -> usize {
        self.lock().executions.len()
    }

    /// All tool execution rows for one tool (test helper).
    pub fn tool_executions_for(&self, tool_name: &str) -> Vec<ToolExecutionRecord> {
        self.lock()
            .tool_executions
            .iter()
            .filter(|t| t.tool_name == tool_name)
            .cloned()
            .collect()
    }

    /// All feedback rows (test helper).
    pub fn feedback_rows(&self) -> usize {
        self.lock().feedback.len()
    }

    /// Seeds a finished tool execution at a chosen time (test helper).
    pub fn seed_tool_execution(&self, mut record: ToolExecutionRecord, at: Timestamp) {
        record.executed_at = at;
        self.lock().tool_executions.push(record);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner
            .lock()
            .expect("InMemoryExecutionStore: lock poisoned")
    }

    fn compute_statistics(tool_executions: &[ToolExecutionRecord]) -> HashMap<String, ToolStatistics> {
        let mut grouped: HashMap<String, Vec<&ToolExecutionRecord>> = HashMap::new();
        for record in tool_executions {
            grouped.entry(record.tool_name.clone()).or_default().push(record);
        }

        grouped
            .into_iter()
            .map(|(name, records)| {
                let successes = records.iter().filter(|r| r.success).count() as i64;
                let failures = records.len() as i64 - successes;
                let durations: Vec<i64> =
                    records.iter().filter_map(|r| r.duration_ms).collect();
                let avg = if durations.is_empty() {
                    None
                } else {
                    Some(durations.iter().sum::<i64>() as f64 / durations.len() as f64)
                };
                let first = records.iter().map(|r| r.executed_at).min();
                let last = records.iter().map(|r| r.executed_at).max();
                (
                    name.clone(),
                    ToolStatistics::from_counts(name, successes, failures, avg, first, last),
                )
            })
            .collect()
    }
}

#[async_trait]
impl ExecutionStore for InMemoryExecutionStore {
    async fn store_execution(&self, execution: &GoalExecution) -> Result<ExecutionId, StoreError> {
        let mut inner = self.lock();
        inner.executions.push(execution.clone());
        Ok(execution.execution_id)
    }

    async fn finalize_execution(
        &self,
        execution_id: &ExecutionId,
        intent: Intent,
        success: bool,
        error: Option<String>,
        duration_ms: i64,
    ) -> Result<(), StoreError> {
        let mut inner = self.lock();
        let execution = inner
            .executions
            .iter_mut()
            .find(|e| e.execution_id == *execution_id)
            .ok_or_else(|| StoreError::not_found(format!("execution {}", execution_id)))?;
        execution.intent = intent;
        execution.success = success;
        execution.error = error;
        execution.duration_ms = Some(duration_ms);
        Ok(())
    }

    async fn store_tool_execution(&self, record: &ToolExecutionRecord) -> Result<(), StoreError> {
        let mut inner = self.lock();
        if !inner
            .executions
            .iter()
            .any(|e| e.execution_id == record.execution_id)
        {
            return Err(StoreError::not_found(format!(
                "execution {} for tool execution",
                record.execution_id
            )));
        }
        inner.tool_executions.push(record.clone());
        Ok(())
    }

    async fn store_feedback(
        &self,
        execution_id: &ExecutionId,
        rating: Rating,
        text: Option<String>,
    ) -> Result<(), StoreError> {
        let mut inner = self.lock();
        if !inner
            .executions
            .iter()
            .any(|e| e.execution_id == *execution_id)
        {
            return Err(StoreError::not_found(format!("execution {}", execution_id)));
        }
        inner.feedback.push(Feedback {
            execution_id: *execution_id,
            rating,
            text,
            created_at: Timestamp::now(),
        });
        Ok(())
    }

    async fn store_tool_creation(&self, event: &ToolCreationEvent) -> Result<(), StoreError> {
        self.lock().tool_creations.push(event.clone());
        Ok(())
    }

    async fn get_execution(
        &self,
        execution_id: &ExecutionId,
    ) -> Result<Option<GoalExecution>, StoreError> {
        Ok(self
            .lock()
            .executions
            .iter()
            .find(|e| e.execution_id == *execution_id)
            .cloned())
    }

    async fn get_execution_by_goal(
        &self,
        goal_id: &GoalId,
    ) -> Result<Option<GoalExecution>, StoreError> {
        Ok(self
            .lock()
            .executions
            .iter()
            .find(|e| e.goal_id == *goal_id)
            .cloned())
    }

    async fn get_tool_statistics(
        &self,
        tool_name: &str,
    ) -> Result<Option<ToolStatistics>, StoreError> {
        Ok(self.lock().statistics.get(tool_name).cloned())
    }

    async fn get_top_tools(
        &self,
        limit: usize,
        min_executions: i64,
    ) -> Result<Vec<ToolStatistics>, StoreError> {
        let inner = self.lock();
        let mut tools: Vec<ToolStatistics> = inner
            .statistics
            .values()
            .filter(|s| s.total_executions >= min_executions)
            .cloned()
            .collect();
        tools.sort_by(|a, b| {
            b.success_rate
                .partial_cmp(&a.success_rate)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(b.total_executions.cmp(&a.total_executions))
        });
        tools.truncate(limit);
        Ok(tools)
    }

    async fn get_recent_executions(
        &self,
        limit: usize,
    ) -> Result<Vec<GoalExecution>, StoreError> {
        let inner = self.lock();
        let mut executions = inner.executions.clone();
        executions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        executions.truncate(limit);
        Ok(executions)
    }

    async fn get_recent_tool_executions(
        &self,
        tool_name: &str,
        window: Duration,
        limit: usize,
    ) -> Result<Vec<ToolExecutionRecord>, StoreError> {
        let cutoff = Timestamp::now().minus_seconds(window.num_seconds());
        let inner = self.lock();
        let mut records: Vec<ToolExecutionRecord> = inner
            .tool_executions
            .iter()
            .filter(|t| t.tool_name == tool_name && t.executed_at.is_after(&cutoff))
            .cloned()
            .collect();
        records.sort_by(|a, b| b.executed_at.cmp(&a.executed_at));
        records.truncate(limit);
        Ok(records)
    }

    async fn get_recent_failures(
        &self,
        limit: usize,
    ) -> Result<Vec<ToolExecutionRecord>, StoreError> {
        let inner = self.lock();
        let mut records: Vec<ToolExecutionRecord> = inner
            .tool_executions
            .iter()
            .filter(|t| !t.success)
            .cloned()
            .collect();
        records.sort_by(|a, b| b.executed_at.cmp(&a.executed_at));
        records.truncate(limit);
        Ok(records)
    }

    async fn get_slow_executions(
        &self,
        threshold_ms: i64,
        limit: usize,
    ) -> Result<Vec<ToolExecutionRecord>, StoreError> {
        let inner = self.lock();
        let mut records: Vec<ToolExecutionRecord> = inner
            .tool_executions
            .iter()
            .filter(|t| t.duration_ms.is_some_and(|d| d > threshold_ms))
            .cloned()
            .collect();
        records.sort_by(|a, b| b.duration_ms.cmp(&a.duration_ms));
        records.truncate(limit);
        Ok(records)
    }

    async fn get_tool_performance_view(&self) -> Result<Vec<ToolStatistics>, StoreError> {
        let inner = self.lock();
        let mut stats: Vec<ToolStatistics> =
            Self::compute_statistics(&inner.tool_executions).into_values().collect();
        stats.sort_by(|a, b| b.total_executions.cmp(&a.total_executions));
        Ok(stats)
    }

    async fn get_success_rate(&self, intent: Option<Intent>) -> Result<f64, StoreError> {
        let inner = self.lock();
        let matching: Vec<&GoalExecution> = inner
            .executions
            .iter()
            .filter(|e| intent.map_or(true, |i| e.intent == i))
            .collect();
        if matching.is_empty() {
            return Ok(0.0);
        }
        let successes = matching.iter().filter(|e| e.success).count();
        Ok(successes as f64 / matching.len() as f64)
    }

    async fn get_tool_metrics_since(
        &self,
        tool_name: &str,
        since: Timestamp,
    ) -> Result<ToolWindowMetrics, StoreError> {
        let inner = self.lock();
        let records: Vec<&ToolExecutionRecord> = inner
            .tool_executions
            .iter()
            .filter(|t| t.tool_name == tool_name && !t.executed_at.is_before(&since))
            .collect();
        let durations: Vec<i64> = records.iter().filter_map(|r| r.duration_ms).collect();
        Ok(ToolWindowMetrics {
            total: records.len() as i64,
            successes: records.iter().filter(|r| r.success).count() as i64,
            avg_duration_ms: if durations.is_empty() {
                None
            } else {
                Some(durations.iter().sum::<i64>() as f64 / durations.len() as f64)
            },
        })
    }

    async fn update_statistics(&self) -> Result<(), StoreError> {
        let mut inner = self.lock();
        inner.statistics = Self::compute_statistics(&inner.tool_executions);
        Ok(())
    }
}
