//! PostgreSQL implementation of ExecutionStore.
//!
//! Every operation is scoped to the bounded `PgPool`: the connection is
//! acquired at entry and returned on every path. Short transactions
//! commit before an id is handed back.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::{PgPool, Row};

use crate::domain::foundation::{ExecutionId, GoalId, Rating, Timestamp};
use crate::domain::goal::{GoalExecution, Intent, ToolExecutionRecord};
use crate::domain::tooling::ToolStatistics;
use crate::ports::{ExecutionStore, StoreError, ToolCreationEvent, ToolWindowMetrics};

/// PostgreSQL implementation of ExecutionStore.
#[derive(Clone)]
pub struct PgExecutionStore {
    pool: PgPool,
}

impl PgExecutionStore {
    /// Creates a new PgExecutionStore over an existing pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ExecutionStore for PgExecutionStore {
    async fn store_execution(&self, execution: &GoalExecution) -> Result<ExecutionId, StoreError> {
        sqlx::query(
            r#"
            INSERT INTO executions (
                execution_id, goal_id, goal_text, intent, success, error,
                duration_ms, metadata, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(execution.execution_id.as_uuid())
        .bind(execution.goal_id.as_uuid())
        .bind(&execution.goal_text)
        .bind(execution.intent.as_str())
        .bind(execution.success)
        .bind(&execution.error)
        .bind(execution.duration_ms)
        .bind(&execution.metadata)
        .bind(execution.created_at.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::database(format!("Failed to insert execution: {}", e)))?;

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
        let result = sqlx::query(
            r#"
            UPDATE executions SET
                intent = $2,
                success = $3,
                error = $4,
                duration_ms = $5
            WHERE execution_id = $1
            "#,
        )
        .bind(execution_id.as_uuid())
        .bind(intent.as_str())
        .bind(success)
        .bind(error)
        .bind(duration_ms)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::database(format!("Failed to finalize execution: {}", e)))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found(format!(
                "execution {}",
                execution_id
            )));
        }
        Ok(())
    }

    async fn store_tool_execution(&self, record: &ToolExecutionRecord) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO tool_executions (
                execution_id, tool_name, parameters, result, success, error,
                duration_ms, executed_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(record.execution_id.as_uuid())
        .bind(&record.tool_name)
        .bind(&record.parameters)
        .bind(&record.result)
        .bind(record.success)
        .bind(&record.error)
        .bind(record.duration_ms)
        .bind(record.executed_at.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::database(format!("Failed to insert tool execution: {}", e)))?;

        Ok(())
    }

    async fn store_feedback(
        &self,
        execution_id: &ExecutionId,
        rating: Rating,
        text: Option<String>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO execution_feedback (execution_id, rating, feedback_text)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(execution_id.as_uuid())
        .bind(rating.value() as i16)
        .bind(text)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::database(format!("Failed to insert feedback: {}", e)))?;

        Ok(())
    }

    async fn store_tool_creation(&self, event: &ToolCreationEvent) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO tool_creation_events (
                tool_name, entry_point, goal_text, generated_code,
                validation_passed, validation_errors, created_by
            ) VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(&event.tool_name)
        .bind(&event.entry_point)
        .bind(&event.goal_text)
        .bind(&event.generated_code)
        .bind(event.validation_passed)
        .bind(serde_json::json!(event.validation_errors))
        .bind(&event.created_by)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::database(format!("Failed to insert tool creation: {}", e)))?;

        Ok(())
    }

    async fn get_execution(
        &self,
        execution_id: &ExecutionId,
    ) -> Result<Option<GoalExecution>, StoreError> {
        let row = sqlx::query(
            "SELECT * FROM executions WHERE execution_id = $1",
        )
        .bind(execution_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::database(format!("Failed to fetch execution: {}", e)))?;

        row.map(row_to_execution).transpose()
    }

    async fn get_execution_by_goal(
        &self,
        goal_id: &GoalId,
    ) -> Result<Option<GoalExecution>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT * FROM executions
            WHERE goal_id = $1
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(goal_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::database(format!("Failed to fetch execution by goal: {}", e)))?;

        row.map(row_to_execution).transpose()
    }

    async fn get_tool_statistics(
        &self,
        tool_name: &str,
    ) -> Result<Option<ToolStatistics>, StoreError> {
        let row = sqlx::query("SELECT * FROM tool_statistics WHERE tool_name = $1")
            .bind(tool_name)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::database(format!("Failed to fetch statistics: {}", e)))?;

        row.map(row_to_statistics).transpose()
    }

    async fn get_top_tools(
        &self,
        limit: usize,
        min_executions: i64,
    ) -> Result<Vec<ToolStatistics>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM tool_statistics
            WHERE total_executions >= $1
            ORDER BY success_rate DESC, total_executions DESC
            LIMIT $2
            "#,
        )
        .bind(min_executions)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::database(format!("Failed to fetch top tools: {}", e)))?;

        rows.into_iter().map(row_to_statistics).collect()
    }

    async fn get_recent_executions(
        &self,
        limit: usize,
    ) -> Result<Vec<GoalExecution>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM executions
            ORDER BY created_at DESC
            LIMIT $1
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::database(format!("Failed to fetch recent executions: {}", e)))?;

        rows.into_iter().map(row_to_execution).collect()
    }

    async fn get_recent_tool_executions(
        &self,
        tool_name: &str,
        window: Duration,
        limit: usize,
    ) -> Result<Vec<ToolExecutionRecord>, StoreError> {
        let cutoff = Utc::now() - window;
        let rows = sqlx::query(
            r#"
            SELECT * FROM tool_executions
            WHERE tool_name = $1 AND executed_at > $2
            ORDER BY executed_at DESC
            LIMIT $3
            "#,
        )
        .bind(tool_name)
        .bind(cutoff)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            StoreError::database(format!("Failed to fetch recent tool executions: {}", e))
        })?;

        rows.into_iter().map(row_to_tool_execution).collect()
    }

    async fn get_recent_failures(
        &self,
        limit: usize,
    ) -> Result<Vec<ToolExecutionRecord>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM tool_executions
            WHERE NOT success
            ORDER BY executed_at DESC
            LIMIT $1
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::database(format!("Failed to fetch failures: {}", e)))?;

        rows.into_iter().map(row_to_tool_execution).collect()
    }

    async fn get_slow_executions(
        &self,
        threshold_ms: i64,
        limit: usize,
    ) -> Result<Vec<ToolExecutionRecord>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM tool_executions
            WHERE duration_ms > $1
            ORDER BY duration_ms DESC
            LIMIT $2
            "#,
        )
        .bind(threshold_ms)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::database(format!("Failed to fetch slow executions: {}", e)))?;

        rows.into_iter().map(row_to_tool_execution).collect()
    }

    async fn get_tool_performance_view(&self) -> Result<Vec<ToolStatistics>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT
                tool_name,
                COUNT(*) FILTER (WHERE success) AS successes,
                COUNT(*) FILTER (WHERE NOT success) AS failures,
                AVG(duration_ms)::FLOAT8 AS avg_duration_ms,
                MIN(executed_at) AS first_used,
                MAX(executed_at) AS last_used
            FROM tool_executions
            GROUP BY tool_name
            ORDER BY COUNT(*) DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::database(format!("Failed to fetch performance view: {}", e)))?;

        rows.into_iter()
            .map(|row| {
                let tool_name: String = get(&row, "tool_name")?;
                let successes: i64 = get(&row, "successes")?;
                let failures: i64 = get(&row, "failures")?;
                let avg: Option<f64> = get(&row, "avg_duration_ms")?;
                let first: Option<DateTime<Utc>> = get(&row, "first_used")?;
                let last: Option<DateTime<Utc>> = get(&row, "last_used")?;
                Ok(ToolStatistics::from_counts(
                    tool_name,
                    successes,
                    failures,
                    avg,
                    first.map(Timestamp::from_datetime),
                    last.map(Timestamp::from_datetime),
                ))
            })
            .collect()
    }

    async fn get_success_rate(&self, intent: Option<Intent>) -> Result<f64, StoreError> {
        let row = match intent {
            Some(intent) => sqlx::query(
                r#"
                SELECT COALESCE(
                    SUM(CASE WHEN success THEN 1 ELSE 0 END)::FLOAT
                        / NULLIF(COUNT(*), 0),
                    0
                ) AS success_rate
                FROM executions
                WHERE intent = $1
                "#,
            )
            .bind(intent.as_str())
            .fetch_one(&self.pool)
            .await,
            None => sqlx::query(
                r#"
                SELECT COALESCE(
                    SUM(CASE WHEN success THEN 1 ELSE 0 END)::FLOAT
                        / NULLIF(COUNT(*), 0),
                    0
                ) AS success_rate
                FROM executions
                "#,
            )
            .fetch_one(&self.pool)
            .await,
        }
        .map_err(|e| StoreError::database(format!("Failed to compute success rate: {}", e)))?;

        get(&row, "success_rate")
    }

    async fn get_tool_metrics_since(
        &self,
        tool_name: &str,
        since: Timestamp,
    ) -> Result<ToolWindowMetrics, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT
                COUNT(*) AS total,
                COUNT(*) FILTER (WHERE success) AS successes,
                AVG(duration_ms)::FLOAT8 AS avg_duration_ms
            FROM tool_executions
            WHERE tool_name = $1 AND executed_at >= $2
            "#,
        )
        .bind(tool_name)
        .bind(since.as_datetime())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| StoreError::database(format!("Failed to fetch window metrics: {}", e)))?;

        Ok(ToolWindowMetrics {
            total: get(&row, "total")?,
            successes: get(&row, "successes")?,
            avg_duration_ms: get(&row, "avg_duration_ms")?,
        })
    }

    async fn update_statistics(&self) -> Result<(), StoreError> {
        // Recompute from the raw rows; running twice in a row yields
        // identical aggregates.
        sqlx::query(
            r#"
            INSERT INTO tool_statistics (
                tool_name, total_executions, successful_executions,
                failed_executions, success_rate, avg_duration_ms,
                first_used, last_used, updated_at
            )
            SELECT
                tool_name,
                COUNT(*),
                COUNT(*) FILTER (WHERE success),
                COUNT(*) FILTER (WHERE NOT success),
                COALESCE(
                    COUNT(*) FILTER (WHERE success)::FLOAT / NULLIF(COUNT(*), 0),
                    0
                ),
                AVG(duration_ms)::FLOAT8,
                MIN(executed_at),
                MAX(executed_at),
                NOW()
            FROM tool_executions
            GROUP BY tool_name
            ON CONFLICT (tool_name) DO UPDATE SET
                total_executions = EXCLUDED.total_executions,
                successful_executions = EXCLUDED.successful_executions,
                failed_executions = EXCLUDED.failed_executions,
                success_rate = EXCLUDED.success_rate,
                avg_duration_ms = EXCLUDED.avg_duration_ms,
                first_used = EXCLUDED.first_used,
                last_used = EXCLUDED.last_used,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::database(format!("Failed to update statistics: {}", e)))?;

        Ok(())
    }
}

// ════════════════════════════════════════════════════════════════════════════
// Row mappers
// ════════════════════════════════════════════════════════════════════════════

fn get<'r, T>(row: &'r sqlx::postgres::PgRow, column: &str) -> Result<T, StoreError>
where
    T: sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
{
    row.try_get(column)
        .map_err(|e| StoreError::database(format!("Failed to get {}: {}", column, e)))
}

fn row_to_execution(row: sqlx::postgres::PgRow) -> Result<GoalExecution, StoreError> {
    let execution_id: uuid::Uuid = get(&row, "execution_id")?;
    let goal_id: uuid::Uuid = get(&row, "goal_id")?;
    let intent: String = get(&row, "intent")?;
    let created_at: DateTime<Utc> = get(&row, "created_at")?;

    Ok(GoalExecution {
        execution_id: ExecutionId::from_uuid(execution_id),
        goal_id: GoalId::from_uuid(goal_id),
        goal_text: get(&row, "goal_text")?,
        intent: Intent::parse(&intent),
        success: get(&row, "success")?,
        error: get(&row, "error")?,
        duration_ms: get(&row, "duration_ms")?,
        metadata: get(&row, "metadata")?,
        created_at: Timestamp::from_datetime(created_at),
    })
}

fn row_to_tool_execution(row: sqlx::postgres::PgRow) -> Result<ToolExecutionRecord, StoreError> {
    let execution_id: uuid::Uuid = get(&row, "execution_id")?;
    let executed_at: DateTime<Utc> = get(&row, "executed_at")?;

    Ok(ToolExecutionRecord {
        execution_id: ExecutionId::from_uuid(execution_id),
        tool_name: get(&row, "tool_name")?,
        parameters: get(&row, "parameters")?,
        result: get(&row, "result")?,
        success: get(&row, "success")?,
        error: get(&row, "error")?,
        duration_ms: get(&row, "duration_ms")?,
        executed_at: Timestamp::from_datetime(executed_at),
    })
}

fn row_to_statistics(row: sqlx::postgres::PgRow) -> Result<ToolStatistics, StoreError> {
    let first_used: Option<DateTime<Utc>> = get(&row, "first_used")?;
    let last_used: Option<DateTime<Utc>> = get(&row, "last_used")?;

    Ok(ToolStatistics {
        tool_name: get(&row, "tool_name")?,
        total_executions: get(&row, "total_executions")?,
        successful_executions: get(&row, "successful_executions")?,
        failed_executions: get(&row, "failed_executions")?,
        success_rate: get(&row, "success_rate")?,
        avg_duration_ms: get(&row, "avg_duration_ms")?,
        first_used: first_used.map(Timestamp::from_datetime),
        last_used: last_used.map(Timestamp::from_datetime),
    })
}
