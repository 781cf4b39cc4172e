//! PostgreSQL implementation of VersionStore.
//!
//! Transitions of the `is_current` pointer run inside transactions so
//! observers see exactly one current version per tool at any moment; the
//! partial unique index on `(tool_name) WHERE is_current` backs this up
//! at the schema level.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Row, Transaction};

use crate::domain::foundation::{DeploymentId, Timestamp, VersionId};
use crate::domain::versioning::{
    CreatedBy, ImprovementType, NewToolVersion, ToolVersion, VersionDeployment, VersionDiff,
    VersionMetricsUpdate,
};
use crate::ports::{StoreError, VersionStore};

/// PostgreSQL implementation of VersionStore.
#[derive(Clone)]
pub struct PgVersionStore {
    pool: PgPool,
}

impl PgVersionStore {
    /// Creates a new PgVersionStore over an existing pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn unset_current(
        tx: &mut Transaction<'_, Postgres>,
        tool_name: &str,
    ) -> Result<(), StoreError> {
        sqlx::query("UPDATE tool_versions SET is_current = FALSE WHERE tool_name = $1")
            .bind(tool_name)
            .execute(&mut **tx)
            .await
            .map_err(|e| StoreError::database(format!("Failed to unset current: {}", e)))?;
        Ok(())
    }

    async fn append_deployment(
        tx: &mut Transaction<'_, Postgres>,
        version_id: VersionId,
        tool_name: &str,
        deployed_by: CreatedBy,
        deployment_type: &str,
        reason: Option<&str>,
    ) -> Result<DeploymentId, StoreError> {
        let row = sqlx::query(
            r#"
            INSERT INTO version_deployments (
                version_id, tool_name, deployed_by, deployment_type, reason
            ) VALUES ($1, $2, $3, $4, $5)
            RETURNING deployment_id
            "#,
        )
        .bind(version_id.value())
        .bind(tool_name)
        .bind(deployed_by.as_str())
        .bind(deployment_type)
        .bind(reason)
        .fetch_one(&mut **tx)
        .await
        .map_err(|e| StoreError::database(format!("Failed to insert deployment: {}", e)))?;

        let id: i64 = row
            .try_get("deployment_id")
            .map_err(|e| StoreError::database(format!("Failed to get deployment_id: {}", e)))?;
        Ok(DeploymentId::new(id))
    }
}

#[async_trait]
impl VersionStore for PgVersionStore {
    async fn insert_version(
        &self,
        new: NewToolVersion,
        set_as_current: bool,
    ) -> Result<ToolVersion, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::database(format!("Failed to begin transaction: {}", e)))?;

        let number_row = sqlx::query(
            r#"
            SELECT COALESCE(MAX(version_number), 0) + 1 AS next_number
            FROM tool_versions
            WHERE tool_name = $1
            "#,
        )
        .bind(&new.tool_name)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| StoreError::database(format!("Failed to get next version number: {}", e)))?;
        let version_number: i32 = number_row
            .try_get("next_number")
            .map_err(|e| StoreError::database(format!("Failed to get next_number: {}", e)))?;

        if set_as_current {
            Self::unset_current(&mut tx, &new.tool_name).await?;
        }

        let row = sqlx::query(
            r#"
            INSERT INTO tool_versions (
                tool_name, version_number, code, code_hash, is_current,
                created_by, improvement_type, improvement_reason,
                previous_version_id, deployment_count,
                first_deployed_at, last_deployed_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, 1, NOW(), NOW())
            RETURNING version_id
            "#,
        )
        .bind(&new.tool_name)
        .bind(version_number)
        .bind(&new.code)
        .bind(&new.code_hash)
        .bind(set_as_current)
        .bind(new.created_by.as_str())
        .bind(new.improvement_type.as_str())
        .bind(&new.improvement_reason)
        .bind(new.previous_version_id.map(|v| v.value()))
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| StoreError::database(format!("Failed to insert version: {}", e)))?;

        let raw_id: i64 = row
            .try_get("version_id")
            .map_err(|e| StoreError::database(format!("Failed to get version_id: {}", e)))?;
        let version_id = VersionId::new(raw_id);

        Self::append_deployment(
            &mut tx,
            version_id,
            &new.tool_name,
            new.created_by,
            new.improvement_type.as_str(),
            new.improvement_reason.as_deref(),
        )
        .await?;

        tx.commit()
            .await
            .map_err(|e| StoreError::database(format!("Failed to commit version: {}", e)))?;

        self.get_version(&version_id)
            .await?
            .ok_or_else(|| StoreError::database("inserted version vanished".to_string()))
    }

    async fn set_current(
        &self,
        tool_name: &str,
        version_id: VersionId,
    ) -> Result<(), StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::database(format!("Failed to begin transaction: {}", e)))?;

        Self::unset_current(&mut tx, tool_name).await?;

        let result = sqlx::query(
            r#"
            UPDATE tool_versions SET is_current = TRUE
            WHERE version_id = $1 AND tool_name = $2
            "#,
        )
        .bind(version_id.value())
        .bind(tool_name)
        .execute(&mut *tx)
        .await
        .map_err(|e| StoreError::database(format!("Failed to set current: {}", e)))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found(format!(
                "version {} of {}",
                version_id, tool_name
            )));
        }

        tx.commit()
            .await
            .map_err(|e| StoreError::database(format!("Failed to commit set_current: {}", e)))?;
        Ok(())
    }

    async fn rollback_transition(
        &self,
        tool_name: &str,
        target: VersionId,
        reason: &str,
        deployed_by: CreatedBy,
    ) -> Result<ToolVersion, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::database(format!("Failed to begin transaction: {}", e)))?;

        let exists = sqlx::query(
            "SELECT version_id FROM tool_versions WHERE version_id = $1 AND tool_name = $2",
        )
        .bind(target.value())
        .bind(tool_name)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| StoreError::database(format!("Failed to fetch target version: {}", e)))?;
        if exists.is_none() {
            return Err(StoreError::not_found(format!(
                "version {} of {}",
                target, tool_name
            )));
        }

        // Mark the outgoing current version (if it is a different one)
        // rolled back and close its open deployment.
        let outgoing = sqlx::query(
            r#"
            UPDATE tool_versions SET
                was_rolled_back = TRUE,
                rolled_back_at = NOW(),
                rollback_reason = $3,
                replaced_by_version_id = $2
            WHERE tool_name = $1 AND is_current AND version_id <> $2
            RETURNING version_id
            "#,
        )
        .bind(tool_name)
        .bind(target.value())
        .bind(reason)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| StoreError::database(format!("Failed to mark rolled back: {}", e)))?;

        if let Some(row) = outgoing {
            let outgoing_id: i64 = row
                .try_get("version_id")
                .map_err(|e| StoreError::database(format!("Failed to get version_id: {}", e)))?;
            sqlx::query(
                r#"
                UPDATE version_deployments SET
                    undeployed_at = NOW(),
                    was_successful = FALSE
                WHERE version_id = $1 AND undeployed_at IS NULL
                "#,
            )
            .bind(outgoing_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::database(format!("Failed to close deployment: {}", e)))?;
        }

        Self::unset_current(&mut tx, tool_name).await?;
        sqlx::query(
            r#"
            UPDATE tool_versions SET
                is_current = TRUE,
                deployment_count = deployment_count + 1,
                last_deployed_at = NOW(),
                first_deployed_at = COALESCE(first_deployed_at, NOW())
            WHERE version_id = $1
            "#,
        )
        .bind(target.value())
        .execute(&mut *tx)
        .await
        .map_err(|e| StoreError::database(format!("Failed to repoint current: {}", e)))?;

        Self::append_deployment(&mut tx, target, tool_name, deployed_by, "rollback", Some(reason))
            .await?;

        tx.commit()
            .await
            .map_err(|e| StoreError::database(format!("Failed to commit rollback: {}", e)))?;

        self.get_version(&target)
            .await?
            .ok_or_else(|| StoreError::database("rolled-back-to version vanished".to_string()))
    }

    async fn get_version(
        &self,
        version_id: &VersionId,
    ) -> Result<Option<ToolVersion>, StoreError> {
        let row = sqlx::query("SELECT * FROM tool_versions WHERE version_id = $1")
            .bind(version_id.value())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::database(format!("Failed to fetch version: {}", e)))?;
        row.map(row_to_version).transpose()
    }

    async fn find_by_hash(
        &self,
        tool_name: &str,
        code_hash: &str,
    ) -> Result<Option<ToolVersion>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT * FROM tool_versions
            WHERE tool_name = $1 AND code_hash = $2
            ORDER BY version_number DESC
            LIMIT 1
            "#,
        )
        .bind(tool_name)
        .bind(code_hash)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::database(format!("Failed to find by hash: {}", e)))?;
        row.map(row_to_version).transpose()
    }

    async fn current_version(
        &self,
        tool_name: &str,
    ) -> Result<Option<ToolVersion>, StoreError> {
        let row = sqlx::query(
            "SELECT * FROM tool_versions WHERE tool_name = $1 AND is_current",
        )
        .bind(tool_name)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::database(format!("Failed to fetch current version: {}", e)))?;
        row.map(row_to_version).transpose()
    }

    async fn version_history(
        &self,
        tool_name: &str,
        limit: usize,
    ) -> Result<Vec<ToolVersion>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM tool_versions
            WHERE tool_name = $1
            ORDER BY version_number DESC
            LIMIT $2
            "#,
        )
        .bind(tool_name)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::database(format!("Failed to fetch history: {}", e)))?;
        rows.into_iter().map(row_to_version).collect()
    }

    async fn deployment_history(
        &self,
        tool_name: &str,
        limit: usize,
    ) -> Result<Vec<VersionDeployment>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM version_deployments
            WHERE tool_name = $1
            ORDER BY deployed_at DESC
            LIMIT $2
            "#,
        )
        .bind(tool_name)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::database(format!("Failed to fetch deployments: {}", e)))?;
        rows.into_iter().map(row_to_deployment).collect()
    }

    async fn find_diff(
        &self,
        from: &VersionId,
        to: &VersionId,
    ) -> Result<Option<VersionDiff>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT * FROM version_diffs
            WHERE from_version_id = $1 AND to_version_id = $2
            "#,
        )
        .bind(from.value())
        .bind(to.value())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::database(format!("Failed to fetch diff: {}", e)))?;
        row.map(row_to_diff).transpose()
    }

    async fn store_diff(&self, diff: &VersionDiff) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO version_diffs (
                tool_name, from_version_id, to_version_id, unified_diff,
                lines_added, lines_removed, breaking_changes,
                breaking_change_details
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (from_version_id, to_version_id) DO NOTHING
            "#,
        )
        .bind(&diff.tool_name)
        .bind(diff.from_version_id.value())
        .bind(diff.to_version_id.value())
        .bind(&diff.unified_diff)
        .bind(diff.lines_added)
        .bind(diff.lines_removed)
        .bind(diff.breaking_changes)
        .bind(serde_json::json!(diff.breaking_change_details))
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::database(format!("Failed to store diff: {}", e)))?;
        Ok(())
    }

    async fn update_version_metrics(
        &self,
        version_id: &VersionId,
        metrics: VersionMetricsUpdate,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE tool_versions SET
                success_rate = $2,
                total_executions = $3,
                successful_executions = $4,
                failed_executions = $5,
                avg_duration_ms = $6
            WHERE version_id = $1
            "#,
        )
        .bind(version_id.value())
        .bind(metrics.success_rate)
        .bind(metrics.total_executions)
        .bind(metrics.successful_executions)
        .bind(metrics.failed_executions)
        .bind(metrics.avg_duration_ms)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::database(format!("Failed to update metrics: {}", e)))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found(format!("version {}", version_id)));
        }
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

fn row_to_version(row: sqlx::postgres::PgRow) -> Result<ToolVersion, StoreError> {
    let version_id: i64 = get(&row, "version_id")?;
    let created_by: String = get(&row, "created_by")?;
    let improvement_type: String = get(&row, "improvement_type")?;
    let previous: Option<i64> = get(&row, "previous_version_id")?;
    let replaced_by: Option<i64> = get(&row, "replaced_by_version_id")?;
    let first_deployed_at: Option<DateTime<Utc>> = get(&row, "first_deployed_at")?;
    let last_deployed_at: Option<DateTime<Utc>> = get(&row, "last_deployed_at")?;
    let rolled_back_at: Option<DateTime<Utc>> = get(&row, "rolled_back_at")?;
    let created_at: DateTime<Utc> = get(&row, "created_at")?;

    Ok(ToolVersion {
        version_id: VersionId::new(version_id),
        tool_name: get(&row, "tool_name")?,
        version_number: get(&row, "version_number")?,
        code: get(&row, "code")?,
        code_hash: get(&row, "code_hash")?,
        is_current: get(&row, "is_current")?,
        created_by: CreatedBy::parse(&created_by).ok_or_else(|| {
            StoreError::database(format!("Invalid created_by: {}", created_by))
        })?,
        improvement_type: ImprovementType::parse(&improvement_type).ok_or_else(|| {
            StoreError::database(format!("Invalid improvement_type: {}", improvement_type))
        })?,
        improvement_reason: get(&row, "improvement_reason")?,
        previous_version_id: previous.map(VersionId::new),
        deployment_count: get(&row, "deployment_count")?,
        first_deployed_at: first_deployed_at.map(Timestamp::from_datetime),
        last_deployed_at: last_deployed_at.map(Timestamp::from_datetime),
        success_rate: get(&row, "success_rate")?,
        total_executions: get(&row, "total_executions")?,
        successful_executions: get(&row, "successful_executions")?,
        failed_executions: get(&row, "failed_executions")?,
        avg_duration_ms: get(&row, "avg_duration_ms")?,
        was_rolled_back: get(&row, "was_rolled_back")?,
        rolled_back_at: rolled_back_at.map(Timestamp::from_datetime),
        rollback_reason: get(&row, "rollback_reason")?,
        replaced_by_version_id: replaced_by.map(VersionId::new),
        created_at: Timestamp::from_datetime(created_at),
    })
}

fn row_to_deployment(row: sqlx::postgres::PgRow) -> Result<VersionDeployment, StoreError> {
    let deployment_id: i64 = get(&row, "deployment_id")?;
    let version_id: i64 = get(&row, "version_id")?;
    let deployed_by: String = get(&row, "deployed_by")?;
    let deployed_at: DateTime<Utc> = get(&row, "deployed_at")?;
    let undeployed_at: Option<DateTime<Utc>> = get(&row, "undeployed_at")?;

    Ok(VersionDeployment {
        deployment_id: DeploymentId::new(deployment_id),
        version_id: VersionId::new(version_id),
        tool_name: get(&row, "tool_name")?,
        deployed_by: CreatedBy::parse(&deployed_by).ok_or_else(|| {
            StoreError::database(format!("Invalid deployed_by: {}", deployed_by))
        })?,
        deployment_type: get(&row, "deployment_type")?,
        reason: get(&row, "reason")?,
        deployed_at: Timestamp::from_datetime(deployed_at),
        undeployed_at: undeployed_at.map(Timestamp::from_datetime),
        was_successful: get(&row, "was_successful")?,
    })
}

fn row_to_diff(row: sqlx::postgres::PgRow) -> Result<VersionDiff, StoreError> {
    let from_version_id: i64 = get(&row, "from_version_id")?;
    let to_version_id: i64 = get(&row, "to_version_id")?;
    let details: serde_json::Value = get(&row, "breaking_change_details")?;

    Ok(VersionDiff {
        tool_name: get(&row, "tool_name")?,
        from_version_id: VersionId::new(from_version_id),
        to_version_id: VersionId::new(to_version_id),
        unified_diff: get(&row, "unified_diff")?,
        lines_added: get(&row, "lines_added")?,
        lines_removed: get(&row, "lines_removed")?,
        breaking_changes: get(&row, "breaking_changes")?,
        breaking_change_details: serde_json::from_value(details)
            .map_err(|e| StoreError::database(format!("Invalid diff details: {}", e)))?,
    })
}
