//! Tool Version Manager - content-addressed history and safe rollback.
//!
//! Owns the decision logic over the version store: hash deduplication,
//! previous-version linking, cached diffs, fast-rollback heuristics, and
//! writing rolled-back source to the tool directory.

use chrono::Duration;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use crate::domain::foundation::VersionId;
use crate::domain::versioning::{
    CreatedBy, ImprovementType, NewToolVersion, RollbackCheck, RollbackTrigger, ToolVersion,
    VersionDiff, VersionMetricsUpdate,
};
use crate::ports::{ExecutionStore, SourceError, StoreError, ToolSourceStore, VersionStore};

use super::registry::ToolRegistry;

/// Window scanned by the fast-rollback heuristic.
const ROLLBACK_WINDOW_MINUTES: i64 = 5;
/// Error substrings indicating a changed call signature.
const SIGNATURE_MARKERS: &[&str] = &["TypeError", "AttributeError"];

/// Version manager errors.
#[derive(Debug, Error)]
pub enum VersionManagerError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error("version {0} not found")]
    VersionNotFound(VersionId),
}

/// Both sides of a comparison plus the (cached) diff.
#[derive(Debug, Clone)]
pub struct VersionComparison {
    pub from_version: ToolVersion,
    pub to_version: ToolVersion,
    pub diff: VersionDiff,
    pub success_rate_change: f64,
    pub execution_count_change: i64,
}

pub struct VersionManager {
    version_store: Arc<dyn VersionStore>,
    execution_store: Arc<dyn ExecutionStore>,
    source_store: Option<Arc<dyn ToolSourceStore>>,
    registry: Option<Arc<ToolRegistry>>,
}

impl VersionManager {
    pub fn new(
        version_store: Arc<dyn VersionStore>,
        execution_store: Arc<dyn ExecutionStore>,
    ) -> Self {
        Self {
            version_store,
            execution_store,
            source_store: None,
            registry: None,
        }
    }

    /// Wires the tool directory and registry so rollbacks reach disk.
    pub fn with_deployment_targets(
        mut self,
        source_store: Arc<dyn ToolSourceStore>,
        registry: Arc<ToolRegistry>,
    ) -> Self {
        self.source_store = Some(source_store);
        self.registry = Some(registry);
        self
    }

    /// SHA-256 of a source text.
    pub fn content_hash(code: &str) -> String {
        let digest = Sha256::digest(code.as_bytes());
        digest.iter().map(|b| format!("{:02x}", b)).collect()
    }

    /// Records a new version. Identical content (per tool) never creates
    /// a new row: the existing version is re-pointed as current instead.
    pub async fn create_version(
        &self,
        tool_name: &str,
        code: &str,
        created_by: CreatedBy,
        improvement_type: ImprovementType,
        reason: Option<String>,
        previous_version_id: Option<VersionId>,
        set_as_current: bool,
    ) -> Result<VersionId, VersionManagerError> {
        let code_hash = Self::content_hash(code);

        if let Some(existing) = self.version_store.find_by_hash(tool_name, &code_hash).await? {
            info!(
                tool = tool_name,
                version = existing.version_number,
                "identical version already exists"
            );
            if set_as_current && !existing.is_current {
                self.version_store
                    .set_current(tool_name, existing.version_id)
                    .await?;
            }
            return Ok(existing.version_id);
        }

        let previous_version_id = match previous_version_id {
            Some(id) => Some(id),
            None => self
                .version_store
                .current_version(tool_name)
                .await?
                .map(|v| v.version_id),
        };

        let created = self
            .version_store
            .insert_version(
                NewToolVersion {
                    tool_name: tool_name.to_string(),
                    code: code.to_string(),
                    code_hash,
                    created_by,
                    improvement_type,
                    improvement_reason: reason,
                    previous_version_id,
                },
                set_as_current,
            )
            .await?;
        info!(
            tool = tool_name,
            version = created.version_number,
            id = %created.version_id,
            "created tool version"
        );

        // Pre-compute the diff against the predecessor; comparison later
        // becomes a cache hit.
        if let Some(previous_id) = previous_version_id {
            if let Err(e) = self.ensure_diff(&previous_id, &created.version_id).await {
                warn!(error = %e, "failed to pre-compute version diff");
            }
        }

        Ok(created.version_id)
    }

    /// Rolls a tool back to a specific version and redeploys its source.
    pub async fn rollback_to_version(
        &self,
        tool_name: &str,
        version_id: VersionId,
        reason: &str,
        deployed_by: CreatedBy,
    ) -> Result<(), VersionManagerError> {
        let target = self
            .version_store
            .rollback_transition(tool_name, version_id, reason, deployed_by)
            .await?;
        info!(
            tool = tool_name,
            version = target.version_number,
            reason,
            "rolled back tool version"
        );

        if let Some(source_store) = &self.source_store {
            source_store.write_source(tool_name, &target.code).await?;
            if let Some(registry) = &self.registry {
                if let Err(e) = registry.refresh().await {
                    warn!(error = %e, "registry refresh after rollback failed");
                }
            }
        }
        Ok(())
    }

    /// Scans the last five minutes of executions for patterns that mean
    /// the current deployment is broken. Conservative: fewer than three
    /// recent executions never trigger.
    pub async fn check_immediate_rollback_needed(
        &self,
        tool_name: &str,
    ) -> Result<RollbackCheck, VersionManagerError> {
        let recent = self
            .execution_store
            .get_recent_tool_executions(
                tool_name,
                Duration::minutes(ROLLBACK_WINDOW_MINUTES),
                10,
            )
            .await?;

        if recent.len() < 3 {
            return Ok(RollbackCheck::not_needed());
        }

        // Newest first: count failures until the first success.
        let mut consecutive_failures = 0usize;
        let mut failure_errors: Vec<&str> = Vec::new();
        for record in &recent {
            if record.success {
                break;
            }
            consecutive_failures += 1;
            if let Some(error) = &record.error {
                failure_errors.push(error);
            }
        }

        if consecutive_failures >= 3 {
            let signature_error = failure_errors
                .iter()
                .find(|e| SIGNATURE_MARKERS.iter().any(|m| e.contains(m)));
            if let Some(sample) = signature_error {
                return Ok(RollbackCheck::needed(
                    RollbackTrigger::SignatureChange,
                    "call signature changed, incompatible with existing callers",
                )
                .with_failures(consecutive_failures, Some(sample.to_string())));
            }
            return Ok(RollbackCheck::needed(
                RollbackTrigger::ConsecutiveFailures,
                format!(
                    "{} consecutive failures indicate a broken deployment",
                    consecutive_failures
                ),
            )
            .with_failures(
                consecutive_failures,
                failure_errors.first().map(|e| e.to_string()),
            ));
        }

        if recent.len() >= 5 && recent.iter().all(|r| !r.success) {
            return Ok(RollbackCheck::needed(
                RollbackTrigger::CompleteFailure,
                "100% failure rate in the last five minutes",
            )
            .with_failures(recent.len(), failure_errors.first().map(|e| e.to_string())));
        }

        Ok(RollbackCheck::not_needed())
    }

    /// Compares two versions of a tool. The diff is computed once and
    /// cached in the store.
    pub async fn compare_versions(
        &self,
        from: VersionId,
        to: VersionId,
    ) -> Result<VersionComparison, VersionManagerError> {
        let from_version = self
            .version_store
            .get_version(&from)
            .await?
            .ok_or(VersionManagerError::VersionNotFound(from))?;
        let to_version = self
            .version_store
            .get_version(&to)
            .await?
            .ok_or(VersionManagerError::VersionNotFound(to))?;

        let diff = self.ensure_diff(&from, &to).await?;

        Ok(VersionComparison {
            success_rate_change: to_version.success_rate.unwrap_or(0.0)
                - from_version.success_rate.unwrap_or(0.0),
            execution_count_change: to_version.total_executions - from_version.total_executions,
            from_version,
            to_version,
            diff,
        })
    }

    /// Recomputes the current version's counters from executions since
    /// its last deployment.
    pub async fn update_version_metrics(
        &self,
        tool_name: &str,
    ) -> Result<(), VersionManagerError> {
        let Some(current) = self.version_store.current_version(tool_name).await? else {
            return Ok(());
        };
        let Some(deployed_at) = current.last_deployed_at else {
            return Ok(());
        };

        let metrics = self
            .execution_store
            .get_tool_metrics_since(tool_name, deployed_at)
            .await?;
        if metrics.total == 0 {
            return Ok(());
        }

        self.version_store
            .update_version_metrics(
                &current.version_id,
                VersionMetricsUpdate {
                    success_rate: metrics.success_rate(),
                    total_executions: metrics.total,
                    successful_executions: metrics.successes,
                    failed_executions: metrics.total - metrics.successes,
                    avg_duration_ms: metrics.avg_duration_ms,
                },
            )
            .await?;
        Ok(())
    }

    /// Version history, newest first.
    pub async fn version_history(
        &self,
        tool_name: &str,
        limit: usize,
    ) -> Result<Vec<ToolVersion>, VersionManagerError> {
        Ok(self.version_store.version_history(tool_name, limit).await?)
    }

    /// The current version of a tool.
    pub async fn current_version(
        &self,
        tool_name: &str,
    ) -> Result<Option<ToolVersion>, VersionManagerError> {
        Ok(self.version_store.current_version(tool_name).await?)
    }

    async fn ensure_diff(
        &self,
        from: &VersionId,
        to: &VersionId,
    ) -> Result<VersionDiff, VersionManagerError> {
        if let Some(cached) = self.version_store.find_diff(from, to).await? {
            return Ok(cached);
        }

        let from_version = self
            .version_store
            .get_version(from)
            .await?
            .ok_or(VersionManagerError::VersionNotFound(*from))?;
        let to_version = self
            .version_store
            .get_version(to)
            .await?
            .ok_or(VersionManagerError::VersionNotFound(*to))?;

        let diff = VersionDiff::compute(
            from_version.tool_name.clone(),
            *from,
            *to,
            &from_version.code,
            &to_version.code,
        );
        self.version_store.store_diff(&diff).await?;
        Ok(diff)
    }
}
