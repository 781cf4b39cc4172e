//! Version Store Port - persistence for tool version history.
//!
//! The store owns the invariants that need transactional enforcement:
//! dense version numbers, the single `is_current` pointer per tool, and
//! the deployment audit rows written alongside transitions. Decision
//! logic (hash deduplication, fast-rollback heuristics, diff generation)
//! lives in the application-level version manager.

use async_trait::async_trait;

use crate::domain::foundation::VersionId;
use crate::domain::versioning::{
    CreatedBy, NewToolVersion, ToolVersion, VersionDeployment, VersionDiff, VersionMetricsUpdate,
};

use super::StoreError;

/// Port over the tool version tables.
#[async_trait]
pub trait VersionStore: Send + Sync {
    /// Inserts a new version row, assigning the next dense version number
    /// for the tool, appending a deployment row, and stamping deployment
    /// timestamps. When `set_as_current` is true the `is_current` pointer
    /// is transferred in the same transaction.
    async fn insert_version(
        &self,
        new: NewToolVersion,
        set_as_current: bool,
    ) -> Result<ToolVersion, StoreError>;

    /// Re-points `is_current` to an existing version (hash-dedupe path).
    /// Atomic per tool; no new rows are written.
    async fn set_current(&self, tool_name: &str, version_id: VersionId)
        -> Result<(), StoreError>;

    /// Performs the full rollback transition in one transaction: marks the
    /// outgoing current version rolled back (reason + replaced-by), closes
    /// its open deployment as unsuccessful, re-points `is_current` to the
    /// target, appends a deployment of type "rollback", and bumps the
    /// target's deployment counters. Returns the target version.
    async fn rollback_transition(
        &self,
        tool_name: &str,
        target: VersionId,
        reason: &str,
        deployed_by: CreatedBy,
    ) -> Result<ToolVersion, StoreError>;

    /// Fetches a version by id.
    async fn get_version(&self, version_id: &VersionId)
        -> Result<Option<ToolVersion>, StoreError>;

    /// Finds an existing version of this tool with the given content hash
    /// (highest version number wins).
    async fn find_by_hash(
        &self,
        tool_name: &str,
        code_hash: &str,
    ) -> Result<Option<ToolVersion>, StoreError>;

    /// The current version of a tool, if any.
    async fn current_version(&self, tool_name: &str)
        -> Result<Option<ToolVersion>, StoreError>;

    /// Version history, newest first.
    async fn version_history(
        &self,
        tool_name: &str,
        limit: usize,
    ) -> Result<Vec<ToolVersion>, StoreError>;

    /// Deployment audit rows for a tool, newest first.
    async fn deployment_history(
        &self,
        tool_name: &str,
        limit: usize,
    ) -> Result<Vec<VersionDeployment>, StoreError>;

    /// A cached diff between two versions, if one was computed before.
    async fn find_diff(
        &self,
        from: &VersionId,
        to: &VersionId,
    ) -> Result<Option<VersionDiff>, StoreError>;

    /// Caches a computed diff.
    async fn store_diff(&self, diff: &VersionDiff) -> Result<(), StoreError>;

    /// Overwrites the derived performance counters of a version.
    async fn update_version_metrics(
        &self,
        version_id: &VersionId,
        metrics: VersionMetricsUpdate,
    ) -> Result<(), StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn version_store_trait_is_send_sync() {
        fn assert_send_sync<T: Send + Sync + ?Sized>() {}
        assert_send_sync::<dyn VersionStore>();
    }
}
