//! In-memory implementation of VersionStore for tests.
//!
//! Enforces the same invariants as the Postgres adapter: dense per-tool
//! version numbers, a single `is_current` pointer, deployment rows
//! written alongside every transition.

use async_trait::async_trait;
use std::sync::Mutex;

use crate::domain::foundation::{DeploymentId, Timestamp, VersionId};
use crate::domain::versioning::{
    CreatedBy, NewToolVersion, ToolVersion, VersionDeployment, VersionDiff, VersionMetricsUpdate,
};
use crate::ports::{StoreError, VersionStore};

#[derive(Default)]
struct Inner {
    versions: Vec<ToolVersion>,
    deployments: Vec<VersionDeployment>,
    diffs: Vec<VersionDiff>,
    next_version_id: i64,
    next_deployment_id: i64,
}

impl Inner {
    fn unset_current(&mut self, tool_name: &str) {
        for v in self.versions.iter_mut().filter(|v| v.tool_name == tool_name) {
            v.is_current = false;
        }
    }

    fn append_deployment(
        &mut self,
        version_id: VersionId,
        tool_name: &str,
        deployed_by: CreatedBy,
        deployment_type: &str,
        reason: Option<String>,
    ) -> DeploymentId {
        self.next_deployment_id += 1;
        let id = DeploymentId::new(self.next_deployment_id);
        self.deployments.push(VersionDeployment {
            deployment_id: id,
            version_id,
            tool_name: tool_name.to_string(),
            deployed_by,
            deployment_type: deployment_type.to_string(),
            reason,
            deployed_at: Timestamp::now(),
            undeployed_at: None,
            was_successful: true,
        });
        id
    }
}

/// In-memory version store.
///
/// # Panics
///
/// Methods panic if the internal lock is poisoned (test-only adapter).
#[derive(Default)]
pub struct InMemoryVersionStore {
    inner: Mutex<Inner>,
}

impl InMemoryVersionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner
            .lock()
            .expect("InMemoryVersionStore: lock poisoned")
    }

    /// All version rows for a tool (test helper).
    pub fn versions_for(&self, tool_name: &str) -> Vec<ToolVersion> {
        self.lock()
            .versions
            .iter()
            .filter(|v| v.tool_name == tool_name)
            .cloned()
            .collect()
    }

    /// All deployment rows for a tool (test helper).
    pub fn deployments_for(&self, tool_name: &str) -> Vec<VersionDeployment> {
        self.lock()
            .deployments
            .iter()
            .filter(|d| d.tool_name == tool_name)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl VersionStore for InMemoryVersionStore {
    async fn insert_version(
        &self,
        new: NewToolVersion,
        set_as_current: bool,
    ) -> Result<ToolVersion, StoreError> {
        let mut inner = self.lock();
        let version_number = inner
            .versions
            .iter()
            .filter(|v| v.tool_name == new.tool_name)
            .map(|v| v.version_number)
            .max()
            .unwrap_or(0)
            + 1;

        inner.next_version_id += 1;
        let version_id = VersionId::new(inner.next_version_id);
        let now = Timestamp::now();

        if set_as_current {
            inner.unset_current(&new.tool_name);
        }

        let version = ToolVersion {
            version_id,
            tool_name: new.tool_name.clone(),
            version_number,
            code: new.code,
            code_hash: new.code_hash,
            is_current: set_as_current,
            created_by: new.created_by,
            improvement_type: new.improvement_type,
            improvement_reason: new.improvement_reason.clone(),
            previous_version_id: new.previous_version_id,
            deployment_count: 1,
            first_deployed_at: Some(now),
            last_deployed_at: Some(now),
            success_rate: None,
            total_executions: 0,
            successful_executions: 0,
            failed_executions: 0,
            avg_duration_ms: None,
            was_rolled_back: false,
            rolled_back_at: None,
            rollback_reason: None,
            replaced_by_version_id: None,
            created_at: now,
        };
        inner.versions.push(version.clone());
        inner.append_deployment(
            version_id,
            &new.tool_name,
            new.created_by,
            new.improvement_type.as_str(),
            new.improvement_reason,
        );
        Ok(version)
    }

    async fn set_current(
        &self,
        tool_name: &str,
        version_id: VersionId,
    ) -> Result<(), StoreError> {
        let mut inner = self.lock();
        if !inner
            .versions
            .iter()
            .any(|v| v.version_id == version_id && v.tool_name == tool_name)
        {
            return Err(StoreError::not_found(format!(
                "version {} of {}",
                version_id, tool_name
            )));
        }
        inner.unset_current(tool_name);
        if let Some(v) = inner
            .versions
            .iter_mut()
            .find(|v| v.version_id == version_id)
        {
            v.is_current = true;
        }
        Ok(())
    }

    async fn rollback_transition(
        &self,
        tool_name: &str,
        target: VersionId,
        reason: &str,
        deployed_by: CreatedBy,
    ) -> Result<ToolVersion, StoreError> {
        let mut inner = self.lock();
        if !inner
            .versions
            .iter()
            .any(|v| v.version_id == target && v.tool_name == tool_name)
        {
            return Err(StoreError::not_found(format!(
                "version {} of {}",
                target, tool_name
            )));
        }

        let now = Timestamp::now();
        let mut outgoing_id = None;
        if let Some(current) = inner
            .versions
            .iter_mut()
            .find(|v| v.tool_name == tool_name && v.is_current && v.version_id != target)
        {
            current.was_rolled_back = true;
            current.rolled_back_at = Some(now);
            current.rollback_reason = Some(reason.to_string());
            current.replaced_by_version_id = Some(target);
            outgoing_id = Some(current.version_id);
        }
        if let Some(outgoing_id) = outgoing_id {
            for d in inner
                .deployments
                .iter_mut()
                .filter(|d| d.version_id == outgoing_id && d.undeployed_at.is_none())
            {
                d.undeployed_at = Some(now);
                d.was_successful = false;
            }
        }

        inner.unset_current(tool_name);
        let target_version = {
            let v = inner
                .versions
                .iter_mut()
                .find(|v| v.version_id == target)
                .expect("target checked above");
            v.is_current = true;
            v.deployment_count += 1;
            v.last_deployed_at = Some(now);
            if v.first_deployed_at.is_none() {
                v.first_deployed_at = Some(now);
            }
            v.clone()
        };
        inner.append_deployment(
            target,
            tool_name,
            deployed_by,
            "rollback",
            Some(reason.to_string()),
        );
        Ok(target_version)
    }

    async fn get_version(
        &self,
        version_id: &VersionId,
    ) -> Result<Option<ToolVersion>, StoreError> {
        Ok(self
            .lock()
            .versions
            .iter()
            .find(|v| v.version_id == *version_id)
            .cloned())
    }

    async fn find_by_hash(
        &self,
        tool_name: &str,
        code_hash: &str,
    ) -> Result<Option<ToolVersion>, StoreError> {
        Ok(self
            .lock()
            .versions
            .iter()
            .filter(|v| v.tool_name == tool_name && v.code_hash == code_hash)
            .max_by_key(|v| v.version_number)
            .cloned())
    }

    async fn current_version(
        &self,
        tool_name: &str,
    ) -> Result<Option<ToolVersion>, StoreError> {
        Ok(self
            .lock()
            .versions
            .iter()
            .find(|v| v.tool_name == tool_name && v.is_current)
            .cloned())
    }

    async fn version_history(
        &self,
        tool_name: &str,
        limit: usize,
    ) -> Result<Vec<ToolVersion>, StoreError> {
        let mut versions = self.versions_for(tool_name);
        versions.sort_by(|a, b| b.version_number.cmp(&a.version_number));
        versions.truncate(limit);
        Ok(versions)
    }

    async fn deployment_history(
        &self,
        tool_name: &str,
        limit: usize,
    ) -> Result<Vec<VersionDeployment>, StoreError> {
        let mut deployments = self.deployments_for(tool_name);
        deployments.sort_by(|a, b| b.deployed_at.cmp(&a.deployed_at));
        deployments.truncate(limit);
        Ok(deployments)
    }

    async fn find_diff(
        &self,
        from: &VersionId,
        to: &VersionId,
    ) -> Result<Option<VersionDiff>, StoreError> {
        Ok(self
            .lock()
            .diffs
            .iter()
            .find(|d| d.from_version_id == *from && d.to_version_id == *to)
            .cloned())
    }

    async fn store_diff(&self, diff: &VersionDiff) -> Result<(), StoreError> {
        self.lock().diffs.push(diff.clone());
        Ok(())
    }

    async fn update_version_metrics(
        &self,
        version_id: &VersionId,
        metrics: VersionMetricsUpdate,
    ) -> Result<(), StoreError> {
        let mut inner = self.lock();
        let version = inner
            .versions
            .iter_mut()
            .find(|v| v.version_id == *version_id)
            .ok_or_else(|| StoreError::not_found(format!("version {}", version_id)))?;
        version.success_rate = Some(metrics.success_rate);
        version.total_executions = metrics.total_executions;
        version.successful_executions = metrics.successful_executions;
        version.failed_executions = metrics.failed_executions;
        version.avg_duration_ms = metrics.avg_duration_ms;
        Ok(())
    }
}
