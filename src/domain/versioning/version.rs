//! Tool version and deployment records.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{DeploymentId, Timestamp, VersionId};

/// Who produced a version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreatedBy {
    Human,
    Autonomous,
}

impl CreatedBy {
    pub fn as_str(&self) -> &'static str {
        match self {
            CreatedBy::Human => "human",
            CreatedBy::Autonomous => "autonomous",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "human" => Some(CreatedBy::Human),
            "autonomous" => Some(CreatedBy::Autonomous),
            _ => None,
        }
    }
}

/// Why a version was created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImprovementType {
    Initial,
    Bugfix,
    Enhancement,
    Rollback,
}

impl ImprovementType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImprovementType::Initial => "initial",
            ImprovementType::Bugfix => "bugfix",
            ImprovementType::Enhancement => "enhancement",
            ImprovementType::Rollback => "rollback",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "initial" => Some(ImprovementType::Initial),
            "bugfix" => Some(ImprovementType::Bugfix),
            "enhancement" => Some(ImprovementType::Enhancement),
            "rollback" => Some(ImprovementType::Rollback),
            _ => None,
        }
    }
}

/// A single version of a tool's source, content-addressed per tool.
///
/// Invariants upheld by the version store:
/// - exactly one version per tool has `is_current = true`;
/// - version numbers are dense and strictly increasing per tool;
/// - inserting source whose hash matches an existing version re-points
///   that version instead of creating a new row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolVersion {
    pub version_id: VersionId,
    pub tool_name: String,
    pub version_number: i32,
    pub code: String,
    pub code_hash: String,
    pub is_current: bool,
    pub created_by: CreatedBy,
    pub improvement_type: ImprovementType,
    pub improvement_reason: Option<String>,
    pub previous_version_id: Option<VersionId>,
    pub deployment_count: i32,
    pub first_deployed_at: Option<Timestamp>,
    pub last_deployed_at: Option<Timestamp>,
    pub success_rate: Option<f64>,
    pub total_executions: i64,
    pub successful_executions: i64,
    pub failed_executions: i64,
    pub avg_duration_ms: Option<f64>,
    pub was_rolled_back: bool,
    pub rolled_back_at: Option<Timestamp>,
    pub rollback_reason: Option<String>,
    pub replaced_by_version_id: Option<VersionId>,
    pub created_at: Timestamp,
}

/// Request to record a new version.
#[derive(Debug, Clone)]
pub struct NewToolVersion {
    pub tool_name: String,
    pub code: String,
    pub code_hash: String,
    pub created_by: CreatedBy,
    pub improvement_type: ImprovementType,
    pub improvement_reason: Option<String>,
    pub previous_version_id: Option<VersionId>,
}

/// Append-only audit row for one deployment of a version.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionDeployment {
    pub deployment_id: DeploymentId,
    pub version_id: VersionId,
    pub tool_name: String,
    pub deployed_by: CreatedBy,
    /// Mirrors the improvement type, or "rollback" for rollback deployments.
    pub deployment_type: String,
    pub reason: Option<String>,
    pub deployed_at: Timestamp,
    /// Null while this deployment is live.
    pub undeployed_at: Option<Timestamp>,
    pub was_successful: bool,
}

/// Fresh metrics for the current version, computed since its last deploy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VersionMetricsUpdate {
    pub success_rate: f64,
    pub total_executions: i64,
    pub successful_executions: i64,
    pub failed_executions: i64,
    pub avg_duration_ms: Option<f64>,
}

/// Why a fast rollback fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RollbackTrigger {
    /// Consecutive failures whose errors mention TypeError/AttributeError.
    SignatureChange,
    /// Three or more consecutive failures without signature markers.
    ConsecutiveFailures,
    /// Five or more recent attempts, all failed.
    CompleteFailure,
}

impl RollbackTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            RollbackTrigger::SignatureChange => "signature_change",
            RollbackTrigger::ConsecutiveFailures => "consecutive_failures",
            RollbackTrigger::CompleteFailure => "complete_failure",
        }
    }
}

/// Outcome of the immediate-rollback heuristic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollbackCheck {
    pub needed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trigger: Option<RollbackTrigger>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consecutive_failures: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sample_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl RollbackCheck {
    pub fn not_needed() -> Self {
        Self {
            needed: false,
            trigger: None,
            consecutive_failures: None,
            sample_error: None,
            detail: None,
        }
    }

    pub fn needed(trigger: RollbackTrigger, detail: impl Into<String>) -> Self {
        Self {
            needed: true,
            trigger: Some(trigger),
            consecutive_failures: None,
            sample_error: None,
            detail: Some(detail.into()),
        }
    }

    pub fn with_failures(mut self, count: usize, sample: Option<String>) -> Self {
        self.consecutive_failures = Some(count);
        self.sample_error = sample;
        self
    }
}
