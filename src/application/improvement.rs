//! Autonomous Improvement - the detect / generate / validate / deploy /
//! rollback cycle.
//!
//! Consumes self-investigation output, asks the forge for replacement
//! sources, A/B-validates candidates, and deploys through the backup +
//! verify + version-record path. Deployment is automatic only behind the
//! configured gate; everything else queues for manual review.

use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use crate::domain::health::{
    AbMetrics, AbRecommendation, AbTestOutcome, ImprovementOpportunity, OpportunityKind,
    OpportunityMetrics, Severity,
};
use crate::domain::tooling::ToolStatistics;
use crate::domain::versioning::{CreatedBy, ImprovementType};
use crate::ports::{
    ExecutionStore, SourceError, StoreError, ToolCreationEvent, ToolSourceStore,
};

use super::investigation::SelfInvestigator;
use super::neurons::{ForgeRequest, NeuronError, ToolForge};
use super::registry::ToolRegistry;
use super::version_manager::{VersionManager, VersionManagerError};

/// Tools averaging slower than this are performance opportunities.
const SLOW_TOOL_THRESHOLD_MS: f64 = 5_000.0;
/// At most this many critical/high opportunities are acted on per cycle.
const MAX_ACTIONS_PER_CYCLE: usize = 3;

/// Improvement tunables.
#[derive(Debug, Clone)]
pub struct ImprovementConfig {
    /// When false, the cycle runs end to end but produces placeholder
    /// improvements and never touches disk.
    pub enable_real_improvements: bool,
    /// When false, validated improvements queue for manual review
    /// instead of deploying.
    pub enable_auto_improvement: bool,
    /// Minimum executions before a tool is eligible.
    pub min_sample_size: i64,
    /// Success rate under which a failing tool is eligible.
    pub improvement_threshold: f64,
    /// Validation confidence the auto-deploy gate requires.
    pub confidence_threshold: f64,
}

impl Default for ImprovementConfig {
    fn default() -> Self {
        Self {
            enable_real_improvements: false,
            enable_auto_improvement: false,
            min_sample_size: 5,
            improvement_threshold: 0.7,
            confidence_threshold: 0.80,
        }
    }
}

/// Improvement errors.
#[derive(Debug, Error)]
pub enum ImprovementError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Forge(#[from] NeuronError),

    #[error(transparent)]
    Versioning(#[from] VersionManagerError),

    #[error("no statistics available for tool '{0}'")]
    NoStatistics(String),

    #[error("deployment verification failed for '{tool}': {reason}")]
    VerificationFailed { tool: String, reason: String },

    #[error("no improvement generated for tool '{0}'")]
    NothingToDeploy(String),
}

/// Whether an improvement carries real source or is a dry-run record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ImprovementMode {
    Real,
    Placeholder,
}

/// A generated (not yet deployed) improvement.
#[derive(Debug, Clone, Serialize)]
pub struct GeneratedImprovement {
    pub tool_name: String,
    pub mode: ImprovementMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    pub improvements: Vec<String>,
    pub failure_patterns_addressed: usize,
}

/// Record of a deployment (real or simulated).
#[derive(Debug, Clone, Serialize)]
pub struct DeploymentRecord {
    pub tool_name: String,
    pub mode: ImprovementMode,
    pub backup_created: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version_id: Option<i64>,
}

/// Summary of one improvement cycle.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CycleReport {
    pub opportunities_detected: usize,
    pub improved: Vec<String>,
    pub deployed: Vec<String>,
    pub queued_for_review: Vec<String>,
    pub failed: Vec<String>,
}

pub struct AutonomousImprovement {
    investigator: Arc<SelfInvestigator>,
    forge: ToolForge,
    version_manager: Arc<VersionManager>,
    execution_store: Arc<dyn ExecutionStore>,
    source_store: Arc<dyn ToolSourceStore>,
    registry: Arc<ToolRegistry>,
    config: ImprovementConfig,
}

impl AutonomousImprovement {
    pub fn new(
        investigator: Arc<SelfInvestigator>,
        forge: ToolForge,
        version_manager: Arc<VersionManager>,
        execution_store: Arc<dyn ExecutionStore>,
        source_store: Arc<dyn ToolSourceStore>,
        registry: Arc<ToolRegistry>,
        config: ImprovementConfig,
    ) -> Self {
        Self {
            investigator,
            forge,
            version_manager,
            execution_store,
            source_store,
            registry,
            config,
        }
    }

    /// Step 1: combine health issues, degradation trends, and a direct
    /// scan for slow tools into prioritised opportunities.
    pub async fn detect_opportunities(
        &self,
    ) -> Result<Vec<ImprovementOpportunity>, ImprovementError> {
        // The health report feeds the alerting side; eligibility here is
        // judged against the raw per-tool aggregates so the cycle sees
        // every failing tool, not just the report's top offenders.
        let health = self.investigator.investigate_health().await?;
        let stats = self.execution_store.get_tool_performance_view().await?;
        let stats_for = |name: &str| stats.iter().find(|s| s.tool_name == name);
        fn flagged(name: &str, opportunities: &[ImprovementOpportunity]) -> bool {
            opportunities.iter().any(|o| o.tool_name == name)
        }

        let mut opportunities: Vec<ImprovementOpportunity> = Vec::new();

        // Failing tools.
        for tool_stats in &stats {
            if tool_stats.total_executions >= self.config.min_sample_size
                && tool_stats.success_rate < 0.5
                && tool_stats.success_rate < self.config.improvement_threshold
                && !flagged(&tool_stats.tool_name, &opportunities)
            {
                opportunities.push(ImprovementOpportunity::new(
                    tool_stats.tool_name.clone(),
                    OpportunityKind::HighFailure,
                    Severity::Critical,
                    Self::metrics_of(tool_stats),
                    {
                        let mut evidence = vec![
                            format!(
                                "Only {:.1}% success rate",
                                tool_stats.success_rate * 100.0
                            ),
                            format!("Based on {} executions", tool_stats.total_executions),
                        ];
                        if let Some(issue) = health
                            .issues
                            .iter()
                            .find(|i| i.tool_name.as_deref() == Some(&tool_stats.tool_name))
                        {
                            evidence.push(issue.description.clone());
                        }
                        evidence
                    },
                    vec![
                        "Add better error handling".to_string(),
                        "Add input validation".to_string(),
                        "Add retry logic for transient failures".to_string(),
                    ],
                ));
            }
        }

        // Degrading tools.
        let degradation = self.investigator.detect_degradation().await?;
        for tool in degradation.degrading_tools {
            let Some(tool_stats) = stats_for(&tool.tool_name) else {
                continue;
            };
            if tool_stats.total_executions >= self.config.min_sample_size
                && !flagged(&tool.tool_name, &opportunities)
            {
                opportunities.push(ImprovementOpportunity::new(
                    tool.tool_name.clone(),
                    OpportunityKind::Degradation,
                    tool.severity,
                    Self::metrics_of(tool_stats),
                    tool.indicators.clone(),
                    vec![
                        "Review recent changes".to_string(),
                        "Check for resource leaks".to_string(),
                    ],
                ));
            }
        }

        // Consistently slow tools.
        for tool_stats in &stats {
            let slow = tool_stats
                .avg_duration_ms
                .is_some_and(|avg| avg > SLOW_TOOL_THRESHOLD_MS);
            if slow
                && tool_stats.total_executions >= self.config.min_sample_size
                && !flagged(&tool_stats.tool_name, &opportunities)
            {
                opportunities.push(ImprovementOpportunity::new(
                    tool_stats.tool_name.clone(),
                    OpportunityKind::Performance,
                    Severity::Medium,
                    Self::metrics_of(tool_stats),
                    vec![format!(
                        "Average duration {:.0}ms exceeds 5s",
                        tool_stats.avg_duration_ms.unwrap_or_default()
                    )],
                    vec![
                        "Profile and optimize hot paths".to_string(),
                        "Add caching".to_string(),
                    ],
                ));
            }
        }

        opportunities.sort_by_key(|o| o.severity);
        Ok(opportunities)
    }

    /// Step 2: generate a candidate improvement for one tool.
    pub async fn improve_tool(
        &self,
        tool_name: &str,
    ) -> Result<GeneratedImprovement, ImprovementError> {
        let stats = self
            .execution_store
            .get_tool_performance_view()
            .await?
            .into_iter()
            .find(|s| s.tool_name == tool_name)
            .ok_or_else(|| ImprovementError::NoStatistics(tool_name.to_string()))?;

        let failures: Vec<_> = self
            .execution_store
            .get_recent_failures(10)
            .await?
            .into_iter()
            .filter(|f| f.tool_name == tool_name)
            .collect();
        let failure_analysis = Self::analyze_failures(&failures);

        if !self.config.enable_real_improvements {
            return Ok(GeneratedImprovement {
                tool_name: tool_name.to_string(),
                mode: ImprovementMode::Placeholder,
                code: None,
                improvements: vec![
                    "Added comprehensive error handling".to_string(),
                    "Added input validation".to_string(),
                    "Added retry logic for transient failures".to_string(),
                ],
                failure_patterns_addressed: failures.len(),
            });
        }

        let current_source = self.source_store.read_source(tool_name).await?;
        let request = ForgeRequest {
            tool_name: tool_name.to_string(),
            description: format!(
                "Improved version of {} fixing its observed failure patterns. \
                 Current success rate {:.1}% over {} executions.",
                tool_name,
                stats.success_rate * 100.0,
                stats.total_executions
            ),
            current_source: Some(current_source),
            failure_analysis: Some(failure_analysis),
        };
        let forged = self.forge.forge(&request).await?;

        let creation = ToolCreationEvent {
            tool_name: tool_name.to_string(),
            entry_point: forged.entry_point.clone(),
            goal_text: request.description.clone(),
            generated_code: forged.code.clone(),
            validation_passed: forged.valid,
            validation_errors: forged.validation_errors.clone(),
            created_by: "autonomous".to_string(),
        };
        if let Err(e) = self.execution_store.store_tool_creation(&creation).await {
            warn!(error = %e, "failed to record tool creation event");
        }

        if !forged.valid {
            return Err(ImprovementError::Forge(NeuronError::ForgeInvalid(
                forged.validation_errors.join("; "),
            )));
        }

        Ok(GeneratedImprovement {
            tool_name: tool_name.to_string(),
            mode: ImprovementMode::Real,
            code: Some(forged.code),
            improvements: vec![
                "Fixed failure patterns identified in execution history".to_string(),
                "Added comprehensive error handling".to_string(),
            ],
            failure_patterns_addressed: failures.len(),
        })
    }

    /// Step 3: validate through an A/B comparison. Until a real traffic
    /// split exists the new side is projected from the old metrics.
    pub async fn validate_improvement(
        &self,
        tool_name: &str,
    ) -> Result<AbTestOutcome, ImprovementError> {
        let stats = self
            .execution_store
            .get_tool_performance_view()
            .await?
            .into_iter()
            .find(|s| s.tool_name == tool_name)
            .ok_or_else(|| ImprovementError::NoStatistics(tool_name.to_string()))?;

        let old = AbMetrics {
            success_rate: stats.success_rate,
            avg_duration_ms: stats.avg_duration_ms.unwrap_or(1_000.0),
        };
        let new = AbMetrics {
            success_rate: (stats.success_rate + 0.20).min(1.0),
            avg_duration_ms: old.avg_duration_ms * 0.90,
        };
        Ok(AbTestOutcome::evaluate(
            tool_name,
            old,
            new,
            stats.total_executions,
        ))
    }

    /// Step 4: deploy. Backup, atomic write, registry refresh, verify,
    /// restore on any failure, version row on success.
    pub async fn deploy_improvement(
        &self,
        improvement: &GeneratedImprovement,
    ) -> Result<DeploymentRecord, ImprovementError> {
        let tool_name = improvement.tool_name.as_str();

        if improvement.mode == ImprovementMode::Placeholder {
            info!(tool = tool_name, "simulated deployment (real improvements disabled)");
            return Ok(DeploymentRecord {
                tool_name: tool_name.to_string(),
                mode: ImprovementMode::Placeholder,
                backup_created: true,
                version_id: None,
            });
        }

        let code = improvement
            .code
            .as_deref()
            .ok_or_else(|| ImprovementError::NothingToDeploy(tool_name.to_string()))?;

        let backup = self.source_store.backup(tool_name).await?;
        self.source_store.write_source(tool_name, code).await?;

        if let Err(e) = self.registry.refresh().await {
            self.restore_and_refresh(&backup).await;
            return Err(ImprovementError::Source(e));
        }

        if let Err(reason) = self.verify_deployment(tool_name) {
            self.restore_and_refresh(&backup).await;
            return Err(ImprovementError::VerificationFailed {
                tool: tool_name.to_string(),
                reason,
            });
        }

        let version_id = self
            .version_manager
            .create_version(
                tool_name,
                code,
                CreatedBy::Autonomous,
                ImprovementType::Enhancement,
                Some("autonomous improvement".to_string()),
                None,
                true,
            )
            .await?;

        info!(tool = tool_name, version = %version_id, "deployed improved tool");
        Ok(DeploymentRecord {
            tool_name: tool_name.to_string(),
            mode: ImprovementMode::Real,
            backup_created: true,
            version_id: Some(version_id.value()),
        })
    }

    /// Step 5: dual of deploy. Restores the latest backup, refreshes,
    /// verifies. A missing backup is fatal for the rollback.
    pub async fn rollback_improvement(
        &self,
        tool_name: &str,
        reason: &str,
    ) -> Result<(), ImprovementError> {
        let backup = self
            .source_store
            .latest_backup(tool_name)
            .await?
            .ok_or_else(|| SourceError::BackupNotFound(tool_name.to_string()))?;

        self.source_store.restore(&backup).await?;
        self.registry.refresh().await?;
        if let Err(verify_reason) = self.verify_deployment(tool_name) {
            return Err(ImprovementError::VerificationFailed {
                tool: tool_name.to_string(),
                reason: verify_reason,
            });
        }
        info!(tool = tool_name, reason, "rolled back improvement");
        Ok(())
    }

    /// The full cycle: detect, improve, validate, and deploy or queue.
    pub async fn run_cycle(&self) -> Result<CycleReport, ImprovementError> {
        let opportunities = self.detect_opportunities().await?;
        let mut report = CycleReport {
            opportunities_detected: opportunities.len(),
            ..Default::default()
        };

        let actionable: Vec<_> = opportunities
            .iter()
            .filter(|o| o.is_actionable())
            .take(MAX_ACTIONS_PER_CYCLE)
            .collect();

        for opportunity in actionable {
            let tool_name = opportunity.tool_name.clone();
            let improvement = match self.improve_tool(&tool_name).await {
                Ok(improvement) => improvement,
                Err(e) => {
                    warn!(tool = %tool_name, error = %e, "improvement generation failed");
                    report.failed.push(tool_name);
                    continue;
                }
            };
            report.improved.push(tool_name.clone());

            let validation = match self.validate_improvement(&tool_name).await {
                Ok(validation) => validation,
                Err(e) => {
                    warn!(tool = %tool_name, error = %e, "validation failed");
                    report.failed.push(tool_name);
                    continue;
                }
            };

            let auto_deploy = self.config.enable_auto_improvement
                && validation.confidence >= self.config.confidence_threshold
                && validation.recommendation == AbRecommendation::Deploy;

            if auto_deploy {
                match self.deploy_improvement(&improvement).await {
                    Ok(_) => report.deployed.push(tool_name),
                    Err(e) => {
                        warn!(tool = %tool_name, error = %e, "deployment failed");
                        report.failed.push(tool_name);
                    }
                }
            } else {
                report.queued_for_review.push(tool_name);
            }
        }

        Ok(report)
    }

    /// Verifies a freshly deployed tool: it must load and expose its
    /// definition and entry point.
    fn verify_deployment(&self, tool_name: &str) -> Result<(), String> {
        let Some(tool) = self.registry.get(tool_name) else {
            return Err("tool not loadable after deployment".to_string());
        };
        let definition = tool.definition();
        if definition.name != tool_name {
            return Err(format!(
                "deployed tool reports name '{}' instead of '{}'",
                definition.name, tool_name
            ));
        }
        if tool.entry_point().is_empty() {
            return Err("deployed tool has no entry point".to_string());
        }
        Ok(())
    }

    async fn restore_and_refresh(&self, backup: &crate::ports::BackupRecord) {
        if let Err(e) = self.source_store.restore(backup).await {
            warn!(error = %e, "backup restore failed");
        }
        if let Err(e) = self.registry.refresh().await {
            warn!(error = %e, "registry refresh after restore failed");
        }
    }

    /// Buckets error strings by frequency into a prompt-sized summary.
    fn analyze_failures(failures: &[crate::domain::goal::ToolExecutionRecord]) -> String {
        if failures.is_empty() {
            return "No recent failures to analyze".to_string();
        }
        let mut counts: std::collections::HashMap<&str, usize> = Default::default();
        for failure in failures {
            let key = failure
                .error
                .as_deref()
                .unwrap_or("Unknown error")
                .lines()
                .next()
                .unwrap_or("Unknown error");
            let key = &key[..key.len().min(100)];
            *counts.entry(key).or_default() += 1;
        }
        let mut sorted: Vec<(&str, usize)> = counts.into_iter().collect();
        sorted.sort_by(|a, b| b.1.cmp(&a.1));

        let mut summary = format!("{} recent failures. Most common errors:\n", failures.len());
        for (error, count) in sorted.iter().take(5) {
            summary.push_str(&format!("- {} ({} times)\n", error, count));
        }
        summary
    }

    fn metrics_of(stats: &ToolStatistics) -> OpportunityMetrics {
        OpportunityMetrics {
            success_rate: Some(stats.success_rate),
            avg_duration_ms: stats.avg_duration_ms,
            total_executions: stats.total_executions,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::ai::MockLanguageModel;
    use crate::adapters::sandbox::MockSandbox;
    use crate::adapters::storage::{InMemoryExecutionStore, InMemoryVersionStore};
    use crate::adapters::tools::FsToolSourceStore;
    use crate::application::investigation::{InvestigationConfig, SelfInvestigator};
    use crate::domain::foundation::GoalId;
    use crate::domain::goal::{GoalExecution, ToolExecutionRecord};
    use serde_json::json;
    use tempfile::TempDir;

    const BROKEN_SOURCE: &str =
        "class BrokenFetcherTool:\n    def execute(self):\n        raise RuntimeError('x')\n";
    const IMPROVED_SOURCE: &str = "# synapse-tool: {\"name\": \"broken_fetcher\", \"description\": \"fetches\", \"parameters\": {}}\n\nclass BrokenFetcherTool:\n    def execute(self):\n        return {\"ok\": True}\n";

    struct Fixture {
        improvement: AutonomousImprovement,
        store: Arc<InMemoryExecutionStore>,
        source_store: Arc<FsToolSourceStore>,
        model: Arc<MockLanguageModel>,
        _dir: TempDir,
    }

    async fn fixture(config: ImprovementConfig) -> Fixture {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(InMemoryExecutionStore::new());
        let source_store = Arc::new(FsToolSourceStore::new(dir.path()));
        source_store
            .write_source("broken_fetcher", BROKEN_SOURCE)
            .await
            .unwrap();

        let registry = Arc::new(crate::application::registry::ToolRegistry::from_sources(
            source_store.clone(),
            Arc::new(MockSandbox::new()),
        ));
        registry.refresh().await.unwrap();

        let investigator = Arc::new(SelfInvestigator::new(
            store.clone(),
            None,
            InvestigationConfig::default(),
        ));
        let version_manager = Arc::new(VersionManager::new(
            Arc::new(InMemoryVersionStore::new()),
            store.clone(),
        ));
        let model = Arc::new(MockLanguageModel::new());

        let improvement = AutonomousImprovement::new(
            investigator,
            ToolForge::new(model.clone()),
            version_manager,
            store.clone(),
            source_store.clone(),
            registry,
            config,
        );

        Fixture {
            improvement,
            store,
            source_store,
            model,
            _dir: dir,
        }
    }

    async fn seed_failing_tool(store: &InMemoryExecutionStore, tool: &str, failures: usize) {
        let execution = GoalExecution::started(GoalId::new(), "goal");
        store.store_execution(&execution).await.unwrap();
        for _ in 0..failures {
            store
                .store_tool_execution(&ToolExecutionRecord::failed(
                    execution.execution_id,
                    tool,
                    json!({}),
                    "RuntimeError: x",
                    10,
                ))
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn failing_tools_become_critical_opportunities() {
        let f = fixture(ImprovementConfig::default()).await;
        seed_failing_tool(&f.store, "broken_fetcher", 8).await;

        let opportunities = f.improvement.detect_opportunities().await.unwrap();
        assert_eq!(opportunities.len(), 1);
        let opp = &opportunities[0];
        assert_eq!(opp.tool_name, "broken_fetcher");
        assert_eq!(opp.kind, OpportunityKind::HighFailure);
        assert_eq!(opp.severity, Severity::Critical);
        assert!(opp.is_actionable());
    }

    #[tokio::test]
    async fn small_samples_are_not_flagged() {
        let f = fixture(ImprovementConfig::default()).await;
        seed_failing_tool(&f.store, "broken_fetcher", 2).await;

        let opportunities = f.improvement.detect_opportunities().await.unwrap();
        assert!(opportunities.is_empty());
    }

    #[tokio::test]
    async fn placeholder_mode_never_reads_source() {
        let f = fixture(ImprovementConfig::default()).await;
        seed_failing_tool(&f.store, "broken_fetcher", 8).await;

        let improvement = f.improvement.improve_tool("broken_fetcher").await.unwrap();
        assert_eq!(improvement.mode, ImprovementMode::Placeholder);
        assert!(improvement.code.is_none());
        assert_eq!(improvement.failure_patterns_addressed, 8);
        assert!(f.model.generate_calls().is_empty());
    }

    #[tokio::test]
    async fn real_mode_forges_from_source_and_failures() {
        let config = ImprovementConfig {
            enable_real_improvements: true,
            ..Default::default()
        };
        let f = fixture(config).await;
        seed_failing_tool(&f.store, "broken_fetcher", 8).await;
        f.model.default_reply(IMPROVED_SOURCE);

        let improvement = f.improvement.improve_tool("broken_fetcher").await.unwrap();
        assert_eq!(improvement.mode, ImprovementMode::Real);
        assert!(improvement.code.is_some());

        let prompt = &f.model.generate_calls()[0];
        assert!(prompt.contains("RuntimeError: x"));
        assert!(prompt.contains("BrokenFetcherTool"));
    }

    #[tokio::test]
    async fn validation_recommends_deploy_for_large_samples() {
        let f = fixture(ImprovementConfig::default()).await;
        seed_failing_tool(&f.store, "broken_fetcher", 60).await;

        let outcome = f
            .improvement
            .validate_improvement("broken_fetcher")
            .await
            .unwrap();
        assert!(outcome.improvement_detected);
        assert_eq!(outcome.confidence, 0.85);
        assert_eq!(outcome.recommendation, AbRecommendation::Deploy);
    }

    #[tokio::test]
    async fn real_deploy_writes_backups_and_versions() {
        let config = ImprovementConfig {
            enable_real_improvements: true,
            enable_auto_improvement: true,
            ..Default::default()
        };
        let f = fixture(config).await;
        seed_failing_tool(&f.store, "broken_fetcher", 8).await;
        f.model.default_reply(IMPROVED_SOURCE);

        let improvement = f.improvement.improve_tool("broken_fetcher").await.unwrap();
        let record = f.improvement.deploy_improvement(&improvement).await.unwrap();

        assert_eq!(record.mode, ImprovementMode::Real);
        assert!(record.version_id.is_some());
        // New source is live and the backup holds the old one.
        let live = f.source_store.read_source("broken_fetcher").await.unwrap();
        assert!(live.contains("\"ok\": True"));
        let backup = f
            .source_store
            .latest_backup("broken_fetcher")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(backup.tool_name, "broken_fetcher");
    }

    #[tokio::test]
    async fn rollback_restores_the_previous_source() {
        let config = ImprovementConfig {
            enable_real_improvements: true,
            ..Default::default()
        };
        let f = fixture(config).await;
        seed_failing_tool(&f.store, "broken_fetcher", 8).await;
        f.model.default_reply(IMPROVED_SOURCE);

        let improvement = f.improvement.improve_tool("broken_fetcher").await.unwrap();
        f.improvement.deploy_improvement(&improvement).await.unwrap();

        f.improvement
            .rollback_improvement("broken_fetcher", "validation regressed")
            .await
            .unwrap();
        let live = f.source_store.read_source("broken_fetcher").await.unwrap();
        assert!(live.contains("raise RuntimeError"));
    }

    #[tokio::test]
    async fn rollback_without_backup_is_fatal() {
        let f = fixture(ImprovementConfig::default()).await;
        let err = f
            .improvement
            .rollback_improvement("broken_fetcher", "reason")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ImprovementError::Source(SourceError::BackupNotFound(_))
        ));
    }

    #[tokio::test]
    async fn cycle_queues_without_the_auto_deploy_gate() {
        let f = fixture(ImprovementConfig::default()).await;
        seed_failing_tool(&f.store, "broken_fetcher", 60).await;

        let report = f.improvement.run_cycle().await.unwrap();
        assert_eq!(report.opportunities_detected, 1);
        assert_eq!(report.improved, vec!["broken_fetcher"]);
        assert!(report.deployed.is_empty());
        assert_eq!(report.queued_for_review, vec!["broken_fetcher"]);
    }

    #[tokio::test]
    async fn cycle_deploys_behind_the_gate() {
        let config = ImprovementConfig {
            enable_real_improvements: true,
            enable_auto_improvement: true,
            ..Default::default()
        };
        let f = fixture(config).await;
        seed_failing_tool(&f.store, "broken_fetcher", 60).await;
        f.model.default_reply(IMPROVED_SOURCE);

        let report = f.improvement.run_cycle().await.unwrap();
        assert_eq!(report.deployed, vec!["broken_fetcher"]);
        assert!(report.queued_for_review.is_empty());
    }

    #[tokio::test]
    async fn cycle_caps_actions_at_three() {
        let f = fixture(ImprovementConfig::default()).await;
        for tool in ["t1", "t2", "t3", "t4", "t5"] {
            seed_failing_tool(&f.store, tool, 10).await;
        }

        let report = f.improvement.run_cycle().await.unwrap();
        assert_eq!(report.opportunities_detected, 5);
        assert_eq!(report.improved.len() + report.failed.len(), 3);
    }
}
