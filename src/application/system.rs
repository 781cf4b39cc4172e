//! System factory - the single wiring site for the component graph.
//!
//! Components reference their peers through ports injected here; nothing
//! reaches for globals. Infrastructure (stores, model, embedder, sandbox,
//! bus) is handed in as `EngineDeps`, so tests wire in-memory doubles and
//! `main` wires Postgres, Ollama, and the process sandbox.

use std::sync::Arc;
use thiserror::Error;
use tracing::info;

use crate::adapters::tools::seed_builtin_tools;
use crate::config::AppConfig;
use crate::ports::{
    Embedder, EventBus, ExecutionStore, LanguageModel, Sandbox, SourceError, ToolSourceStore,
    VersionStore,
};

use super::discovery::{DiscoveryError, ToolDiscovery};
use super::improvement::{AutonomousImprovement, ImprovementConfig};
use super::investigation::{InvestigationConfig, SelfInvestigator};
use super::monitor::{BackgroundMonitor, MonitorConfig};
use super::neurons::{
    default_forbidden_constructs, CodeGenerator, CodeValidator, GenerativeResponder,
    IntentClassifier, IntentClassifierConfig, ToolForge, ToolSelector,
};
use super::orchestrator::{Orchestrator, OrchestratorConfig};
use super::pattern_cache::PatternCache;
use super::recovery::{ErrorRecovery, RecoveryConfig};
use super::registry::ToolRegistry;
use super::version_manager::VersionManager;

/// Errors raised while assembling the engine.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("tool directory setup failed: {0}")]
    Tools(#[from] SourceError),

    #[error("discovery index build failed: {0}")]
    Discovery(#[from] DiscoveryError),
}

/// Infrastructure the engine is built over.
pub struct EngineDeps {
    pub execution_store: Arc<dyn ExecutionStore>,
    pub version_store: Arc<dyn VersionStore>,
    pub model: Arc<dyn LanguageModel>,
    pub embedder: Arc<dyn Embedder>,
    pub sandbox: Arc<dyn Sandbox>,
    pub source_store: Arc<dyn ToolSourceStore>,
    pub event_bus: Option<Arc<dyn EventBus>>,
}

/// The assembled engine.
pub struct Engine {
    pub orchestrator: Arc<Orchestrator>,
    pub registry: Arc<ToolRegistry>,
    pub discovery: Arc<ToolDiscovery>,
    pub investigator: Arc<SelfInvestigator>,
    pub improvement: Arc<AutonomousImprovement>,
    pub version_manager: Arc<VersionManager>,
    pub monitor: Arc<BackgroundMonitor>,
    pub execution_store: Arc<dyn ExecutionStore>,
}

impl Engine {
    /// Builds the full component graph.
    pub async fn build(config: &AppConfig, deps: EngineDeps) -> Result<Self, BuildError> {
        let EngineDeps {
            execution_store,
            version_store,
            model,
            embedder,
            sandbox,
            source_store,
            event_bus,
        } = deps;

        // Tool catalogue: seed builtins, then load everything on disk.
        seed_builtin_tools(source_store.as_ref()).await?;
        let registry = Arc::new(ToolRegistry::from_sources(
            Arc::clone(&source_store),
            Arc::clone(&sandbox),
        ));
        registry.refresh().await?;

        // Discovery shares the embedder with the caches so all vector
        // spaces stay consistent.
        let discovery = Arc::new(ToolDiscovery::new(
            Arc::clone(&registry),
            Arc::clone(&execution_store),
            Arc::clone(&embedder),
        ));
        discovery.index_all_tools().await?;

        let intent_cache = Arc::new(
            PatternCache::load(
                Arc::clone(&embedder),
                config.engine.cache_dir.join("intent_cache.json"),
            )
            .await,
        );
        let selector_cache = Arc::new(
            PatternCache::load(
                Arc::clone(&embedder),
                config.engine.cache_dir.join("selector_cache.json"),
            )
            .await,
        );

        let version_manager = Arc::new(
            VersionManager::new(Arc::clone(&version_store), Arc::clone(&execution_store))
                .with_deployment_targets(Arc::clone(&source_store), Arc::clone(&registry)),
        );

        let investigator = Arc::new(SelfInvestigator::new(
            Arc::clone(&execution_store),
            event_bus.clone(),
            InvestigationConfig {
                check_interval: std::time::Duration::from_secs(
                    config.engine.investigation_interval_secs,
                ),
                alert_threshold: config.engine.alert_threshold,
                ..Default::default()
            },
        ));

        let improvement = Arc::new(AutonomousImprovement::new(
            Arc::clone(&investigator),
            ToolForge::new(Arc::clone(&model)),
            Arc::clone(&version_manager),
            Arc::clone(&execution_store),
            Arc::clone(&source_store),
            Arc::clone(&registry),
            ImprovementConfig {
                enable_real_improvements: config.engine.enable_real_improvements,
                enable_auto_improvement: config.engine.enable_auto_improvement,
                min_sample_size: config.engine.min_sample_size,
                confidence_threshold: config.engine.confidence_threshold,
                ..Default::default()
            },
        ));

        let orchestrator = Arc::new(Orchestrator::new(
            IntentClassifier::new(
                Arc::clone(&model),
                Arc::clone(&intent_cache),
                Some(Arc::clone(&discovery)),
                IntentClassifierConfig::default(),
            ),
            ToolSelector::new(
                Arc::clone(&model),
                Arc::clone(&registry),
                Arc::clone(&selector_cache),
                0.85,
            ),
            CodeGenerator::new(Arc::clone(&model)),
            CodeValidator::new(default_forbidden_constructs(), 5),
            GenerativeResponder::new(Arc::clone(&model)),
            Arc::clone(&discovery),
            Arc::clone(&registry),
            Arc::clone(&sandbox),
            ErrorRecovery::new(
                Arc::clone(&model),
                Arc::clone(&registry),
                Arc::clone(&execution_store),
                RecoveryConfig::default(),
            ),
            Arc::clone(&execution_store),
            intent_cache,
            selector_cache,
            event_bus,
            OrchestratorConfig {
                max_depth: config.engine.max_depth,
                ..Default::default()
            },
        ));

        let monitor = Arc::new(BackgroundMonitor::new(
            Arc::clone(&execution_store),
            Arc::clone(&investigator),
            Some(Arc::clone(&improvement)),
            MonitorConfig {
                statistics_interval: std::time::Duration::from_secs(
                    config.engine.statistics_interval_secs,
                ),
                improvement_interval: std::time::Duration::from_secs(
                    config.engine.improvement_interval_secs,
                ),
            },
        ));

        info!(tools = registry.len(), "engine assembled");
        Ok(Self {
            orchestrator,
            registry,
            discovery,
            investigator,
            improvement,
            version_manager,
            monitor,
            execution_store,
        })
    }

    /// Starts the background loops.
    pub async fn start_background_tasks(&self) {
        self.monitor.start().await;
    }

    /// Stops the background loops, bounded per task.
    pub async fn shutdown(&self) {
        self.monitor.stop().await;
    }
}
