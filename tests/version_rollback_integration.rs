//! Fast-rollback flow: a deployed version whose signature broke is
//! detected from the execution record and rolled back, restoring the
//! previous source on disk and in the registry.

use std::sync::Arc;

use serde_json::json;
use tempfile::TempDir;

use synapse::adapters::sandbox::MockSandbox;
use synapse::adapters::storage::{InMemoryExecutionStore, InMemoryVersionStore};
use synapse::adapters::tools::FsToolSourceStore;
use synapse::application::registry::ToolRegistry;
use synapse::application::version_manager::VersionManager;
use synapse::domain::foundation::{GoalId, VersionId};
use synapse::domain::goal::{GoalExecution, ToolExecutionRecord};
use synapse::domain::versioning::{CreatedBy, ImprovementType, RollbackTrigger};
use synapse::ports::{ExecutionStore, ToolSourceStore, VersionStore};

const V1_SOURCE: &str = "\
class GreeterTool:
    def execute(self, name):
        return {\"greeting\": \"hello \" + name}
";

const V2_BROKEN_SOURCE: &str = "\
class GreeterTool:
    def execute(self):
        return {\"greeting\": \"hello\"}
";

struct Fixture {
    manager: VersionManager,
    version_store: Arc<InMemoryVersionStore>,
    execution_store: Arc<InMemoryExecutionStore>,
    source_store: Arc<FsToolSourceStore>,
    registry: Arc<ToolRegistry>,
    _dir: TempDir,
}

async fn fixture() -> Fixture {
    let dir = TempDir::new().unwrap();
    let source_store = Arc::new(FsToolSourceStore::new(dir.path()));
    source_store.write_source("greeter", V1_SOURCE).await.unwrap();

    let registry = Arc::new(ToolRegistry::from_sources(
        source_store.clone(),
        Arc::new(MockSandbox::new()),
    ));
    registry.refresh().await.unwrap();

    let version_store = Arc::new(InMemoryVersionStore::new());
    let execution_store = Arc::new(InMemoryExecutionStore::new());
    let manager = VersionManager::new(version_store.clone(), execution_store.clone())
        .with_deployment_targets(source_store.clone(), registry.clone());

    Fixture {
        manager,
        version_store,
        execution_store,
        source_store,
        registry,
        _dir: dir,
    }
}

async fn deploy(fixture: &Fixture, code: &str, improvement_type: ImprovementType) -> VersionId {
    let id = fixture
        .manager
        .create_version(
            "greeter",
            code,
            CreatedBy::Autonomous,
            improvement_type,
            Some("deploy".to_string()),
            None,
            true,
        )
        .await
        .unwrap();
    fixture
        .source_store
        .write_source("greeter", code)
        .await
        .unwrap();
    fixture.registry.refresh().await.unwrap();
    id
}

async fn record_signature_failures(fixture: &Fixture, count: usize) {
    let execution = GoalExecution::started(GoalId::new(), "greet Ada");
    fixture
        .execution_store
        .store_execution(&execution)
        .await
        .unwrap();
    for _ in 0..count {
        fixture
            .execution_store
            .store_tool_execution(&ToolExecutionRecord::failed(
                execution.execution_id,
                "greeter",
                json!({"name": "Ada"}),
                "TypeError: execute() got an unexpected keyword argument 'name'",
                12,
            ))
            .await
            .unwrap();
    }
}

#[tokio::test]
async fn signature_breakage_is_detected_and_rolled_back() {
    let f = fixture().await;
    let v1 = deploy(&f, V1_SOURCE, ImprovementType::Initial).await;
    let v2 = deploy(&f, V2_BROKEN_SOURCE, ImprovementType::Enhancement).await;
    assert_ne!(v1, v2);

    // Three consecutive TypeErrors inside the five-minute window.
    record_signature_failures(&f, 3).await;

    let check = f
        .manager
        .check_immediate_rollback_needed("greeter")
        .await
        .unwrap();
    assert!(check.needed);
    assert_eq!(check.trigger, Some(RollbackTrigger::SignatureChange));

    f.manager
        .rollback_to_version("greeter", v1, "signature_change", CreatedBy::Autonomous)
        .await
        .unwrap();

    // The store shows v1 current and v2 rolled back...
    let current = f.version_store.current_version("greeter").await.unwrap().unwrap();
    assert_eq!(current.version_id, v1);
    let outgoing = f.version_store.get_version(&v2).await.unwrap().unwrap();
    assert!(outgoing.was_rolled_back);
    assert_eq!(outgoing.replaced_by_version_id, Some(v1));
    assert_eq!(outgoing.rollback_reason.as_deref(), Some("signature_change"));

    // ...the old source is live on disk again...
    let live = f.source_store.read_source("greeter").await.unwrap();
    assert!(live.contains("def execute(self, name)"));

    // ...and the rollback left an audit trail.
    let deployments = f
        .version_store
        .deployment_history("greeter", 10)
        .await
        .unwrap();
    assert!(deployments
        .iter()
        .any(|d| d.deployment_type == "rollback" && d.version_id == v1));
    assert!(deployments
        .iter()
        .any(|d| d.version_id == v2 && d.undeployed_at.is_some() && !d.was_successful));
}

#[tokio::test]
async fn two_recent_failures_are_not_enough_to_trigger() {
    let f = fixture().await;
    deploy(&f, V1_SOURCE, ImprovementType::Initial).await;
    record_signature_failures(&f, 2).await;

    let check = f
        .manager
        .check_immediate_rollback_needed("greeter")
        .await
        .unwrap();
    assert!(!check.needed);
}

#[tokio::test]
async fn redeploying_identical_code_reuses_the_version_row() {
    let f = fixture().await;
    let v1 = deploy(&f, V1_SOURCE, ImprovementType::Initial).await;
    let v2 = deploy(&f, V2_BROKEN_SOURCE, ImprovementType::Enhancement).await;

    // Rolling forward to code identical to v1 re-points rather than
    // growing the history.
    let v3 = deploy(&f, V1_SOURCE, ImprovementType::Bugfix).await;
    assert_eq!(v3, v1);
    assert_ne!(v3, v2);
    assert_eq!(f.version_store.versions_for("greeter").len(), 2);
}

#[tokio::test]
async fn repeated_rollback_is_a_noop_beyond_the_audit_row() {
    let f = fixture().await;
    let v1 = deploy(&f, V1_SOURCE, ImprovementType::Initial).await;
    deploy(&f, V2_BROKEN_SOURCE, ImprovementType::Enhancement).await;

    f.manager
        .rollback_to_version("greeter", v1, "first", CreatedBy::Autonomous)
        .await
        .unwrap();
    let versions_before = f.version_store.versions_for("greeter").len();
    let deployments_before = f
        .version_store
        .deployment_history("greeter", 50)
        .await
        .unwrap()
        .len();

    f.manager
        .rollback_to_version("greeter", v1, "second", CreatedBy::Autonomous)
        .await
        .unwrap();

    assert_eq!(f.version_store.versions_for("greeter").len(), versions_before);
    let deployments_after = f
        .version_store
        .deployment_history("greeter", 50)
        .await
        .unwrap()
        .len();
    assert_eq!(deployments_after, deployments_before + 1);

    let current = f.version_store.current_version("greeter").await.unwrap().unwrap();
    assert_eq!(current.version_id, v1);
}
