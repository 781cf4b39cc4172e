//! Orchestrator - the state machine that drives a goal through the
//! neuron pipeline.
//!
//! classify -> (generative) | (select tool -> generate code -> validate
//! -> sandbox), with depth-bounded reselection on recovered failures.
//! Every goal gets an execution row at entry and a finalising update on
//! the way out; partial events are never rolled back.

use serde_json::{json, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::domain::foundation::{ExecutionId, GoalId};
use crate::domain::goal::{GoalExecution, GoalOutcome, Intent, ToolExecutionRecord};
use crate::ports::{
    EngineEvent, EventBus, EventPhase, ExecutionStore, PipelineEvent, PipelineStage, Sandbox,
};

use super::discovery::ToolDiscovery;
use super::neurons::{
    CodeGenerator, CodeValidator, GenerativeResponder, IntentClassifier, NeuronError, ToolSelector,
};
use super::pattern_cache::PatternCache;
use super::recovery::{AttemptHistory, ErrorRecovery, RecoveryContext, RecoveryOutcome};
use super::registry::ToolRegistry;

/// Orchestrator tunables.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Hard recursion cap; exceeding it fails before any neuron call.
    pub max_depth: u32,
    /// Stage-1 candidate count handed to discovery.
    pub semantic_limit: usize,
    /// Stage-2 short-list size shown to the selector.
    pub ranking_limit: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_depth: 8,
            semantic_limit: 10,
            ranking_limit: 5,
        }
    }
}

/// Internal pipeline failure, mapped onto the goal outcome.
#[derive(Debug)]
enum PipelineFailure {
    MaxDepth(u32),
    Neuron(NeuronError),
    Explained(String),
    Deadline,
}

impl PipelineFailure {
    fn message(&self) -> String {
        match self {
            PipelineFailure::MaxDepth(depth) => {
                format!("max_depth exceeded at depth {}", depth)
            }
            PipelineFailure::Neuron(e) => e.to_string(),
            PipelineFailure::Explained(text) => text.clone(),
            PipelineFailure::Deadline => "deadline".to_string(),
        }
    }
}

struct ToolBranchSuccess {
    result: Value,
    tool_name: String,
}

pub struct Orchestrator {
    intent_classifier: IntentClassifier,
    tool_selector: ToolSelector,
    code_generator: CodeGenerator,
    code_validator: CodeValidator,
    generative: GenerativeResponder,
    discovery: Arc<ToolDiscovery>,
    registry: Arc<ToolRegistry>,
    sandbox: Arc<dyn Sandbox>,
    recovery: ErrorRecovery,
    execution_store: Arc<dyn ExecutionStore>,
    intent_cache: Arc<PatternCache>,
    selector_cache: Arc<PatternCache>,
    event_bus: Option<Arc<dyn EventBus>>,
    config: OrchestratorConfig,
}

impl Orchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        intent_classifier: IntentClassifier,
        tool_selector: ToolSelector,
        code_generator: CodeGenerator,
        code_validator: CodeValidator,
        generative: GenerativeResponder,
        discovery: Arc<ToolDiscovery>,
        registry: Arc<ToolRegistry>,
        sandbox: Arc<dyn Sandbox>,
        recovery: ErrorRecovery,
        execution_store: Arc<dyn ExecutionStore>,
        intent_cache: Arc<PatternCache>,
        selector_cache: Arc<PatternCache>,
        event_bus: Option<Arc<dyn EventBus>>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            intent_classifier,
            tool_selector,
            code_generator,
            code_validator,
            generative,
            discovery,
            registry,
            sandbox,
            recovery,
            execution_store,
            intent_cache,
            selector_cache,
            event_bus,
            config,
        }
    }

    /// Processes one goal end to end.
    pub async fn process(&self, goal_text: &str) -> GoalOutcome {
        self.process_goal(GoalId::new(), goal_text, None).await
    }

    /// Processes one goal with an optional external deadline. On
    /// deadline the goal execution row is finalised as failed with a
    /// `deadline` error.
    pub async fn process_with_deadline(
        &self,
        goal_text: &str,
        deadline: Option<Duration>,
    ) -> GoalOutcome {
        self.process_goal(GoalId::new(), goal_text, deadline).await
    }

    /// Processes a goal under a caller-allocated id (async submission
    /// hands the id back before the pipeline finishes).
    pub async fn process_goal(
        &self,
        goal_id: GoalId,
        goal_text: &str,
        deadline: Option<Duration>,
    ) -> GoalOutcome {
        let started = Instant::now();
        let goal_text = goal_text.trim();

        let execution = GoalExecution::started(goal_id, goal_text);
        let execution_id = execution.execution_id;
        if let Err(e) = self.execution_store.store_execution(&execution).await {
            warn!(error = %e, "failed to record goal execution");
        }

        self.emit(PipelineEvent::started(goal_id, PipelineStage::Orchestrator))
            .await;

        let outcome = if goal_text.is_empty() {
            Err((Intent::Unknown, PipelineFailure::Explained("goal is empty".into())))
        } else {
            let work = self.run(goal_text, goal_id, execution_id);
            match deadline {
                Some(deadline) => match tokio::time::timeout(deadline, work).await {
                    Ok(outcome) => outcome,
                    Err(_) => Err((Intent::Unknown, PipelineFailure::Deadline)),
                },
                None => work.await,
            }
        };

        let duration_ms = started.elapsed().as_millis() as i64;
        match outcome {
            Ok((intent, result, response, tool_name)) => {
                self.finalize(execution_id, intent, true, None, duration_ms).await;
                self.learn(goal_text, intent, tool_name.as_deref(), true).await;
                self.emit(PipelineEvent::completed(
                    goal_id,
                    PipelineStage::Orchestrator,
                    duration_ms,
                ))
                .await;
                info!(%goal_id, intent = %intent, duration_ms, "goal completed");
                GoalOutcome {
                    goal_id,
                    execution_id,
                    intent,
                    success: true,
                    result,
                    response,
                    error: None,
                    duration_ms,
                }
            }
            Err((intent, failure)) => {
                let message = failure.message();
                self.finalize(execution_id, intent, false, Some(message.clone()), duration_ms)
                    .await;
                self.emit(PipelineEvent::failed(
                    goal_id,
                    PipelineStage::Orchestrator,
                    duration_ms,
                    message.clone(),
                ))
                .await;
                warn!(%goal_id, error = %message, "goal failed");
                GoalOutcome {
                    goal_id,
                    execution_id,
                    intent,
                    success: false,
                    result: None,
                    response: None,
                    error: Some(message),
                    duration_ms,
                }
            }
        }
    }

    /// The pipeline proper: classify, then branch.
    #[allow(clippy::type_complexity)]
    async fn run(
        &self,
        goal_text: &str,
        goal_id: GoalId,
        execution_id: ExecutionId,
    ) -> Result<(Intent, Option<Value>, Option<String>, Option<String>), (Intent, PipelineFailure)>
    {
        let decision = self
            .step(goal_id, PipelineStage::IntentClassifier, async {
                self.intent_classifier.classify(goal_text).await
            })
            .await
            .map_err(|e| (Intent::Unknown, PipelineFailure::Neuron(e)))?;

        match decision.intent {
            Intent::Generative | Intent::Unknown => {
                let response = self
                    .step(goal_id, PipelineStage::GenerativeResponder, async {
                        self.generative.respond(goal_text).await
                    })
                    .await
                    .map_err(|e| (Intent::Generative, PipelineFailure::Neuron(e)))?;
                Ok((Intent::Generative, None, Some(response), None))
            }
            Intent::ToolUse => {
                let mut history = AttemptHistory::default();
                let success = self
                    .tool_branch(goal_text, goal_id, execution_id, 0, Vec::new(), &mut history)
                    .await
                    .map_err(|failure| (Intent::ToolUse, failure))?;
                Ok((
                    Intent::ToolUse,
                    Some(success.result),
                    None,
                    Some(success.tool_name),
                ))
            }
        }
    }

    /// The tool-use branch. Recursion happens only through reselection,
    /// and every re-entry increments `depth`.
    fn tool_branch<'a>(
        &'a self,
        goal_text: &'a str,
        goal_id: GoalId,
        execution_id: ExecutionId,
        depth: u32,
        exclusions: Vec<String>,
        history: &'a mut AttemptHistory,
    ) -> std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<ToolBranchSuccess, PipelineFailure>> + Send + 'a>,
    > {
        Box::pin(async move {
            if depth > self.config.max_depth {
                return Err(PipelineFailure::MaxDepth(depth));
            }

            // Discovery narrows the candidates; its failure is not fatal,
            // the selector falls back to the full registry.
            let shortlist = match self
                .discovery
                .discover_tools(goal_text, self.config.semantic_limit, self.config.ranking_limit)
                .await
            {
                Ok(ranked) if !ranked.is_empty() => Some(ranked),
                Ok(_) => None,
                Err(e) => {
                    warn!(error = %e, "tool discovery failed, selecting over full registry");
                    None
                }
            };

            let selection = self
                .step(goal_id, PipelineStage::ToolSelector, async {
                    self.tool_selector
                        .select(goal_text, shortlist.as_deref(), &exclusions)
                        .await
                })
                .await
                .map_err(PipelineFailure::Neuron)?;
            let tool_name = selection
                .primary()
                .ok_or_else(|| PipelineFailure::Neuron(NeuronError::NoToolsAvailable))?
                .to_string();
            let tool = self.registry.get(&tool_name).ok_or_else(|| {
                PipelineFailure::Neuron(NeuronError::UnknownTool {
                    name: tool_name.clone(),
                    considered: selection.candidates_considered,
                })
            })?;
            let definition = tool.definition();
            let entry_point = tool.entry_point();

            // Generate and validate, feeding findings back on retry.
            let mut feedback: Option<String> = None;
            let mut attempt: u32 = 0;
            let program = loop {
                let program = self
                    .step(goal_id, PipelineStage::CodeGenerator, async {
                        self.code_generator
                            .generate(goal_text, &definition, &entry_point, feedback.as_deref())
                            .await
                    })
                    .await
                    .map_err(PipelineFailure::Neuron)?;

                let report = self.code_validator.validate(&program, &entry_point);
                self.emit(match report.valid {
                    true => PipelineEvent::completed(goal_id, PipelineStage::CodeValidator, 0),
                    false => PipelineEvent::failed(
                        goal_id,
                        PipelineStage::CodeValidator,
                        0,
                        report.feedback.clone(),
                    ),
                })
                .await;

                if report.valid {
                    break program;
                }
                attempt += 1;
                if !self.code_validator.should_retry(attempt) {
                    return Err(PipelineFailure::Neuron(NeuronError::ValidationExhausted {
                        attempts: attempt,
                        feedback: report.feedback,
                    }));
                }
                feedback = Some(report.feedback);
            };

            // Execute in the sandbox and record the attempt.
            let sandbox_started = Instant::now();
            let outcome = self.sandbox.execute(&program).await;
            let sandbox_ms = sandbox_started.elapsed().as_millis() as i64;

            let record = if outcome.success {
                ToolExecutionRecord::succeeded(
                    execution_id,
                    &tool_name,
                    program.parameters.clone(),
                    outcome.result.clone().unwrap_or(Value::Null),
                    sandbox_ms,
                )
            } else {
                ToolExecutionRecord::failed(
                    execution_id,
                    &tool_name,
                    program.parameters.clone(),
                    outcome.error.clone().unwrap_or_else(|| "unknown error".into()),
                    sandbox_ms,
                )
            };
            if let Err(e) = self.execution_store.store_tool_execution(&record).await {
                warn!(error = %e, "failed to record tool execution");
            }
            self.emit(match outcome.success {
                true => PipelineEvent::completed(goal_id, PipelineStage::Sandbox, sandbox_ms),
                false => PipelineEvent::failed(
                    goal_id,
                    PipelineStage::Sandbox,
                    sandbox_ms,
                    outcome.error.clone().unwrap_or_default(),
                ),
            })
            .await;

            if outcome.success {
                return Ok(ToolBranchSuccess {
                    result: outcome.result.unwrap_or(Value::Null),
                    tool_name,
                });
            }

            // Sandbox failure: hand the context to error recovery.
            let error_text = outcome.error.unwrap_or_else(|| "unknown error".into());
            let ctx = RecoveryContext {
                execution_id,
                goal_text,
                tool_name: &tool_name,
                parameters: &program.parameters,
            };
            let recovery_started = Instant::now();
            let recovery_outcome = self.recovery.recover(&error_text, &ctx, history).await;
            let recovery_ms = recovery_started.elapsed().as_millis() as i64;

            match recovery_outcome {
                RecoveryOutcome::Recovered { result, .. } => {
                    self.emit(PipelineEvent::completed(
                        goal_id,
                        PipelineStage::ErrorRecovery,
                        recovery_ms,
                    ))
                    .await;
                    Ok(ToolBranchSuccess { result, tool_name })
                }
                RecoveryOutcome::ReselectTool { exclude } => {
                    self.emit(PipelineEvent::completed(
                        goal_id,
                        PipelineStage::ErrorRecovery,
                        recovery_ms,
                    ))
                    .await;
                    self.tool_branch(goal_text, goal_id, execution_id, depth + 1, exclude, history)
                        .await
                }
                RecoveryOutcome::Explain { explanation } => {
                    self.emit(PipelineEvent::failed(
                        goal_id,
                        PipelineStage::ErrorRecovery,
                        recovery_ms,
                        explanation.clone(),
                    ))
                    .await;
                    Err(PipelineFailure::Explained(explanation))
                }
            }
        })
    }

    /// Stores validated decisions back into the caches so the next
    /// similar goal skips the model.
    async fn learn(&self, goal_text: &str, intent: Intent, tool_name: Option<&str>, success: bool) {
        if let Err(e) = self
            .intent_cache
            .store_after_execution(
                goal_text,
                json!({"intent": intent.as_str()}),
                success,
                0.9,
                None,
            )
            .await
        {
            warn!(error = %e, "failed to store intent pattern");
        }
        if let Some(tool_name) = tool_name {
            if let Err(e) = self
                .selector_cache
                .store_after_execution(goal_text, json!({"tool": tool_name}), success, 0.9, None)
                .await
            {
                warn!(error = %e, "failed to store selection pattern");
            }
        }
    }

    async fn finalize(
        &self,
        execution_id: ExecutionId,
        intent: Intent,
        success: bool,
        error: Option<String>,
        duration_ms: i64,
    ) {
        if let Err(e) = self
            .execution_store
            .finalize_execution(&execution_id, intent, success, error, duration_ms)
            .await
        {
            warn!(error = %e, "failed to finalize goal execution");
        }
    }

    /// Runs a neuron step wrapped in started/completed/failed events.
    async fn step<T, E: std::fmt::Display>(
        &self,
        goal_id: GoalId,
        stage: PipelineStage,
        work: impl std::future::Future<Output = Result<T, E>>,
    ) -> Result<T, E> {
        self.emit(PipelineEvent::started(goal_id, stage)).await;
        let started = Instant::now();
        let outcome = work.await;
        let duration_ms = started.elapsed().as_millis() as i64;
        match &outcome {
            Ok(_) => {
                self.emit(PipelineEvent::completed(goal_id, stage, duration_ms))
                    .await
            }
            Err(e) => {
                self.emit(PipelineEvent::failed(goal_id, stage, duration_ms, e.to_string()))
                    .await
            }
        }
        outcome
    }

    /// Event emission is optional and fully non-observable to the
    /// pipeline: failures are swallowed after a log line.
    async fn emit(&self, event: PipelineEvent) {
        if let Some(bus) = &self.event_bus {
            if let Err(e) = bus.publish(EngineEvent::Pipeline(event)).await {
                warn!(error = %e, "event publish failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::ai::MockLanguageModel;
    use crate::adapters::embedding::HashEmbedder;
    use crate::adapters::events::InMemoryEventBus;
    use crate::adapters::sandbox::MockSandbox;
    use crate::adapters::storage::InMemoryExecutionStore;
    use crate::application::neurons::{default_forbidden_constructs, IntentClassifierConfig};
    use crate::application::recovery::RecoveryConfig;
    use crate::domain::tooling::ToolDefinition;
    use crate::ports::{SandboxOutcome, Tool, ToolError};
    use async_trait::async_trait;
    use tempfile::TempDir;

    struct HelloTool;

    #[async_trait]
    impl Tool for HelloTool {
        fn definition(&self) -> ToolDefinition {
            ToolDefinition::new("hello_world", "Return a hello world greeting")
        }

        async fn execute(&self, _params: &Value) -> Result<Value, ToolError> {
            Ok(json!({"message": "Hello, World!"}))
        }
    }

    struct Harness {
        orchestrator: Orchestrator,
        store: Arc<InMemoryExecutionStore>,
        sandbox: Arc<MockSandbox>,
        bus: Arc<InMemoryEventBus>,
        _dir: TempDir,
    }

    fn harness(model: Arc<MockLanguageModel>) -> Harness {
        let dir = TempDir::new().unwrap();
        let embedder = Arc::new(HashEmbedder::default());
        let store = Arc::new(InMemoryExecutionStore::new());
        let registry = Arc::new(ToolRegistry::with_tools(vec![Arc::new(HelloTool)]));
        let sandbox = Arc::new(MockSandbox::new());
        let bus = InMemoryEventBus::shared();

        let intent_cache = Arc::new(PatternCache::new(
            embedder.clone(),
            dir.path().join("intent_cache.json"),
        ));
        let selector_cache = Arc::new(PatternCache::new(
            embedder.clone(),
            dir.path().join("selector_cache.json"),
        ));
        let discovery = Arc::new(ToolDiscovery::new(
            registry.clone(),
            store.clone(),
            embedder.clone(),
        ));

        let orchestrator = Orchestrator::new(
            IntentClassifier::new(
                model.clone(),
                intent_cache.clone(),
                Some(discovery.clone()),
                IntentClassifierConfig::default(),
            ),
            ToolSelector::new(model.clone(), registry.clone(), selector_cache.clone(), 0.85),
            CodeGenerator::new(model.clone()),
            CodeValidator::new(default_forbidden_constructs(), 5),
            GenerativeResponder::new(model.clone()),
            discovery,
            registry.clone(),
            sandbox.clone(),
            ErrorRecovery::new(model, registry, store.clone(), RecoveryConfig::fast()),
            store.clone(),
            intent_cache,
            selector_cache,
            Some(bus.clone()),
            OrchestratorConfig::default(),
        );

        Harness {
            orchestrator,
            store,
            sandbox,
            bus,
            _dir: dir,
        }
    }

    const HELLO_PROGRAM: &str = "# params: {}\nfrom hello_world import HelloWorldTool\ntool = HelloWorldTool()\nresult = tool.execute()\nset_result(result)";

    #[tokio::test]
    async fn generative_path_produces_a_response_and_no_tool_rows() {
        let model = Arc::new(MockLanguageModel::new());
        model.push_reply("generative"); // classification
        model.push_reply("Here is a joke about a crab."); // generative answer
        let h = harness(model);

        let outcome = h.orchestrator.process("Tell me a joke").await;
        assert!(outcome.success);
        assert_eq!(outcome.intent, Intent::Generative);
        assert!(!outcome.response.as_deref().unwrap_or_default().is_empty());
        assert!(outcome.result.is_none());

        let execution = h
            .store
            .get_execution(&outcome.execution_id)
            .await
            .unwrap()
            .unwrap();
        assert!(execution.success);
        assert_eq!(execution.intent, Intent::Generative);
        assert!(h.store.tool_executions_for("hello_world").is_empty());
    }

    #[tokio::test]
    async fn tool_use_happy_path_runs_the_full_pipeline() {
        let model = Arc::new(MockLanguageModel::new());
        model.push_reply("tool_use"); // classification
        model.push_reply("hello_world"); // selection
        model.push_reply(HELLO_PROGRAM); // generated code
        let h = harness(model);
        h.sandbox.push_outcome(
            "hello_world",
            SandboxOutcome::ok(json!({"message": "Hello, World!"})),
        );

        let outcome = h.orchestrator.process("Say hello").await;
        assert!(outcome.success, "outcome: {:?}", outcome.error);
        assert_eq!(outcome.intent, Intent::ToolUse);
        assert_eq!(outcome.result.unwrap()["message"], "Hello, World!");

        let records = h.store.tool_executions_for("hello_world");
        assert_eq!(records.len(), 1);
        assert!(records[0].success);
    }

    #[tokio::test]
    async fn transient_sandbox_failure_recovers_via_retry() {
        let model = Arc::new(MockLanguageModel::new());
        model.push_reply("tool_use");
        model.push_reply("hello_world");
        model.push_reply(HELLO_PROGRAM);
        model.push_reply(
            r#"{"error_type": "transient", "confidence": 0.9, "reasoning": "timeout"}"#,
        );
        let h = harness(model);
        h.sandbox.push_outcome(
            "hello_world",
            SandboxOutcome::failed("TimeoutError: Connection timeout"),
        );

        let outcome = h.orchestrator.process("Process this test message").await;
        assert!(outcome.success, "outcome: {:?}", outcome.error);

        // Two rows: the failed sandbox attempt plus the successful retry.
        let records = h.store.tool_executions_for("hello_world");
        assert_eq!(records.len(), 2);
        assert_eq!(records.iter().filter(|r| r.success).count(), 1);
    }

    #[tokio::test]
    async fn validation_failures_feed_back_into_generation() {
        let model = Arc::new(MockLanguageModel::new());
        model.push_reply("tool_use");
        model.push_reply("hello_world");
        model.push_reply("print('no publish')"); // invalid: no set_result
        model.push_reply(HELLO_PROGRAM); // corrected on retry
        let h = harness(model.clone());
        h.sandbox.push_outcome(
            "hello_world",
            SandboxOutcome::ok(json!({"message": "Hello, World!"})),
        );

        let outcome = h.orchestrator.process("Say hello").await;
        assert!(outcome.success);

        // The retry prompt carried the validator's feedback.
        let retry_prompt = model.generate_calls().last().unwrap().clone();
        assert!(retry_prompt.contains("set_result"));
    }

    #[tokio::test]
    async fn empty_goal_fails_without_neuron_calls() {
        let model = Arc::new(MockLanguageModel::new());
        let h = harness(model.clone());

        let outcome = h.orchestrator.process("   ").await;
        assert!(!outcome.success);
        assert!(model.chat_calls().is_empty());
        assert!(model.generate_calls().is_empty());
    }

    #[tokio::test]
    async fn orchestrator_events_bracket_the_goal() {
        let model = Arc::new(MockLanguageModel::new());
        model.push_reply("generative");
        model.push_reply("answer");
        let h = harness(model);

        h.orchestrator.process("Tell me a story").await;
        assert_eq!(
            h.bus
                .pipeline_events(PipelineStage::Orchestrator, EventPhase::Started)
                .len(),
            1
        );
        assert_eq!(
            h.bus
                .pipeline_events(PipelineStage::Orchestrator, EventPhase::Completed)
                .len(),
            1
        );
        assert_eq!(
            h.bus
                .pipeline_events(PipelineStage::IntentClassifier, EventPhase::Completed)
                .len(),
            1
        );
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_finalises_the_row_as_failed() {
        let model = Arc::new(MockLanguageModel::new());
        model.push_reply("tool_use");
        model.push_reply("hello_world");
        model.push_reply(HELLO_PROGRAM);
        model.push_reply(
            r#"{"error_type": "transient", "confidence": 0.9, "reasoning": "timeout"}"#,
        );
        let h = harness(model);
        // The sandbox fails, recovery starts its first paced retry, and
        // the (earlier) deadline timer fires during that pause.
        h.sandbox.push_outcome(
            "hello_world",
            SandboxOutcome::failed("TimeoutError: Connection timeout"),
        );

        let outcome = h
            .orchestrator
            .process_with_deadline("Say hello", Some(Duration::from_micros(100)))
            .await;
        assert!(!outcome.success);
        assert_eq!(outcome.error.as_deref(), Some("deadline"));

        let execution = h
            .store
            .get_execution(&outcome.execution_id)
            .await
            .unwrap()
            .unwrap();
        assert!(!execution.success);
        assert_eq!(execution.error.as_deref(), Some("deadline"));
    }
}
