//! Error Recovery - classify a failure, then retry, fall back, adapt,
//! or explain.
//!
//! Strategy caps are absolute per failing tool call: at most 3 retries,
//! 3 fallbacks, and 2 adaptations, tracked in an `AttemptHistory` the
//! orchestrator threads through recursive calls.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::domain::foundation::ExecutionId;
use crate::domain::goal::ToolExecutionRecord;
use crate::ports::{strip_code_fences, ExecutionStore, LanguageModel};

use super::registry::ToolRegistry;

/// Error classes driving strategy choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    Transient,
    WrongTool,
    ParameterMismatch,
    Impossible,
}

impl ErrorClass {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "transient" => Some(ErrorClass::Transient),
            "wrong_tool" => Some(ErrorClass::WrongTool),
            "parameter_mismatch" => Some(ErrorClass::ParameterMismatch),
            "impossible" => Some(ErrorClass::Impossible),
            _ => None,
        }
    }
}

/// The classifier's verdict on a failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Classification {
    pub class: ErrorClass,
    pub confidence: f64,
    pub reasoning: String,
}

/// Bounded record of what recovery has already tried.
#[derive(Debug, Clone, Default)]
pub struct AttemptHistory {
    pub retries: u32,
    pub fallbacks: u32,
    pub adaptations: u32,
    /// Tools already attempted, fed back as selector exclusions.
    pub tried_tools: Vec<String>,
}

impl AttemptHistory {
    pub fn record_tool(&mut self, tool_name: &str) {
        if !self.tried_tools.iter().any(|t| t == tool_name) {
            self.tried_tools.push(tool_name.to_string());
        }
    }
}

/// What the orchestrator should do next.
#[derive(Debug, Clone)]
pub enum RecoveryOutcome {
    /// A strategy produced a result; the pipeline can return it.
    Recovered { result: Value, attempts: u32 },
    /// Select a different tool, excluding those already tried.
    ReselectTool { exclude: Vec<String> },
    /// Recovery is exhausted or the task is impossible.
    Explain { explanation: String },
}

/// Recovery caps and pacing.
#[derive(Debug, Clone)]
pub struct RecoveryConfig {
    pub max_retries: u32,
    pub max_fallbacks: u32,
    pub max_adaptations: u32,
    pub retry_delays: Vec<Duration>,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            max_fallbacks: 3,
            max_adaptations: 2,
            retry_delays: vec![
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(5),
            ],
        }
    }
}

impl RecoveryConfig {
    /// Millisecond pacing for tests.
    pub fn fast() -> Self {
        Self {
            retry_delays: vec![Duration::from_millis(1); 3],
            ..Self::default()
        }
    }
}

/// Context of the failing tool call.
pub struct RecoveryContext<'a> {
    pub execution_id: ExecutionId,
    pub goal_text: &'a str,
    pub tool_name: &'a str,
    pub parameters: &'a Value,
}

pub struct ErrorRecovery {
    model: Arc<dyn LanguageModel>,
    registry: Arc<ToolRegistry>,
    execution_store: Arc<dyn ExecutionStore>,
    config: RecoveryConfig,
}

impl ErrorRecovery {
    pub fn new(
        model: Arc<dyn LanguageModel>,
        registry: Arc<ToolRegistry>,
        execution_store: Arc<dyn ExecutionStore>,
        config: RecoveryConfig,
    ) -> Self {
        Self {
            model,
            registry,
            execution_store,
            config,
        }
    }

    /// Classifies the error and applies the matching strategy.
    pub async fn recover(
        &self,
        error_text: &str,
        ctx: &RecoveryContext<'_>,
        history: &mut AttemptHistory,
    ) -> RecoveryOutcome {
        history.record_tool(ctx.tool_name);

        let classification = self.classify(error_text, ctx).await;
        debug!(
            class = ?classification.class,
            confidence = classification.confidence,
            reasoning = %classification.reasoning,
            "error classified"
        );

        match classification.class {
            ErrorClass::Transient => self.retry_strategy(ctx, history).await,
            ErrorClass::WrongTool => self.fallback_strategy(ctx, history).await,
            ErrorClass::ParameterMismatch => self.adapt_strategy(error_text, ctx, history).await,
            ErrorClass::Impossible => {
                self.explain_strategy(error_text, ctx, "the task cannot be completed")
                    .await
            }
        }
    }

    /// Asks the model to classify; falls back to keyword heuristics when
    /// the answer is malformed.
    pub async fn classify(&self, error_text: &str, ctx: &RecoveryContext<'_>) -> Classification {
        let prompt = format!(
            r#"Classify this tool failure to pick a recovery strategy.

Error: {error}
Tool: {tool}
Parameters: {params}
Goal: "{goal}"

Categories:
1. transient - temporary issue (timeout, network, rate limit); retrying may work
2. wrong_tool - the tool exists but does not fit this goal
3. parameter_mismatch - right tool, invalid or missing parameters
4. impossible - the task fundamentally cannot be completed

Respond in JSON:
{{"error_type": "transient", "confidence": 0.95, "reasoning": "..."}}"#,
            error = error_text,
            tool = ctx.tool_name,
            params = ctx.parameters,
            goal = ctx.goal_text,
        );

        match self.model.generate(&prompt).await {
            Ok(answer) => {
                let cleaned = strip_code_fences(&answer);
                match serde_json::from_str::<serde_json::Value>(&cleaned) {
                    Ok(parsed) => {
                        let class = parsed
                            .get("error_type")
                            .and_then(|v| v.as_str())
                            .and_then(ErrorClass::parse);
                        match class {
                            Some(class) => Classification {
                                class,
                                confidence: parsed
                                    .get("confidence")
                                    .and_then(|v| v.as_f64())
                                    .unwrap_or(0.5),
                                reasoning: parsed
                                    .get("reasoning")
                                    .and_then(|v| v.as_str())
                                    .unwrap_or("")
                                    .to_string(),
                            },
                            None => Self::classify_by_keywords(error_text),
                        }
                    }
                    Err(_) => Self::classify_by_keywords(error_text),
                }
            }
            Err(e) => {
                warn!(error = %e, "classification model call failed, using keywords");
                Self::classify_by_keywords(error_text)
            }
        }
    }

    /// Keyword heuristic used when the model answer is unusable.
    pub fn classify_by_keywords(error_text: &str) -> Classification {
        let lowered = error_text.to_lowercase();

        const TRANSIENT: &[&str] =
            &["timeout", "connection", "network", "rate limit", "429", "503"];
        const PARAMETER: &[&str] =
            &["missing", "required", "invalid", "type", "expected", "parameter"];
        const IMPOSSIBLE: &[&str] = &[
            "permission denied",
            "not found",
            "does not exist",
            "unauthorized",
            "forbidden",
        ];

        if TRANSIENT.iter().any(|kw| lowered.contains(kw)) {
            Classification {
                class: ErrorClass::Transient,
                confidence: 0.8,
                reasoning: "error message contains transient indicators".into(),
            }
        } else if IMPOSSIBLE.iter().any(|kw| lowered.contains(kw)) {
            Classification {
                class: ErrorClass::Impossible,
                confidence: 0.8,
                reasoning: "error message suggests the task is impossible".into(),
            }
        } else if PARAMETER.iter().any(|kw| lowered.contains(kw)) {
            Classification {
                class: ErrorClass::ParameterMismatch,
                confidence: 0.7,
                reasoning: "error message suggests parameter issues".into(),
            }
        } else {
            Classification {
                class: ErrorClass::WrongTool,
                confidence: 0.5,
                reasoning: "uncertain classification, defaulting to wrong_tool".into(),
            }
        }
    }

    /// Retry with the same tool and parameters, paced 1s / 2s / 5s.
    async fn retry_strategy(
        &self,
        ctx: &RecoveryContext<'_>,
        history: &mut AttemptHistory,
    ) -> RecoveryOutcome {
        let Some(tool) = self.registry.get(ctx.tool_name) else {
            return self
                .explain_strategy("tool disappeared from the registry", ctx, "the tool is gone")
                .await;
        };

        while history.retries < self.config.max_retries {
            let delay = self
                .config
                .retry_delays
                .get(history.retries as usize)
                .copied()
                .unwrap_or_else(|| Duration::from_secs(5));
            tokio::time::sleep(delay).await;
            history.retries += 1;

            let started = std::time::Instant::now();
            match tool.execute(ctx.parameters).await {
                Ok(result) => {
                    self.record_attempt(ctx, Some(&result), None, started.elapsed()).await;
                    return RecoveryOutcome::Recovered {
                        result,
                        attempts: history.retries,
                    };
                }
                Err(e) => {
                    let message = e.to_string();
                    self.record_attempt(ctx, None, Some(&message), started.elapsed()).await;
                    debug!(attempt = history.retries, error = %message, "retry failed");
                }
            }
        }

        self.explain_strategy("retries exhausted", ctx, "the tool kept failing transiently")
            .await
    }

    /// Direct the orchestrator to reselect, excluding tried tools.
    async fn fallback_strategy(
        &self,
        ctx: &RecoveryContext<'_>,
        history: &mut AttemptHistory,
    ) -> RecoveryOutcome {
        if history.fallbacks >= self.config.max_fallbacks {
            return self
                .explain_strategy("fallbacks exhausted", ctx, "no alternative tool worked")
                .await;
        }
        history.fallbacks += 1;
        RecoveryOutcome::ReselectTool {
            exclude: history.tried_tools.clone(),
        }
    }

    /// Ask the model for corrected parameters and re-execute.
    async fn adapt_strategy(
        &self,
        error_text: &str,
        ctx: &RecoveryContext<'_>,
        history: &mut AttemptHistory,
    ) -> RecoveryOutcome {
        let Some(tool) = self.registry.get(ctx.tool_name) else {
            return self
                .explain_strategy("tool disappeared from the registry", ctx, "the tool is gone")
                .await;
        };
        let schema = serde_json::to_string(&tool.definition().parameters).unwrap_or_default();

        while history.adaptations < self.config.max_adaptations {
            history.adaptations += 1;

            let prompt = format!(
                r#"A tool call failed because of its parameters. Produce corrected parameters.

Tool: {tool}
Parameter schema: {schema}
Failed parameters: {params}
Error: {error}
Goal: "{goal}"

Respond with only a JSON object of corrected parameters."#,
                tool = ctx.tool_name,
                schema = schema,
                params = ctx.parameters,
                error = error_text,
                goal = ctx.goal_text,
            );

            let corrected = match self.model.generate(&prompt).await {
                Ok(answer) => match serde_json::from_str::<Value>(&strip_code_fences(&answer)) {
                    Ok(value) if value.is_object() => value,
                    _ => continue,
                },
                Err(_) => continue,
            };

            let started = std::time::Instant::now();
            let attempt_ctx = RecoveryContext {
                parameters: &corrected,
                ..*ctx
            };
            match tool.execute(&corrected).await {
                Ok(result) => {
                    self.record_attempt(&attempt_ctx, Some(&result), None, started.elapsed())
                        .await;
                    return RecoveryOutcome::Recovered {
                        result,
                        attempts: history.adaptations,
                    };
                }
                Err(e) => {
                    let message = e.to_string();
                    self.record_attempt(&attempt_ctx, None, Some(&message), started.elapsed())
                        .await;
                }
            }
        }

        self.explain_strategy(error_text, ctx, "adapted parameters still failed")
            .await
    }

    /// Produce a short, user-facing explanation of the failure.
    async fn explain_strategy(
        &self,
        error_text: &str,
        ctx: &RecoveryContext<'_>,
        summary: &str,
    ) -> RecoveryOutcome {
        let prompt = format!(
            "Explain briefly (2 sentences max) why this request could not be \
             completed.\n\nRequest: \"{}\"\nTool tried: {}\nError: {}\nSituation: {}",
            ctx.goal_text, ctx.tool_name, error_text, summary
        );
        let explanation = match self.model.generate(&prompt).await {
            Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
            _ => format!(
                "The request could not be completed: {} ({}).",
                summary, error_text
            ),
        };
        RecoveryOutcome::Explain { explanation }
    }

    async fn record_attempt(
        &self,
        ctx: &RecoveryContext<'_>,
        result: Option<&Value>,
        error: Option<&str>,
        elapsed: Duration,
    ) {
        let record = match (result, error) {
            (Some(result), _) => ToolExecutionRecord::succeeded(
                ctx.execution_id,
                ctx.tool_name,
                ctx.parameters.clone(),
                result.clone(),
                elapsed.as_millis() as i64,
            ),
            (None, Some(error)) => ToolExecutionRecord::failed(
                ctx.execution_id,
                ctx.tool_name,
                ctx.parameters.clone(),
                error,
                elapsed.as_millis() as i64,
            ),
            (None, None) => return,
        };
        if let Err(e) = self.execution_store.store_tool_execution(&record).await {
            warn!(error = %e, "failed to record recovery attempt");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::ai::MockLanguageModel;
    use crate::adapters::storage::InMemoryExecutionStore;
    use crate::domain::foundation::GoalId;
    use crate::domain::goal::GoalExecution;
    use crate::domain::tooling::ToolDefinition;
    use crate::ports::{Tool, ToolError};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Fails `failures` times, then succeeds.
    struct FlakyTool {
        name: &'static str,
        failures: AtomicU32,
    }

    impl FlakyTool {
        fn new(name: &'static str, failures: u32) -> Self {
            Self {
                name,
                failures: AtomicU32::new(failures),
            }
        }
    }

    #[async_trait]
    impl Tool for FlakyTool {
        fn definition(&self) -> ToolDefinition {
            ToolDefinition::new(self.name, "flaky test tool")
        }

        async fn execute(&self, _params: &Value) -> Result<Value, ToolError> {
            let remaining = self.failures.load(Ordering::SeqCst);
            if remaining > 0 {
                self.failures.store(remaining - 1, Ordering::SeqCst);
                Err(ToolError::execution("TimeoutError: Connection timeout"))
            } else {
                Ok(json!({"processed": true}))
            }
        }
    }

    async fn setup(
        tool: Arc<dyn Tool>,
        model: Arc<MockLanguageModel>,
    ) -> (Arc<InMemoryExecutionStore>, ErrorRecovery, ExecutionId) {
        let store = Arc::new(InMemoryExecutionStore::new());
        let execution = GoalExecution::started(GoalId::new(), "Process this test message");
        store.store_execution(&execution).await.unwrap();
        let registry = Arc::new(ToolRegistry::with_tools(vec![tool]));
        let recovery = ErrorRecovery::new(model, registry, store.clone(), RecoveryConfig::fast());
        (store, recovery, execution.execution_id)
    }

    #[tokio::test]
    async fn transient_failure_recovers_by_retrying() {
        let model = Arc::new(MockLanguageModel::new());
        model.push_reply(
            r#"{"error_type": "transient", "confidence": 0.9, "reasoning": "timeout"}"#,
        );
        let tool = Arc::new(FlakyTool::new("test_processor", 0));
        let (store, recovery, execution_id) = setup(tool, model).await;

        let params = json!({"message": "test"});
        let ctx = RecoveryContext {
            execution_id,
            goal_text: "Process this test message",
            tool_name: "test_processor",
            parameters: &params,
        };
        let mut history = AttemptHistory::default();

        let outcome = recovery
            .recover("TimeoutError: Connection timeout", &ctx, &mut history)
            .await;

        match outcome {
            RecoveryOutcome::Recovered { result, attempts } => {
                assert_eq!(result["processed"], true);
                assert_eq!(attempts, 1);
            }
            other => panic!("expected recovery, got {:?}", other),
        }
        // The successful retry is on the record.
        assert_eq!(store.tool_executions_for("test_processor").len(), 1);
    }

    #[tokio::test]
    async fn retries_are_capped_at_three() {
        let model = Arc::new(MockLanguageModel::new());
        model.push_reply(
            r#"{"error_type": "transient", "confidence": 0.9, "reasoning": "timeout"}"#,
        );
        model.default_reply("It kept timing out.");
        let tool = Arc::new(FlakyTool::new("test_processor", 99));
        let (store, recovery, execution_id) = setup(tool, model).await;

        let params = json!({});
        let ctx = RecoveryContext {
            execution_id,
            goal_text: "goal",
            tool_name: "test_processor",
            parameters: &params,
        };
        let mut history = AttemptHistory::default();

        let outcome = recovery.recover("timeout", &ctx, &mut history).await;
        assert!(matches!(outcome, RecoveryOutcome::Explain { .. }));
        assert_eq!(history.retries, 3);
        assert_eq!(store.tool_executions_for("test_processor").len(), 3);
    }

    #[tokio::test]
    async fn wrong_tool_directs_reselection_with_exclusions() {
        let model = Arc::new(MockLanguageModel::new());
        model.push_reply(
            r#"{"error_type": "wrong_tool", "confidence": 0.9, "reasoning": "bad fit"}"#,
        );
        let tool = Arc::new(FlakyTool::new("wrong_one", 99));
        let (_store, recovery, execution_id) = setup(tool, model).await;

        let params = json!({});
        let ctx = RecoveryContext {
            execution_id,
            goal_text: "goal",
            tool_name: "wrong_one",
            parameters: &params,
        };
        let mut history = AttemptHistory::default();

        let outcome = recovery.recover("does not fit", &ctx, &mut history).await;
        match outcome {
            RecoveryOutcome::ReselectTool { exclude } => {
                assert_eq!(exclude, vec!["wrong_one".to_string()]);
            }
            other => panic!("expected reselect, got {:?}", other),
        }
        assert_eq!(history.fallbacks, 1);
    }

    #[tokio::test]
    async fn fallbacks_are_capped_at_three() {
        let model = Arc::new(MockLanguageModel::new());
        model.default_reply("no luck");
        let tool = Arc::new(FlakyTool::new("wrong_one", 99));
        let (_store, recovery, execution_id) = setup(tool, model.clone()).await;

        let params = json!({});
        let ctx = RecoveryContext {
            execution_id,
            goal_text: "goal",
            tool_name: "wrong_one",
            parameters: &params,
        };
        let mut history = AttemptHistory {
            fallbacks: 3,
            ..Default::default()
        };
        model.push_reply(
            r#"{"error_type": "wrong_tool", "confidence": 0.9, "reasoning": "bad fit"}"#,
        );

        let outcome = recovery.recover("does not fit", &ctx, &mut history).await;
        assert!(matches!(outcome, RecoveryOutcome::Explain { .. }));
        assert_eq!(history.fallbacks, 3);
    }

    #[tokio::test]
    async fn parameter_mismatch_adapts_and_reexecutes() {
        let model = Arc::new(MockLanguageModel::new());
        model.push_reply(
            r#"{"error_type": "parameter_mismatch", "confidence": 0.9, "reasoning": "missing field"}"#,
        );
        model.push_reply(r#"{"message": "corrected"}"#);
        let tool = Arc::new(FlakyTool::new("fixable", 0));
        let (store, recovery, execution_id) = setup(tool, model).await;

        let params = json!({"wrong": 1});
        let ctx = RecoveryContext {
            execution_id,
            goal_text: "goal",
            tool_name: "fixable",
            parameters: &params,
        };
        let mut history = AttemptHistory::default();

        let outcome = recovery
            .recover("missing parameter 'message'", &ctx, &mut history)
            .await;
        assert!(matches!(outcome, RecoveryOutcome::Recovered { .. }));
        assert_eq!(history.adaptations, 1);

        // The recorded attempt carries the corrected parameters.
        let records = store.tool_executions_for("fixable");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].parameters["message"], "corrected");
    }

    #[tokio::test]
    async fn impossible_errors_explain_without_attempts() {
        let model = Arc::new(MockLanguageModel::new());
        model.push_reply(
            r#"{"error_type": "impossible", "confidence": 0.9, "reasoning": "no such user"}"#,
        );
        model.push_reply("That user does not exist, so nothing can be deleted.");
        let tool = Arc::new(FlakyTool::new("deleter", 99));
        let (store, recovery, execution_id) = setup(tool, model).await;

        let params = json!({});
        let ctx = RecoveryContext {
            execution_id,
            goal_text: "delete user X",
            tool_name: "deleter",
            parameters: &params,
        };
        let mut history = AttemptHistory::default();

        let outcome = recovery
            .recover("user does not exist", &ctx, &mut history)
            .await;
        match outcome {
            RecoveryOutcome::Explain { explanation } => {
                assert!(!explanation.is_empty());
            }
            other => panic!("expected explanation, got {:?}", other),
        }
        assert_eq!(history.retries, 0);
        assert!(store.tool_executions_for("deleter").is_empty());
    }

    #[tokio::test]
    async fn malformed_model_answer_falls_back_to_keywords() {
        let model = Arc::new(MockLanguageModel::new());
        model.push_reply("I am not JSON");
        model.default_reply("explained");
        let tool = Arc::new(FlakyTool::new("t", 0));
        let (_store, recovery, execution_id) = setup(tool, model).await;

        let params = json!({});
        let ctx = RecoveryContext {
            execution_id,
            goal_text: "goal",
            tool_name: "t",
            parameters: &params,
        };
        let classification = recovery.classify("429 Too Many Requests", &ctx).await;
        assert_eq!(classification.class, ErrorClass::Transient);
    }

    #[test]
    fn keyword_classification_covers_the_taxonomy() {
        assert_eq!(
            ErrorRecovery::classify_by_keywords("Connection timeout").class,
            ErrorClass::Transient
        );
        assert_eq!(
            ErrorRecovery::classify_by_keywords("missing parameter 'x'").class,
            ErrorClass::ParameterMismatch
        );
        assert_eq!(
            ErrorRecovery::classify_by_keywords("permission denied").class,
            ErrorClass::Impossible
        );
        assert_eq!(
            ErrorRecovery::classify_by_keywords("something strange").class,
            ErrorClass::WrongTool
        );
    }
}
