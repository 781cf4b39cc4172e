//! Event Bus Port - structured engine events for observers.
//!
//! Attaching a collector is optional; the pipeline behaves identically
//! with or without one. Events are fire-and-forget: publishing failures
//! are the publisher's problem to log, never the pipeline's.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::foundation::{GoalId, Timestamp};
use crate::domain::health::{HealthIssue, HealthStatus};

/// Pipeline component that emitted an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Orchestrator,
    IntentClassifier,
    ToolSelector,
    CodeGenerator,
    CodeValidator,
    GenerativeResponder,
    Sandbox,
    ErrorRecovery,
}

impl PipelineStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStage::Orchestrator => "orchestrator",
            PipelineStage::IntentClassifier => "intent_classifier",
            PipelineStage::ToolSelector => "tool_selector",
            PipelineStage::CodeGenerator => "code_generator",
            PipelineStage::CodeValidator => "code_validator",
            PipelineStage::GenerativeResponder => "generative_responder",
            PipelineStage::Sandbox => "sandbox",
            PipelineStage::ErrorRecovery => "error_recovery",
        }
    }
}

/// Lifecycle phase of a pipeline step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventPhase {
    Started,
    Completed,
    Failed,
}

/// One step-level event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineEvent {
    pub goal_id: GoalId,
    pub component: PipelineStage,
    pub phase: EventPhase,
    pub timestamp: Timestamp,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PipelineEvent {
    pub fn started(goal_id: GoalId, component: PipelineStage) -> Self {
        Self {
            goal_id,
            component,
            phase: EventPhase::Started,
            timestamp: Timestamp::now(),
            duration_ms: None,
            error: None,
        }
    }

    pub fn completed(goal_id: GoalId, component: PipelineStage, duration_ms: i64) -> Self {
        Self {
            goal_id,
            component,
            phase: EventPhase::Completed,
            timestamp: Timestamp::now(),
            duration_ms: Some(duration_ms),
            error: None,
        }
    }

    pub fn failed(
        goal_id: GoalId,
        component: PipelineStage,
        duration_ms: i64,
        error: impl Into<String>,
    ) -> Self {
        Self {
            goal_id,
            component,
            phase: EventPhase::Failed,
            timestamp: Timestamp::now(),
            duration_ms: Some(duration_ms),
            error: Some(error.into()),
        }
    }
}

/// A smart alert published by self-investigation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthAlert {
    pub investigation_id: String,
    pub health_score: f64,
    pub status: HealthStatus,
    pub issues: Vec<HealthIssue>,
    pub timestamp: Timestamp,
}

/// Everything the bus can carry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    Pipeline(PipelineEvent),
    HealthAlert(HealthAlert),
}

/// Event bus errors.
#[derive(Debug, Clone, Error)]
pub enum EventError {
    #[error("event bus publish failed: {0}")]
    Publish(String),
}

/// Port over the event transport.
#[async_trait]
pub trait EventBus: Send + Sync {
    async fn publish(&self, event: EngineEvent) -> Result<(), EventError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn started_event_has_no_duration() {
        let e = PipelineEvent::started(GoalId::new(), PipelineStage::IntentClassifier);
        assert_eq!(e.phase, EventPhase::Started);
        assert!(e.duration_ms.is_none());
        assert!(e.error.is_none());
    }

    #[test]
    fn failed_event_carries_error_summary() {
        let e = PipelineEvent::failed(
            GoalId::new(),
            PipelineStage::Sandbox,
            42,
            "TypeError: execute() got an unexpected keyword argument 'x'",
        );
        assert_eq!(e.phase, EventPhase::Failed);
        assert!(e.error.unwrap().contains("TypeError"));
    }

    #[test]
    fn engine_event_serializes_with_tag() {
        let e = EngineEvent::Pipeline(PipelineEvent::completed(
            GoalId::new(),
            PipelineStage::Orchestrator,
            10,
        ));
        let json = serde_json::to_string(&e).unwrap();
        assert!(json.contains("\"type\":\"pipeline\""));
    }
}
