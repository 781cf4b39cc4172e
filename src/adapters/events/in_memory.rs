//! In-memory event bus implementation for testing.
//!
//! Synchronous, deterministic delivery with capture for assertions.
//! Production deployments use the Redis event bus adapter.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};

use crate::ports::{EngineEvent, EventBus, EventError, EventPhase, PipelineStage};

/// In-memory event bus.
///
/// # Panics
///
/// Methods may panic if the internal lock is poisoned. Acceptable for
/// test code; this adapter should not be used in production.
#[derive(Default)]
pub struct InMemoryEventBus {
    published: Mutex<Vec<EngineEvent>>,
}

impl InMemoryEventBus {
    /// Creates a new empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Convenience constructor returning an `Arc` for sharing.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    // === Test Helpers ===

    /// All published events, in order.
    pub fn published_events(&self) -> Vec<EngineEvent> {
        self.published
            .lock()
            .expect("InMemoryEventBus: lock poisoned")
            .clone()
    }

    /// Pipeline events for one component and phase.
    pub fn pipeline_events(&self, stage: PipelineStage, phase: EventPhase) -> Vec<EngineEvent> {
        self.published_events()
            .into_iter()
            .filter(|e| {
                matches!(e, EngineEvent::Pipeline(p) if p.component == stage && p.phase == phase)
            })
            .collect()
    }

    /// Number of health alerts published.
    pub fn alert_count(&self) -> usize {
        self.published_events()
            .iter()
            .filter(|e| matches!(e, EngineEvent::HealthAlert(_)))
            .count()
    }

    /// Clears captured events (test isolation).
    pub fn clear(&self) {
        self.published
            .lock()
            .expect("InMemoryEventBus: lock poisoned")
            .clear();
    }
}

#[async_trait]
impl EventBus for InMemoryEventBus {
    async fn publish(&self, event: EngineEvent) -> Result<(), EventError> {
        self.published
            .lock()
            .map_err(|_| EventError::Publish("lock poisoned".to_string()))?
            .push(event);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::GoalId;
    use crate::ports::PipelineEvent;

    #[tokio::test]
    async fn publish_captures_events_in_order() {
        let bus = InMemoryEventBus::new();
        let goal = GoalId::new();
        bus.publish(EngineEvent::Pipeline(PipelineEvent::started(
            goal,
            PipelineStage::Orchestrator,
        )))
        .await
        .unwrap();
        bus.publish(EngineEvent::Pipeline(PipelineEvent::completed(
            goal,
            PipelineStage::Orchestrator,
            5,
        )))
        .await
        .unwrap();

        let events = bus.published_events();
        assert_eq!(events.len(), 2);
        assert_eq!(
            bus.pipeline_events(PipelineStage::Orchestrator, EventPhase::Started)
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn clear_resets_capture() {
        let bus = InMemoryEventBus::new();
        bus.publish(EngineEvent::Pipeline(PipelineEvent::started(
            GoalId::new(),
            PipelineStage::Sandbox,
        )))
        .await
        .unwrap();
        bus.clear();
        assert!(bus.published_events().is_empty());
    }
}
