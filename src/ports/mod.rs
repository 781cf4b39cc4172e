//! Ports: interfaces the application core depends on.
//!
//! Adapters implement these; the application never touches infrastructure
//! directly. The component graph is assembled once in
//! `application::system`.

mod embedder;
mod event_bus;
mod execution_store;
mod language_model;
mod sandbox;
mod tool;
mod tool_source;
mod version_store;

pub use embedder::{EmbedError, Embedder};
pub use event_bus::{
    EngineEvent, EventBus, EventError, EventPhase, HealthAlert, PipelineEvent, PipelineStage,
};
pub use execution_store::{
    ExecutionStore, StoreError, ToolCreationEvent, ToolWindowMetrics,
};
pub use language_model::{strip_code_fences, ChatMessage, LanguageModel, MessageRole, ModelError};
pub use sandbox::{GeneratedProgram, Sandbox, SandboxOutcome};
pub use tool::{Tool, ToolError};
pub use tool_source::{BackupRecord, SourceError, ToolSourceStore};
pub use version_store::VersionStore;
