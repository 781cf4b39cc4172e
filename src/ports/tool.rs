//! Tool Port - the contract every loadable tool satisfies.
//!
//! A tool exposes its introspection record (`definition`) and a single
//! `execute` entry point taking structured parameters. Tools must be
//! cheap to hold: expensive setup happens lazily inside `execute`.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::domain::tooling::ToolDefinition;

/// Errors raised by tool execution.
#[derive(Debug, Clone, Error)]
pub enum ToolError {
    /// Parameters failed schema validation.
    #[error("invalid parameters: {0}")]
    InvalidParameters(String),

    /// The tool ran and failed. The message is preserved verbatim for
    /// error-recovery classification (it may mention TypeError etc.).
    #[error("{0}")]
    Execution(String),
}

impl ToolError {
    pub fn invalid_parameters(message: impl Into<String>) -> Self {
        Self::InvalidParameters(message.into())
    }

    pub fn execution(message: impl Into<String>) -> Self {
        Self::Execution(message.into())
    }
}

/// Port implemented by every tool in the registry.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The tool's introspection record.
    fn definition(&self) -> ToolDefinition;

    /// Executes the tool with structured parameters.
    async fn execute(&self, params: &Value) -> Result<Value, ToolError>;

    /// Name of the class the code generator instantiates. Defaults to
    /// the CamelCase form of the tool name with a `Tool` suffix
    /// (`hello_world` -> `HelloWorldTool`).
    fn entry_point(&self) -> String {
        let mut class_name = String::new();
        for part in self.definition().name.split('_') {
            let mut chars = part.chars();
            if let Some(first) = chars.next() {
                class_name.extend(first.to_uppercase());
                class_name.push_str(chars.as_str());
            }
        }
        class_name.push_str("Tool");
        class_name
    }
}
