//! Sandbox Port - isolated execution of generated programs.
//!
//! The engine only requires: execute a short program in isolation and
//! surface the single value it publishes through `set_result`, or the
//! error it raised. The mechanism (subprocess, embedded interpreter,
//! WASM) is an adapter choice.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A program produced by the code generator for one tool invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedProgram {
    /// Full program text in the sandbox's target language.
    pub source: String,
    /// The tool the program invokes.
    pub tool_name: String,
    /// Parameters the generator extracted from the goal.
    pub parameters: Value,
}

impl GeneratedProgram {
    pub fn new(source: impl Into<String>, tool_name: impl Into<String>, parameters: Value) -> Self {
        Self {
            source: source.into(),
            tool_name: tool_name.into(),
            parameters,
        }
    }
}

/// What the sandbox observed: the published value or an error string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SandboxOutcome {
    pub success: bool,
    pub result: Option<Value>,
    pub error: Option<String>,
}

impl SandboxOutcome {
    pub fn ok(result: Value) -> Self {
        Self {
            success: true,
            result: Some(result),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            result: None,
            error: Some(error.into()),
        }
    }
}

/// Port over the isolated execution mechanism.
#[async_trait]
pub trait Sandbox: Send + Sync {
    /// Runs the program and captures its single published value or error.
    /// Infrastructure failures (spawn errors, harness failures) surface as
    /// failed outcomes, not panics.
    async fn execute(&self, program: &GeneratedProgram) -> SandboxOutcome;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn ok_outcome_carries_result() {
        let outcome = SandboxOutcome::ok(json!({"message": "Hello, World!"}));
        assert!(outcome.success);
        assert!(outcome.error.is_none());
        assert_eq!(outcome.result.unwrap()["message"], "Hello, World!");
    }

    #[test]
    fn failed_outcome_carries_error() {
        let outcome = SandboxOutcome::failed("TimeoutError: Connection timeout");
        assert!(!outcome.success);
        assert!(outcome.result.is_none());
        assert!(outcome.error.unwrap().starts_with("TimeoutError"));
    }

    #[tokio::test]
    async fn sandbox_trait_is_send_sync() {
        fn assert_send_sync<T: Send + Sync + ?Sized>() {}
        assert_send_sync::<dyn Sandbox>();
    }
}
