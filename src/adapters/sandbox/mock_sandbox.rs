//! Scriptable sandbox for tests.
//!
//! Queue outcomes per tool name, or install a delegate that executes the
//! referenced tool directly (useful for end-to-end pipeline tests without
//! an interpreter).

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::ports::{GeneratedProgram, Sandbox, SandboxOutcome, Tool};

#[derive(Default)]
struct Inner {
    queued: HashMap<String, Vec<SandboxOutcome>>,
    default_outcome: Option<SandboxOutcome>,
    executed: Vec<GeneratedProgram>,
}

/// In-memory sandbox double.
///
/// Resolution order: queued per-tool outcomes (FIFO), then the delegate
/// tools, then the default outcome, then failure.
#[derive(Default)]
pub struct MockSandbox {
    inner: Mutex<Inner>,
    delegates: Mutex<HashMap<String, Arc<dyn Tool>>>,
}

impl MockSandbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues an outcome for the next execution of `tool_name`.
    pub fn push_outcome(&self, tool_name: impl Into<String>, outcome: SandboxOutcome) {
        self.lock()
            .queued
            .entry(tool_name.into())
            .or_default()
            .push(outcome);
    }

    /// Sets the outcome for any un-queued execution.
    pub fn default_outcome(&self, outcome: SandboxOutcome) {
        self.lock().default_outcome = Some(outcome);
    }

    /// Registers a tool to execute in-process when a program references it.
    pub fn delegate_tool(&self, tool: Arc<dyn Tool>) {
        let name = tool.definition().name;
        self.delegates
            .lock()
            .expect("MockSandbox: delegates lock poisoned")
            .insert(name, tool);
    }

    /// Programs executed so far (test helper).
    pub fn executed_programs(&self) -> Vec<GeneratedProgram> {
        self.lock().executed.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().expect("MockSandbox: lock poisoned")
    }
}

#[async_trait]
impl Sandbox for MockSandbox {
    async fn execute(&self, program: &GeneratedProgram) -> SandboxOutcome {
        self.lock().executed.push(program.clone());

        let queued = {
            let mut inner = self.lock();
            inner
                .queued
                .get_mut(&program.tool_name)
                .filter(|v| !v.is_empty())
                .map(|v| v.remove(0))
        };
        if let Some(outcome) = queued {
            return outcome;
        }

        let delegate = self
            .delegates
            .lock()
            .expect("MockSandbox: delegates lock poisoned")
            .get(&program.tool_name)
            .cloned();
        if let Some(tool) = delegate {
            return match tool.execute(&program.parameters).await {
                Ok(result) => SandboxOutcome::ok(result),
                Err(e) => SandboxOutcome::failed(e.to_string()),
            };
        }

        self.lock().default_outcome.clone().unwrap_or_else(|| {
            SandboxOutcome::failed(format!(
                "MockSandbox has no outcome for tool '{}'",
                program.tool_name
            ))
        })
    }
}
