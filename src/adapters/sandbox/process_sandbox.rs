//! Process sandbox - runs generated programs in an interpreter subprocess.
//!
//! Isolation comes from the process boundary: the program runs in its own
//! address space with the tool directory on its module path. A prelude
//! injected above the program provides the `set_result` callback, which
//! serialises the published value onto stdout behind a marker the harness
//! scans for.

use async_trait::async_trait;
use std::path::PathBuf;
use tokio::process::Command;
use tracing::warn;
use uuid::Uuid;

use crate::ports::{GeneratedProgram, Sandbox, SandboxOutcome};

const RESULT_MARKER: &str = "__SYNAPSE_RESULT__";

/// Sandbox that executes programs with a configured interpreter.
pub struct ProcessSandbox {
    /// Interpreter command, e.g. "python3".
    interpreter: String,
    /// Directory containing tool sources, exported to the program's path.
    tool_directory: PathBuf,
}

impl ProcessSandbox {
    pub fn new(interpreter: impl Into<String>, tool_directory: impl Into<PathBuf>) -> Self {
        Self {
            interpreter: interpreter.into(),
            tool_directory: tool_directory.into(),
        }
    }

    /// The prelude every program runs under: a module-level `set_result`
    /// plus a `sandbox` shim for programs that call `sandbox.set_result`.
    fn harness(&self, program_source: &str) -> String {
        format!(
            r#"import json as _synapse_json
import sys as _synapse_sys
_synapse_sys.path.insert(0, {tool_dir:?})

def set_result(value):
    print("{marker}" + _synapse_json.dumps(value))

class _SynapseSandbox:
    @staticmethod
    def set_result(value):
        set_result(value)

sandbox = _SynapseSandbox()

{program}
"#,
            tool_dir = self.tool_directory.display().to_string(),
            marker = RESULT_MARKER,
            program = program_source,
        )
    }

    fn parse_stdout(stdout: &str) -> Option<serde_json::Value> {
        stdout
            .lines()
            .rev()
            .find_map(|line| line.strip_prefix(RESULT_MARKER))
            .and_then(|payload| serde_json::from_str(payload).ok())
    }
}

#[async_trait]
impl Sandbox for ProcessSandbox {
    async fn execute(&self, program: &GeneratedProgram) -> SandboxOutcome {
        let script = self.harness(&program.source);
        let script_path =
            std::env::temp_dir().join(format!("synapse_program_{}.py", Uuid::new_v4()));

        if let Err(e) = tokio::fs::write(&script_path, &script).await {
            return SandboxOutcome::failed(format!("failed to stage program: {}", e));
        }

        let output = Command::new(&self.interpreter)
            .arg(&script_path)
            .kill_on_drop(true)
            .output()
            .await;

        if let Err(e) = tokio::fs::remove_file(&script_path).await {
            warn!(path = %script_path.display(), error = %e, "failed to remove staged program");
        }

        let output = match output {
            Ok(output) => output,
            Err(e) => {
                return SandboxOutcome::failed(format!(
                    "failed to spawn interpreter '{}': {}",
                    self.interpreter, e
                ))
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        if !output.status.success() {
            let last_error = stderr
                .lines()
                .rev()
                .find(|l| !l.trim().is_empty())
                .unwrap_or("program exited with an error");
            return SandboxOutcome::failed(last_error.to_string());
        }

        match Self::parse_stdout(&stdout) {
            Some(value) => SandboxOutcome::ok(value),
            None => SandboxOutcome::failed(
                "program completed without publishing a result via set_result",
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn harness_injects_tool_path_and_program() {
        let sandbox = ProcessSandbox::new("python3", "/var/tools");
        let script = sandbox.harness("set_result(1)");
        assert!(script.contains("/var/tools"));
        assert!(script.contains("set_result(1)"));
        assert!(script.contains(RESULT_MARKER));
    }

    #[test]
    fn parse_stdout_finds_last_marker_line() {
        let stdout = format!(
            "some log\n{}{}\nmore output\n{}{}\n",
            RESULT_MARKER,
            json!({"a": 1}),
            RESULT_MARKER,
            json!({"message": "Hello, World!"}),
        );
        let value = ProcessSandbox::parse_stdout(&stdout).unwrap();
        assert_eq!(value["message"], "Hello, World!");
    }

    #[test]
    fn parse_stdout_without_marker_is_none() {
        assert!(ProcessSandbox::parse_stdout("just logs\n").is_none());
    }
}
