//! File-backed tools executed through the sandbox.
//!
//! A tool source file may carry a structured header comment:
//!
//! ```text
//! # synapse-tool: {"name": "...", "description": "...", "parameters": {...}}
//! ```
//!
//! The registry parses the header into a `ToolDefinition`. Files without
//! a header get a minimal definition (name from the file stem,
//! description from the first docstring or comment line).

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use crate::domain::tooling::ToolDefinition;
use crate::ports::{GeneratedProgram, Sandbox, Tool, ToolError};

const HEADER_PREFIX: &str = "# synapse-tool:";

/// Parses a tool definition from a source file.
pub fn parse_definition(tool_name: &str, source: &str) -> ToolDefinition {
    for line in source.lines() {
        let trimmed = line.trim();
        if let Some(raw) = trimmed.strip_prefix(HEADER_PREFIX) {
            if let Ok(definition) = serde_json::from_str::<ToolDefinition>(raw.trim()) {
                return definition;
            }
        }
    }
    ToolDefinition::new(tool_name, first_description_line(source))
}

/// Name of the first class defined in the source, used as the entry point.
pub fn extract_entry_point(source: &str) -> Option<String> {
    for line in source.lines() {
        let trimmed = line.trim_start();
        if let Some(rest) = trimmed.strip_prefix("class ") {
            let name: String = rest
                .chars()
                .take_while(|c| c.is_alphanumeric() || *c == '_')
                .collect();
            if !name.is_empty() {
                return Some(name);
            }
        }
    }
    None
}

fn first_description_line(source: &str) -> String {
    for line in source.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with(HEADER_PREFIX) {
            continue;
        }
        if let Some(comment) = trimmed.strip_prefix('#') {
            return comment.trim().to_string();
        }
        if let Some(doc) = trimmed.strip_prefix("\"\"\"") {
            let doc = doc.trim_end_matches("\"\"\"").trim();
            if !doc.is_empty() {
                return doc.to_string();
            }
            continue;
        }
        break;
    }
    String::new()
}

/// A tool whose implementation lives in a source file and runs inside
/// the sandbox.
pub struct ScriptTool {
    definition: ToolDefinition,
    entry_point: String,
    sandbox: Arc<dyn Sandbox>,
}

impl ScriptTool {
    /// Builds a script tool from its source. Fails when no entry-point
    /// class can be found.
    pub fn from_source(
        tool_name: &str,
        source: &str,
        sandbox: Arc<dyn Sandbox>,
    ) -> Result<Self, ToolError> {
        let entry_point = extract_entry_point(source).ok_or_else(|| {
            ToolError::execution(format!("tool '{}' has no entry-point class", tool_name))
        })?;
        Ok(Self {
            definition: parse_definition(tool_name, source),
            entry_point,
            sandbox,
        })
    }

    /// The wrapper program that imports, instantiates, executes, and
    /// publishes through `set_result`.
    fn wrapper_program(&self, params: &Value) -> GeneratedProgram {
        let source = format!(
            r#"import json
from {module} import {class_name}

tool = {class_name}()
params = json.loads({params:?})
result = tool.execute(**params) if params else tool.execute()
set_result(result)
"#,
            module = self.definition.name,
            class_name = self.entry_point,
            params = params.to_string(),
        );
        GeneratedProgram::new(source, self.definition.name.clone(), params.clone())
    }
}

#[async_trait]
impl Tool for ScriptTool {
    fn definition(&self) -> ToolDefinition {
        self.definition.clone()
    }

    fn entry_point(&self) -> String {
        self.entry_point.clone()
    }

    async fn execute(&self, params: &Value) -> Result<Value, ToolError> {
        let program = self.wrapper_program(params);
        let outcome = self.sandbox.execute(&program).await;
        if outcome.success {
            Ok(outcome.result.unwrap_or(Value::Null))
        } else {
            Err(ToolError::execution(
                outcome.error.unwrap_or_else(|| "sandbox failure".to_string()),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sandbox::MockSandbox;
    use crate::ports::SandboxOutcome;
    use serde_json::json;

    const SOURCE_WITH_HEADER: &str = r#"# synapse-tool: {"name": "hello_world", "description": "Say hello", "parameters": {}}

class HelloWorldTool:
    def execute(self):
        return {"message": "Hello, World!"}
"#;

    const SOURCE_WITHOUT_HEADER: &str = r#"# Adds numbers together.

class AdderTool:
    def execute(self, a, b):
        return a + b
"#;

    #[test]
    fn header_definition_wins() {
        let def = parse_definition("ignored", SOURCE_WITH_HEADER);
        assert_eq!(def.name, "hello_world");
        assert_eq!(def.description, "Say hello");
    }

    #[test]
    fn fallback_definition_uses_stem_and_comment() {
        let def = parse_definition("adder", SOURCE_WITHOUT_HEADER);
        assert_eq!(def.name, "adder");
        assert_eq!(def.description, "Adds numbers together.");
    }

    #[test]
    fn entry_point_is_first_class() {
        assert_eq!(
            extract_entry_point(SOURCE_WITH_HEADER).unwrap(),
            "HelloWorldTool"
        );
        assert!(extract_entry_point("x = 1\n").is_none());
    }

    #[tokio::test]
    async fn execute_routes_through_sandbox() {
        let sandbox = Arc::new(MockSandbox::new());
        sandbox.push_outcome(
            "hello_world",
            SandboxOutcome::ok(json!({"message": "Hello, World!"})),
        );
        let tool = ScriptTool::from_source("hello_world", SOURCE_WITH_HEADER, sandbox).unwrap();

        let result = tool.execute(&json!({})).await.unwrap();
        assert_eq!(result["message"], "Hello, World!");
    }

    #[tokio::test]
    async fn sandbox_errors_become_tool_errors() {
        let sandbox = Arc::new(MockSandbox::new());
        sandbox.push_outcome(
            "hello_world",
            SandboxOutcome::failed("TypeError: bad argument"),
        );
        let tool = ScriptTool::from_source("hello_world", SOURCE_WITH_HEADER, sandbox).unwrap();

        let err = tool.execute(&json!({})).await.unwrap_err();
        assert!(err.to_string().contains("TypeError"));
    }

    #[test]
    fn wrapper_program_instantiates_and_publishes() {
        let sandbox = Arc::new(MockSandbox::new());
        let tool = ScriptTool::from_source("hello_world", SOURCE_WITH_HEADER, sandbox).unwrap();
        let program = tool.wrapper_program(&json!({"name": "Ada"}));
        assert!(program.source.contains("from hello_world import HelloWorldTool"));
        assert!(program.source.contains("set_result(result)"));
        assert_eq!(program.tool_name, "hello_world");
    }
}
