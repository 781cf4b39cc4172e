//! Code Generator - produces the short program that invokes a tool.
//!
//! The program imports the tool's module, instantiates its entry point,
//! calls `execute` with parameters extracted from the goal, and publishes
//! the return value through `set_result`. The first line of the model's
//! answer is a `# params:` comment carrying the extracted parameters as
//! JSON, which ends up on the tool execution record.

use serde_json::Value;
use std::sync::Arc;

use crate::domain::tooling::ToolDefinition;
use crate::ports::{strip_code_fences, GeneratedProgram, LanguageModel};

use super::NeuronError;

pub struct CodeGenerator {
    model: Arc<dyn LanguageModel>,
}

impl CodeGenerator {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self { model }
    }

    /// Generates the invocation program. `feedback` carries the
    /// validator's findings on a retry.
    pub async fn generate(
        &self,
        goal: &str,
        tool: &ToolDefinition,
        entry_point: &str,
        feedback: Option<&str>,
    ) -> Result<GeneratedProgram, NeuronError> {
        let prompt = Self::build_prompt(goal, tool, entry_point, feedback);
        let answer = self.model.generate(&prompt).await?;
        let source = strip_code_fences(&answer);
        let parameters = Self::extract_params_comment(&source);
        Ok(GeneratedProgram::new(source, tool.name.clone(), parameters))
    }

    fn build_prompt(
        goal: &str,
        tool: &ToolDefinition,
        entry_point: &str,
        feedback: Option<&str>,
    ) -> String {
        let schema = serde_json::to_string_pretty(&tool.parameters).unwrap_or_default();
        let mut prompt = format!(
            r#"Write a short Python program that fulfils this goal with the given tool.

Goal: "{goal}"

Tool module: {module}
Tool class: {class_name}
Parameter schema:
{schema}

The program must:
1. Start with a comment of the form `# params: {{...}}` holding the
   parameter values you extracted from the goal as JSON.
2. Import the class: `from {module} import {class_name}`
3. Instantiate it: `tool = {class_name}()`
4. Call `tool.execute(...)` with the extracted parameters.
5. Publish the return value: `set_result(result)`

Respond with only the program. No shell commands, no markdown prose.
"#,
            goal = goal,
            module = tool.name,
            class_name = entry_point,
            schema = schema,
        );
        if let Some(feedback) = feedback {
            prompt.push_str(&format!(
                "\nYour previous attempt was rejected. Fix these problems:\n{}\n",
                feedback
            ));
        }
        prompt
    }

    /// Pulls the `# params: {...}` comment out of the program, if present
    /// and parseable.
    fn extract_params_comment(source: &str) -> Value {
        source
            .lines()
            .find_map(|line| line.trim().strip_prefix("# params:"))
            .and_then(|raw| serde_json::from_str(raw.trim()).ok())
            .unwrap_or_else(|| Value::Object(serde_json::Map::new()))
    }
}
