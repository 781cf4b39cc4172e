//! Tool Forge - produces complete replacement tool sources.
//!
//! Used by autonomous improvement (and operator-driven tool creation),
//! never by the request pipeline. Given a description and, when
//! improving, the current source plus a failure analysis, it asks the
//! model for a full source file and validates the result structurally.

use std::sync::Arc;

use crate::adapters::tools::extract_entry_point;
use crate::ports::{strip_code_fences, LanguageModel};

use super::NeuronError;

/// What the forge is asked to build.
#[derive(Debug, Clone)]
pub struct ForgeRequest {
    /// Tool name the source must keep.
    pub tool_name: String,
    /// Natural-language description of what the tool must do.
    pub description: String,
    /// Current source, present when improving an existing tool.
    pub current_source: Option<String>,
    /// Summary of observed failure patterns, present when improving.
    pub failure_analysis: Option<String>,
}

/// A forged source file with its validation verdict.
#[derive(Debug, Clone)]
pub struct ForgeResult {
    pub tool_name: String,
    pub code: String,
    pub entry_point: String,
    pub valid: bool,
    pub validation_errors: Vec<String>,
}

pub struct ToolForge {
    model: Arc<dyn LanguageModel>,
}

impl ToolForge {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self { model }
    }

    /// Forges a replacement source for the request.
    pub async fn forge(&self, request: &ForgeRequest) -> Result<ForgeResult, NeuronError> {
        let prompt = Self::build_prompt(request);
        let answer = self.model.generate(&prompt).await?;
        let code = strip_code_fences(&answer);

        let entry_point = extract_entry_point(&code).ok_or_else(|| {
            NeuronError::ForgeInvalid(format!(
                "no class definition found for tool '{}'",
                request.tool_name
            ))
        })?;

        let mut validation_errors = Vec::new();
        if !code.contains("def execute") {
            validation_errors.push("missing execute entry point".to_string());
        }
        if code.trim().is_empty() {
            validation_errors.push("empty source".to_string());
        }

        Ok(ForgeResult {
            tool_name: request.tool_name.clone(),
            valid: validation_errors.is_empty(),
            entry_point,
            code,
            validation_errors,
        })
    }

    fn build_prompt(request: &ForgeRequest) -> String {
        let mut prompt = format!(
            r#"Write a complete Python tool source file.

Tool name: {name}
Purpose: {description}

Requirements:
- Define exactly one class whose name ends in "Tool".
- The class exposes `def execute(self, ...)` returning a JSON-serialisable value.
- Keep the same tool name and, when improving, the same execute signature.
- Handle errors with specific exceptions and actionable messages.
- Validate inputs before doing work.
"#,
            name = request.tool_name,
            description = request.description,
        );

        if let Some(source) = &request.current_source {
            prompt.push_str(&format!("\nCurrent source:\n```python\n{}\n```\n", source));
        }
        if let Some(analysis) = &request.failure_analysis {
            prompt.push_str(&format!(
                "\nObserved failure patterns to fix:\n{}\n",
                analysis
            ));
        }
        prompt.push_str("\nRespond with only the source file.");
        prompt
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::ai::MockLanguageModel;

    fn request() -> ForgeRequest {
        ForgeRequest {
            tool_name: "hello_world".to_string(),
            description: "Return a friendly greeting".to_string(),
            current_source: None,
            failure_analysis: None,
        }
    }

    #[tokio::test]
    async fn forge_extracts_entry_point() {
        let model = Arc::new(MockLanguageModel::new());
        model.default_reply(
            "```python\nclass HelloWorldTool:\n    def execute(self):\n        return {\"message\": \"hi\"}\n```",
        );
        let forge = ToolForge::new(model);

        let result = forge.forge(&request()).await.unwrap();
        assert!(result.valid);
        assert_eq!(result.entry_point, "HelloWorldTool");
        assert!(!result.code.contains("```"));
    }

    #[tokio::test]
    async fn source_without_a_class_is_rejected() {
        let model = Arc::new(MockLanguageModel::new());
        model.default_reply("def execute():\n    return 1\n");
        let forge = ToolForge::new(model);

        let err = forge.forge(&request()).await.unwrap_err();
        assert!(matches!(err, NeuronError::ForgeInvalid(_)));
    }

    #[tokio::test]
    async fn missing_execute_fails_validation() {
        let model = Arc::new(MockLanguageModel::new());
        model.default_reply("class HelloWorldTool:\n    pass\n");
        let forge = ToolForge::new(model);

        let result = forge.forge(&request()).await.unwrap();
        assert!(!result.valid);
        assert!(result
            .validation_errors
            .iter()
            .any(|e| e.contains("execute")));
    }

    #[tokio::test]
    async fn improvement_context_reaches_the_prompt() {
        let model = Arc::new(MockLanguageModel::new());
        model.default_reply("class HelloWorldTool:\n    def execute(self):\n        return 1\n");
        let forge = ToolForge::new(model.clone());

        let mut req = request();
        req.current_source = Some("class HelloWorldTool: ...".to_string());
        req.failure_analysis = Some("TypeError on missing argument (4 times)".to_string());
        forge.forge(&req).await.unwrap();

        let prompt = &model.generate_calls()[0];
        assert!(prompt.contains("Current source"));
        assert!(prompt.contains("TypeError on missing argument"));
    }
}
