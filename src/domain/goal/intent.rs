//! Goal intent classification.

use serde::{Deserialize, Serialize};

/// Coarse classification of a goal controlling the pipeline branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    /// Conversational or creative request answered directly by the model.
    Generative,
    /// Request that needs an external tool (data, computation, storage).
    ToolUse,
    /// Classification failed or has not happened yet.
    Unknown,
}

impl Intent {
    /// Stable string form used in storage and prompts.
    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::Generative => "generative",
            Intent::ToolUse => "tool_use",
            Intent::Unknown => "unknown",
        }
    }

    /// Parses a stored string form; anything unrecognised is `Unknown`.
    pub fn parse(s: &str) -> Self {
        match s {
            "generative" => Intent::Generative,
            "tool_use" => Intent::ToolUse,
            _ => Intent::Unknown,
        }
    }

    /// Salvages a free-form model answer into an intent, if possible.
    ///
    /// Small models sometimes answer with prose ("this is a tool use
    /// request"); accept the answer when the intent name is recognisable.
    pub fn salvage(raw: &str) -> Option<Self> {
        let normalized = raw.trim().to_lowercase();
        match normalized.as_str() {
            "generative" => return Some(Intent::Generative),
            "tool_use" => return Some(Intent::ToolUse),
            _ => {}
        }
        if normalized.contains("tool") {
            Some(Intent::ToolUse)
        } else if normalized.contains("gen") || normalized.contains("creative") {
            Some(Intent::Generative)
        } else {
            None
        }
    }
}

impl std::fmt::Display for Intent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How a classification decision was reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationMethod {
    PatternCache,
    KeywordSimplifier,
    LlmFewshot,
    LlmZeroshot,
    DomainOverride,
}

/// The structured output of the intent classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentDecision {
    pub intent: Intent,
    pub confidence: f64,
    pub method: ClassificationMethod,
}

impl IntentDecision {
    pub fn new(intent: Intent, confidence: f64, method: ClassificationMethod) -> Self {
        Self {
            intent,
            confidence,
            method,
        }
    }
}
