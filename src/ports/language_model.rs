//! Language Model Port - the opaque generate/chat RPC the neurons consume.
//!
//! The engine never parses provider-specific payloads outside the adapter;
//! neurons see plain strings and do their own JSON extraction.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Role of a chat message author.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

/// A message in a chat exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(MessageRole::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, content)
    }
}

/// Language model errors.
#[derive(Debug, Clone, Error)]
pub enum ModelError {
    /// The prompt-length guard rejected the request before the call.
    #[error("prompt too long: estimated {estimated} tokens exceeds {limit} limit")]
    TokenLimitExceeded { estimated: usize, limit: usize },

    /// The endpoint is unreachable or returned a server error.
    #[error("model unavailable: {0}")]
    Unavailable(String),

    /// Network failure during the request.
    #[error("network error: {0}")]
    Network(String),

    /// The provider response could not be decoded.
    #[error("parse error: {0}")]
    Parse(String),

    /// The request exceeded its deadline.
    #[error("model request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },
}

impl ModelError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable(message.into())
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::Network(message.into())
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse(message.into())
    }

    /// Whether retrying the same request may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ModelError::Unavailable(_) | ModelError::Network(_) | ModelError::Timeout { .. }
        )
    }
}

/// Port over the embedded language model service.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Single-prompt completion.
    async fn generate(&self, prompt: &str) -> Result<String, ModelError>;

    /// Multi-turn chat completion; returns the assistant's reply text.
    async fn chat(&self, messages: &[ChatMessage]) -> Result<String, ModelError>;
}

/// Strips markdown code fences from a model answer, returning the inner
/// text. Small models habitually wrap JSON and code in fences.
pub fn strip_code_fences(raw: &str) -> String {
    let trimmed = raw.trim();
    for marker in ["```json", "```python", "```"] {
        if let Some(start) = trimmed.find(marker) {
            let rest = &trimmed[start + marker.len()..];
            if let Some(end) = rest.find("```") {
                return rest[..end].trim().to_string();
            }
            return rest.trim().to_string();
        }
    }
    trimmed.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_constructors_set_roles() {
        assert_eq!(ChatMessage::system("s").role, MessageRole::System);
        assert_eq!(ChatMessage::user("u").role, MessageRole::User);
        assert_eq!(ChatMessage::assistant("a").role, MessageRole::Assistant);
    }

    #[test]
    fn role_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&MessageRole::Assistant).unwrap(),
            "\"assistant\""
        );
    }

    #[test]
    fn retryable_classification() {
        assert!(ModelError::unavailable("down").is_retryable());
        assert!(ModelError::network("reset").is_retryable());
        assert!(ModelError::Timeout { timeout_secs: 30 }.is_retryable());
        assert!(!ModelError::parse("bad json").is_retryable());
        assert!(!ModelError::TokenLimitExceeded {
            estimated: 9000,
            limit: 4096
        }
        .is_retryable());
    }

    #[test]
    fn strip_code_fences_unwraps_json_blocks() {
        let raw = "Here you go:\n```json\n{\"intent\": \"tool_use\"}\n```";
        assert_eq!(strip_code_fences(raw), "{\"intent\": \"tool_use\"}");
    }

    #[test]
    fn strip_code_fences_unwraps_bare_blocks() {
        let raw = "```\nresult = 1\n```";
        assert_eq!(strip_code_fences(raw), "result = 1");
    }

    #[test]
    fn strip_code_fences_passes_plain_text_through() {
        assert_eq!(strip_code_fences("  tool_use  "), "tool_use");
    }

    #[test]
    fn strip_code_fences_handles_unterminated_fence() {
        let raw = "```python\nsandbox.set_result(1)";
        assert_eq!(strip_code_fences(raw), "sandbox.set_result(1)");
    }
}
