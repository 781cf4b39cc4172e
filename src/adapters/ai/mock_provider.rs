//! Mock language model for tests.
//!
//! Scriptable responses: queue exact replies, or register substring
//! rules mapping prompts to answers. Records every request for
//! assertions.

use async_trait::async_trait;
use std::sync::Mutex;

use crate::ports::{ChatMessage, LanguageModel, ModelError};

enum Script {
    Reply(String),
    Error(ModelError),
}

#[derive(Default)]
struct Inner {
    queue: Vec<Script>,
    rules: Vec<(String, String)>,
    generate_calls: Vec<String>,
    chat_calls: Vec<Vec<ChatMessage>>,
    default_reply: Option<String>,
}

/// Scriptable in-memory language model.
///
/// Resolution order per call: queued scripts first (FIFO), then
/// substring rules, then the default reply. With nothing configured the
/// call fails, which keeps tests honest about what they exercise.
#[derive(Default)]
pub struct MockLanguageModel {
    inner: Mutex<Inner>,
}

impl MockLanguageModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues one exact reply (consumed in order).
    pub fn push_reply(&self, reply: impl Into<String>) {
        self.lock().queue.push(Script::Reply(reply.into()));
    }

    /// Queues one error (consumed in order).
    pub fn push_error(&self, error: ModelError) {
        self.lock().queue.push(Script::Error(error));
    }

    /// Registers a substring rule: prompts containing `needle` get `reply`.
    pub fn reply_when(&self, needle: impl Into<String>, reply: impl Into<String>) {
        self.lock().rules.push((needle.into(), reply.into()));
    }

    /// Sets the fallback reply for unmatched prompts.
    pub fn default_reply(&self, reply: impl Into<String>) {
        self.lock().default_reply = Some(reply.into());
    }

    /// All prompts passed to `generate` (test helper).
    pub fn generate_calls(&self) -> Vec<String> {
        self.lock().generate_calls.clone()
    }

    /// All message lists passed to `chat` (test helper).
    pub fn chat_calls(&self) -> Vec<Vec<ChatMessage>> {
        self.lock().chat_calls.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().expect("MockLanguageModel: lock poisoned")
    }

    fn resolve(&self, prompt: &str) -> Result<String, ModelError> {
        let mut inner = self.lock();
        if !inner.queue.is_empty() {
            return match inner.queue.remove(0) {
                Script::Reply(reply) => Ok(reply),
                Script::Error(error) => Err(error),
            };
        }
        for (needle, reply) in &inner.rules {
            if prompt.contains(needle.as_str()) {
                return Ok(reply.clone());
            }
        }
        inner
            .default_reply
            .clone()
            .ok_or_else(|| ModelError::unavailable("MockLanguageModel has no scripted reply"))
    }
}

#[async_trait]
impl LanguageModel for MockLanguageModel {
    async fn generate(&self, prompt: &str) -> Result<String, ModelError> {
        self.lock().generate_calls.push(prompt.to_string());
        self.resolve(prompt)
    }

    async fn chat(&self, messages: &[ChatMessage]) -> Result<String, ModelError> {
        self.lock().chat_calls.push(messages.to_vec());
        let last_user = messages
            .iter()
            .rev()
            .find(|m| m.role == crate::ports::MessageRole::User)
            .map(|m| m.content.clone())
            .unwrap_or_default();
        self.resolve(&last_user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn queued_replies_are_consumed_in_order() {
        let model = MockLanguageModel::new();
        model.push_reply("first");
        model.push_reply("second");

        assert_eq!(model.generate("x").await.unwrap(), "first");
        assert_eq!(model.generate("x").await.unwrap(), "second");
    }

    #[tokio::test]
    async fn substring_rules_match_prompts() {
        let model = MockLanguageModel::new();
        model.reply_when("classify", "tool_use");
        model.default_reply("generative");

        assert_eq!(model.generate("please classify this").await.unwrap(), "tool_use");
        assert_eq!(model.generate("anything else").await.unwrap(), "generative");
    }

    #[tokio::test]
    async fn unscripted_mock_fails_loudly() {
        let model = MockLanguageModel::new();
        assert!(model.generate("x").await.is_err());
    }

    #[tokio::test]
    async fn chat_resolves_against_last_user_message() {
        let model = MockLanguageModel::new();
        model.reply_when("Calculate", "tool_use");

        let messages = vec![
            ChatMessage::system("You are an intent classifier."),
            ChatMessage::user("Calculate 5 plus 3"),
        ];
        assert_eq!(model.chat(&messages).await.unwrap(), "tool_use");
        assert_eq!(model.chat_calls().len(), 1);
    }

    #[tokio::test]
    async fn queued_errors_surface() {
        let model = MockLanguageModel::new();
        model.push_error(ModelError::network("reset"));
        assert!(matches!(
            model.generate("x").await,
            Err(ModelError::Network(_))
        ));
    }
}
