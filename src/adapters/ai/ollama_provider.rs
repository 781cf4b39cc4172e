//! Ollama Provider - LanguageModel implementation over the Ollama REST API.
//!
//! Non-streaming generate/chat calls with a conservative prompt-length
//! guard that fails fast before the request leaves the process.
//!
//! # Configuration
//!
//! ```ignore
//! let config = OllamaConfig::new("http://localhost:11434")
//!     .with_model("mistral")
//!     .with_token_limit(4096);
//!
//! let provider = OllamaProvider::new(config);
//! ```

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::sleep;

use crate::ports::{ChatMessage, LanguageModel, MessageRole, ModelError};

/// Configuration for the Ollama provider.
#[derive(Debug, Clone)]
pub struct OllamaConfig {
    /// Base URL of the Ollama endpoint.
    pub base_url: String,
    /// Model to use (e.g. "mistral", "llama3").
    pub model: String,
    /// Request timeout.
    pub timeout: Duration,
    /// Context window, in tokens, enforced by the prompt guard.
    pub token_limit: usize,
    /// Maximum retries on transient failures.
    pub max_retries: u32,
}

impl OllamaConfig {
    /// Creates a new configuration for the given endpoint.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            model: "mistral".to_string(),
            timeout: Duration::from_secs(120),
            token_limit: 4096,
            max_retries: 3,
        }
    }

    /// Sets the model to use.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Sets the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the token limit for the prompt guard.
    pub fn with_token_limit(mut self, limit: usize) -> Self {
        self.token_limit = limit;
        self
    }

    /// Sets the maximum retry count.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }
}

/// Ollama REST API provider.
pub struct OllamaProvider {
    config: OllamaConfig,
    client: Client,
}

impl OllamaProvider {
    /// Creates a new provider with the given configuration.
    pub fn new(config: OllamaConfig) -> Self {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .expect("Failed to create HTTP client");
        Self { config, client }
    }

    /// Conservative token estimate: roughly 3 characters per token, so
    /// overcounting is more likely than undercounting.
    fn estimate_tokens(text: &str) -> usize {
        text.len() / 3
    }

    /// Fails fast before the call when the prompt cannot fit.
    fn guard_prompt(&self, text: &str) -> Result<(), ModelError> {
        let estimated = Self::estimate_tokens(text);
        if estimated > self.config.token_limit {
            return Err(ModelError::TokenLimitExceeded {
                estimated,
                limit: self.config.token_limit,
            });
        }
        Ok(())
    }

    fn map_request_error(&self, e: reqwest::Error) -> ModelError {
        if e.is_timeout() {
            ModelError::Timeout {
                timeout_secs: self.config.timeout.as_secs(),
            }
        } else if e.is_connect() {
            ModelError::network(format!("Connection failed: {}", e))
        } else {
            ModelError::network(e.to_string())
        }
    }

    fn role_str(role: MessageRole) -> &'static str {
        match role {
            MessageRole::System => "system",
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
        }
    }
}

impl OllamaProvider {
    async fn generate_once(&self, request: &GenerateRequest) -> Result<String, ModelError> {
        let response = self
            .client
            .post(format!("{}/api/generate", self.config.base_url))
            .json(request)
            .send()
            .await
            .map_err(|e| self.map_request_error(e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ModelError::unavailable(format!(
                "generate returned {}: {}",
                status, body
            )));
        }

        let body: GenerateResponse = response
            .json()
            .await
            .map_err(|e| ModelError::parse(format!("Invalid generate response: {}", e)))?;
        Ok(body.response)
    }

    async fn chat_once(&self, request: &ChatRequest) -> Result<String, ModelError> {
        let response = self
            .client
            .post(format!("{}/api/chat", self.config.base_url))
            .json(request)
            .send()
            .await
            .map_err(|e| self.map_request_error(e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ModelError::unavailable(format!(
                "chat returned {}: {}",
                status, body
            )));
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| ModelError::parse(format!("Invalid chat response: {}", e)))?;
        Ok(body.message.content)
    }

}

#[async_trait]
impl LanguageModel for OllamaProvider {
    async fn generate(&self, prompt: &str) -> Result<String, ModelError> {
        self.guard_prompt(prompt)?;

        let request = GenerateRequest {
            model: self.config.model.clone(),
            prompt: prompt.to_string(),
            stream: false,
        };

        let mut attempt = 0;
        loop {
            match self.generate_once(&request).await {
                Ok(text) => return Ok(text),
                Err(e) if e.is_retryable() && attempt < self.config.max_retries => {
                    attempt += 1;
                    sleep(Duration::from_millis(250 * attempt as u64)).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn chat(&self, messages: &[ChatMessage]) -> Result<String, ModelError> {
        let combined_len: usize = messages.iter().map(|m| m.content.len()).sum();
        self.guard_prompt(&"x".repeat(combined_len))?;

        let request = ChatRequest {
            model: self.config.model.clone(),
            messages: messages
                .iter()
                .map(|m| WireMessage {
                    role: Self::role_str(m.role).to_string(),
                    content: m.content.clone(),
                })
                .collect(),
            stream: false,
        };

        let mut attempt = 0;
        loop {
            match self.chat_once(&request).await {
                Ok(text) => return Ok(text),
                Err(e) if e.is_retryable() && attempt < self.config.max_retries => {
                    attempt += 1;
                    sleep(Duration::from_millis(250 * attempt as u64)).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════
// Wire types
// ════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Serialize)]
struct GenerateRequest {
    model: String,
    prompt: String,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<WireMessage>,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: ChatResponseMessage,
}
