//! Ollama embedder - Embedder implementation over the Ollama REST API.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::ports::{EmbedError, Embedder};

/// Configuration for the Ollama embedder.
#[derive(Debug, Clone)]
pub struct OllamaEmbedderConfig {
    pub base_url: String,
    /// Embedding model (e.g. "nomic-embed-text", "mxbai-embed-large").
    pub model: String,
    pub timeout: Duration,
}

impl OllamaEmbedderConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            model: "nomic-embed-text".to_string(),
            timeout: Duration::from_secs(60),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }
}

/// Embedder backed by Ollama's `/api/embeddings` endpoint.
pub struct OllamaEmbedder {
    config: OllamaEmbedderConfig,
    client: Client,
}

impl OllamaEmbedder {
    pub fn new(config: OllamaEmbedderConfig) -> Self {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .expect("Failed to create HTTP client");
        Self { config, client }
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    async fn encode(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        let request = EmbeddingsRequest {
            model: self.config.model.clone(),
            prompt: text.to_string(),
        };

        let response = self
            .client
            .post(format!("{}/api/embeddings", self.config.base_url))
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    EmbedError::network(format!("Connection failed: {}", e))
                } else {
                    EmbedError::network(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(EmbedError::unavailable(format!(
                "embeddings returned {}: {}",
                status, body
            )));
        }

        let body: EmbeddingsResponse = response
            .json()
            .await
            .map_err(|e| EmbedError::parse(format!("Invalid embeddings response: {}", e)))?;

        if body.embedding.is_empty() {
            return Err(EmbedError::parse("empty embedding vector"));
        }
        Ok(body.embedding)
    }
}

#[derive(Debug, Serialize)]
struct EmbeddingsRequest {
    model: String,
    prompt: String,
}

#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    embedding: Vec<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults_to_nomic_embed_text() {
        let config = OllamaEmbedderConfig::new("http://localhost:11434");
        assert_eq!(config.model, "nomic-embed-text");
    }

    #[test]
    fn config_builder_overrides_model() {
        let config =
            OllamaEmbedderConfig::new("http://localhost:11434").with_model("mxbai-embed-large");
        assert_eq!(config.model, "mxbai-embed-large");
    }
}
