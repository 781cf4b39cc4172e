//! Language-model and embedding endpoint configuration.

use serde::Deserialize;

use super::error::ConfigValidationError;

/// Model endpoints the engine consumes as opaque services.
#[derive(Debug, Clone, Deserialize)]
pub struct AiConfig {
    /// Language-model endpoint (Ollama-compatible REST API).
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Worker model used by the neurons.
    #[serde(default = "default_model")]
    pub model: String,
    /// Context window enforced by the prompt guard.
    #[serde(default = "default_token_limit")]
    pub token_limit: usize,
    /// Embedding endpoint; defaults to the model endpoint.
    #[serde(default)]
    pub embedding_endpoint: Option<String>,
    /// Embedding model id.
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
}

fn default_endpoint() -> String {
    "http://localhost:11434".to_string()
}

fn default_model() -> String {
    "mistral".to_string()
}

fn default_token_limit() -> usize {
    4096
}

fn default_embedding_model() -> String {
    "nomic-embed-text".to_string()
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            model: default_model(),
            token_limit: default_token_limit(),
            embedding_endpoint: None,
            embedding_model: default_embedding_model(),
        }
    }
}

impl AiConfig {
    /// Endpoint the embedder talks to.
    pub fn embedding_endpoint(&self) -> &str {
        self.embedding_endpoint.as_deref().unwrap_or(&self.endpoint)
    }

    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if !self.endpoint.starts_with("http") {
            return Err(ConfigValidationError::invalid(
                "ai.endpoint",
                "must be an http(s) URL",
            ));
        }
        if self.token_limit == 0 {
            return Err(ConfigValidationError::invalid(
                "ai.token_limit",
                "must be positive",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedding_endpoint_falls_back_to_model_endpoint() {
        let config = AiConfig::default();
        assert_eq!(config.embedding_endpoint(), "http://localhost:11434");

        let custom = AiConfig {
            embedding_endpoint: Some("http://embedder:8080".to_string()),
            ..Default::default()
        };
        assert_eq!(custom.embedding_endpoint(), "http://embedder:8080");
    }

    #[test]
    fn non_http_endpoint_fails_validation() {
        let config = AiConfig {
            endpoint: "ollama:11434".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
