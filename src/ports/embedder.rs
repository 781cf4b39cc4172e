//! Embedder Port - deterministic text-to-vector encoding.
//!
//! The pattern cache and tool discovery share a single embedder instance
//! so their vector spaces stay consistent.

use async_trait::async_trait;
use thiserror::Error;

/// Embedding service errors.
#[derive(Debug, Clone, Error)]
pub enum EmbedError {
    #[error("embedding service unavailable: {0}")]
    Unavailable(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("parse error: {0}")]
    Parse(String),
}

impl EmbedError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable(message.into())
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::Network(message.into())
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse(message.into())
    }
}

/// Port over the embedding model. `encode` must be deterministic for a
/// given input so cached vectors stay comparable.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn encode(&self, text: &str) -> Result<Vec<f32>, EmbedError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn embedder_trait_is_send_sync() {
        fn assert_send_sync<T: Send + Sync + ?Sized>() {}
        assert_send_sync::<dyn Embedder>();
    }
}
