//! Deterministic hash-based embedder for tests.
//!
//! Produces stable vectors with useful geometry: texts sharing tokens get
//! higher cosine similarity, identical texts get identical vectors. Not a
//! semantic model; good enough to exercise cache and discovery logic
//! deterministically.

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::ports::{EmbedError, Embedder};

/// Bag-of-hashed-tokens embedder.
pub struct HashEmbedder {
    dimensions: usize,
}

impl HashEmbedder {
    /// Creates an embedder producing vectors of the given dimension.
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }

    fn token_index(&self, token: &str) -> usize {
        let digest = Sha256::digest(token.as_bytes());
        let mut value = 0usize;
        for byte in digest.iter().take(8) {
            value = (value << 8) | *byte as usize;
        }
        value % self.dimensions
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    async fn encode(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        let mut vector = vec![0.0f32; self.dimensions];
        for token in text
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            vector[self.token_index(token)] += 1.0;
        }
        // Normalise so cosine similarity behaves like the real thing.
        let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        Ok(vector)
    }
}
