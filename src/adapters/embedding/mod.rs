//! Embedding adapters. The cache and discovery share one instance so
//! their vector spaces stay consistent.

mod hash_embedder;
mod ollama_embedder;

pub use hash_embedder::HashEmbedder;
pub use ollama_embedder::{OllamaEmbedder, OllamaEmbedderConfig};
