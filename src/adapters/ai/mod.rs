//! Language model adapters.

mod mock_provider;
mod ollama_provider;

pub use mock_provider::MockLanguageModel;
pub use ollama_provider::{OllamaConfig, OllamaProvider};
