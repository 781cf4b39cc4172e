//! Generative Responder - answers goals that need no tools.

use std::sync::Arc;

use crate::ports::LanguageModel;

use super::NeuronError;

pub struct GenerativeResponder {
    model: Arc<dyn LanguageModel>,
}

impl GenerativeResponder {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self { model }
    }

    /// Produces a free-form answer to the goal.
    pub async fn respond(&self, goal: &str) -> Result<String, NeuronError> {
        let prompt = format!(
            "You are a helpful assistant. Respond to the following request \
             directly and concisely.\n\nRequest: {}",
            goal
        );
        Ok(self.model.generate(&prompt).await?)
    }
}
