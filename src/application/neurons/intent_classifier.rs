//! Intent Classifier - decides which pipeline branch a goal takes.
//!
//! Staged, cheapest first:
//! 1. pattern cache (learned patterns, no model call)
//! 2. rule-based simplifier (keyword rules, then semantic tool matching)
//! 3. model few-shot with the best cached examples
//! 4. model zero-shot
//!
//! Anything unrecognisable defaults to `generative` with a logged
//! warning: a wrong generative answer is recoverable, a wrong tool call
//! is not.

use serde_json::json;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::application::discovery::ToolDiscovery;
use crate::application::pattern_cache::PatternCache;
use crate::domain::goal::{ClassificationMethod, Intent, IntentDecision};
use crate::ports::{ChatMessage, LanguageModel};

use super::NeuronError;

/// Tunables for the classification funnel.
#[derive(Debug, Clone)]
pub struct IntentClassifierConfig {
    /// Cache similarity needed to reuse a learned decision.
    pub cache_threshold: f64,
    /// Simplifier confidence needed to skip the model.
    pub simplifier_threshold: f64,
    /// Similarity floor for few-shot examples.
    pub fewshot_min_similarity: f64,
    /// Semantic distance under which a goal counts as tool-shaped.
    pub tool_match_distance: f64,
}

impl Default for IntentClassifierConfig {
    fn default() -> Self {
        Self {
            cache_threshold: 0.80,
            simplifier_threshold: 0.80,
            fewshot_min_similarity: 0.70,
            tool_match_distance: 0.65,
        }
    }
}

/// Keyword rules for phrasings that are unambiguous without a model.
const TOOL_USE_KEYWORDS: &[&str] = &[
    "remember that",
    "store my",
    "save my",
    "recall ",
    "what did i tell you",
];

pub struct IntentClassifier {
    model: Arc<dyn LanguageModel>,
    pattern_cache: Arc<PatternCache>,
    discovery: Option<Arc<ToolDiscovery>>,
    config: IntentClassifierConfig,
}

impl IntentClassifier {
    pub fn new(
        model: Arc<dyn LanguageModel>,
        pattern_cache: Arc<PatternCache>,
        discovery: Option<Arc<ToolDiscovery>>,
        config: IntentClassifierConfig,
    ) -> Self {
        Self {
            model,
            pattern_cache,
            discovery,
            config,
        }
    }

    /// Classifies a goal. First stage to produce a confident answer wins.
    pub async fn classify(&self, goal: &str) -> Result<IntentDecision, NeuronError> {
        // Stage 1: learned patterns.
        if let Some((decision, confidence)) = self
            .pattern_cache
            .lookup(goal, self.config.cache_threshold)
            .await?
        {
            if let Some(intent) = decision.get("intent").and_then(|v| v.as_str()) {
                let intent = Intent::parse(intent);
                if intent != Intent::Unknown {
                    debug!(goal, intent = %intent, confidence, "pattern cache hit");
                    return Ok(IntentDecision::new(
                        intent,
                        confidence,
                        ClassificationMethod::PatternCache,
                    ));
                }
            }
        }

        // Stage 2: rule-based simplifier.
        if let Some(decision) = self.simplify(goal).await? {
            if decision.confidence >= self.config.simplifier_threshold {
                self.pattern_cache
                    .store(
                        goal,
                        json!({"intent": decision.intent.as_str()}),
                        decision.confidence,
                        Some(json!({"method": "keyword_simplifier"})),
                    )
                    .await?;
                return Ok(decision);
            }
        }

        // Stage 3/4: the model, few-shot when good examples exist.
        let examples = self
            .pattern_cache
            .get_similar_examples_with_queries(goal, 2, self.config.fewshot_min_similarity)
            .await?;

        let (raw, method) = if examples.is_empty() {
            (self.ask_zeroshot(goal).await?, ClassificationMethod::LlmZeroshot)
        } else {
            (
                self.ask_fewshot(goal, &examples).await?,
                ClassificationMethod::LlmFewshot,
            )
        };

        let intent = match Intent::salvage(&raw) {
            Some(intent) => intent,
            None => {
                warn!(goal, answer = %raw, "unrecognised intent answer, defaulting to generative");
                Intent::Generative
            }
        };

        self.pattern_cache
            .store(
                goal,
                json!({"intent": intent.as_str()}),
                0.75,
                Some(json!({"method": "llm_chat"})),
            )
            .await?;

        Ok(IntentDecision::new(intent, 0.75, method))
    }

    /// The rule-based stage: keyword rules first, semantic tool matching
    /// second. Returns `None` when neither applies.
    async fn simplify(&self, goal: &str) -> Result<Option<IntentDecision>, NeuronError> {
        let lowered = goal.to_lowercase();
        if TOOL_USE_KEYWORDS.iter().any(|kw| lowered.contains(kw)) {
            return Ok(Some(IntentDecision::new(
                Intent::ToolUse,
                0.90,
                ClassificationMethod::KeywordSimplifier,
            )));
        }

        let Some(discovery) = &self.discovery else {
            return Ok(None);
        };
        let candidates = discovery.semantic_search(goal, 3).await?;
        let Some(top) = candidates.first() else {
            return Ok(None);
        };

        if top.distance < self.config.tool_match_distance {
            let confidence = (1.0 - top.distance / 2.0).clamp(0.6, 0.95);
            debug!(
                goal,
                tool = %top.tool_name,
                distance = top.distance,
                "semantic simplifier matched a tool"
            );
            return Ok(Some(IntentDecision::new(
                Intent::ToolUse,
                confidence,
                ClassificationMethod::KeywordSimplifier,
            )));
        }
        Ok(None)
    }

    fn system_prompt() -> ChatMessage {
        ChatMessage::system(
            "You are an intent classifier. Classify user goals as either:\n\
             - 'generative' (creative writing, stories, poems, general knowledge)\n\
             - 'tool_use' (calculations, data retrieval, API calls, specific actions)\n\n\
             Respond with only the intent name.",
        )
    }

    async fn ask_zeroshot(&self, goal: &str) -> Result<String, NeuronError> {
        let messages = vec![Self::system_prompt(), ChatMessage::user(goal)];
        Ok(self.model.chat(&messages).await?)
    }

    async fn ask_fewshot(
        &self,
        goal: &str,
        examples: &[(String, serde_json::Value, f64)],
    ) -> Result<String, NeuronError> {
        let mut messages = vec![Self::system_prompt()];
        for (query, decision, _) in examples.iter().take(2) {
            let intent = decision
                .get("intent")
                .and_then(|v| v.as_str())
                .unwrap_or("generative");
            messages.push(ChatMessage::user(query.clone()));
            messages.push(ChatMessage::assistant(intent));
        }
        messages.push(ChatMessage::user(goal));
        Ok(self.model.chat(&messages).await?)
    }
}
