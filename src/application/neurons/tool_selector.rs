//! Tool Selector - picks the tool that will serve a goal.
//!
//! Prefers the discovery short list so the model only ever sees a
//! handful of candidates; falls back to the full registry when discovery
//! produced nothing. The chosen name must exist in the registry.

use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::debug;

use crate::application::discovery::RankedTool;
use crate::application::pattern_cache::PatternCache;
use crate::application::registry::ToolRegistry;
use crate::ports::LanguageModel;

use super::NeuronError;

/// How the selection was reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionMethod {
    PatternCache,
    LlmShortlist,
    LlmFullRegistry,
}

/// The structured output of the selector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSelection {
    pub selected_tools: Vec<String>,
    pub method: SelectionMethod,
    pub confidence: f64,
    pub candidates_considered: usize,
}

impl ToolSelection {
    /// The primary choice.
    pub fn primary(&self) -> Option<&str> {
        self.selected_tools.first().map(|s| s.as_str())
    }
}

pub struct ToolSelector {
    model: Arc<dyn LanguageModel>,
    registry: Arc<ToolRegistry>,
    pattern_cache: Arc<PatternCache>,
    cache_threshold: f64,
}

impl ToolSelector {
    pub fn new(
        model: Arc<dyn LanguageModel>,
        registry: Arc<ToolRegistry>,
        pattern_cache: Arc<PatternCache>,
        cache_threshold: f64,
    ) -> Self {
        Self {
            model,
            registry,
            pattern_cache,
            cache_threshold,
        }
    }

    /// Selects a tool for the goal. `shortlist` comes from discovery;
    /// `exclusions` lists tools already tried by error recovery.
    pub async fn select(
        &self,
        goal: &str,
        shortlist: Option<&[RankedTool]>,
        exclusions: &[String],
    ) -> Result<ToolSelection, NeuronError> {
        // Stage 1: learned selections (skipped when excluding, since a
        // cached choice may be exactly the tool that just failed).
        if exclusions.is_empty() {
            if let Some((decision, confidence)) =
                self.pattern_cache.lookup(goal, self.cache_threshold).await?
            {
                if let Some(name) = decision.get("tool").and_then(|v| v.as_str()) {
                    if self.registry.contains(name) {
                        debug!(goal, tool = name, "selector pattern cache hit");
                        return Ok(ToolSelection {
                            selected_tools: vec![name.to_string()],
                            method: SelectionMethod::PatternCache,
                            confidence,
                            candidates_considered: 1,
                        });
                    }
                }
            }
        }

        // Stage 2: ask the model over the short list or the registry.
        let (candidates, method) = match shortlist {
            Some(shortlist) if !shortlist.is_empty() => (
                shortlist
                    .iter()
                    .map(|t| (t.tool_name.clone(), t.description.clone()))
                    .collect::<Vec<_>>(),
                SelectionMethod::LlmShortlist,
            ),
            _ => (
                self.registry
                    .definitions()
                    .into_iter()
                    .map(|d| (d.name, d.description))
                    .collect(),
                SelectionMethod::LlmFullRegistry,
            ),
        };

        let candidates: Vec<(String, String)> = candidates
            .into_iter()
            .filter(|(name, _)| !exclusions.contains(name))
            .collect();
        if candidates.is_empty() {
            return Err(NeuronError::NoToolsAvailable);
        }

        let prompt = Self::build_prompt(goal, &candidates);
        let answer = self.model.generate(&prompt).await?;

        // Stage 3: validate the answer against the candidates by word
        // match, longest names first so "memory_write_v2" never loses to
        // "memory_write".
        let mut names: Vec<&String> = candidates.iter().map(|(n, _)| n).collect();
        names.sort_by_key(|n| std::cmp::Reverse(n.len()));
        let chosen = names
            .iter()
            .find(|name| Self::mentions(&answer, name))
            .map(|n| n.to_string());

        let Some(chosen) = chosen else {
            return Err(NeuronError::UnknownTool {
                name: answer.trim().chars().take(80).collect(),
                considered: candidates.len(),
            });
        };
        if !self.registry.contains(&chosen) {
            return Err(NeuronError::UnknownTool {
                name: chosen,
                considered: candidates.len(),
            });
        }

        self.pattern_cache
            .store(
                goal,
                json!({"tool": chosen.clone()}),
                0.75,
                Some(json!({"method": "llm"})),
            )
            .await?;

        Ok(ToolSelection {
            selected_tools: vec![chosen],
            method,
            confidence: 0.75,
            candidates_considered: candidates.len(),
        })
    }

    fn build_prompt(goal: &str, candidates: &[(String, String)]) -> String {
        let mut prompt = format!(
            "Select the single best tool for this goal.\n\nGoal: \"{}\"\n\nTools:\n",
            goal
        );
        for (name, description) in candidates {
            prompt.push_str(&format!("- {}: {}\n", name, description));
        }
        prompt.push_str("\nAnswer with only the tool name.");
        prompt
    }

    /// Word-boundary containment check.
    fn mentions(answer: &str, name: &str) -> bool {
        answer.match_indices(name).any(|(start, _)| {
            let before_ok = start == 0
                || !answer[..start]
                    .chars()
                    .next_back()
                    .is_some_and(|c| c.is_alphanumeric() || c == '_');
            let end = start + name.len();
            let after_ok = end == answer.len()
                || !answer[end..]
                    .chars()
                    .next()
                    .is_some_and(|c| c.is_alphanumeric() || c == '_');
            before_ok && after_ok
        })
    }
}
