//! Tool Discovery - the funnel that keeps the model's decision context
//! bounded as the catalogue grows.
//!
//! Stage 1 narrows thousands of tools to ~20 by embedding distance.
//! Stage 2 ranks those by execution statistics down to ~5. Stage 3 (the
//! actual choice) belongs to the tool selector neuron; discovery never
//! calls the model.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::domain::patterns::cosine_similarity;
use crate::ports::{EmbedError, Embedder, ExecutionStore, StoreError};

use super::registry::ToolRegistry;

/// Similarity at which two tools count as candidate duplicates.
pub const DUPLICATE_THRESHOLD: f64 = 0.90;
/// Similarity at which a pair is flagged a likely duplicate.
const LIKELY_DUPLICATE_THRESHOLD: f64 = 0.95;

/// Discovery errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum DiscoveryError {
    #[error("embedding failed: {0}")]
    Embed(#[from] EmbedError),

    #[error("statistics unavailable: {0}")]
    Store(#[from] StoreError),
}

/// A stage-1 candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SemanticCandidate {
    pub tool_name: String,
    /// Cosine distance: 0 identical, 2 opposite.
    pub distance: f64,
    pub description: String,
}

/// A stage-2 ranked tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedTool {
    pub tool_name: String,
    pub score: f64,
    pub success_rate: Option<f64>,
    pub executions: i64,
    pub distance: f64,
    pub description: String,
}

/// Health of the semantic index relative to the registry.
#[derive(Debug, Clone, Serialize)]
pub struct IndexStats {
    pub indexed_tools: usize,
    pub registry_tools: usize,
    pub not_indexed: Vec<String>,
    pub stale_indexed: Vec<String>,
}

/// One candidate duplicate pair with a consolidation recommendation.
#[derive(Debug, Clone, Serialize)]
pub struct DuplicatePair {
    pub tool_a: String,
    pub tool_b: String,
    pub similarity: f64,
    pub is_likely_duplicate: bool,
    pub recommendation: ConsolidationRecommendation,
}

/// Which of two duplicates to keep.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConsolidationRecommendation {
    pub keep: String,
    pub deprecate: String,
    pub reason: String,
}

struct IndexEntry {
    embedding: Vec<f32>,
    description: String,
}

/// Embedding index over tool documents plus statistical ranking.
pub struct ToolDiscovery {
    registry: Arc<ToolRegistry>,
    execution_store: Arc<dyn ExecutionStore>,
    embedder: Arc<dyn Embedder>,
    index: RwLock<HashMap<String, IndexEntry>>,
}

impl ToolDiscovery {
    pub fn new(
        registry: Arc<ToolRegistry>,
        execution_store: Arc<dyn ExecutionStore>,
        embedder: Arc<dyn Embedder>,
    ) -> Self {
        Self {
            registry,
            execution_store,
            embedder,
            index: RwLock::new(HashMap::new()),
        }
    }

    /// (Re)indexes every tool in the registry. Upserts; existing entries
    /// for still-present tools are overwritten.
    pub async fn index_all_tools(&self) -> Result<usize, DiscoveryError> {
        let definitions = self.registry.definitions();
        let mut index = self.index.write().await;
        for definition in &definitions {
            let embedding = self.embedder.encode(&definition.searchable_document()).await?;
            index.insert(
                definition.name.clone(),
                IndexEntry {
                    embedding,
                    description: definition.description.clone(),
                },
            );
        }
        info!(tools = definitions.len(), "indexed tools for discovery");
        Ok(definitions.len())
    }

    /// Indexes or refreshes a single tool.
    pub async fn reindex_tool(&self, tool_name: &str) -> Result<bool, DiscoveryError> {
        let Some(tool) = self.registry.get(tool_name) else {
            return Ok(false);
        };
        let definition = tool.definition();
        let embedding = self.embedder.encode(&definition.searchable_document()).await?;
        self.index.write().await.insert(
            definition.name.clone(),
            IndexEntry {
                embedding,
                description: definition.description,
            },
        );
        Ok(true)
    }

    /// Drops a tool from the index.
    pub async fn remove_tool_from_index(&self, tool_name: &str) -> bool {
        self.index.write().await.remove(tool_name).is_some()
    }

    /// Stage 1: the `n` closest tools by cosine distance. Indexes lazily
    /// on first use.
    pub async fn semantic_search(
        &self,
        goal_text: &str,
        n: usize,
    ) -> Result<Vec<SemanticCandidate>, DiscoveryError> {
        if n == 0 {
            return Ok(Vec::new());
        }
        if self.index.read().await.is_empty() {
            self.index_all_tools().await?;
        }

        let query = self.embedder.encode(goal_text).await?;
        let index = self.index.read().await;
        let mut candidates: Vec<SemanticCandidate> = index
            .iter()
            .map(|(name, entry)| SemanticCandidate {
                tool_name: name.clone(),
                distance: 1.0 - cosine_similarity(&query, &entry.embedding),
                description: entry.description.clone(),
            })
            .collect();
        candidates.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        candidates.truncate(n);
        Ok(candidates)
    }

    /// Stage 2: ranks candidates by
    /// `success_rate * ln(total + 1) * recency_factor`; tools without
    /// statistics get a neutral 0.5. Ties break on lower distance.
    pub async fn statistical_ranking(
        &self,
        candidates: Vec<SemanticCandidate>,
        limit: usize,
    ) -> Result<Vec<RankedTool>, DiscoveryError> {
        let mut ranked = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            let stats = self
                .execution_store
                .get_tool_statistics(&candidate.tool_name)
                .await?;
            let (score, success_rate, executions) = match stats {
                Some(stats) => (
                    stats.ranking_score(),
                    Some(stats.success_rate),
                    stats.total_executions,
                ),
                None => (0.5, None, 0),
            };
            ranked.push(RankedTool {
                tool_name: candidate.tool_name,
                score,
                success_rate,
                executions,
                distance: candidate.distance,
                description: candidate.description,
            });
        }
        ranked.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(
                    a.distance
                        .partial_cmp(&b.distance)
                        .unwrap_or(std::cmp::Ordering::Equal),
                )
        });
        ranked.truncate(limit);
        Ok(ranked)
    }

    /// Stages 1 and 2 chained.
    pub async fn discover_tools(
        &self,
        goal_text: &str,
        semantic_limit: usize,
        ranking_limit: usize,
    ) -> Result<Vec<RankedTool>, DiscoveryError> {
        let candidates = self.semantic_search(goal_text, semantic_limit).await?;
        if candidates.is_empty() {
            return Ok(Vec::new());
        }
        self.statistical_ranking(candidates, ranking_limit).await
    }

    /// Compares the index against the registry.
    pub async fn index_stats(&self) -> IndexStats {
        let index = self.index.read().await;
        let indexed: Vec<String> = index.keys().cloned().collect();
        let registry_names = self.registry.names();

        let not_indexed = registry_names
            .iter()
            .filter(|n| !index.contains_key(*n))
            .cloned()
            .collect();
        let stale_indexed = indexed
            .iter()
            .filter(|n| !registry_names.contains(n))
            .cloned()
            .collect();

        IndexStats {
            indexed_tools: indexed.len(),
            registry_tools: registry_names.len(),
            not_indexed,
            stale_indexed,
        }
    }

    /// Reconciles the index with the registry: adds missing entries and
    /// removes stale ones.
    pub async fn sync(&self) -> Result<IndexStats, DiscoveryError> {
        let stats = self.index_stats().await;
        if !stats.not_indexed.is_empty() {
            debug!(missing = stats.not_indexed.len(), "indexing missing tools");
            self.index_all_tools().await?;
        }
        for stale in &stats.stale_indexed {
            self.remove_tool_from_index(stale).await;
        }
        Ok(self.index_stats().await)
    }

    /// Tools semantically similar to the given one (potential duplicates),
    /// sorted by similarity.
    pub async fn find_similar_tools(
        &self,
        tool_name: &str,
        threshold: f64,
        limit: usize,
    ) -> Result<Vec<(String, f64)>, DiscoveryError> {
        if self.index.read().await.is_empty() {
            self.index_all_tools().await?;
        }
        let index = self.index.read().await;
        let Some(reference) = index.get(tool_name) else {
            return Ok(Vec::new());
        };

        let mut similar: Vec<(String, f64)> = index
            .iter()
            .filter(|(name, _)| name.as_str() != tool_name)
            .map(|(name, entry)| {
                (
                    name.clone(),
                    cosine_similarity(&reference.embedding, &entry.embedding),
                )
            })
            .filter(|(_, similarity)| *similarity >= threshold)
            .collect();
        similar.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        similar.truncate(limit);
        Ok(similar)
    }

    /// Scans the whole catalogue for candidate duplicate pairs.
    pub async fn find_all_duplicates(
        &self,
        threshold: f64,
    ) -> Result<Vec<DuplicatePair>, DiscoveryError> {
        let mut pairs = Vec::new();
        let mut seen: std::collections::HashSet<(String, String)> = Default::default();

        for tool_name in self.registry.names() {
            for (other, similarity) in
                self.find_similar_tools(&tool_name, threshold, 20).await?
            {
                let key = if tool_name < other {
                    (tool_name.clone(), other.clone())
                } else {
                    (other.clone(), tool_name.clone())
                };
                if !seen.insert(key.clone()) {
                    continue;
                }
                let recommendation = self.consolidation_recommendation(&key.0, &key.1).await?;
                pairs.push(DuplicatePair {
                    tool_a: key.0,
                    tool_b: key.1,
                    similarity,
                    is_likely_duplicate: similarity >= LIKELY_DUPLICATE_THRESHOLD,
                    recommendation,
                });
            }
        }
        pairs.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        Ok(pairs)
    }

    /// Scores each side as `executions * success_rate` and keeps the
    /// clearly better one; execution count then alphabetical order break
    /// ties.
    async fn consolidation_recommendation(
        &self,
        tool_a: &str,
        tool_b: &str,
    ) -> Result<ConsolidationRecommendation, DiscoveryError> {
        let stats_a = self.execution_store.get_tool_statistics(tool_a).await?;
        let stats_b = self.execution_store.get_tool_statistics(tool_b).await?;

        let execs_a = stats_a.as_ref().map_or(0, |s| s.total_executions);
        let execs_b = stats_b.as_ref().map_or(0, |s| s.total_executions);
        let score_a = execs_a as f64 * stats_a.as_ref().map_or(0.5, |s| s.success_rate);
        let score_b = execs_b as f64 * stats_b.as_ref().map_or(0.5, |s| s.success_rate);

        let (keep, deprecate, reason) = if score_a > score_b * 1.2 {
            (
                tool_a,
                tool_b,
                format!("{} has better usage and reliability", tool_a),
            )
        } else if score_b > score_a * 1.2 {
            (
                tool_b,
                tool_a,
                format!("{} has better usage and reliability", tool_b),
            )
        } else if execs_a > execs_b {
            (
                tool_a,
                tool_b,
                format!(
                    "{} is used more frequently ({} vs {} executions)",
                    tool_a, execs_a, execs_b
                ),
            )
        } else if execs_b > execs_a {
            (
                tool_b,
                tool_a,
                format!(
                    "{} is used more frequently ({} vs {} executions)",
                    tool_b, execs_b, execs_a
                ),
            )
        } else {
            let (keep, deprecate) = if tool_a < tool_b {
                (tool_a, tool_b)
            } else {
                (tool_b, tool_a)
            };
            (keep, deprecate, "Usage is similar, alphabetical selection".to_string())
        };

        Ok(ConsolidationRecommendation {
            keep: keep.to_string(),
            deprecate: deprecate.to_string(),
            reason,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::embedding::HashEmbedder;
    use crate::adapters::storage::InMemoryExecutionStore;
    use crate::domain::foundation::GoalId;
    use crate::domain::goal::{GoalExecution, ToolExecutionRecord};
    use crate::domain::tooling::{ParameterSpec, SemanticTags, ToolDefinition};
    use crate::ports::{Tool, ToolError};
    use async_trait::async_trait;
    use serde_json::{json, Value};

    struct FakeTool(ToolDefinition);

    #[async_trait]
    impl Tool for FakeTool {
        fn definition(&self) -> ToolDefinition {
            self.0.clone()
        }

        async fn execute(&self, _params: &Value) -> Result<Value, ToolError> {
            Ok(json!({}))
        }
    }

    fn tool(name: &str, description: &str, domain: &str) -> Arc<dyn Tool> {
        Arc::new(FakeTool(
            ToolDefinition::new(name, description)
                .with_parameter("limit", ParameterSpec::new("number", "max results"))
                .with_tags(SemanticTags {
                    domain: Some(domain.into()),
                    ..Default::default()
                }),
        ))
    }

    fn fitness_registry() -> Arc<ToolRegistry> {
        let mut tools: Vec<Arc<dyn Tool>> = vec![tool(
            "strava_get_my_activities",
            "Fetch the athlete's recent strava activities runs and rides",
            "fitness",
        )];
        for i in 0..20 {
            tools.push(tool(
                &format!("filler_tool_{}", i),
                &format!("unrelated bookkeeping helper number {}", i),
                "misc",
            ));
        }
        Arc::new(ToolRegistry::with_tools(tools))
    }

    async fn discovery_with(
        registry: Arc<ToolRegistry>,
    ) -> (Arc<InMemoryExecutionStore>, ToolDiscovery) {
        let store = Arc::new(InMemoryExecutionStore::new());
        let discovery = ToolDiscovery::new(
            registry,
            store.clone(),
            Arc::new(HashEmbedder::default()),
        );
        discovery.index_all_tools().await.unwrap();
        (store, discovery)
    }

    #[tokio::test]
    async fn discover_bounds_results_and_finds_the_obvious_tool() {
        let (_store, discovery) = discovery_with(fitness_registry()).await;

        let ranked = discovery
            .discover_tools("Get my Strava activities", 10, 5)
            .await
            .unwrap();

        assert!(ranked.len() <= 5);
        assert!(ranked
            .iter()
            .any(|t| t.tool_name == "strava_get_my_activities"));
    }

    #[tokio::test]
    async fn semantic_search_orders_by_distance() {
        let (_store, discovery) = discovery_with(fitness_registry()).await;
        let candidates = discovery
            .semantic_search("fetch my strava activities and runs", 3)
            .await
            .unwrap();
        assert_eq!(candidates.len(), 3);
        assert!(candidates[0].distance <= candidates[1].distance);
        assert_eq!(candidates[0].tool_name, "strava_get_my_activities");
    }

    #[tokio::test]
    async fn tools_without_statistics_get_neutral_score() {
        let (_store, discovery) = discovery_with(fitness_registry()).await;
        let candidates = discovery.semantic_search("anything", 2).await.unwrap();
        let ranked = discovery.statistical_ranking(candidates, 2).await.unwrap();
        for tool in ranked {
            assert_eq!(tool.score, 0.5);
            assert!(tool.success_rate.is_none());
        }
    }

    #[tokio::test]
    async fn ranking_prefers_proven_tools() {
        let registry = Arc::new(ToolRegistry::with_tools(vec![
            tool("proven", "does the thing reliably", "misc"),
            tool("flaky", "does the thing unreliably", "misc"),
        ]));
        let (store, discovery) = discovery_with(registry).await;

        let execution = GoalExecution::started(GoalId::new(), "the thing");
        store.store_execution(&execution).await.unwrap();
        for _ in 0..10 {
            store
                .store_tool_execution(&ToolExecutionRecord::succeeded(
                    execution.execution_id,
                    "proven",
                    json!({}),
                    json!({}),
                    5,
                ))
                .await
                .unwrap();
            store
                .store_tool_execution(&ToolExecutionRecord::failed(
                    execution.execution_id,
                    "flaky",
                    json!({}),
                    "boom",
                    5,
                ))
                .await
                .unwrap();
        }
        store.update_statistics().await.unwrap();

        let candidates = discovery.semantic_search("does the thing", 2).await.unwrap();
        let ranked = discovery.statistical_ranking(candidates, 2).await.unwrap();
        assert_eq!(ranked[0].tool_name, "proven");
        assert!(ranked[0].score > ranked[1].score);
    }

    #[tokio::test]
    async fn sync_removes_stale_entries() {
        let registry = Arc::new(ToolRegistry::with_tools(vec![tool(
            "kept",
            "a tool that stays",
            "misc",
        )]));
        let store = Arc::new(InMemoryExecutionStore::new());
        let discovery = ToolDiscovery::new(
            registry,
            store,
            Arc::new(HashEmbedder::default()),
        );
        discovery.index_all_tools().await.unwrap();

        // Simulate a stale entry left over from a removed tool.
        discovery.index.write().await.insert(
            "removed".to_string(),
            IndexEntry {
                embedding: vec![0.0; 8],
                description: String::new(),
            },
        );

        let stats = discovery.sync().await.unwrap();
        assert_eq!(stats.stale_indexed.len(), 0);
        assert_eq!(stats.indexed_tools, 1);
    }

    #[tokio::test]
    async fn near_identical_tools_are_flagged_as_duplicates() {
        let registry = Arc::new(ToolRegistry::with_tools(vec![
            tool("memory_store", "Store a value under a key in memory", "memory"),
            tool("memory_save", "Store a value under a key in memory", "memory"),
            tool("weather", "Fetch tomorrow's weather forecast", "weather"),
        ]));
        let (_store, discovery) = discovery_with(registry).await;

        let pairs = discovery.find_all_duplicates(0.9).await.unwrap();
        assert_eq!(pairs.len(), 1);
        let pair = &pairs[0];
        assert!(pair.is_likely_duplicate);
        // Equal usage: alphabetical keep.
        assert_eq!(pair.recommendation.keep, "memory_save");
        assert_eq!(pair.recommendation.deprecate, "memory_store");
    }
}
