//! Pattern Cache - embedding-keyed memoisation of past decisions.
//!
//! Repeated "what is this goal asking for?" questions become similarity
//! lookups instead of model calls. The cache learns from validated
//! executions (`store_after_execution`) and persists itself to a single
//! JSON file.
//!
//! Writes are serialised behind an async RwLock; reads are concurrent.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::domain::foundation::Timestamp;
use crate::domain::patterns::{
    adjusted_confidence, cosine_similarity, ranking_weight, PatternEntry,
};
use crate::ports::{EmbedError, Embedder};

/// Similarity at which a new query is considered a duplicate of an
/// existing entry and merged instead of stored.
const DEDUPE_THRESHOLD: f64 = 0.90;

/// Pattern cache errors.
#[derive(Debug, Clone, Error)]
pub enum CacheError {
    #[error("embedding failed: {0}")]
    Embed(#[from] EmbedError),

    #[error("cache persistence failed: {0}")]
    Persistence(String),
}

/// Raw counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheCounters {
    pub lookups: u64,
    pub hits: u64,
    pub misses: u64,
    pub stores: u64,
}

/// Counters plus derived figures, as reported to operators.
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub lookups: u64,
    pub hits: u64,
    pub misses: u64,
    pub stores: u64,
    pub hit_rate: f64,
    pub pattern_count: usize,
    pub cache_size_bytes: u64,
}

#[derive(Default)]
struct State {
    patterns: Vec<PatternEntry>,
    counters: CacheCounters,
}

#[derive(Serialize, Deserialize)]
struct PersistedCache {
    patterns: Vec<Value>,
    #[serde(default)]
    stats: CacheCounters,
}

/// Embedding-indexed store of (query -> decision) patterns.
pub struct PatternCache {
    embedder: Arc<dyn Embedder>,
    cache_file: PathBuf,
    state: RwLock<State>,
}

impl PatternCache {
    /// Creates an empty cache (no disk load).
    pub fn new(embedder: Arc<dyn Embedder>, cache_file: impl Into<PathBuf>) -> Self {
        Self {
            embedder,
            cache_file: cache_file.into(),
            state: RwLock::new(State::default()),
        }
    }

    /// Creates a cache and loads persisted patterns. Entries whose payload
    /// cannot be parsed are discarded with a logged count.
    pub async fn load(embedder: Arc<dyn Embedder>, cache_file: impl Into<PathBuf>) -> Self {
        let cache = Self::new(embedder, cache_file);
        cache.load_from_disk().await;
        cache
    }

    async fn load_from_disk(&self) {
        let raw = match tokio::fs::read_to_string(&self.cache_file).await {
            Ok(raw) if !raw.trim().is_empty() => raw,
            _ => {
                debug!(file = %self.cache_file.display(), "pattern cache initialized empty");
                return;
            }
        };

        let persisted: PersistedCache = match serde_json::from_str(&raw) {
            Ok(persisted) => persisted,
            Err(e) => {
                warn!(error = %e, "failed to parse pattern cache file, starting empty");
                return;
            }
        };

        let total = persisted.patterns.len();
        let mut patterns = Vec::with_capacity(total);
        for value in persisted.patterns {
            match serde_json::from_value::<PatternEntry>(value) {
                Ok(entry) => patterns.push(entry),
                Err(_) => {}
            }
        }
        let dropped = total - patterns.len();
        if dropped > 0 {
            warn!(dropped, "discarded unparseable pattern cache entries");
        }
        debug!(loaded = patterns.len(), "loaded pattern cache");

        let mut state = self.state.write().await;
        state.patterns = patterns;
        state.counters = persisted.stats;
    }

    async fn save_to_disk(&self, state: &State) -> Result<(), CacheError> {
        if let Some(parent) = self.cache_file.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| CacheError::Persistence(format!("create cache dir: {}", e)))?;
        }
        let persisted = PersistedCache {
            patterns: state
                .patterns
                .iter()
                .filter_map(|p| serde_json::to_value(p).ok())
                .collect(),
            stats: state.counters,
        };
        let payload = serde_json::to_string_pretty(&persisted)
            .map_err(|e| CacheError::Persistence(format!("encode cache: {}", e)))?;
        tokio::fs::write(&self.cache_file, payload)
            .await
            .map_err(|e| CacheError::Persistence(format!("write cache: {}", e)))?;
        Ok(())
    }

    /// Finds the best matching servable pattern above `threshold`.
    /// Returns the decision and the usage-adjusted confidence; increments
    /// the entry's usage count.
    pub async fn lookup(
        &self,
        query: &str,
        threshold: f64,
    ) -> Result<Option<(Value, f64)>, CacheError> {
        {
            let mut state = self.state.write().await;
            state.counters.lookups += 1;
            if state.patterns.is_empty() {
                state.counters.misses += 1;
                return Ok(None);
            }
        }

        let query_embedding = self.embedder.encode(query).await?;

        let mut state = self.state.write().await;
        let mut best: Option<(usize, f64)> = None;
        for (index, pattern) in state.patterns.iter().enumerate() {
            if !pattern.is_servable() {
                continue;
            }
            let similarity =
                cosine_similarity(&query_embedding, &pattern.embedding) * pattern.lookup_boost();
            if similarity >= threshold && best.map_or(true, |(_, s)| similarity > s) {
                best = Some((index, similarity));
            }
        }

        match best {
            Some((index, _)) => {
                state.counters.hits += 1;
                let entry = &mut state.patterns[index];
                let confidence = adjusted_confidence(entry.confidence, entry.usage_count);
                entry.usage_count += 1;
                let decision = entry.decision.clone();
                Ok(Some((decision, confidence)))
            }
            None => {
                state.counters.misses += 1;
                Ok(None)
            }
        }
    }

    /// Stores a pattern. A query within `DEDUPE_THRESHOLD` of an existing
    /// entry updates that entry in place (max confidence, usage bump,
    /// metadata replacement) instead of creating a new one.
    pub async fn store(
        &self,
        query: &str,
        decision: Value,
        confidence: f64,
        metadata: Option<Value>,
    ) -> Result<(), CacheError> {
        self.store_entry(query, decision, confidence, metadata, None)
            .await
    }

    /// The preferred write path: only successful executions are cached,
    /// tagged `execution_validated`.
    pub async fn store_after_execution(
        &self,
        query: &str,
        decision: Value,
        execution_success: bool,
        confidence: f64,
        metadata: Option<Value>,
    ) -> Result<(), CacheError> {
        if !execution_success {
            debug!(query, "skipping cache store, execution failed");
            return Ok(());
        }
        self.store_entry(query, decision, confidence, metadata, Some(true))
            .await
    }

    async fn store_entry(
        &self,
        query: &str,
        decision: Value,
        confidence: f64,
        metadata: Option<Value>,
        validated_success: Option<bool>,
    ) -> Result<(), CacheError> {
        let embedding = self.embedder.encode(query).await?;

        let mut state = self.state.write().await;
        state.counters.stores += 1;

        let duplicate = state
            .patterns
            .iter_mut()
            .map(|p| {
                let similarity = cosine_similarity(&embedding, &p.embedding);
                (p, similarity)
            })
            .filter(|(_, s)| *s >= DEDUPE_THRESHOLD)
            .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));

        if let Some((existing, _)) = duplicate {
            existing.confidence = existing.confidence.max(confidence);
            existing.usage_count += 1;
            existing.last_updated = Timestamp::now();
            if let Some(metadata) = metadata {
                existing.metadata = metadata;
            }
            if let Some(success) = validated_success {
                existing.execution_validated = true;
                existing.execution_success = Some(success);
            }
        } else {
            let mut entry = PatternEntry::new(
                query,
                embedding,
                decision,
                confidence,
                metadata.unwrap_or_else(|| Value::Object(serde_json::Map::new())),
            );
            if let Some(success) = validated_success {
                entry = entry.validated(success);
            }
            state.patterns.push(entry);
        }

        self.save_to_disk(&state).await
    }

    /// The `k` most similar patterns above `min_similarity`, ranked by
    /// `similarity * (1 + 0.1 * usage_count)`. Returns
    /// `(similarity, decision, confidence, usage_count)` tuples.
    pub async fn get_similar_examples(
        &self,
        query: &str,
        k: usize,
        min_similarity: f64,
    ) -> Result<Vec<(f64, Value, f64, u32)>, CacheError> {
        let query_embedding = self.embedder.encode(query).await?;
        let state = self.state.read().await;

        let mut scored: Vec<(f64, Value, f64, u32)> = state
            .patterns
            .iter()
            .filter_map(|p| {
                let similarity = cosine_similarity(&query_embedding, &p.embedding);
                (similarity >= min_similarity).then(|| {
                    (similarity, p.decision.clone(), p.confidence, p.usage_count)
                })
            })
            .collect();
        scored.sort_by(|a, b| {
            ranking_weight(b.0, b.3)
                .partial_cmp(&ranking_weight(a.0, a.3))
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(k);
        Ok(scored)
    }

    /// Like `get_similar_examples` but keeps the original query text, for
    /// building few-shot user/assistant message pairs. Returns
    /// `(query, decision, similarity)` tuples.
    pub async fn get_similar_examples_with_queries(
        &self,
        query: &str,
        k: usize,
        min_similarity: f64,
    ) -> Result<Vec<(String, Value, f64)>, CacheError> {
        let query_embedding = self.embedder.encode(query).await?;
        let state = self.state.read().await;

        let mut scored: Vec<(String, Value, f64, u32)> = state
            .patterns
            .iter()
            .filter_map(|p| {
                let similarity = cosine_similarity(&query_embedding, &p.embedding);
                (similarity >= min_similarity).then(|| {
                    (p.query.clone(), p.decision.clone(), similarity, p.usage_count)
                })
            })
            .collect();
        scored.sort_by(|a, b| {
            ranking_weight(b.2, b.3)
                .partial_cmp(&ranking_weight(a.2, a.3))
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(k);
        Ok(scored.into_iter().map(|(q, d, s, _)| (q, d, s)).collect())
    }

    /// Drops every pattern and resets counters.
    pub async fn clear(&self) -> Result<(), CacheError> {
        let mut state = self.state.write().await;
        state.patterns.clear();
        state.counters = CacheCounters::default();
        self.save_to_disk(&state).await
    }

    /// Current statistics.
    pub async fn stats(&self) -> CacheStats {
        let state = self.state.read().await;
        let counters = state.counters;
        let cache_size_bytes = tokio::fs::metadata(&self.cache_file)
            .await
            .map(|m| m.len())
            .unwrap_or(0);
        CacheStats {
            lookups: counters.lookups,
            hits: counters.hits,
            misses: counters.misses,
            stores: counters.stores,
            hit_rate: counters.hits as f64 / counters.lookups.max(1) as f64,
            pattern_count: state.patterns.len(),
            cache_size_bytes,
        }
    }

    /// Number of stored patterns (test helper).
    pub async fn pattern_count(&self) -> usize {
        self.state.read().await.patterns.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::embedding::HashEmbedder;
    use serde_json::json;
    use tempfile::TempDir;

    fn cache_in(dir: &TempDir) -> PatternCache {
        PatternCache::new(
            Arc::new(HashEmbedder::default()),
            dir.path().join("pattern_cache.json"),
        )
    }

    #[tokio::test]
    async fn lookup_on_empty_cache_misses() {
        let dir = TempDir::new().unwrap();
        let cache = cache_in(&dir);
        assert!(cache.lookup("anything", 0.8).await.unwrap().is_none());
        let stats = cache.stats().await;
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hit_rate, 0.0);
    }

    #[tokio::test]
    async fn store_then_lookup_same_query_hits() {
        let dir = TempDir::new().unwrap();
        let cache = cache_in(&dir);
        cache
            .store_after_execution(
                "Calculate 5 plus 3",
                json!({"intent": "tool_use"}),
                true,
                0.9,
                None,
            )
            .await
            .unwrap();

        let (decision, confidence) = cache
            .lookup("Calculate 5 plus 3", 0.85)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(decision["intent"], "tool_use");
        assert!(confidence >= 0.80);
    }

    #[tokio::test]
    async fn failed_executions_are_never_cached() {
        let dir = TempDir::new().unwrap();
        let cache = cache_in(&dir);
        cache
            .store_after_execution(
                "Fetch the doomed endpoint",
                json!({"intent": "tool_use"}),
                false,
                0.9,
                None,
            )
            .await
            .unwrap();

        assert_eq!(cache.pattern_count().await, 0);
        assert!(cache
            .lookup("Fetch the doomed endpoint", 0.5)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn near_duplicates_merge_instead_of_accumulating() {
        let dir = TempDir::new().unwrap();
        let cache = cache_in(&dir);
        cache
            .store("Calculate 5 plus 3", json!({"intent": "tool_use"}), 0.7, None)
            .await
            .unwrap();
        cache
            .store("Calculate 5 plus 3", json!({"intent": "tool_use"}), 0.9, None)
            .await
            .unwrap();

        assert_eq!(cache.pattern_count().await, 1);
        let (_, confidence) = cache
            .lookup("Calculate 5 plus 3", 0.8)
            .await
            .unwrap()
            .unwrap();
        // Merged entry keeps the max confidence plus its usage boost.
        assert!(confidence >= 0.9);
    }

    #[tokio::test]
    async fn usage_boost_grows_with_hits() {
        let dir = TempDir::new().unwrap();
        let cache = cache_in(&dir);
        cache
            .store("remember my name", json!({"intent": "tool_use"}), 0.8, None)
            .await
            .unwrap();

        let (_, first) = cache.lookup("remember my name", 0.8).await.unwrap().unwrap();
        let (_, second) = cache.lookup("remember my name", 0.8).await.unwrap().unwrap();
        assert!(second > first);
    }

    #[tokio::test]
    async fn cache_persists_across_instances() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("pattern_cache.json");
        {
            let cache = PatternCache::new(Arc::new(HashEmbedder::default()), &file);
            cache
                .store("tell me a joke", json!({"intent": "generative"}), 0.8, None)
                .await
                .unwrap();
        }

        let reloaded = PatternCache::load(Arc::new(HashEmbedder::default()), &file).await;
        assert_eq!(reloaded.pattern_count().await, 1);
        let (decision, _) = reloaded.lookup("tell me a joke", 0.8).await.unwrap().unwrap();
        assert_eq!(decision["intent"], "generative");
    }

    #[tokio::test]
    async fn unparseable_entries_are_dropped_on_load() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("pattern_cache.json");
        let payload = json!({
            "patterns": [
                {"query": "broken entry with no fields"},
                {
                    "query": "valid",
                    "embedding": [0.1, 0.2],
                    "decision": {"intent": "generative"},
                    "confidence": 0.8,
                    "usage_count": 1,
                    "created_at": "2026-01-01T00:00:00Z",
                    "last_updated": "2026-01-01T00:00:00Z",
                    "metadata": {}
                }
            ],
            "stats": {"lookups": 0, "hits": 0, "misses": 0, "stores": 1}
        });
        tokio::fs::write(&file, payload.to_string()).await.unwrap();

        let cache = PatternCache::load(Arc::new(HashEmbedder::default()), &file).await;
        assert_eq!(cache.pattern_count().await, 1);
    }

    #[tokio::test]
    async fn similar_examples_respect_floor_and_k() {
        let dir = TempDir::new().unwrap();
        let cache = cache_in(&dir);
        cache
            .store("Calculate 10 plus 20", json!({"intent": "tool_use"}), 0.9, None)
            .await
            .unwrap();
        cache
            .store("write a haiku about rust", json!({"intent": "generative"}), 0.8, None)
            .await
            .unwrap();

        let examples = cache
            .get_similar_examples_with_queries("Calculate 7 plus 9", 2, 0.4)
            .await
            .unwrap();
        assert!(examples.len() <= 2);
        if let Some((query, decision, similarity)) = examples.first() {
            assert!(query.contains("Calculate"));
            assert_eq!(decision["intent"], "tool_use");
            assert!(*similarity >= 0.4);
        }
    }

    #[tokio::test]
    async fn clear_resets_everything() {
        let dir = TempDir::new().unwrap();
        let cache = cache_in(&dir);
        cache
            .store("a query", json!({"intent": "generative"}), 0.8, None)
            .await
            .unwrap();
        cache.clear().await.unwrap();
        assert_eq!(cache.pattern_count().await, 0);
        assert_eq!(cache.stats().await.stores, 0);
    }
}
