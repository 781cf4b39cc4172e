//! A single cached (query -> decision) pattern.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::foundation::Timestamp;

/// A learned pattern: an embedded query and the decision it led to.
///
/// The decision payload is opaque to the cache. Entries validated by a
/// real execution carry `execution_validated = true` and remember whether
/// that execution succeeded; validated failures are never served.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternEntry {
    pub query: String,
    pub embedding: Vec<f32>,
    pub decision: Value,
    pub confidence: f64,
    pub usage_count: u32,
    pub created_at: Timestamp,
    pub last_updated: Timestamp,
    #[serde(default)]
    pub metadata: Value,
    #[serde(default)]
    pub execution_validated: bool,
    #[serde(default)]
    pub execution_success: Option<bool>,
}

impl PatternEntry {
    /// Creates a fresh, unvalidated entry.
    pub fn new(
        query: impl Into<String>,
        embedding: Vec<f32>,
        decision: Value,
        confidence: f64,
        metadata: Value,
    ) -> Self {
        let now = Timestamp::now();
        Self {
            query: query.into(),
            embedding,
            decision,
            confidence,
            usage_count: 1,
            created_at: now,
            last_updated: now,
            metadata,
            execution_validated: false,
            execution_success: None,
        }
    }

    /// Marks the entry as validated by a finished execution.
    pub fn validated(mut self, success: bool) -> Self {
        self.execution_validated = true;
        self.execution_success = Some(success);
        self
    }

    /// Entries validated by a failed execution must never be served.
    pub fn is_servable(&self) -> bool {
        !(self.execution_validated && self.execution_success == Some(false))
    }

    /// Similarity boost: validated successes score 10% higher at lookup.
    pub fn lookup_boost(&self) -> f64 {
        if self.execution_validated && self.execution_success == Some(true) {
            1.1
        } else {
            1.0
        }
    }
}
