//! Derived per-tool execution statistics.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::Timestamp;

/// Rollup of a tool's execution history.
///
/// Refreshed by `ExecutionStore::update_statistics`; eventually consistent
/// with the raw tool-execution rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolStatistics {
    pub tool_name: String,
    pub total_executions: i64,
    pub successful_executions: i64,
    pub failed_executions: i64,
    /// successes / total, in [0, 1].
    pub success_rate: f64,
    pub avg_duration_ms: Option<f64>,
    pub first_used: Option<Timestamp>,
    pub last_used: Option<Timestamp>,
}

impl ToolStatistics {
    /// Recomputes the aggregate from raw counts.
    pub fn from_counts(
        tool_name: impl Into<String>,
        successes: i64,
        failures: i64,
        avg_duration_ms: Option<f64>,
        first_used: Option<Timestamp>,
        last_used: Option<Timestamp>,
    ) -> Self {
        let total = successes + failures;
        let success_rate = if total > 0 {
            successes as f64 / total as f64
        } else {
            0.0
        };
        Self {
            tool_name: tool_name.into(),
            total_executions: total,
            successful_executions: successes,
            failed_executions: failures,
            success_rate,
            avg_duration_ms,
            first_used,
            last_used,
        }
    }

    /// The discovery ranking score:
    /// `success_rate * ln(total + 1) * recency_factor` where the recency
    /// factor decays linearly over a year with a floor of 0.5.
    pub fn ranking_score(&self) -> f64 {
        let recency_factor = match &self.last_used {
            Some(last) => (1.0 - last.days_ago() as f64 / 365.0).max(0.5),
            None => 0.5,
        };
        self.success_rate * ((self.total_executions + 1) as f64).ln() * recency_factor
    }

    /// Consolidation weight used when deduplicating tools:
    /// `executions * success_rate`.
    pub fn consolidation_score(&self) -> f64 {
        self.total_executions as f64 * self.success_rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_counts_computes_rate() {
        let stats = ToolStatistics::from_counts("hello_world", 9, 1, Some(20.0), None, None);
        assert_eq!(stats.total_executions, 10);
        assert!((stats.success_rate - 0.9).abs() < f64::EPSILON);
    }

    #[test]
    fn from_counts_handles_no_executions() {
        let stats = ToolStatistics::from_counts("unused", 0, 0, None, None, None);
        assert_eq!(stats.success_rate, 0.0);
        assert_eq!(stats.total_executions, 0);
    }

    #[test]
    fn totals_always_equal_successes_plus_failures() {
        let stats = ToolStatistics::from_counts("t", 7, 5, None, None, None);
        assert_eq!(
            stats.total_executions,
            stats.successful_executions + stats.failed_executions
        );
    }

    #[test]
    fn ranking_score_rewards_recent_heavy_use() {
        let recent = ToolStatistics::from_counts(
            "busy",
            99,
            1,
            None,
            None,
            Some(Timestamp::now()),
        );
        let stale = ToolStatistics::from_counts(
            "stale",
            99,
            1,
            None,
            None,
            Some(Timestamp::now().minus_days(400)),
        );
        assert!(recent.ranking_score() > stale.ranking_score());
    }

    #[test]
    fn recency_factor_floors_at_half() {
        let ancient = ToolStatistics::from_counts(
            "ancient",
            10,
            0,
            None,
            None,
            Some(Timestamp::now().minus_days(3650)),
        );
        // success_rate 1.0, ln(11) ≈ 2.398, floor 0.5
        let expected = (11.0f64).ln() * 0.5;
        assert!((ancient.ranking_score() - expected).abs() < 1e-9);
    }

    #[test]
    fn consolidation_score_weights_usage_by_reliability() {
        let a = ToolStatistics::from_counts("a", 50, 50, None, None, None);
        let b = ToolStatistics::from_counts("b", 40, 0, None, None, None);
        assert!(a.consolidation_score() > b.consolidation_score());
    }
}
