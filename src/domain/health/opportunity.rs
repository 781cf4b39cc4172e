//! Improvement opportunities and A/B validation outcomes.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::Timestamp;

use super::Severity;

/// Why a tool was flagged for improvement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpportunityKind {
    HighFailure,
    Degradation,
    Performance,
}

/// Lifecycle of an opportunity through the improvement cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpportunityStatus {
    Detected,
    Analyzing,
    Improving,
    Testing,
    Deployed,
    Rejected,
}

/// Snapshot of the metrics that justified the opportunity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OpportunityMetrics {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub success_rate: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_duration_ms: Option<f64>,
    pub total_executions: i64,
}

/// A detected case where a tool's metrics merit an improvement attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImprovementOpportunity {
    pub tool_name: String,
    pub kind: OpportunityKind,
    pub severity: Severity,
    pub metrics: OpportunityMetrics,
    pub evidence: Vec<String>,
    pub recommended_fixes: Vec<String>,
    pub status: OpportunityStatus,
    pub detected_at: Timestamp,
}

impl ImprovementOpportunity {
    pub fn new(
        tool_name: impl Into<String>,
        kind: OpportunityKind,
        severity: Severity,
        metrics: OpportunityMetrics,
        evidence: Vec<String>,
        recommended_fixes: Vec<String>,
    ) -> Self {
        Self {
            tool_name: tool_name.into(),
            kind,
            severity,
            metrics,
            evidence,
            recommended_fixes,
            status: OpportunityStatus::Detected,
            detected_at: Timestamp::now(),
        }
    }

    pub fn is_actionable(&self) -> bool {
        matches!(self.severity, Severity::Critical | Severity::High)
    }
}

/// Metrics for one side of an A/B comparison.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AbMetrics {
    pub success_rate: f64,
    pub avg_duration_ms: f64,
}

/// Recommendation that falls out of an A/B validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AbRecommendation {
    Deploy,
    ContinueTesting,
    Rollback,
}

/// Result of validating a candidate improvement against the old version.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AbTestOutcome {
    pub tool_name: String,
    pub old_metrics: AbMetrics,
    pub new_metrics: AbMetrics,
    pub sample_size: i64,
    pub improvement_detected: bool,
    pub confidence: f64,
    pub recommendation: AbRecommendation,
}

impl AbTestOutcome {
    /// Evaluates the comparison. An improvement requires at least a five
    /// point success-rate gain; confidence is a step function of sample
    /// size (>=100: 0.95, >=50: 0.85, >=20: 0.70, else 0.50).
    pub fn evaluate(
        tool_name: impl Into<String>,
        old_metrics: AbMetrics,
        new_metrics: AbMetrics,
        sample_size: i64,
    ) -> Self {
        let improvement_detected = new_metrics.success_rate > old_metrics.success_rate + 0.05;
        let confidence = if sample_size >= 100 {
            0.95
        } else if sample_size >= 50 {
            0.85
        } else if sample_size >= 20 {
            0.70
        } else {
            0.50
        };
        let recommendation = if improvement_detected && confidence > 0.80 {
            AbRecommendation::Deploy
        } else if !improvement_detected && confidence > 0.80 {
            AbRecommendation::Rollback
        } else {
            AbRecommendation::ContinueTesting
        };
        Self {
            tool_name: tool_name.into(),
            old_metrics,
            new_metrics,
            sample_size,
            improvement_detected,
            confidence,
            recommendation,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics(rate: f64) -> AbMetrics {
        AbMetrics {
            success_rate: rate,
            avg_duration_ms: 100.0,
        }
    }

    #[test]
    fn large_sample_with_gain_recommends_deploy() {
        let outcome = AbTestOutcome::evaluate("t", metrics(0.6), metrics(0.8), 120);
        assert!(outcome.improvement_detected);
        assert_eq!(outcome.confidence, 0.95);
        assert_eq!(outcome.recommendation, AbRecommendation::Deploy);
    }

    #[test]
    fn large_sample_without_gain_recommends_rollback() {
        let outcome = AbTestOutcome::evaluate("t", metrics(0.8), metrics(0.8), 120);
        assert!(!outcome.improvement_detected);
        assert_eq!(outcome.recommendation, AbRecommendation::Rollback);
    }

    #[test]
    fn marginal_gain_is_not_an_improvement() {
        let outcome = AbTestOutcome::evaluate("t", metrics(0.80), metrics(0.84), 120);
        assert!(!outcome.improvement_detected);
    }

    #[test]
    fn small_sample_keeps_testing() {
        let outcome = AbTestOutcome::evaluate("t", metrics(0.5), metrics(0.9), 10);
        assert_eq!(outcome.confidence, 0.50);
        assert_eq!(outcome.recommendation, AbRecommendation::ContinueTesting);
    }

    #[test]
    fn confidence_steps_with_sample_size() {
        for (n, c) in [(150, 0.95), (60, 0.85), (25, 0.70), (5, 0.50)] {
            let outcome = AbTestOutcome::evaluate("t", metrics(0.5), metrics(0.9), n);
            assert_eq!(outcome.confidence, c);
        }
    }

    #[test]
    fn only_critical_and_high_are_actionable() {
        let mut opp = ImprovementOpportunity::new(
            "t",
            OpportunityKind::HighFailure,
            Severity::Critical,
            OpportunityMetrics::default(),
            vec![],
            vec![],
        );
        assert!(opp.is_actionable());
        opp.severity = Severity::Medium;
        assert!(!opp.is_actionable());
    }
}
