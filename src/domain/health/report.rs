//! System health reports produced by self-investigation.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::Timestamp;
use crate::domain::tooling::ToolStatistics;

/// Overall health bucket for the whole system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Warning,
    Critical,
    NoData,
}

impl HealthStatus {
    /// healthy >= 0.8, warning >= 0.6, else critical.
    pub fn from_score(score: f64) -> Self {
        if score >= 0.8 {
            HealthStatus::Healthy
        } else if score >= 0.6 {
            HealthStatus::Warning
        } else {
            HealthStatus::Critical
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Warning => "warning",
            HealthStatus::Critical => "critical",
            HealthStatus::NoData => "no_data",
        }
    }
}

/// Tools bucketed by success rate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCategories {
    /// success rate >= 0.9
    pub excellent: u32,
    /// success rate >= 0.7
    pub good: u32,
    /// success rate >= 0.5
    pub struggling: u32,
    /// success rate < 0.5
    pub failing: u32,
}

impl ToolCategories {
    /// Buckets a set of tool statistics.
    pub fn from_stats(stats: &[ToolStatistics]) -> Self {
        let mut categories = Self::default();
        for s in stats {
            if s.success_rate >= 0.9 {
                categories.excellent += 1;
            } else if s.success_rate >= 0.7 {
                categories.good += 1;
            } else if s.success_rate >= 0.5 {
                categories.struggling += 1;
            } else {
                categories.failing += 1;
            }
        }
        categories
    }

    pub fn total(&self) -> u32 {
        self.excellent + self.good + self.struggling + self.failing
    }

    /// Weighted average of bucket scores (1.0 / 0.75 / 0.5 / 0.0).
    pub fn health_score(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            return 1.0;
        }
        (self.excellent as f64 * 1.0 + self.good as f64 * 0.75 + self.struggling as f64 * 0.5)
            / total as f64
    }
}

/// Severity levels shared by issues, anomalies, and opportunities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::High => "high",
            Severity::Medium => "medium",
            Severity::Low => "low",
        }
    }
}

/// What kind of problem an issue describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    ToolFailure,
    ToolStruggling,
    HighFailureVolume,
    PerformanceIssue,
}

impl IssueKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueKind::ToolFailure => "tool_failure",
            IssueKind::ToolStruggling => "tool_struggling",
            IssueKind::HighFailureVolume => "high_failure_volume",
            IssueKind::PerformanceIssue => "performance_issue",
        }
    }
}

/// One concrete problem surfaced by an investigation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthIssue {
    pub kind: IssueKind,
    pub severity: Severity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<u64>,
    pub description: String,
}

impl HealthIssue {
    /// Deduplication key for the known-issues set: kind plus tool (or
    /// "system" for system-wide issues).
    pub fn key(&self) -> String {
        format!(
            "{}_{}",
            self.kind.as_str(),
            self.tool_name.as_deref().unwrap_or("system")
        )
    }
}

/// The full result of one health investigation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub investigation_id: String,
    pub timestamp: Timestamp,
    pub duration_ms: i64,
    pub health_score: f64,
    pub status: HealthStatus,
    pub total_tools: u32,
    pub tool_categories: ToolCategories,
    pub issues: Vec<HealthIssue>,
    pub insights: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub best_performer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub worst_performer: Option<String>,
}

impl HealthReport {
    /// Report used when no tool has executed yet.
    pub fn no_data(investigation_id: impl Into<String>, duration_ms: i64) -> Self {
        Self {
            investigation_id: investigation_id.into(),
            timestamp: Timestamp::now(),
            duration_ms,
            health_score: 1.0,
            status: HealthStatus::NoData,
            total_tools: 0,
            tool_categories: ToolCategories::default(),
            issues: Vec::new(),
            insights: vec!["No tools have been executed yet".to_string()],
            best_performer: None,
            worst_performer: None,
        }
    }

    pub fn high_severity_issues(&self) -> impl Iterator<Item = &HealthIssue> {
        self.issues
            .iter()
            .filter(|i| matches!(i.severity, Severity::High | Severity::Critical))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(name: &str, rate: f64) -> ToolStatistics {
        let total = 10i64;
        let successes = (rate * total as f64).round() as i64;
        ToolStatistics::from_counts(name, successes, total - successes, None, None, None)
    }

    #[test]
    fn status_thresholds() {
        assert_eq!(HealthStatus::from_score(0.85), HealthStatus::Healthy);
        assert_eq!(HealthStatus::from_score(0.8), HealthStatus::Healthy);
        assert_eq!(HealthStatus::from_score(0.7), HealthStatus::Warning);
        assert_eq!(HealthStatus::from_score(0.59), HealthStatus::Critical);
    }

    #[test]
    fn categories_bucket_by_success_rate() {
        let all = vec![
            stats("a", 1.0),
            stats("b", 0.8),
            stats("c", 0.5),
            stats("d", 0.2),
        ];
        let cats = ToolCategories::from_stats(&all);
        assert_eq!(cats.excellent, 1);
        assert_eq!(cats.good, 1);
        assert_eq!(cats.struggling, 1);
        assert_eq!(cats.failing, 1);
        assert_eq!(cats.total(), 4);
    }

    #[test]
    fn health_score_is_weighted_average() {
        let cats = ToolCategories {
            excellent: 2,
            good: 1,
            struggling: 1,
            failing: 0,
        };
        let expected = (2.0 + 0.75 + 0.5) / 4.0;
        assert!((cats.health_score() - expected).abs() < 1e-9);
    }

    #[test]
    fn all_failing_scores_zero() {
        let cats = ToolCategories {
            failing: 3,
            ..Default::default()
        };
        assert_eq!(cats.health_score(), 0.0);
        assert_eq!(HealthStatus::from_score(cats.health_score()), HealthStatus::Critical);
    }

    #[test]
    fn issue_key_distinguishes_tools() {
        let issue = HealthIssue {
            kind: IssueKind::ToolFailure,
            severity: Severity::High,
            tool_name: Some("strava_get_my_activities".into()),
            count: None,
            description: "failing".into(),
        };
        assert_eq!(issue.key(), "tool_failure_strava_get_my_activities");

        let system = HealthIssue {
            kind: IssueKind::HighFailureVolume,
            severity: Severity::Medium,
            tool_name: None,
            count: Some(12),
            description: "12 recent failures".into(),
        };
        assert_eq!(system.key(), "high_failure_volume_system");
    }

    #[test]
    fn no_data_report_is_healthy_but_flagged() {
        let report = HealthReport::no_data("inv-1", 3);
        assert_eq!(report.status, HealthStatus::NoData);
        assert_eq!(report.health_score, 1.0);
        assert_eq!(report.total_tools, 0);
    }
}
