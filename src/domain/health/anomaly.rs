//! Anomalies and degradation findings.

use serde::{Deserialize, Serialize};

use super::Severity;

/// Kind of behavioural anomaly detected against the rolling baseline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyKind {
    HealthDegradation,
    FailureSpike,
    NewFailure,
}

/// A deviation from expected system behaviour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anomaly {
    pub kind: AnomalyKind,
    pub severity: Severity,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub baseline: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delta: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<u64>,
}

impl Anomaly {
    /// Health dropped from baseline: medium above 0.10, high above 0.20.
    pub fn health_degradation(baseline: f64, current: f64) -> Option<Self> {
        let delta = baseline - current;
        let severity = if delta > 0.2 {
            Severity::High
        } else if delta > 0.1 {
            Severity::Medium
        } else {
            return None;
        };
        Some(Self {
            kind: AnomalyKind::HealthDegradation,
            severity,
            description: format!(
                "System health dropped {:.1}% from baseline",
                delta * 100.0
            ),
            tool_name: None,
            baseline: Some(baseline),
            current: Some(current),
            delta: Some(delta),
            count: None,
        })
    }

    pub fn failure_spike(count: u64) -> Self {
        Self {
            kind: AnomalyKind::FailureSpike,
            severity: Severity::High,
            description: format!("Unusual spike in failures: {} recent failures", count),
            tool_name: None,
            baseline: None,
            current: None,
            delta: None,
            count: Some(count),
        }
    }

    pub fn new_failure(tool_name: impl Into<String>) -> Self {
        let tool_name = tool_name.into();
        Self {
            kind: AnomalyKind::NewFailure,
            severity: Severity::High,
            description: format!("New tool failure detected: {}", tool_name),
            tool_name: Some(tool_name),
            baseline: None,
            current: None,
            delta: None,
            count: None,
        }
    }
}

/// A tool whose recent success rate trails its history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DegradingTool {
    pub tool_name: String,
    pub recent_success_rate: f64,
    pub historical_success_rate: f64,
    pub severity: Severity,
    pub indicators: Vec<String>,
}

impl DegradingTool {
    /// Flags a decline; severity is high below 50% recent success.
    pub fn detect(
        tool_name: impl Into<String>,
        recent_success_rate: f64,
        historical_success_rate: f64,
    ) -> Option<Self> {
        if recent_success_rate >= historical_success_rate {
            return None;
        }
        let severity = if recent_success_rate < 0.5 {
            Severity::High
        } else {
            Severity::Medium
        };
        Some(Self {
            tool_name: tool_name.into(),
            recent_success_rate,
            historical_success_rate,
            severity,
            indicators: vec![format!(
                "Success rate declined from {:.0}% to {:.0}%",
                historical_success_rate * 100.0,
                recent_success_rate * 100.0
            )],
        })
    }
}
