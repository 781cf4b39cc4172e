//! Health reports, anomalies, and improvement opportunities.

mod anomaly;
mod opportunity;
mod report;

pub use anomaly::{Anomaly, AnomalyKind, DegradingTool};
pub use opportunity::{
    AbMetrics, AbRecommendation, AbTestOutcome, ImprovementOpportunity, OpportunityKind,
    OpportunityMetrics, OpportunityStatus,
};
pub use report::{
    HealthIssue, HealthReport, HealthStatus, IssueKind, Severity, ToolCategories,
};
