//! Content-addressed tool version history.

mod diff;
mod version;

pub use diff::{detect_breaking_changes, unified_diff, VersionDiff};
pub use version::{
    CreatedBy, ImprovementType, NewToolVersion, RollbackCheck, RollbackTrigger, ToolVersion,
    VersionDeployment, VersionMetricsUpdate,
};
