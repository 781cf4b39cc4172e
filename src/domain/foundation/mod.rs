//! Foundation value objects shared across the domain.

mod errors;
mod ids;
mod rating;
mod timestamp;

pub use errors::{DomainError, ErrorCode, ValidationError};
pub use ids::{DeploymentId, ExecutionId, GoalId, VersionId};
pub use rating::Rating;
pub use timestamp::Timestamp;
