//! Goal executions, intents, and feedback.

mod execution;
mod feedback;
mod intent;

pub use execution::{GoalExecution, GoalOutcome, ToolExecutionRecord};
pub use feedback::Feedback;
pub use intent::{ClassificationMethod, Intent, IntentDecision};
