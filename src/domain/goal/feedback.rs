//! User feedback on a goal execution.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{ExecutionId, Rating, Timestamp, ValidationError};

/// At most one feedback row per execution; the rating is range-checked
/// at construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Feedback {
    pub execution_id: ExecutionId,
    pub rating: Rating,
    pub text: Option<String>,
    pub created_at: Timestamp,
}

impl Feedback {
    /// Creates feedback, validating the raw rating value.
    pub fn new(
        execution_id: ExecutionId,
        rating: u8,
        text: Option<String>,
    ) -> Result<Self, ValidationError> {
        Ok(Self {
            execution_id,
            rating: Rating::new(rating)?,
            text,
            created_at: Timestamp::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feedback_accepts_valid_rating() {
        let fb = Feedback::new(ExecutionId::new(), 4, Some("helpful".into())).unwrap();
        assert_eq!(fb.rating.value(), 4);
    }

    #[test]
    fn feedback_rejects_invalid_rating() {
        assert!(Feedback::new(ExecutionId::new(), 0, None).is_err());
        assert!(Feedback::new(ExecutionId::new(), 7, None).is_err());
    }
}
