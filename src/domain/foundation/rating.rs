//! User feedback rating value object.

use serde::{Deserialize, Serialize};

use super::ValidationError;

/// A 1-5 user rating of a goal execution.
///
/// Construction enforces the range; a stored rating is always valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Rating(u8);

impl Rating {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 5;

    /// Creates a rating, rejecting values outside 1-5.
    pub fn new(value: u8) -> Result<Self, ValidationError> {
        if !(Self::MIN..=Self::MAX).contains(&value) {
            return Err(ValidationError::out_of_range(
                "rating",
                Self::MIN as i32,
                Self::MAX as i32,
                value as i32,
            ));
        }
        Ok(Self(value))
    }

    /// Returns the numeric rating.
    pub fn value(&self) -> u8 {
        self.0
    }
}

impl std::fmt::Display for Rating {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_full_range() {
        for v in 1..=5 {
            assert_eq!(Rating::new(v).unwrap().value(), v);
        }
    }

    #[test]
    fn rejects_zero_and_six() {
        assert!(Rating::new(0).is_err());
        assert!(Rating::new(6).is_err());
    }

    #[test]
    fn out_of_range_error_names_the_field() {
        let err = Rating::new(9).unwrap_err();
        assert!(err.to_string().contains("rating"));
    }
}
