//! Configuration error types.

use thiserror::Error;

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration loading failed: {0}")]
    Load(#[from] config::ConfigError),
}

/// Errors raised while validating loaded configuration.
#[derive(Debug, Clone, Error)]
pub enum ConfigValidationError {
    #[error("invalid {field}: {reason}")]
    Invalid { field: String, reason: String },
}

impl ConfigValidationError {
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field: field.into(),
            reason: reason.into(),
        }
    }
}
