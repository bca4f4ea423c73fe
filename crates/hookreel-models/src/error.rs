//! Configuration validation errors.

use thiserror::Error;

/// A configuration value outside the range the pipeline accepts.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ConfigError {
    #[error("{field} must be {expected}, got {actual}")]
    OutOfRange {
        field: &'static str,
        expected: String,
        actual: String,
    },

    #[error("{0} must not be empty")]
    Empty(&'static str),
}

impl ConfigError {
    pub fn out_of_range(
        field: &'static str,
        expected: impl Into<String>,
        actual: impl ToString,
    ) -> Self {
        Self::OutOfRange {
            field,
            expected: expected.into(),
            actual: actual.to_string(),
        }
    }
}
