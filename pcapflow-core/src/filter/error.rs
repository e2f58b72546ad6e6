//! Error types for capture filter parsing.

use thiserror::Error;

/// Errors that can occur while parsing a filter expression.
#[derive(Debug, Error)]
pub enum FilterError {
    /// Parse error with context
    #[error("Parse error: {message}")]
    ParseError { message: String },

    /// Empty filter
    #[error("Empty filter expression")]
    EmptyFilter,
}

impl FilterError {
    pub fn parse_error(message: impl Into<String>) -> Self {
        FilterError::ParseError {
            message: message.into(),
        }
    }
}
