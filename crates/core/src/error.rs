//! Error types for regcite.
//!
//! This module defines a unified error enum covering every failure category
//! of the retrieval-and-citation pipeline: document structure, embedding and
//! generation services, deadlines, index freshness, configuration and I/O.

use std::time::Duration;
use thiserror::Error;

/// Unified error type for regcite.
///
/// All fallible functions in the workspace return `Result<T, AppError>`.
/// We never panic: errors must be represented and propagated.
#[derive(Error, Debug)]
pub enum AppError {
    /// The source document has a bad structure (fatal to an index build)
    #[error("Malformed document: {0}")]
    MalformedDocument(String),

    /// The embedding capability failed for a section or a query
    #[error("Embedding service error: {0}")]
    EmbeddingService(String),

    /// A blocking external call exceeded its configured deadline
    #[error("Timed out after {millis}ms: {operation}")]
    Timeout { operation: String, millis: u64 },

    /// Context was required but retrieval produced none
    #[error("No context available: {0}")]
    EmptyContext(String),

    /// A persisted index no longer matches its source document
    #[error("Index out of date: {0}")]
    StaleIndex(String),

    /// Generation service errors
    #[error("LLM error: {0}")]
    Llm(String),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O and filesystem errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Index persistence errors
    #[error("Storage error: {0}")]
    Storage(String),

    /// Prompt template errors
    #[error("Prompt error: {0}")]
    Prompt(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors
    #[error("{0}")]
    Other(String),
}

/// How the front-end boundary should present an error to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// A remote service failed or was too slow; retry later
    ServiceUnavailable,
    /// The persisted index must be rebuilt before answering
    IndexOutOfDate,
    /// The operator supplied a bad document or configuration
    InvalidInput,
    /// Anything else
    Internal,
}

impl AppError {
    /// Build a timeout error for the named operation.
    pub fn timeout(operation: impl Into<String>, after: Duration) -> Self {
        AppError::Timeout {
            operation: operation.into(),
            millis: after.as_millis().try_into().unwrap_or(u64::MAX),
        }
    }

    /// Classify the error for user-visible reporting.
    pub fn class(&self) -> ErrorClass {
        match self {
            AppError::Timeout { .. } | AppError::EmbeddingService(_) | AppError::Llm(_) => {
                ErrorClass::ServiceUnavailable
            }
            AppError::StaleIndex(_) => ErrorClass::IndexOutOfDate,
            AppError::MalformedDocument(_) | AppError::Config(_) | AppError::Prompt(_) => {
                ErrorClass::InvalidInput
            }
            AppError::EmptyContext(_)
            | AppError::Io(_)
            | AppError::Storage(_)
            | AppError::Serialization(_)
            | AppError::Other(_) => ErrorClass::Internal,
        }
    }

    /// Whether the caller may retry the same operation unchanged.
    pub fn is_retryable(&self) -> bool {
        self.class() == ErrorClass::ServiceUnavailable
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for AppError {
    fn from(err: serde_yaml::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_errors_are_retryable() {
        assert!(AppError::timeout("generation", Duration::from_secs(30)).is_retryable());
        assert!(AppError::EmbeddingService("down".to_string()).is_retryable());
        assert!(AppError::Llm("502".to_string()).is_retryable());
        assert!(!AppError::MalformedDocument("x".to_string()).is_retryable());
    }

    #[test]
    fn test_error_classes() {
        assert_eq!(
            AppError::StaleIndex("changed".to_string()).class(),
            ErrorClass::IndexOutOfDate
        );
        assert_eq!(
            AppError::Config("bad".to_string()).class(),
            ErrorClass::InvalidInput
        );
        assert_eq!(
            AppError::Storage("locked".to_string()).class(),
            ErrorClass::Internal
        );
    }

    #[test]
    fn test_timeout_display() {
        let err = AppError::timeout("query embedding", Duration::from_secs(5));
        assert_eq!(err.to_string(), "Timed out after 5000ms: query embedding");

        let err = AppError::timeout("query embedding", Duration::from_millis(50));
        assert_eq!(err.to_string(), "Timed out after 50ms: query embedding");
    }
}
