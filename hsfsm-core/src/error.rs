//! Core error types.

use thiserror::Error;

/// Errors surfaced by a store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("duplicate key: {0}")]
    DuplicateKey(String),

    #[error("unsupported statement: {0}")]
    Unsupported(String),

    #[error("store backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Returns whether this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Backend(_))
    }
}

/// Errors from the transition engine.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("undefined event: {event}")]
    UndefinedEvent { event: String },

    #[error("entity already exists: {id}")]
    DuplicateEntry { id: String },

    #[error("entity not found: {id}")]
    NotFound { id: String },

    #[error("deadline exceeded during {operation}")]
    DeadlineExceeded { operation: &'static str },

    #[error("invalid machine definition: {reason}")]
    InvalidDefinition { reason: String },

    #[error("invalid identifier '{identifier}': {reason}")]
    InvalidIdentifier { identifier: String, reason: String },

    #[error("state '{state}' is not reachable from the initial state")]
    Unreachable { state: String },

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CoreError {
    /// Returns whether this error indicates the operation can be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            CoreError::Store(e) => e.is_retryable(),
            CoreError::DeadlineExceeded { .. } => true,
            _ => false,
        }
    }

    /// Returns a stable error code for callers that branch on the failure kind.
    pub fn error_code(&self) -> &'static str {
        match self {
            CoreError::UndefinedEvent { .. } => "UNDEFINED_EVENT",
            CoreError::DuplicateEntry { .. } => "DUPLICATE_ENTRY",
            CoreError::NotFound { .. } => "NOT_FOUND",
            CoreError::DeadlineExceeded { .. } => "DEADLINE_EXCEEDED",
            CoreError::InvalidDefinition { .. } => "BAD_REQUEST",
            CoreError::InvalidIdentifier { .. } => "BAD_REQUEST",
            CoreError::Unreachable { .. } => "BAD_REQUEST",
            CoreError::Store(_) => "STORE_ERROR",
            CoreError::Json(_) => "BAD_REQUEST",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(CoreError::Store(StoreError::Backend("connection reset".into())).is_retryable());
        assert!(CoreError::DeadlineExceeded { operation: "event" }.is_retryable());
        assert!(!CoreError::Store(StoreError::DuplicateKey("task/1".into())).is_retryable());
        assert!(!CoreError::NotFound { id: "1".into() }.is_retryable());
    }

    #[test]
    fn test_error_codes() {
        let err = CoreError::UndefinedEvent {
            event: "Launch".into(),
        };
        assert_eq!(err.error_code(), "UNDEFINED_EVENT");
        assert_eq!(err.to_string(), "undefined event: Launch");
        assert_eq!(
            CoreError::DuplicateEntry { id: "1".into() }.error_code(),
            "DUPLICATE_ENTRY"
        );
    }
}
