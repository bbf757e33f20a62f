//! Query surface errors with stable kind tags.
//!
//! External callers always receive a structured error carrying one of the
//! stable kinds: `INVALID_REQUEST`, `NOT_FOUND`, `INTERNAL`,
//! `DEADLINE_EXCEEDED`. The kinds are the wire contract; the messages are
//! for humans and may change.

use spectre_analyze::AnalyzeError;
use spectre_log::LogError;
use thiserror::Error;

/// Result type for query operations.
pub type QueryResult<T> = Result<T, QueryError>;

/// A query surface failure.
#[derive(Debug, Error)]
pub enum QueryError {
    /// Malformed request parameters.
    #[error("invalid request: {reason}")]
    InvalidRequest { reason: String },

    /// The requested resource does not exist.
    #[error("not found: {what}")]
    NotFound { what: String },

    /// The per-call deadline expired. Partial data is never returned.
    #[error("deadline exceeded")]
    DeadlineExceeded,

    /// Anything else: storage faults, codec errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl QueryError {
    /// The stable kind tag external callers dispatch on.
    pub fn kind(&self) -> &'static str {
        match self {
            QueryError::InvalidRequest { .. } => "INVALID_REQUEST",
            QueryError::NotFound { .. } => "NOT_FOUND",
            QueryError::DeadlineExceeded => "DEADLINE_EXCEEDED",
            QueryError::Internal(_) => "INTERNAL",
        }
    }

    pub fn invalid(reason: impl Into<String>) -> Self {
        QueryError::InvalidRequest {
            reason: reason.into(),
        }
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        QueryError::NotFound { what: what.into() }
    }
}

impl From<LogError> for QueryError {
    fn from(err: LogError) -> Self {
        match err {
            LogError::UnsupportedContentType { content_type } => QueryError::InvalidRequest {
                reason: format!("unsupported content type {content_type}"),
            },
            LogError::InvalidJson(e) => QueryError::InvalidRequest {
                reason: format!("invalid JSON batch: {e}"),
            },
            LogError::InvalidContainer { reason } => QueryError::InvalidRequest {
                reason: format!("invalid export container: {reason}"),
            },
            other => QueryError::Internal(other.to_string()),
        }
    }
}

impl From<AnalyzeError> for QueryError {
    fn from(err: AnalyzeError) -> Self {
        match err {
            AnalyzeError::SymptomNotFound { uid } => QueryError::NotFound {
                what: format!("resource {uid}"),
            },
            AnalyzeError::DeadlineExceeded => QueryError::DeadlineExceeded,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_are_stable() {
        assert_eq!(QueryError::invalid("x").kind(), "INVALID_REQUEST");
        assert_eq!(QueryError::not_found("y").kind(), "NOT_FOUND");
        assert_eq!(QueryError::DeadlineExceeded.kind(), "DEADLINE_EXCEEDED");
        assert_eq!(QueryError::Internal("z".into()).kind(), "INTERNAL");
    }

    #[test]
    fn analyze_errors_map_to_kinds() {
        let err: QueryError = AnalyzeError::SymptomNotFound {
            uid: spectre_types::Uid::new("u"),
        }
        .into();
        assert_eq!(err.kind(), "NOT_FOUND");

        let err: QueryError = AnalyzeError::DeadlineExceeded.into();
        assert_eq!(err.kind(), "DEADLINE_EXCEEDED");
    }
}
