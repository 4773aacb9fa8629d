//! Error types for the rule store.
//!
//! - [`StoreError`] is returned by every [`RuleStore`](crate::store::RuleStore)
//!   operation and tells the request boundary which failure class occurred.
//! - [`IndexError`](crate::index::IndexError) and
//!   [`EmbeddingError`](crate::embedding::EmbeddingError) are the collaborator
//!   errors the store classifies into a `StoreError`.
//!
//! Degraded-mode outcomes (a missing index on read, a zero-vector embedding on
//! write, a schema that already exists) never appear here: the store turns
//! them into successful results.

use thiserror::Error;

use crate::embedding::EmbeddingError;
use crate::index::IndexError;

/// Result type alias for rule store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Top-level error for all rule store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The search backend could not be reached while opening the store.
    #[error("cannot reach search backend: {0}")]
    Connectivity(#[source] IndexError),

    /// Input failed validation.
    #[error("invalid input: {0}")]
    Validation(String),

    /// The query text could not be embedded.
    #[error("failed to embed query: {0}")]
    Embedding(#[source] EmbeddingError),

    /// Writing a rule document failed.
    #[error("failed to write rule {rule_id}: {source}")]
    Write {
        rule_id: String,
        #[source]
        source: IndexError,
    },

    /// A similarity query failed at the backend.
    #[error("rule query failed: {0}")]
    Query(#[source] IndexError),

    /// Listing rules failed at the backend.
    #[error("rule listing failed: {0}")]
    List(#[source] IndexError),
}

impl StoreError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Returns true if this error was caused by caller input rather than a
    /// collaborator.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Returns true if the backend was unreachable for this operation.
    pub fn is_unreachable(&self) -> bool {
        match self {
            Self::Connectivity(_) => true,
            Self::Write { source, .. } | Self::Query(source) | Self::List(source) => {
                matches!(source, IndexError::Unreachable(_))
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_error_names_rule() {
        let err = StoreError::Write {
            rule_id: "abc123".into(),
            source: IndexError::Backend("mapper_parsing_exception".into()),
        };
        let msg = err.to_string();
        assert!(msg.contains("abc123"));
        assert!(msg.contains("mapper_parsing_exception"));
    }

    #[test]
    fn test_unreachable_classification() {
        assert!(StoreError::Query(IndexError::Unreachable("timeout".into())).is_unreachable());
        assert!(!StoreError::List(IndexError::Backend("boom".into())).is_unreachable());
        assert!(!StoreError::validation("x").is_unreachable());
        assert!(StoreError::validation("x").is_validation());
    }
}
