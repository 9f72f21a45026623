//! Error types for the aggregation engine.

use crate::db::repository::RepositoryError;

/// Result type for grouping strategy calls
pub type GroupingResult<T> = Result<T, GroupingError>;

/// Result type for aggregation runs
pub type AggregationResult<T> = Result<T, AggregationError>;

/// Why a grouping strategy could not place an annotation.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GroupingError {
    /// No canonical point exists in the window (e.g. a gap in the data).
    /// The annotation is skipped; aggregation continues.
    #[error("No group found between JD {x_min} and JD {x_max}")]
    NoGroupFound { x_min: f64, x_max: f64 },

    /// The strategy has no grouping logic. Indicates misconfiguration.
    #[error("Grouping strategy '{strategy}' does not implement group_between")]
    NotSupported { strategy: String },
}

impl GroupingError {
    /// True when the failure only affects the current annotation.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, GroupingError::NoGroupFound { .. })
    }
}

/// Error type for aggregation runs
#[derive(Debug, thiserror::Error)]
pub enum AggregationError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),

    /// A non-recoverable grouping failure; nothing is persisted.
    #[error("Grouping failed: {0}")]
    Grouping(#[from] GroupingError),
}

impl AggregationError {
    /// True when retrying the target on a later run may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            AggregationError::Repository(e) => e.is_retryable(),
            AggregationError::Grouping(_) => false,
        }
    }

    /// True for configuration errors that will fail for every target.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            AggregationError::Grouping(GroupingError::NotSupported { .. })
        )
    }
}
