//! Error types for the similarity query client.

use cinevec_core::DimensionMismatch;

/// Error type for vector store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// No similarity index covers the requested vector field.
    #[error("Index not found: {index} (field '{field}')")]
    IndexNotFound { index: String, field: String },

    /// Query vector and index disagree on dimensionality.
    #[error("Dimension mismatch on index {index}: {source}")]
    DimensionMismatch {
        index: String,
        #[source]
        source: DimensionMismatch,
    },

    /// The filter references a field the index does not declare as filterable.
    #[error("Field '{field}' is not a filter field of index {index}")]
    FilterNotIndexed { index: String, field: String },

    /// The store reported that the index build failed.
    #[error("Index {index} failed to build: {reason}")]
    IndexFailed { index: String, reason: String },

    /// The query itself is malformed.
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Database error: {0}")]
    Database(#[from] mongodb::error::Error),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = StoreError::IndexNotFound {
            index: "vector_index".to_string(),
            field: "plot_embedding".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Index not found: vector_index (field 'plot_embedding')"
        );

        let err = StoreError::DimensionMismatch {
            index: "vector_index".to_string(),
            source: DimensionMismatch {
                expected: 2048,
                actual: 1024,
            },
        };
        assert_eq!(
            err.to_string(),
            "Dimension mismatch on index vector_index: dimension mismatch: expected 2048, got 1024"
        );
    }
}
