//! Similarity index definitions and lifecycle state.

use cinevec_core::{DimensionMismatch, EmbeddingVector, Quantization, SimilarityFunction};
use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};
use crate::filter::QueryFilter;

/// Declaration of one vector-search index over one vector field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorIndexDefinition {
    /// Index name in the store.
    pub name: String,
    /// Path of the vector field the index covers.
    pub path: String,
    /// Vector length every indexed and query vector must have.
    pub dimensions: usize,
    /// Fixed at index creation; applies to every query.
    pub similarity: SimilarityFunction,
    #[serde(default)]
    pub quantization: Quantization,
    /// Scalar fields usable in pre-filters.
    #[serde(default)]
    pub filter_fields: Vec<String>,
}

impl VectorIndexDefinition {
    pub fn new(
        name: impl Into<String>,
        path: impl Into<String>,
        dimensions: usize,
        similarity: SimilarityFunction,
    ) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            dimensions,
            similarity,
            quantization: Quantization::None,
            filter_fields: Vec::new(),
        }
    }

    pub fn with_quantization(mut self, quantization: Quantization) -> Self {
        self.quantization = quantization;
        self
    }

    pub fn with_filter_field(mut self, field: impl Into<String>) -> Self {
        self.filter_fields.push(field.into());
        self
    }

    /// Check a query vector against the declared dimensionality.
    pub fn check_vector(&self, vector: &EmbeddingVector) -> Result<()> {
        vector
            .ensure_dimensions(self.dimensions)
            .map_err(|source| StoreError::DimensionMismatch {
                index: self.name.clone(),
                source,
            })
    }

    /// Check that every field `filter` references is declared filterable.
    pub fn check_filter(&self, filter: &QueryFilter) -> Result<()> {
        for field in filter.fields() {
            if !self.filter_fields.iter().any(|f| f == field) {
                return Err(StoreError::FilterNotIndexed {
                    index: self.name.clone(),
                    field: field.to_string(),
                });
            }
        }
        Ok(())
    }
}

/// Where an index is in its lifecycle: `absent → building → ready`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "reason", rename_all = "lowercase")]
pub enum IndexState {
    /// No such index. Queries fail with `IndexNotFound`.
    Absent,
    /// Declared but not yet queryable. Queries return zero or partial
    /// results without error.
    Building,
    /// Fully built.
    Ready,
    /// The store gave up building it.
    Failed(String),
}

impl IndexState {
    pub fn is_ready(&self) -> bool {
        matches!(self, IndexState::Ready)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            IndexState::Absent => "absent",
            IndexState::Building => "building",
            IndexState::Ready => "ready",
            IndexState::Failed(_) => "failed",
        }
    }
}

impl std::fmt::Display for IndexState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IndexState::Failed(reason) => write!(f, "failed ({})", reason),
            other => f.write_str(other.as_str()),
        }
    }
}

/// An index's state as reported by the store, with the definition the store
/// holds for it when available.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexStatus {
    pub state: IndexState,
    /// Vector dimensionality the live index was built with, if reported.
    pub dimensions: Option<usize>,
}

impl IndexStatus {
    pub fn absent() -> Self {
        Self {
            state: IndexState::Absent,
            dimensions: None,
        }
    }

    pub fn new(state: IndexState, dimensions: Option<usize>) -> Self {
        Self { state, dimensions }
    }

    /// Check a query vector against the live dimensionality, if known.
    pub fn check_vector(&self, index: &str, vector: &EmbeddingVector) -> Result<()> {
        match self.dimensions {
            Some(expected) if expected != vector.dimensions() => {
                Err(StoreError::DimensionMismatch {
                    index: index.to_string(),
                    source: DimensionMismatch {
                        expected,
                        actual: vector.dimensions(),
                    },
                })
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn movie_index() -> VectorIndexDefinition {
        VectorIndexDefinition::new(
            "vector_index",
            "plot_embedding_voyage_3_large",
            4,
            SimilarityFunction::DotProduct,
        )
        .with_filter_field("year")
    }

    #[test]
    fn test_check_vector() {
        let index = movie_index();
        assert!(index.check_vector(&EmbeddingVector::new(vec![0.0; 4])).is_ok());
        assert!(matches!(
            index.check_vector(&EmbeddingVector::new(vec![0.0; 3])),
            Err(StoreError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_check_filter_rejects_undeclared_fields() {
        let index = movie_index();
        assert!(index.check_filter(&QueryFilter::between("year", 1980, 1989)).is_ok());

        let err = index
            .check_filter(&QueryFilter::eq("title", "Alien"))
            .unwrap_err();
        match err {
            StoreError::FilterNotIndexed { field, .. } => assert_eq!(field, "title"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_status_check_uses_live_dimensions() {
        let v = EmbeddingVector::new(vec![0.0; 4]);
        assert!(IndexStatus::new(IndexState::Ready, None).check_vector("i", &v).is_ok());
        assert!(IndexStatus::new(IndexState::Ready, Some(4)).check_vector("i", &v).is_ok());
        assert!(IndexStatus::new(IndexState::Ready, Some(8)).check_vector("i", &v).is_err());
    }

    #[test]
    fn test_state_display() {
        assert_eq!(IndexState::Building.to_string(), "building");
        assert_eq!(
            IndexState::Failed("bad mapping".to_string()).to_string(),
            "failed (bad mapping)"
        );
        assert!(IndexState::Ready.is_ready());
    }
}
