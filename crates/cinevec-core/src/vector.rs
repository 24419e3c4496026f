//! Embedding vectors.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Two vectors (or a vector and an index) disagree on dimensionality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("dimension mismatch: expected {expected}, got {actual}")]
pub struct DimensionMismatch {
    /// Dimensionality the index or caller was configured for.
    pub expected: usize,
    /// Dimensionality actually supplied.
    pub actual: usize,
}

/// An ordered, fixed-length sequence of floats produced by an embedding model.
///
/// The length is decided by the model configuration and never changes after
/// construction. Serializes as a plain JSON array.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EmbeddingVector(Vec<f32>);

impl EmbeddingVector {
    /// Wrap raw components.
    pub fn new(values: Vec<f32>) -> Self {
        Self(values)
    }

    /// Number of components.
    pub fn dimensions(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn into_inner(self) -> Vec<f32> {
        self.0
    }

    /// Check that this vector has exactly `expected` components.
    pub fn ensure_dimensions(&self, expected: usize) -> Result<(), DimensionMismatch> {
        if self.0.len() == expected {
            Ok(())
        } else {
            Err(DimensionMismatch {
                expected,
                actual: self.0.len(),
            })
        }
    }

    /// Dot product with another vector of the same length.
    pub fn dot(&self, other: &EmbeddingVector) -> Result<f64, DimensionMismatch> {
        other.ensure_dimensions(self.dimensions())?;
        Ok(self
            .0
            .iter()
            .zip(&other.0)
            .map(|(a, b)| f64::from(*a) * f64::from(*b))
            .sum())
    }

    /// Euclidean (L2) norm.
    pub fn norm(&self) -> f64 {
        self.0
            .iter()
            .map(|v| f64::from(*v) * f64::from(*v))
            .sum::<f64>()
            .sqrt()
    }
}

impl From<Vec<f32>> for EmbeddingVector {
    fn from(values: Vec<f32>) -> Self {
        Self(values)
    }
}

impl From<EmbeddingVector> for Vec<f32> {
    fn from(vector: EmbeddingVector) -> Self {
        vector.0
    }
}

impl AsRef<[f32]> for EmbeddingVector {
    fn as_ref(&self) -> &[f32] {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dimensions_and_check() {
        let v = EmbeddingVector::new(vec![0.0; 2048]);
        assert_eq!(v.dimensions(), 2048);
        assert!(v.ensure_dimensions(2048).is_ok());

        let err = v.ensure_dimensions(1024).unwrap_err();
        assert_eq!(err.expected, 1024);
        assert_eq!(err.actual, 2048);
        assert_eq!(err.to_string(), "dimension mismatch: expected 1024, got 2048");
    }

    #[test]
    fn test_dot_and_norm() {
        let a = EmbeddingVector::new(vec![1.0, 2.0, 2.0]);
        let b = EmbeddingVector::new(vec![2.0, 0.0, 1.0]);
        assert_eq!(a.dot(&b).unwrap(), 4.0);
        assert_eq!(a.norm(), 3.0);
    }

    #[test]
    fn test_dot_rejects_mismatched_lengths() {
        let a = EmbeddingVector::new(vec![1.0, 2.0]);
        let b = EmbeddingVector::new(vec![1.0, 2.0, 3.0]);
        assert!(a.dot(&b).is_err());
    }

    #[test]
    fn test_serializes_as_plain_array() {
        let v = EmbeddingVector::new(vec![0.5, -1.0]);
        assert_eq!(serde_json::to_string(&v).unwrap(), "[0.5,-1.0]");

        let back: EmbeddingVector = serde_json::from_str("[0.25, 0.75]").unwrap();
        assert_eq!(back.as_slice(), &[0.25, 0.75]);
    }
}
