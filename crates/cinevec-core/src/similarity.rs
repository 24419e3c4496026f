//! Similarity functions and quantization settings for vector indexes.

use serde::{Deserialize, Serialize};

use crate::vector::{DimensionMismatch, EmbeddingVector};

/// How an index compares vectors. Chosen when the index is configured,
/// never per query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum SimilarityFunction {
    Euclidean,
    Cosine,
    #[default]
    DotProduct,
}

impl SimilarityFunction {
    /// Name used in index definitions.
    pub fn as_str(&self) -> &'static str {
        match self {
            SimilarityFunction::Euclidean => "euclidean",
            SimilarityFunction::Cosine => "cosine",
            SimilarityFunction::DotProduct => "dotProduct",
        }
    }

    /// Parse a similarity name, accepting a few common spellings.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().replace(['_', '-'], "").as_str() {
            "euclidean" | "l2" => Some(SimilarityFunction::Euclidean),
            "cosine" => Some(SimilarityFunction::Cosine),
            "dotproduct" | "dot" => Some(SimilarityFunction::DotProduct),
            _ => None,
        }
    }

    /// Normalized score between two vectors; higher is more similar.
    ///
    /// Uses the same normalization Atlas Vector Search reports:
    /// `(1 + cos) / 2` for cosine, `(1 + dot) / 2` for dot product and
    /// `1 / (1 + distance)` for euclidean.
    pub fn score(
        &self,
        a: &EmbeddingVector,
        b: &EmbeddingVector,
    ) -> Result<f64, DimensionMismatch> {
        match self {
            SimilarityFunction::DotProduct => Ok((1.0 + a.dot(b)?) / 2.0),
            SimilarityFunction::Cosine => {
                let dot = a.dot(b)?;
                let denom = a.norm() * b.norm();
                let cos = if denom == 0.0 { 0.0 } else { dot / denom };
                Ok((1.0 + cos) / 2.0)
            }
            SimilarityFunction::Euclidean => {
                b.ensure_dimensions(a.dimensions())?;
                let distance = a
                    .as_slice()
                    .iter()
                    .zip(b.as_slice())
                    .map(|(x, y)| {
                        let d = f64::from(*x) - f64::from(*y);
                        d * d
                    })
                    .sum::<f64>()
                    .sqrt();
                Ok(1.0 / (1.0 + distance))
            }
        }
    }
}

impl std::fmt::Display for SimilarityFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Compression applied to stored vector components by the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Quantization {
    #[default]
    None,
    Scalar,
    Binary,
}

impl Quantization {
    pub fn as_str(&self) -> &'static str {
        match self {
            Quantization::None => "none",
            Quantization::Scalar => "scalar",
            Quantization::Binary => "binary",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Some(Quantization::None),
            "scalar" => Some(Quantization::Scalar),
            "binary" => Some(Quantization::Binary),
            _ => None,
        }
    }
}
