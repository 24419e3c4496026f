//! cinevec-core: shared vector types
//!
//! Types used by both sides of cinevec:
//! - `EmbeddingVector`, the fixed-length output of an embedding model
//! - `SimilarityFunction` and `Quantization`, chosen when an index is configured
//! - `DimensionMismatch`, raised when vectors of different lengths meet

pub mod similarity;
pub mod vector;

pub use similarity::{Quantization, SimilarityFunction};
pub use vector::{DimensionMismatch, EmbeddingVector};
