//! Store trait for vector-search capable document stores.
//!
//! The store owns documents, indexes and the index build lifecycle. The
//! similarity client validates queries and delegates execution here.

use std::sync::Arc;

use async_trait::async_trait;
use cinevec_core::EmbeddingVector;

use crate::document::{Document, DocumentId, MatchResult};
use crate::error::{Result, StoreError};
use crate::filter::QueryFilter;
use crate::index::{IndexStatus, VectorIndexDefinition};

/// Maximum candidate pool a store accepts for approximate search.
pub const MAX_NUM_CANDIDATES: usize = 10_000;

/// Candidate pool multiplier applied to `limit` when none is given.
pub const DEFAULT_CANDIDATE_MULTIPLIER: usize = 10;

/// A fully resolved similarity query, ready for the store.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorQuery {
    pub index: String,
    pub path: String,
    pub vector: EmbeddingVector,
    pub limit: usize,
    pub filter: Option<QueryFilter>,
    pub include_score: bool,
    /// Keep the vector field in returned documents.
    pub include_vector: bool,
    /// Exhaustive scan instead of approximate nearest neighbours.
    pub exact: bool,
    /// Candidate pool for approximate search. `None` uses
    /// `limit * DEFAULT_CANDIDATE_MULTIPLIER`.
    pub num_candidates: Option<usize>,
}

impl VectorQuery {
    pub fn new(index: &VectorIndexDefinition, vector: EmbeddingVector, limit: usize) -> Self {
        Self {
            index: index.name.clone(),
            path: index.path.clone(),
            vector,
            limit,
            filter: None,
            include_score: true,
            include_vector: false,
            exact: false,
            num_candidates: None,
        }
    }

    /// Effective candidate pool, clamped to `[limit, MAX_NUM_CANDIDATES]`.
    pub fn candidates(&self) -> usize {
        let wanted = self
            .num_candidates
            .unwrap_or(self.limit.saturating_mul(DEFAULT_CANDIDATE_MULTIPLIER));
        wanted.max(self.limit).min(MAX_NUM_CANDIDATES)
    }
}

/// Store operations the similarity client needs.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Report an index's lifecycle state. A missing index is `Absent`,
    /// not an error.
    async fn index_status(&self, name: &str) -> Result<IndexStatus>;

    /// Create the index unless it already exists. Returns `true` when a
    /// build was started, `false` when the index was already there.
    async fn create_index(&self, definition: &VectorIndexDefinition) -> Result<bool>;

    /// Run a similarity query. Results come back in descending score order.
    async fn vector_search(&self, query: &VectorQuery) -> Result<Vec<MatchResult>>;

    /// First document matching `filter`, if any.
    async fn find_one(&self, filter: &QueryFilter) -> Result<Option<Document>>;

    /// Overwrite the vector stored at `field` on one document.
    async fn update_embedding(
        &self,
        id: &DocumentId,
        field: &str,
        vector: &EmbeddingVector,
    ) -> Result<()>;

    /// Store name, for logging.
    fn name(&self) -> &str;
}

pub type SharedVectorStore = Arc<dyn VectorStore>;

/// Reject limits the store cannot serve.
pub(crate) fn check_limit(limit: usize) -> Result<()> {
    if limit == 0 {
        return Err(StoreError::InvalidQuery("limit must be at least 1".to_string()));
    }
    if limit > MAX_NUM_CANDIDATES {
        return Err(StoreError::InvalidQuery(format!(
            "limit {} exceeds maximum of {}",
            limit, MAX_NUM_CANDIDATES
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use cinevec_core::SimilarityFunction;

    fn query(limit: usize) -> VectorQuery {
        let index = VectorIndexDefinition::new("idx", "emb", 2, SimilarityFunction::DotProduct);
        VectorQuery::new(&index, EmbeddingVector::new(vec![1.0, 0.0]), limit)
    }

    #[test]
    fn test_default_candidates() {
        assert_eq!(query(10).candidates(), 100);
        assert_eq!(query(5_000).candidates(), MAX_NUM_CANDIDATES);
    }

    #[test]
    fn test_candidates_never_below_limit() {
        let mut q = query(50);
        q.num_candidates = Some(20);
        assert_eq!(q.candidates(), 50);
        q.num_candidates = Some(200);
        assert_eq!(q.candidates(), 200);
    }

    #[test]
    fn test_check_limit() {
        assert!(check_limit(1).is_ok());
        assert!(check_limit(0).is_err());
        assert!(check_limit(MAX_NUM_CANDIDATES + 1).is_err());
    }
}
