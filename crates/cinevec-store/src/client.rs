//! Similarity query client.
//!
//! Holds the index declarations for a collection and validates queries
//! against them before anything reaches the store. Index management is kept
//! apart from querying: `search` never creates an index and never waits for
//! one.

use std::time::Duration;

use cinevec_core::EmbeddingVector;
use tracing::{debug, info, warn};

use crate::backend::{MAX_NUM_CANDIDATES, SharedVectorStore, VectorQuery, check_limit};
use crate::document::{Document, DocumentId, MatchResult};
use crate::error::{Result, StoreError};
use crate::filter::QueryFilter;
use crate::index::{IndexState, VectorIndexDefinition};

/// A similarity query against one vector field.
#[derive(Debug, Clone, PartialEq)]
pub struct SimilarityQuery {
    pub field: String,
    pub vector: EmbeddingVector,
    pub limit: usize,
    pub filter: Option<QueryFilter>,
    pub with_scores: bool,
    pub include_vector: bool,
    pub exact: bool,
    pub num_candidates: Option<usize>,
}

impl SimilarityQuery {
    /// Query returning up to `limit` matches with scores and without the
    /// vector field.
    pub fn new(field: impl Into<String>, vector: EmbeddingVector, limit: usize) -> Self {
        Self {
            field: field.into(),
            vector,
            limit,
            filter: None,
            with_scores: true,
            include_vector: false,
            exact: false,
            num_candidates: None,
        }
    }

    pub fn with_filter(mut self, filter: QueryFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_scores(mut self, with_scores: bool) -> Self {
        self.with_scores = with_scores;
        self
    }

    pub fn include_vector(mut self, include: bool) -> Self {
        self.include_vector = include;
        self
    }

    /// Exhaustive search instead of approximate nearest neighbours.
    pub fn exact(mut self, exact: bool) -> Self {
        self.exact = exact;
        self
    }

    pub fn with_num_candidates(mut self, candidates: usize) -> Self {
        self.num_candidates = Some(candidates);
        self
    }
}

/// Result of a search, with the index state observed when it ran.
///
/// A query against a `Building` index succeeds with zero or partial
/// matches; `index_state` tells the two cases apart from a genuinely empty
/// result.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchOutcome {
    pub matches: Vec<MatchResult>,
    pub index_state: IndexState,
}

impl SearchOutcome {
    /// True when the index was fully built, so the matches are complete.
    pub fn is_complete(&self) -> bool {
        self.index_state.is_ready()
    }

    pub fn len(&self) -> usize {
        self.matches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }

    pub fn into_matches(self) -> Vec<MatchResult> {
        self.matches
    }
}

/// Client issuing similarity queries over a set of declared indexes.
#[derive(Clone)]
pub struct SimilarityClient {
    store: SharedVectorStore,
    indexes: Vec<VectorIndexDefinition>,
}

impl SimilarityClient {
    pub fn new(store: SharedVectorStore) -> Self {
        Self {
            store,
            indexes: Vec::new(),
        }
    }

    /// Declare an index. A later declaration for the same field replaces
    /// the earlier one.
    pub fn with_index(mut self, definition: VectorIndexDefinition) -> Self {
        self.indexes.retain(|d| d.path != definition.path);
        self.indexes.push(definition);
        self
    }

    pub fn indexes(&self) -> &[VectorIndexDefinition] {
        &self.indexes
    }

    pub fn store(&self) -> &SharedVectorStore {
        &self.store
    }

    /// The index declared for a vector field.
    pub fn index_for(&self, field: &str) -> Result<&VectorIndexDefinition> {
        self.indexes
            .iter()
            .find(|d| d.path == field)
            .ok_or_else(|| StoreError::IndexNotFound {
                index: "(undeclared)".to_string(),
                field: field.to_string(),
            })
    }

    /// Run a similarity query.
    ///
    /// Fails with `IndexNotFound` when no index covers the field or the
    /// store does not have it, and with `DimensionMismatch` when the query
    /// vector disagrees with the index.
    pub async fn search(&self, query: SimilarityQuery) -> Result<SearchOutcome> {
        check_limit(query.limit)?;
        let index = self.index_for(&query.field)?;
        index.check_vector(&query.vector)?;
        if let Some(filter) = &query.filter {
            index.check_filter(filter)?;
        }

        let status = self.store.index_status(&index.name).await?;
        match &status.state {
            IndexState::Ready => {}
            IndexState::Building => {
                warn!(
                    index = %index.name,
                    field = %query.field,
                    "Querying an index that is still building; results may be empty or partial"
                );
            }
            IndexState::Absent => {
                return Err(StoreError::IndexNotFound {
                    index: index.name.clone(),
                    field: query.field,
                });
            }
            IndexState::Failed(reason) => {
                return Err(StoreError::IndexFailed {
                    index: index.name.clone(),
                    reason: reason.clone(),
                });
            }
        }
        status.check_vector(&index.name, &query.vector)?;

        let limit = query.limit;
        let store_query = VectorQuery {
            limit,
            filter: query.filter,
            include_score: query.with_scores,
            include_vector: query.include_vector,
            exact: query.exact,
            num_candidates: query.num_candidates,
            ..VectorQuery::new(index, query.vector, limit)
        };

        let mut matches = self.store.vector_search(&store_query).await?;
        if store_query.include_score {
            matches.sort_by(|a, b| {
                b.score
                    .partial_cmp(&a.score)
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
        }
        matches.truncate(limit);

        debug!(
            store = %self.store.name(),
            index = %index.name,
            limit,
            exact = store_query.exact,
            filtered = store_query.filter.is_some(),
            results = matches.len(),
            "Similarity search complete"
        );

        Ok(SearchOutcome {
            matches,
            index_state: status.state,
        })
    }

    /// Search using the stored vector of the first document matching
    /// `source`. The source document itself is left out of the matches.
    pub async fn search_like(
        &self,
        field: &str,
        source: &QueryFilter,
        limit: usize,
    ) -> Result<(Document, SearchOutcome)> {
        check_limit(limit)?;
        let document = self
            .store
            .find_one(source)
            .await?
            .ok_or_else(|| StoreError::InvalidQuery("no document matches the source filter".to_string()))?;
        let vector = document.vector(field).cloned().ok_or_else(|| {
            StoreError::InvalidData(format!("document {} has no vector in '{}'", document.id, field))
        })?;

        // One extra slot for the source document, which usually ranks first.
        let query = SimilarityQuery::new(field, vector, (limit + 1).min(MAX_NUM_CANDIDATES));
        let mut outcome = self.search(query).await?;
        outcome.matches.retain(|m| m.document.id != document.id);
        outcome.matches.truncate(limit);

        Ok((document.without_field(field), outcome))
    }

    /// Write an embedding into one document after checking its length.
    pub async fn store_embedding(
        &self,
        id: &DocumentId,
        field: &str,
        vector: &EmbeddingVector,
    ) -> Result<()> {
        self.index_for(field)?.check_vector(vector)?;
        self.store.update_embedding(id, field, vector).await
    }

    /// Current lifecycle state of the index covering `field`.
    pub async fn index_state(&self, field: &str) -> Result<IndexState> {
        let index = self.index_for(field)?;
        Ok(self.store.index_status(&index.name).await?.state)
    }

    /// Create every declared index the store does not have yet. Returns the
    /// names of the indexes whose build was started; calling it again is a
    /// no-op.
    pub async fn create_missing_indexes(&self) -> Result<Vec<String>> {
        let mut created = Vec::new();
        for definition in &self.indexes {
            if self.store.create_index(definition).await? {
                info!(index = %definition.name, path = %definition.path, "Created index");
                created.push(definition.name.clone());
            }
        }
        Ok(created)
    }

    /// Poll until every declared index is ready.
    ///
    /// There is no timeout; wrap the call in `tokio::time::timeout` to bound
    /// it. Fails with `IndexFailed` if a build fails and `IndexNotFound` if
    /// an index was never created.
    pub async fn wait_until_ready(&self, poll_interval: Duration) -> Result<()> {
        loop {
            let mut pending = Vec::new();
            for definition in &self.indexes {
                match self.store.index_status(&definition.name).await?.state {
                    IndexState::Ready => {}
                    IndexState::Building => pending.push(definition.name.as_str()),
                    IndexState::Absent => {
                        return Err(StoreError::IndexNotFound {
                            index: definition.name.clone(),
                            field: definition.path.clone(),
                        });
                    }
                    IndexState::Failed(reason) => {
                        return Err(StoreError::IndexFailed {
                            index: definition.name.clone(),
                            reason,
                        });
                    }
                }
            }

            if pending.is_empty() {
                info!(count = self.indexes.len(), "All indexes ready");
                return Ok(());
            }

            debug!(?pending, "Waiting for index builds");
            tokio::time::sleep(poll_interval).await;
        }
    }
}
