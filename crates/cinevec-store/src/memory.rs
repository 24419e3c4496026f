//! In-memory vector store.
//!
//! Scores every candidate exactly, so approximate and exact queries return
//! the same results. Index builds are simulated: a freshly created index
//! reports `Building` for a configurable number of status checks before it
//! becomes `Ready`. Used for demos and tests.

use std::collections::HashMap;

use async_trait::async_trait;
use cinevec_core::EmbeddingVector;
use tokio::sync::RwLock;
use tracing::debug;

use crate::backend::{VectorQuery, VectorStore, check_limit};
use crate::document::{Document, DocumentId, MatchResult};
use crate::error::{Result, StoreError};
use crate::filter::QueryFilter;
use crate::index::{IndexState, IndexStatus, VectorIndexDefinition};

#[derive(Debug, Clone)]
struct IndexEntry {
    definition: VectorIndexDefinition,
    state: IndexState,
    /// Status checks left before a building index turns ready.
    pending_polls: usize,
}

/// Vector store holding all documents in memory.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    documents: RwLock<Vec<Document>>,
    indexes: RwLock<HashMap<String, IndexEntry>>,
    build_polls: usize,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of status checks a created index reports `Building` for.
    ///
    /// Every `index_status` call counts, including the one
    /// `SimilarityClient::search` makes before each query, so searching a
    /// building index moves its build forward.
    pub fn with_build_polls(mut self, polls: usize) -> Self {
        self.build_polls = polls;
        self
    }

    /// Seed documents.
    pub fn with_documents(mut self, documents: impl IntoIterator<Item = Document>) -> Self {
        self.documents.get_mut().extend(documents);
        self
    }

    /// Register an index that is already built.
    pub fn with_ready_index(mut self, definition: VectorIndexDefinition) -> Self {
        self.indexes.get_mut().insert(
            definition.name.clone(),
            IndexEntry {
                definition,
                state: IndexState::Ready,
                pending_polls: 0,
            },
        );
        self
    }

    pub async fn insert(&self, document: Document) {
        self.documents.write().await.push(document);
    }

    pub async fn len(&self) -> usize {
        self.documents.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.documents.read().await.is_empty()
    }

    /// Force an index into a lifecycle state. `Absent` drops it.
    pub async fn set_index_state(&self, name: &str, state: IndexState) {
        let mut indexes = self.indexes.write().await;
        if state == IndexState::Absent {
            indexes.remove(name);
        } else if let Some(entry) = indexes.get_mut(name) {
            entry.state = state;
            entry.pending_polls = 0;
        }
    }
}

#[async_trait]
impl VectorStore for InMemoryStore {
    async fn index_status(&self, name: &str) -> Result<IndexStatus> {
        let mut indexes = self.indexes.write().await;
        let Some(entry) = indexes.get_mut(name) else {
            return Ok(IndexStatus::absent());
        };

        if entry.state == IndexState::Building {
            if entry.pending_polls == 0 {
                entry.state = IndexState::Ready;
            } else {
                entry.pending_polls -= 1;
            }
        }

        Ok(IndexStatus::new(
            entry.state.clone(),
            Some(entry.definition.dimensions),
        ))
    }

    async fn create_index(&self, definition: &VectorIndexDefinition) -> Result<bool> {
        let mut indexes = self.indexes.write().await;
        if indexes.contains_key(&definition.name) {
            debug!(index = %definition.name, "Index already exists");
            return Ok(false);
        }
        indexes.insert(
            definition.name.clone(),
            IndexEntry {
                definition: definition.clone(),
                state: IndexState::Building,
                pending_polls: self.build_polls,
            },
        );
        debug!(index = %definition.name, polls = self.build_polls, "Index build started");
        Ok(true)
    }

    async fn vector_search(&self, query: &VectorQuery) -> Result<Vec<MatchResult>> {
        check_limit(query.limit)?;

        let (definition, state) = {
            let indexes = self.indexes.read().await;
            match indexes.get(&query.index) {
                Some(entry) => (entry.definition.clone(), entry.state.clone()),
                None => {
                    return Err(StoreError::IndexNotFound {
                        index: query.index.clone(),
                        field: query.path.clone(),
                    });
                }
            }
        };

        match state {
            IndexState::Ready => {}
            IndexState::Building | IndexState::Absent => return Ok(Vec::new()),
            IndexState::Failed(reason) => {
                return Err(StoreError::IndexFailed {
                    index: query.index.clone(),
                    reason,
                });
            }
        }
        definition.check_vector(&query.vector)?;

        let documents = self.documents.read().await;
        let mut scored = Vec::new();
        for doc in documents.iter() {
            // Documents whose vector is missing or the wrong length are not indexed.
            let Some(vector) = doc.vector(&query.path) else {
                continue;
            };
            if vector.dimensions() != definition.dimensions {
                continue;
            }
            if let Some(filter) = &query.filter {
                if !filter.matches(doc) {
                    continue;
                }
            }
            let score = definition
                .similarity
                .score(&query.vector, vector)
                .map_err(|source| StoreError::DimensionMismatch {
                    index: query.index.clone(),
                    source,
                })?;
            scored.push((score, doc));
        }

        scored.sort_by(|(a, da), (b, db)| {
            b.partial_cmp(a)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| da.id.cmp(&db.id))
        });
        scored.truncate(query.limit);

        Ok(scored
            .into_iter()
            .map(|(score, doc)| {
                let document = if query.include_vector {
                    doc.clone()
                } else {
                    doc.without_field(&query.path)
                };
                MatchResult::new(document, query.include_score.then_some(score))
            })
            .collect())
    }

    async fn find_one(&self, filter: &QueryFilter) -> Result<Option<Document>> {
        let documents = self.documents.read().await;
        Ok(documents.iter().find(|doc| filter.matches(doc)).cloned())
    }

    async fn update_embedding(
        &self,
        id: &DocumentId,
        field: &str,
        vector: &EmbeddingVector,
    ) -> Result<()> {
        let mut documents = self.documents.write().await;
        let doc = documents
            .iter_mut()
            .find(|doc| &doc.id == id)
            .ok_or_else(|| StoreError::InvalidData(format!("no document with id {}", id)))?;
        doc.set(field, vector.clone());
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}
