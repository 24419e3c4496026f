//! cinevec-store: similarity query client
//!
//! This crate issues vector-similarity queries against a document store that
//! owns the index:
//! - Query validation against declared index definitions
//! - Pre-filters evaluated by the store before ranking
//! - Index lifecycle (`absent → building → ready`) kept apart from querying
//! - MongoDB Atlas Vector Search and in-memory store implementations

pub mod atlas;
pub mod backend;
pub mod client;
pub mod document;
pub mod error;
pub mod filter;
pub mod index;
pub mod memory;

pub use atlas::{AtlasConfig, AtlasStore};
pub use backend::{SharedVectorStore, VectorQuery, VectorStore};
pub use cinevec_core::{EmbeddingVector, Quantization, SimilarityFunction};
pub use client::{SearchOutcome, SimilarityClient, SimilarityQuery};
pub use document::{Document, DocumentId, FieldValue, MatchResult};
pub use error::{Result, StoreError};
pub use filter::QueryFilter;
pub use index::{IndexState, IndexStatus, VectorIndexDefinition};
pub use memory::InMemoryStore;
