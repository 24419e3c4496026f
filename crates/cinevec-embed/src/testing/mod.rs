//! Testing utilities for cinevec-embed.
//!
//! This module provides deterministic fixtures and an HTTP stand-in for the
//! embedding provider so clients can be exercised without real API calls.
//!
//! # Components
//!
//! - [`fixtures`]: Deterministic vectors and response builders
//! - [`mock_server`]: HTTP mock of the `/v1/embeddings` endpoint

pub mod fixtures;
pub mod mock_server;

pub use fixtures::*;
pub use mock_server::{CapturedRequest, EmbedFn, MockEmbeddingServer};
