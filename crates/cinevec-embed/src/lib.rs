//! cinevec-embed: embedding client
//!
//! This crate turns batches of text into embedding vectors through a remote
//! embedding provider:
//! - Provider abstraction with a logging decorator and a mock
//! - Voyage AI implementation (bearer auth, one request per batch)
//! - Batch contract checks: one vector per input, in input order, of the
//!   requested dimensionality
//!
//! Calls are never retried and results are never cached.

pub mod error;
pub mod provider;
pub mod types;
pub mod voyage;

// Testing utilities - available in test builds and behind the `testing` feature
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use cinevec_core::EmbeddingVector;
pub use error::{EmbedError, ProviderError, Result};
pub use provider::{EmbeddingProvider, LoggingProvider, MockProvider, SharedProvider};
pub use types::{EmbedRequest, EmbedResponse, InputType};
pub use voyage::{VoyageConfig, VoyageProvider};
