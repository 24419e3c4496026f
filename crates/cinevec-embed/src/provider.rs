//! Embedding provider trait and implementations.
//!
//! This module defines the abstraction over remote embedding services and
//! provides a logging decorator and a mock implementation for testing.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::error::{EmbedError, ProviderError, Result};
use crate::types::{EmbedRequest, EmbedResponse};

/// Trait for embedding providers.
///
/// One call to [`embed`](EmbeddingProvider::embed) is one remote round trip:
/// the whole batch succeeds or the whole batch fails. Implementations do not
/// retry, cache, or split the batch.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed every input of `request`, returning vectors in input order.
    async fn embed(&self, request: EmbedRequest) -> Result<EmbedResponse>;

    /// Get the name of this provider.
    fn name(&self) -> &str;
}

/// A provider that can be shared across tasks.
pub type SharedProvider = Arc<dyn EmbeddingProvider>;

/// A mock provider for testing purposes.
///
/// Returns queued outcomes in order and records every request it receives.
/// Requests are validated the same way a real provider validates them.
#[derive(Debug)]
pub struct MockProvider {
    name: String,
    outcomes: Mutex<VecDeque<Result<EmbedResponse>>>,
    request_log: Mutex<Vec<EmbedRequest>>,
}

impl MockProvider {
    /// Create a mock provider that returns the given responses in order.
    pub fn new(responses: Vec<EmbedResponse>) -> Self {
        Self {
            name: "mock".to_string(),
            outcomes: Mutex::new(responses.into_iter().map(Ok).collect()),
            request_log: Mutex::new(Vec::new()),
        }
    }

    /// Queue a provider failure after the already queued outcomes.
    pub fn with_error(self, error: ProviderError) -> Self {
        self.lock_outcomes().push_back(Err(EmbedError::Provider(error)));
        self
    }

    /// Queue another successful response.
    pub fn queue_response(&self, response: EmbedResponse) {
        self.lock_outcomes().push_back(Ok(response));
    }

    /// Get all requests that were made to this provider.
    pub fn requests(&self) -> Vec<EmbedRequest> {
        self.lock_requests().clone()
    }

    /// Get the number of requests made.
    pub fn request_count(&self) -> usize {
        self.lock_requests().len()
    }

    fn lock_outcomes(&self) -> std::sync::MutexGuard<'_, VecDeque<Result<EmbedResponse>>> {
        self.outcomes.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_requests(&self) -> std::sync::MutexGuard<'_, Vec<EmbedRequest>> {
        self.request_log.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl EmbeddingProvider for MockProvider {
    async fn embed(&self, request: EmbedRequest) -> Result<EmbedResponse> {
        request.validate()?;
        self.lock_requests().push(request.clone());

        let outcome = self.lock_outcomes().pop_front().unwrap_or_else(|| {
            Err(EmbedError::Provider(ProviderError::transport(
                "mock",
                "MockProvider: no more responses available",
            )))
        });

        let response = outcome?;
        response.check_against(&request)?;
        Ok(response)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// A provider that wraps another provider with request/response logging.
pub struct LoggingProvider<P: EmbeddingProvider> {
    inner: P,
    name: String,
}

impl<P: EmbeddingProvider> LoggingProvider<P> {
    /// Create a new logging provider.
    pub fn new(inner: P) -> Self {
        let name = format!("logging({})", inner.name());
        Self { inner, name }
    }
}

#[async_trait]
impl<P: EmbeddingProvider> EmbeddingProvider for LoggingProvider<P> {
    async fn embed(&self, request: EmbedRequest) -> Result<EmbedResponse> {
        tracing::debug!(
            provider = self.inner.name(),
            model = %request.model,
            inputs = request.inputs.len(),
            output_dimension = request.output_dimension,
            truncation = request.truncation,
            "Sending embedding request"
        );

        let start = std::time::Instant::now();
        let result = self.inner.embed(request).await;
        let elapsed = start.elapsed();

        match &result {
            Ok(response) => {
                tracing::debug!(
                    provider = self.inner.name(),
                    model = %response.model,
                    embeddings = response.len(),
                    total_tokens = response.total_tokens,
                    duration_ms = elapsed.as_millis() as u64,
                    "Embedding successful"
                );
            }
            Err(e) => {
                tracing::warn!(
                    provider = self.inner.name(),
                    error = %e,
                    duration_ms = elapsed.as_millis() as u64,
                    "Embedding failed"
                );
            }
        }

        result
    }

    fn name(&self) -> &str {
        &self.name
    }
}
