//! Request and response types for the embedding client.

use cinevec_core::EmbeddingVector;
use serde::{Deserialize, Serialize};

use crate::error::{EmbedError, Result};

/// What the embedded text will be used for. Some providers prepend a
/// retrieval prompt depending on this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputType {
    Query,
    Document,
}

/// A batch of inputs to embed in one provider call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbedRequest {
    /// Texts to embed, in order.
    pub inputs: Vec<String>,
    /// Model identifier.
    pub model: String,
    /// Requested vector length.
    pub output_dimension: usize,
    /// Silently truncate inputs longer than the model context instead of
    /// rejecting them.
    pub truncation: bool,
    /// Optional usage hint.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_type: Option<InputType>,
}

impl EmbedRequest {
    /// Create a request with truncation enabled and no input type.
    pub fn new<I, S>(inputs: I, model: impl Into<String>, output_dimension: usize) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            inputs: inputs.into_iter().map(Into::into).collect(),
            model: model.into(),
            output_dimension,
            truncation: true,
            input_type: None,
        }
    }

    pub fn with_truncation(mut self, truncation: bool) -> Self {
        self.truncation = truncation;
        self
    }

    pub fn with_input_type(mut self, input_type: InputType) -> Self {
        self.input_type = Some(input_type);
        self
    }

    /// Reject requests that can never succeed.
    pub fn validate(&self) -> Result<()> {
        if self.inputs.is_empty() {
            return Err(EmbedError::InvalidRequest("empty input batch".to_string()));
        }
        if self.model.is_empty() {
            return Err(EmbedError::InvalidRequest("model cannot be empty".to_string()));
        }
        if self.output_dimension == 0 {
            return Err(EmbedError::InvalidRequest(
                "output dimension must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Embeddings returned for one request, index-aligned with its inputs.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbedResponse {
    /// One vector per input, in input order.
    pub embeddings: Vec<EmbeddingVector>,
    /// Model that produced the vectors, as reported by the provider.
    pub model: String,
    /// Tokens billed for the batch, if reported.
    pub total_tokens: Option<u64>,
}

impl EmbedResponse {
    pub fn new(embeddings: Vec<EmbeddingVector>, model: impl Into<String>) -> Self {
        Self {
            embeddings,
            model: model.into(),
            total_tokens: None,
        }
    }

    pub fn len(&self) -> usize {
        self.embeddings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.embeddings.is_empty()
    }

    pub fn into_vectors(self) -> Vec<EmbeddingVector> {
        self.embeddings
    }

    /// Check the response against the batch contract of `request`: one
    /// vector per input, each of the requested length.
    pub fn check_against(&self, request: &EmbedRequest) -> Result<()> {
        if self.embeddings.len() != request.inputs.len() {
            return Err(EmbedError::InvalidResponse(format!(
                "expected {} embeddings, got {}",
                request.inputs.len(),
                self.embeddings.len()
            )));
        }
        for (i, embedding) in self.embeddings.iter().enumerate() {
            embedding
                .ensure_dimensions(request.output_dimension)
                .map_err(|e| EmbedError::InvalidResponse(format!("embedding {}: {}", i, e)))?;
        }
        Ok(())
    }
}
