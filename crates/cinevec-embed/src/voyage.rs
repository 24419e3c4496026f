//! Voyage AI embedding provider.
//!
//! This module provides the `VoyageProvider` which calls Voyage AI's
//! `/v1/embeddings` endpoint. One batch is one HTTP request; failures are
//! reported as-is without retry.

use async_trait::async_trait;
use reqwest::{Client, header};
use std::time::Duration;

use cinevec_core::EmbeddingVector;

use crate::error::{EmbedError, ProviderError, Result};
use crate::provider::EmbeddingProvider;
use crate::types::{EmbedRequest, EmbedResponse, InputType};

/// Default Voyage API base URL.
const DEFAULT_API_BASE: &str = "https://api.voyageai.com";

/// Default timeout for requests.
const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Default embedding model.
pub const DEFAULT_MODEL: &str = "voyage-3-large";

/// Default output dimensionality.
pub const DEFAULT_OUTPUT_DIMENSION: usize = 2048;

/// Environment variable holding the API key.
pub const API_KEY_ENV: &str = "VOYAGE_API_KEY";

const PROVIDER_NAME: &str = "voyage";

/// Configuration for the Voyage provider.
#[derive(Debug, Clone)]
pub struct VoyageConfig {
    /// API key for authentication.
    pub api_key: String,

    /// Base URL for the API.
    pub base_url: String,

    /// Model used by [`VoyageProvider::embed_texts`].
    pub model: String,

    /// Vector length used by [`VoyageProvider::embed_texts`].
    pub output_dimension: usize,

    /// Truncation flag used by [`VoyageProvider::embed_texts`].
    pub truncation: bool,

    /// Request timeout.
    pub timeout: Duration,
}

impl VoyageConfig {
    /// Create a new config with the given API key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_API_BASE.to_string(),
            model: DEFAULT_MODEL.to_string(),
            output_dimension: DEFAULT_OUTPUT_DIMENSION,
            truncation: true,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    /// Create config from environment variable.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var(API_KEY_ENV).map_err(|_| {
            EmbedError::Config(format!("{} environment variable not set", API_KEY_ENV))
        })?;
        Ok(Self::new(api_key))
    }

    /// Set the model to use.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set a custom base URL.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Set the output dimensionality.
    pub fn with_output_dimension(mut self, dimension: usize) -> Self {
        self.output_dimension = dimension;
        self
    }

    /// Set whether over-long inputs are truncated.
    pub fn with_truncation(mut self, truncation: bool) -> Self {
        self.truncation = truncation;
        self
    }

    /// Set request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Voyage AI embedding provider.
pub struct VoyageProvider {
    client: Client,
    config: VoyageConfig,
}

impl VoyageProvider {
    /// Create a new Voyage provider with the given configuration.
    pub fn new(config: VoyageConfig) -> Result<Self> {
        if config.api_key.is_empty() {
            return Err(EmbedError::Config("Voyage API key is empty".to_string()));
        }

        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| EmbedError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    /// Create a provider from environment configuration.
    pub fn from_env() -> Result<Self> {
        Self::new(VoyageConfig::from_env()?)
    }

    pub fn config(&self) -> &VoyageConfig {
        &self.config
    }

    /// Build a request for `inputs` from the configured model, dimension and
    /// truncation settings.
    pub fn request_for<I, S>(&self, inputs: I) -> EmbedRequest
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        EmbedRequest::new(inputs, &self.config.model, self.config.output_dimension)
            .with_truncation(self.config.truncation)
    }

    /// Embed `inputs` with the configured settings.
    pub async fn embed_texts<I, S>(&self, inputs: I) -> Result<Vec<EmbeddingVector>>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let response = self.embed(self.request_for(inputs)).await?;
        Ok(response.into_vectors())
    }

    /// Build the embeddings endpoint URL.
    fn embeddings_url(&self) -> String {
        format!("{}/v1/embeddings", self.config.base_url.trim_end_matches('/'))
    }

    /// Add authentication headers to a request.
    fn add_headers(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder
            .header(
                header::AUTHORIZATION,
                format!("Bearer {}", self.config.api_key),
            )
            .header(header::CONTENT_TYPE, "application/json")
    }

    /// Convert our EmbedRequest to Voyage's wire format.
    fn to_voyage_request(request: &EmbedRequest) -> VoyageEmbedRequest<'_> {
        VoyageEmbedRequest {
            input: &request.inputs,
            model: &request.model,
            truncation: request.truncation,
            output_dimension: request.output_dimension,
            input_type: request.input_type,
        }
    }
}

/// Place each returned embedding at the position of the input it belongs to.
///
/// Voyage tags every item with the index of its input. When all items carry
/// an index, those indices must form a permutation of `0..expected`; when
/// none do, response order is taken as input order.
fn order_embeddings(items: Vec<VoyageEmbedding>, expected: usize) -> Result<Vec<EmbeddingVector>> {
    if items.len() != expected {
        return Err(EmbedError::InvalidResponse(format!(
            "expected {} embeddings, got {}",
            expected,
            items.len()
        )));
    }

    if items.iter().all(|item| item.index.is_none()) {
        return Ok(items
            .into_iter()
            .map(|item| EmbeddingVector::new(item.embedding))
            .collect());
    }

    let mut slots: Vec<Option<EmbeddingVector>> = vec![None; expected];
    for item in items {
        let index = item.index.ok_or_else(|| {
            EmbedError::InvalidResponse("embedding item without index".to_string())
        })?;
        let slot = slots.get_mut(index).ok_or_else(|| {
            EmbedError::InvalidResponse(format!("embedding index {} out of range", index))
        })?;
        if slot.is_some() {
            return Err(EmbedError::InvalidResponse(format!(
                "duplicate embedding index {}",
                index
            )));
        }
        *slot = Some(EmbeddingVector::new(item.embedding));
    }

    // Count matched and no duplicates, so every slot is filled.
    Ok(slots.into_iter().flatten().collect())
}

/// Pull a human-readable reason out of an error body.
fn extract_error_reason(body: &str) -> String {
    let Ok(value) = serde_json::from_str::<serde_json::Value>(body) else {
        return body.trim().to_string();
    };

    let reason = value
        .get("detail")
        .and_then(|v| v.as_str())
        .or_else(|| value.get("message").and_then(|v| v.as_str()))
        .or_else(|| {
            value
                .get("error")
                .and_then(|e| e.get("message"))
                .and_then(|v| v.as_str())
        });

    match reason {
        Some(r) => r.to_string(),
        None => body.trim().to_string(),
    }
}

#[async_trait]
impl EmbeddingProvider for VoyageProvider {
    async fn embed(&self, request: EmbedRequest) -> Result<EmbedResponse> {
        request.validate()?;

        let url = self.embeddings_url();
        let body = Self::to_voyage_request(&request);

        tracing::debug!(
            model = %request.model,
            inputs = request.inputs.len(),
            output_dimension = request.output_dimension,
            "Voyage request"
        );

        let response = self
            .add_headers(self.client.post(&url))
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::transport(PROVIDER_NAME, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let reason = extract_error_reason(&body);
            let reason = if reason.is_empty() {
                status.canonical_reason().unwrap_or("unknown error").to_string()
            } else {
                reason
            };
            return Err(ProviderError::status(PROVIDER_NAME, status.as_u16(), reason).into());
        }

        let voyage_response: VoyageEmbedResponse = response
            .json()
            .await
            .map_err(|e| EmbedError::Serialization(format!("Failed to parse response: {}", e)))?;

        let embeddings = order_embeddings(voyage_response.data, request.inputs.len())?;
        let result = EmbedResponse {
            embeddings,
            model: voyage_response.model.unwrap_or_else(|| request.model.clone()),
            total_tokens: voyage_response.usage.map(|u| u.total_tokens),
        };
        result.check_against(&request)?;

        Ok(result)
    }

    fn name(&self) -> &str {
        PROVIDER_NAME
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Voyage API Types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, serde::Serialize)]
struct VoyageEmbedRequest<'a> {
    input: &'a [String],
    model: &'a str,
    truncation: bool,
    output_dimension: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    input_type: Option<InputType>,
}

#[derive(Debug, serde::Deserialize)]
struct VoyageEmbedResponse {
    data: Vec<VoyageEmbedding>,
    model: Option<String>,
    usage: Option<VoyageUsage>,
}

#[derive(Debug, serde::Deserialize)]
struct VoyageEmbedding {
    embedding: Vec<f32>,
    index: Option<usize>,
}

#[derive(Debug, serde::Deserialize)]
struct VoyageUsage {
    total_tokens: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn item(index: Option<usize>, value: f32) -> VoyageEmbedding {
        VoyageEmbedding {
            embedding: vec![value; 2],
            index,
        }
    }

    #[test]
    fn test_config_defaults() {
        let config = VoyageConfig::new("key");
        assert_eq!(config.base_url, "https://api.voyageai.com");
        assert_eq!(config.model, "voyage-3-large");
        assert_eq!(config.output_dimension, 2048);
        assert!(config.truncation);
    }

    #[test]
    fn test_config_builder() {
        let config = VoyageConfig::new("key")
            .with_model("voyage-3.5")
            .with_base_url("http://127.0.0.1:9000")
            .with_output_dimension(1024)
            .with_truncation(false);

        assert_eq!(config.model, "voyage-3.5");
        assert_eq!(config.base_url, "http://127.0.0.1:9000");
        assert_eq!(config.output_dimension, 1024);
        assert!(!config.truncation);
    }

    #[test]
    #[serial]
    fn test_config_from_env() {
        // SAFETY: serialized with other env-mutating tests.
        unsafe { std::env::set_var(API_KEY_ENV, "env-key") };
        let config = VoyageConfig::from_env().unwrap();
        assert_eq!(config.api_key, "env-key");

        unsafe { std::env::remove_var(API_KEY_ENV) };
        assert!(matches!(
            VoyageConfig::from_env(),
            Err(EmbedError::Config(_))
        ));
    }

    #[test]
    fn test_empty_api_key_rejected() {
        assert!(matches!(
            VoyageProvider::new(VoyageConfig::new("")),
            Err(EmbedError::Config(_))
        ));
    }

    #[test]
    fn test_request_serialization() {
        let request = EmbedRequest::new(["time travel"], "voyage-3-large", 2048)
            .with_input_type(InputType::Query);
        let json = serde_json::to_value(VoyageProvider::to_voyage_request(&request)).unwrap();

        assert_eq!(json["input"], serde_json::json!(["time travel"]));
        assert_eq!(json["model"], "voyage-3-large");
        assert_eq!(json["truncation"], true);
        assert_eq!(json["output_dimension"], 2048);
        assert_eq!(json["input_type"], "query");
    }

    #[test]
    fn test_request_serialization_omits_missing_input_type() {
        let request = EmbedRequest::new(["a"], "voyage-3-large", 2048).with_truncation(false);
        let json = serde_json::to_value(VoyageProvider::to_voyage_request(&request)).unwrap();
        assert!(json.get("input_type").is_none());
        assert_eq!(json["truncation"], false);
    }

    #[test]
    fn test_order_embeddings_by_index() {
        let items = vec![item(Some(2), 2.0), item(Some(0), 0.0), item(Some(1), 1.0)];
        let ordered = order_embeddings(items, 3).unwrap();
        let firsts: Vec<f32> = ordered.iter().map(|v| v.as_slice()[0]).collect();
        assert_eq!(firsts, vec![0.0, 1.0, 2.0]);
    }

    #[test]
    fn test_order_embeddings_without_index_keeps_response_order() {
        let items = vec![item(None, 5.0), item(None, 6.0)];
        let ordered = order_embeddings(items, 2).unwrap();
        assert_eq!(ordered[0].as_slice()[0], 5.0);
        assert_eq!(ordered[1].as_slice()[0], 6.0);
    }

    #[test]
    fn test_order_embeddings_rejects_bad_indices() {
        assert!(order_embeddings(vec![item(Some(0), 0.0), item(Some(0), 1.0)], 2).is_err());
        assert!(order_embeddings(vec![item(Some(5), 0.0)], 1).is_err());
        assert!(order_embeddings(vec![item(Some(0), 0.0), item(None, 1.0)], 2).is_err());
        assert!(order_embeddings(vec![item(None, 0.0)], 2).is_err());
    }

    #[test]
    fn test_extract_error_reason() {
        assert_eq!(
            extract_error_reason(r#"{"detail": "Provided API key is invalid."}"#),
            "Provided API key is invalid."
        );
        assert_eq!(
            extract_error_reason(r#"{"error": {"message": "rate limited"}}"#),
            "rate limited"
        );
        assert_eq!(extract_error_reason("upstream timeout\n"), "upstream timeout");
        assert_eq!(extract_error_reason(r#"{"other": 1}"#), r#"{"other": 1}"#);
    }
}
