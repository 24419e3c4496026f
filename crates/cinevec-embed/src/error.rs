//! Error types for the embedding client.

use thiserror::Error;

/// Result type alias for embedding operations.
pub type Result<T> = std::result::Result<T, EmbedError>;

/// Errors that can occur while producing embeddings.
#[derive(Debug, Error)]
pub enum EmbedError {
    /// The provider call did not succeed.
    #[error("Provider error: {0}")]
    Provider(ProviderError),

    /// The request was rejected before any call was made.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The provider answered 2xx but the payload breaks the batch contract.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Details of a failed provider call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderError {
    /// Provider name, e.g. `voyage`.
    pub provider: String,
    /// HTTP status, absent for transport failures.
    pub status: Option<u16>,
    /// Reason reported by the provider (or the transport).
    pub reason: String,
}

impl ProviderError {
    /// A non-2xx answer.
    pub fn status(provider: impl Into<String>, status: u16, reason: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            status: Some(status),
            reason: reason.into(),
        }
    }

    /// The request never got an answer.
    pub fn transport(provider: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            status: None,
            reason: reason.into(),
        }
    }
}

impl std::fmt::Display for ProviderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.status {
            Some(status) => write!(f, "{} returned {}: {}", self.provider, status, self.reason),
            None => write!(f, "{} request failed: {}", self.provider, self.reason),
        }
    }
}

impl From<ProviderError> for EmbedError {
    fn from(e: ProviderError) -> Self {
        EmbedError::Provider(e)
    }
}

impl From<serde_json::Error> for EmbedError {
    fn from(e: serde_json::Error) -> Self {
        EmbedError::Serialization(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = EmbedError::from(ProviderError::status("voyage", 401, "invalid api key"));
        assert_eq!(
            err.to_string(),
            "Provider error: voyage returned 401: invalid api key"
        );

        let err = EmbedError::from(ProviderError::transport("voyage", "connection refused"));
        assert_eq!(
            err.to_string(),
            "Provider error: voyage request failed: connection refused"
        );
    }

    #[test]
    fn test_invalid_request_display() {
        let err = EmbedError::InvalidRequest("empty input batch".to_string());
        assert_eq!(err.to_string(), "Invalid request: empty input batch");
    }
}
