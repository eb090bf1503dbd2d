//! AI provider trait and implementations.
//!
//! Each provider module exposes a struct that implements [`AiProvider`].

pub mod normalize;
pub mod openai;
pub(crate) mod openai_sse;
pub mod placeholder;

use async_trait::async_trait;
use quire_core::error_handler::QuireError;

use crate::stream::{CancelHandle, CompletionStream};
use crate::types::{CompletionRequest, CompletionResult, ModelInfo, ProviderKind};

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors that any provider may return.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProviderError {
    #[error("{provider} API key is not configured. Add it in settings.")]
    MissingCredential { provider: String },

    #[error("{provider} API error: {message}")]
    Http {
        provider: String,
        status: u16,
        message: String,
    },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Model not available: {0}")]
    ModelUnavailable(String),

    #[error("Provider error: {0}")]
    Other(String),
}

impl From<ProviderError> for QuireError {
    fn from(e: ProviderError) -> Self {
        match e {
            ProviderError::MissingCredential { .. } | ProviderError::ModelUnavailable(_) => {
                QuireError::Config(e.to_string())
            }
            ProviderError::Http { .. } | ProviderError::Network(_) => {
                QuireError::Transport(e.to_string())
            }
            ProviderError::Other(msg) => QuireError::Internal(msg),
        }
    }
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Unified interface for every chat backend.
#[async_trait]
pub trait AiProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// Human-readable display name.
    fn name(&self) -> &str;

    /// Models this provider serves, in picker order.
    fn models(&self) -> Vec<ModelInfo>;

    fn supports_model(&self, model: &str) -> bool {
        self.models().iter().any(|m| m.id == model)
    }

    /// Start a streaming completion. Fails before any network traffic when
    /// the request cannot be sent (e.g. a missing credential).
    async fn stream_completion(
        &self,
        request: &CompletionRequest,
        cancel: CancelHandle,
    ) -> Result<CompletionStream, ProviderError>;

    /// Stream a completion to the end, invoking `on_update` with the
    /// cumulative formatted text after every increment.
    async fn generate_completion(
        &self,
        request: &CompletionRequest,
        cancel: CancelHandle,
        on_update: &mut (dyn for<'a> FnMut(&'a str) + Send),
    ) -> Result<CompletionResult, ProviderError> {
        let stream = self.stream_completion(request, cancel).await?;
        stream.collect_with(|text| on_update(text)).await
    }
}
