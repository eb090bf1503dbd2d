//! AI Service: the routing layer between the chat UI and providers.
//!
//! Holds one provider per [`ProviderKind`] and sends each request to the
//! provider that serves the requested model.

use std::sync::Arc;

use tracing::{debug, info};

use crate::model_registry;
use crate::providers::openai::{DEFAULT_BASE_URL, OpenAIProvider};
use crate::providers::placeholder::PlaceholderProvider;
use crate::providers::{AiProvider, ProviderError};
use crate::stream::{CancelHandle, CompletionStream};
use crate::types::{CompletionRequest, CompletionResult, ModelInfo, ProviderKind};
use quire_core::usage::UsageTier;

// ---------------------------------------------------------------------------
// Config bridge
// ---------------------------------------------------------------------------

/// Provider configuration passed from the config layer.
#[derive(Debug, Clone)]
pub struct AiServiceConfig {
    pub openai_api_key: Option<String>,
    pub openai_base_url: String,
}

impl Default for AiServiceConfig {
    fn default() -> Self {
        Self {
            openai_api_key: None,
            openai_base_url: DEFAULT_BASE_URL.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// AiService
// ---------------------------------------------------------------------------

/// A provider together with the models it lists, in picker order.
#[derive(Debug, Clone)]
pub struct ProviderModels {
    pub kind: ProviderKind,
    pub name: String,
    pub models: Vec<ModelInfo>,
}

pub struct AiService {
    providers: Vec<Arc<dyn AiProvider>>,
}

impl AiService {
    /// Register OpenAI (with whatever key is configured, possibly none) and
    /// the not-yet-supported vendors.
    pub fn new(config: AiServiceConfig) -> Self {
        let openai = OpenAIProvider::with_base_url(config.openai_api_key, config.openai_base_url);
        info!("AI service ready (OpenAI, Anthropic and Google placeholders)");
        Self::with_providers(vec![
            Arc::new(openai),
            Arc::new(PlaceholderProvider::anthropic()),
            Arc::new(PlaceholderProvider::google()),
        ])
    }

    /// Build a service over an explicit provider set.
    pub fn with_providers(providers: Vec<Arc<dyn AiProvider>>) -> Self {
        Self { providers }
    }

    pub fn available_providers(&self) -> Vec<ProviderKind> {
        self.providers.iter().map(|p| p.kind()).collect()
    }

    pub fn provider(&self, kind: ProviderKind) -> Option<Arc<dyn AiProvider>> {
        self.providers.iter().find(|p| p.kind() == kind).cloned()
    }

    /// The provider serving `model`, if any.
    pub fn provider_for_model(&self, model: &str) -> Option<Arc<dyn AiProvider>> {
        self.providers
            .iter()
            .find(|p| p.supports_model(model))
            .cloned()
    }

    /// Every provider with its models, for the model picker.
    pub fn grouped_models(&self) -> Vec<ProviderModels> {
        self.providers
            .iter()
            .map(|p| ProviderModels {
                kind: p.kind(),
                name: p.name().to_string(),
                models: p.models(),
            })
            .collect()
    }

    pub fn all_models(&self) -> Vec<ModelInfo> {
        self.providers.iter().flat_map(|p| p.models()).collect()
    }

    pub fn find_model(&self, model: &str) -> Option<ModelInfo> {
        self.all_models().into_iter().find(|m| m.id == model)
    }

    /// Usage tier the model is charged against.
    pub fn model_tier(&self, model: &str) -> UsageTier {
        self.find_model(model)
            .map_or_else(|| model_registry::model_tier(model), |m| m.tier)
    }

    fn resolve(&self, model: &str) -> Result<Arc<dyn AiProvider>, ProviderError> {
        self.provider_for_model(model)
            .ok_or_else(|| ProviderError::ModelUnavailable(model.to_string()))
    }

    pub async fn stream_completion(
        &self,
        request: &CompletionRequest,
        cancel: CancelHandle,
    ) -> Result<CompletionStream, ProviderError> {
        let provider = self.resolve(&request.model)?;
        info!("Starting stream to {} model={}", provider.name(), request.model);
        provider.stream_completion(request, cancel).await
    }

    pub async fn generate_completion(
        &self,
        request: &CompletionRequest,
        cancel: CancelHandle,
        on_update: &mut (dyn for<'a> FnMut(&'a str) + Send),
    ) -> Result<CompletionResult, ProviderError> {
        let provider = self.resolve(&request.model)?;
        debug!("Routing {} to {}", request.model, provider.name());
        provider.generate_completion(request, cancel, on_update).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_service_routes_by_model() {
        let service = AiService::new(AiServiceConfig::default());
        assert_eq!(
            service.available_providers(),
            vec![ProviderKind::OpenAI, ProviderKind::Anthropic, ProviderKind::Google]
        );
        assert_eq!(
            service.provider_for_model("gpt-4.1").unwrap().kind(),
            ProviderKind::OpenAI
        );
        assert_eq!(
            service.provider_for_model("claude-3-sonnet").unwrap().kind(),
            ProviderKind::Anthropic
        );
        assert!(service.provider_for_model("llama-3").is_none());
    }

    #[test]
    fn grouped_models_follow_provider_order() {
        let service = AiService::new(AiServiceConfig::default());
        let groups = service.grouped_models();
        assert_eq!(groups.len(), 3);
        assert_eq!(groups[0].name, "OpenAI");
        assert_eq!(groups[0].models[0].id, "gpt-4.1");
        assert_eq!(groups[2].models[0].id, "gemini-2.5-pro");
        assert_eq!(service.all_models().len(), 8);
    }

    #[test]
    fn tiers() {
        let service = AiService::new(AiServiceConfig::default());
        assert_eq!(service.model_tier("gpt-4.1-mini"), UsageTier::Standard);
        assert_eq!(service.model_tier("o4-mini"), UsageTier::Premium);
        assert_eq!(service.model_tier("mystery"), UsageTier::Standard);
    }

    #[tokio::test]
    async fn unknown_model_is_unavailable() {
        let service = AiService::new(AiServiceConfig::default());
        let err = service
            .stream_completion(&CompletionRequest::new("llama-3", "hi"), CancelHandle::new())
            .await
            .err()
            .unwrap();
        assert_eq!(err, ProviderError::ModelUnavailable("llama-3".into()));
    }

    #[tokio::test]
    async fn missing_openai_key_is_reported() {
        let service = AiService::new(AiServiceConfig::default());
        let err = service
            .generate_completion(
                &CompletionRequest::new("gpt-4.1-mini", "hi"),
                CancelHandle::new(),
                &mut |_: &str| {},
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::MissingCredential { .. }));
    }

    #[tokio::test]
    async fn placeholder_vendors_answer_locally() {
        let service = AiService::new(AiServiceConfig::default());
        let result = service
            .generate_completion(
                &CompletionRequest::new("gemini-2.5-pro", "hi"),
                CancelHandle::new(),
                &mut |_: &str| {},
            )
            .await
            .unwrap();
        assert_eq!(result.text, "Support for Google models is coming soon.");
    }

    #[tokio::test]
    async fn placeholder_models_are_listed_and_routable() {
        let service = AiService::new(AiServiceConfig::default());
        let model = service.find_model("claude-3-opus").unwrap();
        assert_eq!(model.provider, ProviderKind::Anthropic);

        let stream = service
            .stream_completion(&CompletionRequest::new("claude-3-opus", "hi"), CancelHandle::new())
            .await;
        assert!(stream.is_ok());
    }
}
