//! Providers whose API is not wired up yet.
//!
//! They list their models so the picker can show them, and answer every
//! request with a fixed notice instead of calling out.

use async_trait::async_trait;
use tracing::info;

use super::{AiProvider, ProviderError};
use crate::model_registry;
use crate::stream::{CancelHandle, CompletionStream, StreamEvent};
use crate::types::{CompletionRequest, ModelInfo, ProviderKind};

pub struct PlaceholderProvider {
    kind: ProviderKind,
    name: String,
}

impl PlaceholderProvider {
    pub fn new(kind: ProviderKind) -> Self {
        Self {
            kind,
            name: kind.to_string(),
        }
    }

    pub fn anthropic() -> Self {
        Self::new(ProviderKind::Anthropic)
    }

    pub fn google() -> Self {
        Self::new(ProviderKind::Google)
    }

    pub fn notice(&self) -> String {
        format!("Support for {} models is coming soon.", self.name)
    }
}

#[async_trait]
impl AiProvider for PlaceholderProvider {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn models(&self) -> Vec<ModelInfo> {
        model_registry::models_for_provider(self.kind)
            .into_iter()
            .cloned()
            .collect()
    }

    async fn stream_completion(
        &self,
        request: &CompletionRequest,
        cancel: CancelHandle,
    ) -> Result<CompletionStream, ProviderError> {
        info!("{} is not supported yet; answering {} locally", self.name, request.model);
        Ok(CompletionStream::from_events(
            vec![
                StreamEvent::Delta(self.notice()),
                StreamEvent::Done { usage: None },
            ],
            request.model.clone(),
            self.kind,
        )
        .with_cancel(cancel))
    }
}
