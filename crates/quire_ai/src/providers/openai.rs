//! OpenAI provider (GPT-4.x, o-series).
//!
//! Uses raw `reqwest` against `/chat/completions` with `stream: true`; the
//! body is consumed by [`super::openai_sse`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::normalize::normalize_messages;
use super::openai_sse;
use super::{AiProvider, ProviderError};
use crate::model_registry;
use crate::stream::{CancelHandle, CompletionStream, STREAM_CHANNEL_CAPACITY};
use crate::types::{
    ChatMessage, CompletionRequest, ContentPart, ImageUrl, MessageContent, MessageRole, ModelInfo,
    ProviderKind,
};
use quire_core::config::{DEFAULT_TEMPERATURE, ReasoningEffort};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Model used whenever a message carries attachments.
pub const VISION_MODEL: &str = "gpt-4o";

const DEFAULT_MAX_TOKENS: u32 = 2000;
const DEFAULT_MAX_TOKENS_WITH_ATTACHMENTS: u32 = 4000;

// ---------------------------------------------------------------------------
// Wire types (serialization only)
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct OpenAIChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_completion_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reasoning_effort: Option<ReasoningEffort>,
    /// Ask the API to include usage in the final chunk.
    stream_options: StreamOptions,
}

#[derive(Debug, Serialize)]
struct StreamOptions {
    include_usage: bool,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: Option<ErrorBody>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

// ---------------------------------------------------------------------------
// Provider
// ---------------------------------------------------------------------------

pub struct OpenAIProvider {
    api_key: Option<String>,
    base_url: String,
    client: reqwest::Client,
}

impl OpenAIProvider {
    /// Create a provider. A `None` or blank key yields a provider that fails
    /// every request with [`ProviderError::MissingCredential`].
    pub fn new(api_key: Option<String>) -> Self {
        Self::with_base_url(api_key, DEFAULT_BASE_URL.into())
    }

    /// Create a provider with a custom base URL (proxies, compatible servers).
    pub fn with_base_url(api_key: Option<String>, base_url: String) -> Self {
        Self {
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            base_url: base_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    /// Returns `true` for reasoning models (o1, o3, o4) that take
    /// `max_completion_tokens` and `reasoning_effort` instead of
    /// `max_tokens` and `temperature`.
    pub fn is_reasoning_model(model: &str) -> bool {
        model.starts_with("o1") || model.starts_with("o3") || model.starts_with("o4")
    }

    /// Assemble the message list: optional system message, history, then
    /// the new user turn. With attachments the user turn becomes a parts
    /// array and history is flattened to plain text.
    fn build_messages(request: &CompletionRequest) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(request.history.len() + 2);

        if let Some(system) = request
            .options
            .system_message
            .as_deref()
            .filter(|s| !s.trim().is_empty())
        {
            messages.push(ChatMessage::system(system));
        }

        let attachments = &request.options.attachments;
        if attachments.is_empty() {
            messages.extend(request.history.iter().cloned());
            messages.push(ChatMessage::user(request.message.clone()));
            return normalize_messages(messages);
        }

        for past in &request.history {
            messages.push(ChatMessage::new(past.role, past.content.as_text()));
        }

        let mut parts = Vec::with_capacity(attachments.len() + 1);
        if !request.message.trim().is_empty() {
            parts.push(ContentPart::text(request.message.clone()));
        }
        for attachment in attachments {
            if attachment.is_image() {
                parts.push(ContentPart::ImageUrl {
                    image_url: ImageUrl {
                        url: attachment.data_url.clone(),
                        detail: attachment.image_detail(),
                    },
                });
            } else if let Some(text) = &attachment.text_content {
                parts.push(ContentPart::text(format!("File: {}\n{}", attachment.name, text)));
            } else {
                debug!("Attachment {} has no extractable text", attachment.name);
                parts.push(ContentPart::text(format!(
                    "File: {} ({}, {} bytes; contents not included)",
                    attachment.name, attachment.mime_type, attachment.size
                )));
            }
        }
        messages.push(ChatMessage {
            role: MessageRole::User,
            content: MessageContent::Parts(parts),
        });

        normalize_messages(messages)
    }

    /// Model actually sent: the vision model when attachments are present.
    pub fn effective_model(request: &CompletionRequest) -> &str {
        if request.options.attachments.is_empty() {
            &request.model
        } else {
            VISION_MODEL
        }
    }

    fn build_body(&self, request: &CompletionRequest) -> OpenAIChatRequest {
        let model = Self::effective_model(request).to_string();
        let is_reasoning = Self::is_reasoning_model(&model);
        let has_attachments = !request.options.attachments.is_empty();

        let max_tokens = request.options.max_tokens.unwrap_or(if has_attachments {
            DEFAULT_MAX_TOKENS_WITH_ATTACHMENTS
        } else {
            DEFAULT_MAX_TOKENS
        });

        OpenAIChatRequest {
            messages: Self::build_messages(request),
            stream: true,
            max_tokens: (!is_reasoning).then_some(max_tokens),
            max_completion_tokens: is_reasoning.then_some(max_tokens),
            temperature: (!is_reasoning)
                .then(|| request.options.temperature.unwrap_or(DEFAULT_TEMPERATURE)),
            reasoning_effort: if is_reasoning {
                Some(request.options.reasoning_effort.unwrap_or_default())
            } else {
                None
            },
            stream_options: StreamOptions {
                include_usage: true,
            },
            model,
        }
    }

    /// Get the API key or fail before any network traffic.
    fn require_key(&self) -> Result<&str, ProviderError> {
        self.api_key
            .as_deref()
            .ok_or_else(|| ProviderError::MissingCredential {
                provider: "OpenAI".into(),
            })
    }

    /// Send a POST to the chat completions endpoint.
    async fn post_completions(
        &self,
        body: &OpenAIChatRequest,
    ) -> Result<reqwest::Response, ProviderError> {
        let key = self.require_key()?;
        let url = format!("{}/chat/completions", self.base_url);

        let resp = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {key}"))
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            let message = error_message(status, &text);
            warn!("OpenAI request failed ({status}): {message}");
            return Err(ProviderError::Http {
                provider: "OpenAI".into(),
                status: status.as_u16(),
                message,
            });
        }

        Ok(resp)
    }
}

/// `error.message` from a JSON error body, else `API error: <status line>`.
fn error_message(status: reqwest::StatusCode, body: &str) -> String {
    serde_json::from_str::<ErrorEnvelope>(body)
        .ok()
        .and_then(|e| e.error)
        .and_then(|e| e.message)
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| {
            format!(
                "API error: {} {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or("")
            )
            .trim_end()
            .to_string()
        })
}

fn map_reqwest_error(e: reqwest::Error) -> ProviderError {
    if e.is_timeout() {
        ProviderError::Network(format!("Request timed out: {e}"))
    } else if e.is_connect() {
        ProviderError::Network(format!("Connection failed: {e}"))
    } else {
        ProviderError::Network(e.to_string())
    }
}

#[async_trait]
impl AiProvider for OpenAIProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::OpenAI
    }

    fn name(&self) -> &str {
        "OpenAI"
    }

    fn models(&self) -> Vec<ModelInfo> {
        model_registry::models_for_provider(ProviderKind::OpenAI)
            .into_iter()
            .cloned()
            .collect()
    }

    async fn stream_completion(
        &self,
        request: &CompletionRequest,
        cancel: CancelHandle,
    ) -> Result<CompletionStream, ProviderError> {
        let body = self.build_body(request);
        info!(
            "OpenAI request: model={} messages={} attachments={}",
            body.model,
            body.messages.len(),
            request.options.attachments.len()
        );
        let resp = self.post_completions(&body).await?;

        let (tx, rx) = mpsc::channel(STREAM_CHANNEL_CAPACITY);
        tokio::spawn(openai_sse::drive_sse_stream(resp, tx, cancel.clone()));

        Ok(CompletionStream::new(rx, cancel, body.model, ProviderKind::OpenAI))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
