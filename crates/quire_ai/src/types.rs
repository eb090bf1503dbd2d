use std::fmt;

use quire_core::config::ReasoningEffort;
use quire_core::conversations::AttachmentRef;
use quire_core::usage::UsageTier;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

impl MessageRole {
    /// Map a stored role string. Anything that is not `user` or `system`
    /// is treated as the assistant.
    pub fn from_stored(role: &str) -> Self {
        match role {
            "user" => Self::User,
            "system" => Self::System,
            _ => Self::Assistant,
        }
    }
}

/// Image detail hint for vision models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageDetail {
    Auto,
    Low,
    High,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageUrl {
    pub url: String,
    pub detail: ImageDetail,
}

/// One element of a multi-part message body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

impl ContentPart {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

impl MessageContent {
    /// The concatenated text of the content, ignoring images.
    pub fn as_text(&self) -> String {
        match self {
            Self::Text(t) => t.clone(),
            Self::Parts(parts) => parts
                .iter()
                .filter_map(|p| match p {
                    ContentPart::Text { text } => Some(text.as_str()),
                    ContentPart::ImageUrl { .. } => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: MessageContent,
}

impl ChatMessage {
    pub fn new(role: MessageRole, text: impl Into<String>) -> Self {
        Self {
            role,
            content: MessageContent::Text(text.into()),
        }
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::new(MessageRole::System, text)
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(MessageRole::User, text)
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, text)
    }
}

// ---------------------------------------------------------------------------
// Attachments
// ---------------------------------------------------------------------------

/// A file attached to the message being composed. Lives only as long as
/// the in-flight request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub id: String,
    pub name: String,
    pub mime_type: String,
    pub size: u64,
    /// `data:<mime>;base64,<payload>`
    pub data_url: String,
    /// Extracted text for text-like files.
    pub text_content: Option<String>,
}

impl Attachment {
    pub fn is_image(&self) -> bool {
        self.mime_type.starts_with("image/")
    }

    /// PNG and JPEG images are sent at high detail, everything else auto.
    pub fn image_detail(&self) -> ImageDetail {
        let mime = self.mime_type.to_lowercase();
        if mime.contains("png") || mime.contains("jpg") || mime.contains("jpeg") {
            ImageDetail::High
        } else {
            ImageDetail::Auto
        }
    }

    /// The reference kept in conversation history.
    pub fn to_ref(&self) -> AttachmentRef {
        AttachmentRef {
            id: self.id.clone(),
            name: self.name.clone(),
            mime_type: self.mime_type.clone(),
            size: self.size,
        }
    }
}

// ---------------------------------------------------------------------------
// Requests & results
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompletionOptions {
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub system_message: Option<String>,
    pub attachments: Vec<Attachment>,
    pub reasoning_effort: Option<ReasoningEffort>,
}

/// One user turn plus the conversation that precedes it.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub model: String,
    pub message: String,
    pub history: Vec<ChatMessage>,
    pub options: CompletionOptions,
}

impl CompletionRequest {
    pub fn new(model: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            message: message.into(),
            history: Vec::new(),
            options: CompletionOptions::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    /// The server sent its end-of-stream sentinel.
    Done,
    /// The transport closed without a sentinel.
    EndOfStream,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompletionResult {
    /// Final formatted text.
    pub text: String,
    pub model: String,
    pub provider: ProviderKind,
    pub usage: Option<TokenUsage>,
    pub finish: FinishReason,
}

// ---------------------------------------------------------------------------
// Providers & models
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    OpenAI,
    Anthropic,
    Google,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 3] = [Self::OpenAI, Self::Anthropic, Self::Google];

    /// Stable lowercase id used in settings.
    pub fn id(&self) -> &'static str {
        match self {
            Self::OpenAI => "openai",
            Self::Anthropic => "anthropic",
            Self::Google => "google",
        }
    }

    pub fn from_id(id: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.id() == id)
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format_provider_name(self.id()))
    }
}

/// Display name for a provider id: `OpenAI`, `Anthropic`, `Google`, `xAI`,
/// otherwise the id with its first letter upper-cased.
pub fn format_provider_name(id: &str) -> String {
    match id {
        "openai" => "OpenAI".into(),
        "anthropic" => "Anthropic".into(),
        "google" => "Google".into(),
        "xai" => "xAI".into(),
        other => {
            let mut chars = other.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub id: String,
    pub name: String,
    pub description: String,
    pub provider: ProviderKind,
    pub max_tokens: u32,
    pub tier: UsageTier,
    pub is_reasoning: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attachment(mime: &str) -> Attachment {
        Attachment {
            id: "a".into(),
            name: "f".into(),
            mime_type: mime.into(),
            size: 1,
            data_url: format!("data:{mime};base64,AA=="),
            text_content: None,
        }
    }

    #[test]
    fn content_part_wire_shape() {
        let parts = MessageContent::Parts(vec![
            ContentPart::text("hi"),
            ContentPart::ImageUrl {
                image_url: ImageUrl {
                    url: "data:image/png;base64,AA==".into(),
                    detail: ImageDetail::High,
                },
            },
        ]);
        let json = serde_json::to_value(&parts).unwrap();
        assert_eq!(json[0]["type"], "text");
        assert_eq!(json[0]["text"], "hi");
        assert_eq!(json[1]["type"], "image_url");
        assert_eq!(json[1]["image_url"]["detail"], "high");
    }

    #[test]
    fn text_content_serializes_as_string() {
        let msg = ChatMessage::user("hello");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["role"], "user");
        assert_eq!(json["content"], "hello");
    }

    #[test]
    fn as_text_skips_images() {
        let content = MessageContent::Parts(vec![
            ContentPart::text("a"),
            ContentPart::ImageUrl {
                image_url: ImageUrl {
                    url: "x".into(),
                    detail: ImageDetail::Auto,
                },
            },
            ContentPart::text("b"),
        ]);
        assert_eq!(content.as_text(), "a\nb");
    }

    #[test]
    fn image_detail_by_mime() {
        assert_eq!(attachment("image/png").image_detail(), ImageDetail::High);
        assert_eq!(attachment("image/jpeg").image_detail(), ImageDetail::High);
        assert_eq!(attachment("image/gif").image_detail(), ImageDetail::Auto);
        assert!(attachment("image/webp").is_image());
        assert!(!attachment("application/pdf").is_image());
    }

    #[test]
    fn provider_names() {
        assert_eq!(ProviderKind::OpenAI.to_string(), "OpenAI");
        assert_eq!(format_provider_name("xai"), "xAI");
        assert_eq!(format_provider_name("mistral"), "Mistral");
        assert_eq!(format_provider_name(""), "");
        assert_eq!(ProviderKind::from_id("google"), Some(ProviderKind::Google));
        assert_eq!(ProviderKind::from_id("groq"), None);
    }

    #[test]
    fn stored_roles_map() {
        assert_eq!(MessageRole::from_stored("user"), MessageRole::User);
        assert_eq!(MessageRole::from_stored("system"), MessageRole::System);
        assert_eq!(MessageRole::from_stored("assistant"), MessageRole::Assistant);
    }
}
