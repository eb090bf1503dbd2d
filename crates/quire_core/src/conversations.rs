use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::storage::LocalStore;

pub const KEY_CONVERSATIONS: &str = "conversations";
pub const KEY_ACTIVE_CONVERSATION: &str = "active_conversation_id";

const TITLE_MAX_LEN: usize = 50;
const PREVIEW_MAX_LEN: usize = 100;

// ---------------------------------------------------------------------------
// Data types
// ---------------------------------------------------------------------------

/// Reference to an attachment that was sent with a message. The payload
/// itself is never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentRef {
    pub id: String,
    pub name: String,
    pub mime_type: String,
    pub size: u64,
}

/// Message body: plain text, or text plus the attachments it carried.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StoredContent {
    Text(String),
    Rich {
        text: String,
        attachments: Vec<AttachmentRef>,
    },
}

impl StoredContent {
    pub fn text(&self) -> &str {
        match self {
            Self::Text(t) => t,
            Self::Rich { text, .. } => text,
        }
    }

    pub fn attachments(&self) -> &[AttachmentRef] {
        match self {
            Self::Text(_) => &[],
            Self::Rich { attachments, .. } => attachments,
        }
    }
}

/// A single message stored inside a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredMessage {
    pub role: String,
    pub content: StoredContent,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl StoredMessage {
    pub fn user(text: impl Into<String>, attachments: Vec<AttachmentRef>) -> Self {
        let text = text.into();
        let content = if attachments.is_empty() {
            StoredContent::Text(text)
        } else {
            StoredContent::Rich { text, attachments }
        };
        Self {
            role: "user".into(),
            content,
            timestamp: Utc::now(),
            model: None,
        }
    }

    pub fn assistant(text: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            role: "assistant".into(),
            content: StoredContent::Text(text.into()),
            timestamp: Utc::now(),
            model: Some(model.into()),
        }
    }

    pub fn text(&self) -> &str {
        self.content.text()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: String,
    pub title: String,
    pub messages: Vec<StoredMessage>,
    pub model: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    pub fn new(model: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            title: "New Conversation".into(),
            messages: Vec::new(),
            model: model.into(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Append a message and refresh the title and timestamp. Messages are
    /// never reordered or edited once appended.
    pub fn add_message(&mut self, msg: StoredMessage) {
        self.updated_at = msg.timestamp.max(self.updated_at);
        if let Some(model) = &msg.model {
            self.model = model.clone();
        }
        self.messages.push(msg);
        self.title = generate_title(&self.messages);
    }
}

/// Summary row for the conversation list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSummary {
    pub id: String,
    pub title: String,
    /// First ~100 characters of the last message.
    pub preview: String,
    pub message_count: usize,
    pub model: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Conversation> for ConversationSummary {
    fn from(c: &Conversation) -> Self {
        Self {
            id: c.id.clone(),
            title: c.title.clone(),
            preview: c
                .messages
                .last()
                .map(|m| make_preview(m.text(), PREVIEW_MAX_LEN))
                .unwrap_or_default(),
            message_count: c.messages.len(),
            model: c.model.clone(),
            created_at: c.created_at,
            updated_at: c.updated_at,
        }
    }
}

// ---------------------------------------------------------------------------
// Title / preview / date helpers
// ---------------------------------------------------------------------------

/// Generates a title from the first user message, truncated to 50 chars.
pub fn generate_title(messages: &[StoredMessage]) -> String {
    let first_user = messages
        .iter()
        .find(|m| m.role == "user" && !m.text().trim().is_empty());
    match first_user {
        Some(msg) => make_preview(msg.text(), TITLE_MAX_LEN),
        None => match messages.iter().find(|m| m.role == "user") {
            Some(msg) if !msg.content.attachments().is_empty() => {
                format!("Attachment: {}", msg.content.attachments()[0].name)
            }
            _ => "New Conversation".to_string(),
        },
    }
}

fn make_preview(content: &str, max_len: usize) -> String {
    let trimmed = content.trim();
    if trimmed.len() <= max_len {
        trimmed.to_string()
    } else {
        let boundary = trimmed
            .char_indices()
            .take_while(|(i, _)| *i < max_len)
            .last()
            .map(|(i, c)| i + c.len_utf8())
            .unwrap_or(max_len);
        format!("{}...", &trimmed[..boundary])
    }
}

/// `Today`, `Yesterday`, a weekday name within the last week, otherwise an
/// ISO date. Both instants are compared in local time.
pub fn format_relative_date(at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let day = at.with_timezone(&Local).date_naive();
    let today = now.with_timezone(&Local).date_naive();
    let days = (today - day).num_days();
    match days {
        0 => "Today".to_string(),
        1 => "Yesterday".to_string(),
        2..=6 => day.format("%A").to_string(),
        _ => day.format("%Y-%m-%d").to_string(),
    }
}

// ---------------------------------------------------------------------------
// ConversationStore
// ---------------------------------------------------------------------------

/// Conversations kept as one JSON array under `conversations` in the local
/// store, plus the id of the active one.
pub struct ConversationStore {
    store: Arc<LocalStore>,
}

impl ConversationStore {
    pub fn new(store: Arc<LocalStore>) -> Self {
        Self { store }
    }

    fn load_all(&self) -> Vec<Conversation> {
        self.store
            .get_json::<Vec<Conversation>>(KEY_CONVERSATIONS)
            .unwrap_or_default()
    }

    fn save_all(&self, conversations: &[Conversation]) -> Result<()> {
        self.store
            .set_json(KEY_CONVERSATIONS, &conversations)
            .context("Failed to save conversations")
    }

    /// Start a new empty conversation and make it active.
    pub fn create(&self, model: &str) -> Result<Conversation> {
        let conversation = Conversation::new(model);
        let mut all = self.load_all();
        all.push(conversation.clone());
        self.save_all(&all)?;
        self.set_active(&conversation.id)?;
        info!("Created conversation {}", conversation.id);
        Ok(conversation)
    }

    pub fn get(&self, id: &str) -> Option<Conversation> {
        self.load_all().into_iter().find(|c| c.id == id)
    }

    /// Summaries sorted by `updated_at`, newest first.
    pub fn list(&self) -> Vec<ConversationSummary> {
        let mut summaries: Vec<ConversationSummary> =
            self.load_all().iter().map(ConversationSummary::from).collect();
        summaries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        summaries
    }

    /// Case-insensitive match over titles and message text.
    pub fn search(&self, query: &str) -> Vec<ConversationSummary> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return self.list();
        }
        let mut hits: Vec<ConversationSummary> = self
            .load_all()
            .iter()
            .filter(|c| {
                c.title.to_lowercase().contains(&needle)
                    || c.messages
                        .iter()
                        .any(|m| m.text().to_lowercase().contains(&needle))
            })
            .map(ConversationSummary::from)
            .collect();
        hits.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        hits
    }

    /// Append `message` to conversation `id`. On a storage failure the
    /// stored conversation is left as it was.
    pub fn append_message(&self, id: &str, message: StoredMessage) -> Result<Conversation> {
        let mut all = self.load_all();
        let conversation = all
            .iter_mut()
            .find(|c| c.id == id)
            .with_context(|| format!("Conversation {id} not found"))?;
        conversation.add_message(message);
        let updated = conversation.clone();
        self.save_all(&all)?;
        Ok(updated)
    }

    pub fn active_id(&self) -> Option<String> {
        self.store.get(KEY_ACTIVE_CONVERSATION)
    }

    pub fn active(&self) -> Option<Conversation> {
        self.get(&self.active_id()?)
    }

    pub fn set_active(&self, id: &str) -> Result<()> {
        self.store
            .set(KEY_ACTIVE_CONVERSATION, id)
            .context("Failed to store active conversation")
    }

    /// Delete conversation `id`. If it was active, the most recently
    /// updated remaining conversation becomes active.
    pub fn delete(&self, id: &str) -> Result<bool> {
        let mut all = self.load_all();
        let before = all.len();
        all.retain(|c| c.id != id);
        if all.len() == before {
            warn!("Delete requested for unknown conversation {id}");
            return Ok(false);
        }
        self.save_all(&all)?;

        if self.active_id().as_deref() == Some(id) {
            match all.iter().max_by_key(|c| c.updated_at) {
                Some(next) => self.set_active(&next.id)?,
                None => {
                    self.store
                        .remove(KEY_ACTIVE_CONVERSATION)
                        .context("Failed to clear active conversation")?;
                }
            }
        }
        info!("Deleted conversation {id}");
        Ok(true)
    }
}
