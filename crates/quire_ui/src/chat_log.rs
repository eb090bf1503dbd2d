//! The on-screen conversation: an ordered list of message elements.
//!
//! User messages are shown verbatim. A bot message starts as a typing
//! indicator and has its whole content replaced on every streaming update;
//! code block controls are re-attached after each replacement and the
//! copy-message control is re-created hidden until the reply completes.
//! Failures turn the bot element into an error element, optionally with a
//! retry control carrying the original submission.

use quire_ai::types::Attachment;
use quire_core::conversations::{AttachmentRef, Conversation};
use quire_core::error_handler::QuireError;
use quire_core::usage::UsageTier;
use tracing::debug;
use uuid::Uuid;

use crate::code_block::{CodeBlockControl, attach_controls};
use crate::composer::Submission;
use crate::html::escape_html;
use crate::markdown::render_markdown;

const TYPING_INDICATOR: &str =
    r#"<div class="typing-indicator"><span></span><span></span><span></span></div>"#;
const COPY_MESSAGE_ICON: &str = r#"<svg class="icon" viewBox="0 0 24 24"><rect x="9" y="9" width="13" height="13" rx="2" ry="2"></rect><path d="M5 15H4a2 2 0 0 1-2-2V4a2 2 0 0 1 2-2h9a2 2 0 0 1 2 2v1"></path></svg>"#;

pub const ERROR_PREFIX: &str = "Sorry, there was an error processing your request: ";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementKind {
    User,
    Bot,
    Error,
    Warning,
}

impl ElementKind {
    fn css_class(&self) -> &'static str {
        match self {
            Self::User => "chat-message user-message",
            Self::Bot => "chat-message bot-message markdown-content",
            Self::Error => "chat-message error-message",
            Self::Warning => "chat-message warning-message",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CopyButton {
    pub visible: bool,
}

#[derive(Debug, Clone)]
pub struct MessageElement {
    id: String,
    kind: ElementKind,
    content_html: String,
    /// Text the element was rendered from; what "copy message" yields.
    source: String,
    code_blocks: Vec<CodeBlockControl>,
    copy_button: Option<CopyButton>,
    streaming: bool,
    retry: Option<Submission>,
}

impl MessageElement {
    fn new(kind: ElementKind, content_html: String, source: String) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            kind,
            content_html,
            source,
            code_blocks: Vec::new(),
            copy_button: None,
            streaming: false,
            retry: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> ElementKind {
        self.kind
    }

    pub fn content_html(&self) -> &str {
        &self.content_html
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn code_blocks(&self) -> &[CodeBlockControl] {
        &self.code_blocks
    }

    pub fn copy_button(&self) -> Option<CopyButton> {
        self.copy_button
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming
    }

    pub fn can_retry(&self) -> bool {
        self.retry.is_some()
    }

    /// Replace the content with `text` rendered as markdown.
    fn render_markdown_content(&mut self, text: &str) {
        let rendered = render_markdown(text);
        self.content_html = rendered.html;
        self.code_blocks = rendered.code_blocks;
        attach_controls(&mut self.code_blocks);
        self.source = text.to_string();
    }

    pub fn to_html(&self) -> String {
        let mut html = format!(
            r#"<div class="{}" data-id="{}">"#,
            self.kind.css_class(),
            self.id
        );
        html.push_str(&self.content_html);
        if let Some(button) = self.copy_button {
            let display = if button.visible { "flex" } else { "none" };
            html.push_str(&format!(
                r#"<button class="copy-message-btn" style="display: {display}">{COPY_MESSAGE_ICON}<span>Copy</span></button>"#
            ));
        }
        html.push_str("</div>");
        html
    }
}

// ---------------------------------------------------------------------------
// ChatLog
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct ChatLog {
    elements: Vec<MessageElement>,
}

impl ChatLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn elements(&self) -> &[MessageElement] {
        &self.elements
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&MessageElement> {
        self.elements.iter().find(|e| e.id == id)
    }

    fn get_mut(&mut self, id: &str) -> Option<&mut MessageElement> {
        self.elements.iter_mut().find(|e| e.id == id)
    }

    pub fn last(&self) -> Option<&MessageElement> {
        self.elements.last()
    }

    pub fn clear(&mut self) {
        self.elements.clear();
    }

    pub fn remove(&mut self, id: &str) -> Option<MessageElement> {
        let idx = self.elements.iter().position(|e| e.id == id)?;
        Some(self.elements.remove(idx))
    }

    fn push(&mut self, element: MessageElement) -> String {
        let id = element.id.clone();
        self.elements.push(element);
        id
    }

    // -- User messages ------------------------------------------------------

    /// Append a user message with inline image previews for image
    /// attachments and a note for the rest.
    pub fn push_user(&mut self, text: &str, attachments: &[Attachment]) -> String {
        let mut html = user_text_html(text);

        let images: Vec<&Attachment> = attachments.iter().filter(|a| a.is_image()).collect();
        if !images.is_empty() {
            html.push_str(r#"<div class="message-attachments">"#);
            for image in images {
                html.push_str(&format!(
                    r#"<div class="message-image-container"><img src="{}" alt="{}" class="message-image"></div>"#,
                    escape_html(&image.data_url),
                    escape_html(&image.name)
                ));
            }
            html.push_str("</div>");
        }

        let others = attachments.iter().filter(|a| !a.is_image()).count();
        html.push_str(&attachment_note(others));

        self.push(MessageElement::new(ElementKind::User, html, text.to_string()))
    }

    /// Append a user message from history, where only attachment
    /// references survive.
    pub fn push_user_from_history(&mut self, text: &str, attachments: &[AttachmentRef]) -> String {
        let mut html = user_text_html(text);
        html.push_str(&attachment_note(attachments.len()));
        self.push(MessageElement::new(ElementKind::User, html, text.to_string()))
    }

    // -- Bot messages -------------------------------------------------------

    /// Append an in-progress bot message showing a typing indicator.
    pub fn push_bot_placeholder(&mut self) -> String {
        let mut element =
            MessageElement::new(ElementKind::Bot, TYPING_INDICATOR.to_string(), String::new());
        element.copy_button = Some(CopyButton { visible: false });
        element.streaming = true;
        self.push(element)
    }

    /// Append a finished bot message.
    pub fn push_bot(&mut self, text: &str) -> String {
        let mut element = MessageElement::new(ElementKind::Bot, String::new(), String::new());
        element.render_markdown_content(text);
        element.copy_button = Some(CopyButton { visible: true });
        self.push(element)
    }

    /// Replace a streaming bot message's content with `text`. The copy
    /// control is re-created hidden.
    pub fn update_bot(&mut self, id: &str, text: &str) -> bool {
        let Some(element) = self.get_mut(id) else {
            return false;
        };
        element.render_markdown_content(text);
        element.copy_button = Some(CopyButton { visible: false });
        true
    }

    /// Mark a bot message complete and reveal its copy control. The content
    /// is only re-rendered if `text` differs from the last update.
    pub fn finish_bot(&mut self, id: &str, text: &str) -> bool {
        let Some(element) = self.get_mut(id) else {
            return false;
        };
        if element.streaming && (element.source != text || element.source.is_empty()) {
            element.render_markdown_content(text);
        }
        element.streaming = false;
        element.copy_button = Some(CopyButton { visible: true });
        true
    }

    /// Turn a message into an error element. A retry control is offered
    /// when the error is retryable and a submission is supplied.
    pub fn fail_bot(&mut self, id: &str, error: &QuireError, retry: Option<Submission>) -> bool {
        let Some(element) = self.get_mut(id) else {
            return false;
        };
        let retry = retry.filter(|_| error.is_retryable());
        let message = error.user_message();

        let mut html = format!("<div>{}{}</div>", ERROR_PREFIX, escape_html(&message));
        if retry.is_some() {
            html.push_str(r#"<button class="retry-btn">Retry</button>"#);
        }

        element.kind = ElementKind::Error;
        element.content_html = html;
        element.source = format!("{ERROR_PREFIX}{message}");
        element.code_blocks.clear();
        element.copy_button = None;
        element.streaming = false;
        element.retry = retry;
        debug!("Message {id} failed: {message}");
        true
    }

    /// Append a standalone error element.
    pub fn push_error(&mut self, error: &QuireError) -> String {
        let id = self.push_bot_placeholder();
        self.fail_bot(&id, error, None);
        id
    }

    /// Remove an error element and hand back its submission for resending.
    pub fn take_retry(&mut self, id: &str) -> Option<Submission> {
        let element = self.get(id)?;
        if element.kind != ElementKind::Error || element.retry.is_none() {
            return None;
        }
        self.remove(id).and_then(|e| e.retry)
    }

    /// Id of the most recent element offering a retry.
    pub fn last_retryable(&self) -> Option<&str> {
        self.elements
            .iter()
            .rev()
            .find(|e| e.can_retry())
            .map(|e| e.id.as_str())
    }

    // -- Warnings -----------------------------------------------------------

    pub fn push_usage_warning(
        &mut self,
        tier: UsageTier,
        used: u32,
        limit: u32,
        reset_time: &str,
    ) -> String {
        let (title, noun) = match tier {
            UsageTier::Premium => ("Premium message limit approaching", "premium"),
            UsageTier::Standard => ("Standard message limit approaching", "standard"),
        };
        let body = format!(
            "You have used {used} of {limit} {noun} messages. Your usage will reset on {reset_time}."
        );
        let html = format!(
            concat!(
                r#"<div class="warning-icon">⚠️</div>"#,
                r#"<div class="warning-content"><p><strong>{title}</strong></p>"#,
                r#"<p>You have used {used} of {limit} {noun} messages.</p>"#,
                r#"<p>Your usage will reset on {reset}.</p></div>"#,
                r#"<button class="dismiss-warning-btn">Dismiss</button>"#,
            ),
            title = title,
            used = used,
            limit = limit,
            noun = noun,
            reset = escape_html(reset_time),
        );
        self.push(MessageElement::new(
            ElementKind::Warning,
            html,
            format!("{title}. {body}"),
        ))
    }

    /// Dismiss a warning element.
    pub fn dismiss(&mut self, id: &str) -> bool {
        match self.get(id) {
            Some(e) if e.kind == ElementKind::Warning => self.remove(id).is_some(),
            _ => false,
        }
    }

    // -- History ------------------------------------------------------------

    /// Replace the log with a stored conversation.
    pub fn render_history(&mut self, conversation: &Conversation) {
        self.clear();
        for msg in &conversation.messages {
            match msg.role.as_str() {
                "user" => {
                    self.push_user_from_history(msg.text(), msg.content.attachments());
                }
                "assistant" => {
                    self.push_bot(msg.text());
                }
                other => debug!("Skipping {other} message in history"),
            }
        }
    }

    // -- Controls -----------------------------------------------------------

    /// Text the copy-message control puts on the clipboard.
    pub fn copy_message_text(&self, id: &str) -> Option<String> {
        let element = self.get(id)?;
        element
            .copy_button
            .filter(|b| b.visible)
            .map(|_| element.source.clone())
    }

    /// Original code of the `index`th code block in a message.
    pub fn copy_code(&self, id: &str, index: usize) -> Option<String> {
        self.get(id)?.code_blocks.get(index).map(CodeBlockControl::copy_text)
    }

    /// Toggle a code block's collapsed state, returning the new state.
    pub fn toggle_code_collapse(&mut self, id: &str, index: usize) -> Option<bool> {
        self.get_mut(id)?
            .code_blocks
            .get_mut(index)
            .map(CodeBlockControl::toggle_collapse)
    }

    /// Most recent finished bot message.
    pub fn last_bot(&self) -> Option<&MessageElement> {
        self.elements
            .iter()
            .rev()
            .find(|e| e.kind == ElementKind::Bot && !e.streaming)
    }

    pub fn to_html(&self) -> String {
        self.elements.iter().map(MessageElement::to_html).collect()
    }
}

fn user_text_html(text: &str) -> String {
    format!(
        r#"<div class="message-text">{}</div>"#,
        escape_html(text).replace('\n', "<br>")
    )
}

fn attachment_note(count: usize) -> String {
    match count {
        0 => String::new(),
        1 => r#"<div class="attachment-note">[Attached 1 file]</div>"#.into(),
        n => format!(r#"<div class="attachment-note">[Attached {n} files]</div>"#),
    }
}
