pub mod attachments;
pub mod chat_log;
pub mod chat_service;
pub mod clipboard;
pub mod code_block;
pub mod composer;
pub mod export;
pub mod html;
pub mod markdown;

pub use attachments::{AttachmentError, AttachmentIcon, attachment_from_bytes, load_attachment};
pub use chat_log::{ChatLog, CopyButton, ElementKind, MessageElement};
pub use chat_service::{ChatService, PendingReply, ReplyOutcome};
pub use clipboard::{Clipboard, MemoryClipboard};
pub use code_block::{CodeBlockControl, render_code_block};
pub use composer::{Composer, Submission};
pub use export::{export_conversation, export_html};
pub use markdown::{RenderedMarkdown, markdown_to_html, render_markdown};
