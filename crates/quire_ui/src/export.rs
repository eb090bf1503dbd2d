//! Printable HTML export of a conversation.

use quire_core::conversations::Conversation;

use crate::chat_log::ChatLog;
use crate::html::escape_html;

const PRINT_STYLE: &str = "<style>\
body { font-family: Inter, Arial, sans-serif; margin: 40px; }\
.chat-message { margin-bottom: 24px; }\
.user-message .message-text { font-weight: bold; }\
.code-block { background: #f5f5f5; padding: 12px; white-space: pre-wrap; }\
.code-controls, .copy-message-btn, .retry-btn, .dismiss-warning-btn { display: none !important; }\
@media print { .chat-message { page-break-inside: avoid; } }\
</style>";

/// A standalone document containing the rendered chat log.
pub fn export_html(log: &ChatLog) -> String {
    export_with_title(log, None)
}

/// Render a stored conversation and export it, with its title as a
/// subheading.
pub fn export_conversation(conversation: &Conversation) -> String {
    let mut log = ChatLog::new();
    log.render_history(conversation);
    export_with_title(&log, Some(&conversation.title))
}

fn export_with_title(log: &ChatLog, title: Option<&str>) -> String {
    let mut doc = String::from("<!DOCTYPE html><html><head><meta charset=\"utf-8\">");
    doc.push_str("<title>Conversation Export</title>");
    doc.push_str(PRINT_STYLE);
    doc.push_str("</head><body><h2>Conversation History</h2>");
    if let Some(title) = title {
        doc.push_str(&format!("<h3>{}</h3>", escape_html(title)));
    }
    doc.push_str(&log.to_html());
    doc.push_str("</body></html>");
    doc
}
