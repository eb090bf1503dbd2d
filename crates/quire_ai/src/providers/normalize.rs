//! Message list cleanup before a request is sent.
//!
//! Chat endpoints reject (or silently mishandle) several system messages
//! and back-to-back turns from the same role. [`normalize_messages`] keeps
//! the first system message, puts it first, and folds each run of
//! same-role messages into one so the remaining roles strictly alternate.

use tracing::debug;

use crate::types::{ChatMessage, ContentPart, MessageContent, MessageRole};

pub fn normalize_messages(messages: Vec<ChatMessage>) -> Vec<ChatMessage> {
    let mut system: Option<ChatMessage> = None;
    let mut turns: Vec<ChatMessage> = Vec::with_capacity(messages.len());

    for msg in messages {
        if msg.role == MessageRole::System {
            if system.is_none() {
                system = Some(msg);
            } else {
                debug!("Dropping additional system message");
            }
            continue;
        }

        match turns.last_mut() {
            Some(last) if last.role == msg.role => merge_content(&mut last.content, msg.content),
            _ => turns.push(msg),
        }
    }

    let mut out = Vec::with_capacity(turns.len() + 1);
    out.extend(system);
    out.extend(turns);
    out
}

/// Append `next` to `target`, preserving order.
///
/// - text + text: joined with a newline
/// - parts + text: appended to the first text part, or added as one
/// - text + parts / parts + parts: concatenated into one parts list
fn merge_content(target: &mut MessageContent, next: MessageContent) {
    let current = std::mem::replace(target, MessageContent::Parts(Vec::new()));
    *target = match (current, next) {
        (MessageContent::Text(mut a), MessageContent::Text(b)) => {
            a.push('\n');
            a.push_str(&b);
            MessageContent::Text(a)
        }
        (MessageContent::Parts(mut parts), MessageContent::Text(b)) => {
            let first_text = parts.iter_mut().find_map(|p| match p {
                ContentPart::Text { text } => Some(text),
                ContentPart::ImageUrl { .. } => None,
            });
            match first_text {
                Some(text) => {
                    text.push('\n');
                    text.push_str(&b);
                }
                None => parts.push(ContentPart::text(b)),
            }
            MessageContent::Parts(parts)
        }
        (MessageContent::Text(a), MessageContent::Parts(b)) => MessageContent::Parts(
            std::iter::once(ContentPart::text(a)).chain(b).collect(),
        ),
        (MessageContent::Parts(mut a), MessageContent::Parts(b)) => {
            a.extend(b);
            MessageContent::Parts(a)
        }
    };
}
