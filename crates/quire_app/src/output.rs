//! Terminal rendering helpers.

use std::io::{self, Write};

use chrono::Utc;
use quire_ai::service::ProviderModels;
use quire_ai::types::ProviderKind;
use quire_core::conversations::{ConversationSummary, format_relative_date};
use quire_core::usage::{UsageCounters, UsageTier};
use quire_ui::chat_log::{ChatLog, ElementKind};

// ---------------------------------------------------------------------------
// Streaming
// ---------------------------------------------------------------------------

/// Tracks what has already been written for a streaming reply so only the
/// newly appended part of each cumulative update is printed.
#[derive(Debug, Default)]
pub struct StreamPrinter {
    printed: String,
}

impl StreamPrinter {
    pub fn new() -> Self {
        Self::default()
    }

    /// The part of `text` not yet printed. `None` when nothing was added, or
    /// when formatting rewrote text that is already on screen; the next
    /// update that extends the printed text catches up.
    pub fn advance<'a>(&mut self, text: &'a str) -> Option<&'a str> {
        let suffix = text.strip_prefix(self.printed.as_str())?;
        if suffix.is_empty() {
            return None;
        }
        self.printed = text.to_string();
        Some(suffix)
    }

    /// Text to print once the reply is final. A reply whose earlier part
    /// was rewritten is printed again in full on a fresh line.
    pub fn finish(&mut self, text: &str) -> Option<String> {
        if let Some(suffix) = self.advance(text) {
            return Some(suffix.to_string());
        }
        if text == self.printed {
            return None;
        }
        self.printed = text.to_string();
        Some(format!("\n{text}"))
    }

    pub fn is_empty(&self) -> bool {
        self.printed.is_empty()
    }
}

pub fn write_flush(text: &str) {
    let mut out = io::stdout().lock();
    let _ = out.write_all(text.as_bytes());
    let _ = out.flush();
}

// ---------------------------------------------------------------------------
// Chat log
// ---------------------------------------------------------------------------

fn label(kind: ElementKind) -> &'static str {
    match kind {
        ElementKind::User => "You",
        ElementKind::Bot => "Assistant",
        ElementKind::Error => "Error",
        ElementKind::Warning => "Warning",
    }
}

/// Print every element from `from` onwards.
pub fn print_log(log: &ChatLog, from: usize) {
    for element in log.elements().iter().skip(from) {
        println!("{}: {}\n", label(element.kind()), element.source());
    }
}

/// Print the warnings and errors added since `from`. Returns how many
/// were printed.
pub fn print_notices(log: &ChatLog, from: usize) -> usize {
    let mut printed = 0;
    for element in log.elements().iter().skip(from) {
        if matches!(element.kind(), ElementKind::Error | ElementKind::Warning) {
            eprintln!("{}: {}", label(element.kind()), element.source());
            printed += 1;
        }
    }
    printed
}

// ---------------------------------------------------------------------------
// Listings
// ---------------------------------------------------------------------------

pub fn print_models(groups: &[ProviderModels], active: &str) {
    for group in groups {
        println!("{}", group.name);
        for model in &group.models {
            let marker = if model.id == active { "*" } else { " " };
            let mut notes = vec![model.tier.to_string().to_lowercase()];
            if model.is_reasoning {
                notes.push("reasoning".into());
            }
            if model.provider != ProviderKind::OpenAI {
                notes.push("coming soon".into());
            }
            println!(
                " {marker} {:<18} {:<18} [{}]",
                model.id,
                model.name,
                notes.join(", ")
            );
        }
    }
}

pub fn print_conversations(summaries: &[ConversationSummary], active: Option<&str>) {
    if summaries.is_empty() {
        println!("No conversations yet.");
        return;
    }
    let now = Utc::now();
    for (i, summary) in summaries.iter().enumerate() {
        let marker = if Some(summary.id.as_str()) == active { "*" } else { " " };
        println!(
            "{marker}{:>3}. {}  ({}, {} messages)  {}",
            i + 1,
            summary.title,
            format_relative_date(summary.updated_at, now),
            summary.message_count,
            short_id(&summary.id)
        );
    }
}

fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}

pub fn print_usage(counters: &UsageCounters, reset: &str) {
    for tier in [UsageTier::Standard, UsageTier::Premium] {
        println!(
            "{tier:<9} {:>5} / {:<5} ({:.0}%), {} remaining",
            counters.used(tier),
            counters.limit(tier),
            counters.percent(tier),
            counters.remaining(tier)
        );
    }
    println!("Resets {reset}");
}

/// Show a key as its first three and last four characters.
pub fn mask_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 8 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..3].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}...{tail}")
}
