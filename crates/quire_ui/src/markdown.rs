//! Lightweight markdown renderer for assistant replies.
//!
//! Rendering is two pure steps: [`parse`] turns text into a list of
//! [`MarkdownBlock`]s, and [`render`] turns that list into HTML. Only the
//! subset models actually emit is recognized: fenced code, `#`–`###`
//! headings, `**bold**`, `*italic*`, `` `code` ``, `[links](url)` and
//! `*`/`-` list items. Every other newline becomes `<br>`.
//!
//! The text may be a partial reply: an opening fence without its closing
//! fence is rendered as an open code block so that code streams in place.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::code_block::{CodeBlockControl, render_code_block};
use crate::html::escape_html;

// ---------------------------------------------------------------------------
// Node types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inline {
    Text(String),
    Code(String),
    Strong(Vec<Inline>),
    Emphasis(Vec<Inline>),
    Link { label: Vec<Inline>, href: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarkdownBlock {
    Heading { level: u8, content: Vec<Inline> },
    ListItem(Vec<Inline>),
    /// One line of prose.
    Line(Vec<Inline>),
    /// A newline between two prose lines or around a code block.
    LineBreak,
    CodeBlock {
        language: String,
        code: String,
        /// `false` while the closing fence has not arrived yet.
        closed: bool,
    },
}

/// HTML plus one control per code block, in document order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderedMarkdown {
    pub html: String,
    pub code_blocks: Vec<CodeBlockControl>,
}

// ---------------------------------------------------------------------------
// Block parsing
// ---------------------------------------------------------------------------

const FENCE: &str = "```";
const DEFAULT_LANGUAGE: &str = "text";

fn is_language_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '#' | '+' | '-')
}

/// Parse markdown into blocks. Fenced code is extracted first so its
/// content is never interpreted.
pub fn parse(text: &str) -> Vec<MarkdownBlock> {
    let mut blocks = Vec::new();
    let mut rest = text;

    while let Some(start) = rest.find(FENCE) {
        parse_prose(&rest[..start], &mut blocks);

        let after_fence = &rest[start + FENCE.len()..];
        let lang_len = after_fence
            .find(|c: char| !is_language_char(c))
            .unwrap_or(after_fence.len());
        let language = match &after_fence[..lang_len] {
            "" => DEFAULT_LANGUAGE.to_string(),
            tag => tag.to_string(),
        };
        let mut body = &after_fence[lang_len..];
        body = body.strip_prefix('\n').unwrap_or(body);

        match body.find(FENCE) {
            Some(end) => {
                blocks.push(code_block(language, &body[..end], true));
                rest = &body[end + FENCE.len()..];
            }
            None => {
                blocks.push(code_block(language, body, false));
                rest = "";
            }
        }
    }
    parse_prose(rest, &mut blocks);
    blocks
}

fn code_block(language: String, raw: &str, closed: bool) -> MarkdownBlock {
    let code = raw.strip_suffix('\n').unwrap_or(raw);
    MarkdownBlock::CodeBlock {
        language,
        code: code.to_string(),
        closed,
    }
}

/// Split a prose segment into lines. Each `\n` becomes a [`MarkdownBlock::LineBreak`];
/// empty lines produce no node of their own.
fn parse_prose(text: &str, blocks: &mut Vec<MarkdownBlock>) {
    for (i, line) in text.split('\n').enumerate() {
        if i > 0 {
            blocks.push(MarkdownBlock::LineBreak);
        }
        if !line.is_empty() {
            blocks.push(parse_line(line));
        }
    }
}

fn parse_line(line: &str) -> MarkdownBlock {
    for (prefix, level) in [("### ", 3), ("## ", 2), ("# ", 1)] {
        if let Some(title) = line.strip_prefix(prefix) {
            return MarkdownBlock::Heading {
                level,
                content: parse_inlines(title),
            };
        }
    }

    let trimmed = line.trim_start();
    for marker in ['*', '-'] {
        if let Some(item) = trimmed.strip_prefix(marker)
            && item.starts_with(char::is_whitespace)
        {
            return MarkdownBlock::ListItem(parse_inlines(item.trim_start()));
        }
    }

    MarkdownBlock::Line(parse_inlines(line))
}

// ---------------------------------------------------------------------------
// Inline parsing
// ---------------------------------------------------------------------------

static INLINE_CODE: Lazy<Regex> = Lazy::new(|| Regex::new(r"`([^`\n]+)`").expect("valid regex"));
static LINK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[([^\]\n]+)\]\(([^)\s]+)\)").expect("valid regex"));
static STRONG: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*\*(.+?)\*\*").expect("valid regex"));
static EMPHASIS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*([^*\n]+)\*").expect("valid regex"));

#[derive(Clone, Copy)]
enum InlineKind {
    Code,
    Link,
    Strong,
    Emphasis,
}

/// Inline patterns in priority order. Code comes first so backticked
/// asterisks never turn into emphasis.
fn inline_patterns() -> [(InlineKind, &'static Regex); 4] {
    [
        (InlineKind::Code, &*INLINE_CODE),
        (InlineKind::Link, &*LINK),
        (InlineKind::Strong, &*STRONG),
        (InlineKind::Emphasis, &*EMPHASIS),
    ]
}

/// Parse one line of inline markup. The earliest match wins; on a tie the
/// pattern listed first in [`inline_patterns`] wins.
pub fn parse_inlines(text: &str) -> Vec<Inline> {
    let mut out = Vec::new();
    let mut rest = text;

    loop {
        let next = inline_patterns()
            .into_iter()
            .filter_map(|(kind, re)| re.captures(rest).map(|caps| (kind, caps)))
            .min_by_key(|(_, caps)| caps.get(0).map_or(usize::MAX, |m| m.start()));

        let Some((kind, caps)) = next else {
            push_text(&mut out, rest);
            break;
        };
        let (Some(whole), Some(first)) = (caps.get(0), caps.get(1)) else {
            push_text(&mut out, rest);
            break;
        };

        push_text(&mut out, &rest[..whole.start()]);
        match kind {
            InlineKind::Code => out.push(Inline::Code(first.as_str().to_string())),
            InlineKind::Strong => out.push(Inline::Strong(parse_inlines(first.as_str()))),
            InlineKind::Emphasis => out.push(Inline::Emphasis(parse_inlines(first.as_str()))),
            InlineKind::Link => {
                let href = caps.get(2).map_or("", |m| m.as_str());
                if is_safe_href(href) {
                    out.push(Inline::Link {
                        label: parse_inlines(first.as_str()),
                        href: href.to_string(),
                    });
                } else {
                    push_text(&mut out, whole.as_str());
                }
            }
        }
        rest = &rest[whole.end()..];
    }

    out
}

fn push_text(out: &mut Vec<Inline>, text: &str) {
    if text.is_empty() {
        return;
    }
    if let Some(Inline::Text(prev)) = out.last_mut() {
        prev.push_str(text);
    } else {
        out.push(Inline::Text(text.to_string()));
    }
}

/// Rejects script-capable URL schemes.
pub fn is_safe_href(href: &str) -> bool {
    let normalized: String = href
        .chars()
        .filter(|c| !c.is_whitespace() && !c.is_control())
        .collect::<String>()
        .to_ascii_lowercase();
    !["javascript:", "vbscript:", "data:"]
        .iter()
        .any(|scheme| normalized.starts_with(scheme))
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

/// Render blocks to HTML, collecting a control for every code block.
pub fn render(blocks: &[MarkdownBlock]) -> RenderedMarkdown {
    let mut html = String::new();
    let mut code_blocks = Vec::new();

    for block in blocks {
        match block {
            MarkdownBlock::Heading { level, content } => {
                html.push_str(&format!("<h{level}>"));
                render_inlines(content, &mut html);
                html.push_str(&format!("</h{level}>"));
            }
            MarkdownBlock::ListItem(content) => {
                html.push_str("<li>");
                render_inlines(content, &mut html);
                html.push_str("</li>");
            }
            MarkdownBlock::Line(content) => render_inlines(content, &mut html),
            MarkdownBlock::LineBreak => html.push_str("<br>"),
            MarkdownBlock::CodeBlock { language, code, .. } => {
                html.push_str(&render_code_block(language, code));
                code_blocks.push(CodeBlockControl::new(language, code));
            }
        }
    }

    RenderedMarkdown { html, code_blocks }
}

fn render_inlines(inlines: &[Inline], html: &mut String) {
    for inline in inlines {
        match inline {
            Inline::Text(text) => html.push_str(&escape_html(text)),
            Inline::Code(code) => {
                html.push_str("<code class=\"inline-code\">");
                html.push_str(&escape_html(code));
                html.push_str("</code>");
            }
            Inline::Strong(inner) => {
                html.push_str("<strong>");
                render_inlines(inner, html);
                html.push_str("</strong>");
            }
            Inline::Emphasis(inner) => {
                html.push_str("<em>");
                render_inlines(inner, html);
                html.push_str("</em>");
            }
            Inline::Link { label, href } => {
                html.push_str("<a href=\"");
                html.push_str(&escape_html(href));
                html.push_str("\" target=\"_blank\" rel=\"noopener noreferrer\">");
                render_inlines(label, html);
                html.push_str("</a>");
            }
        }
    }
}

/// Parse and render in one step.
pub fn render_markdown(text: &str) -> RenderedMarkdown {
    render(&parse(text))
}

/// HTML only.
pub fn markdown_to_html(text: &str) -> String {
    render_markdown(text).html
}
