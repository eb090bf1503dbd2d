//! Fenced code block decoration: a language header, copy and collapse
//! controls, and the code itself.

use crate::html::{escape_html, unescape_html};

const COPY_ICON: &str = r#"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 24 24" fill="none" stroke="currentColor" stroke-width="2" stroke-linecap="round" stroke-linejoin="round"><rect x="9" y="9" width="13" height="13" rx="2" ry="2"></rect><path d="M5 15H4a2 2 0 0 1-2-2V4a2 2 0 0 1 2-2h9a2 2 0 0 1 2 2v1"></path></svg>"#;
const COLLAPSE_ICON: &str = r#"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 24 24" fill="none" stroke="currentColor" stroke-width="2" stroke-linecap="round" stroke-linejoin="round"><polyline points="18 15 12 9 6 15"></polyline></svg>"#;

pub const COLLAPSE_TITLE: &str = "Collapse code";
pub const EXPAND_TITLE: &str = "Expand code";

/// Display name for a fence language tag.
pub fn language_display_name(language: &str) -> String {
    let known = match language.to_lowercase().as_str() {
        "js" | "javascript" => "JavaScript",
        "ts" | "typescript" => "TypeScript",
        "py" | "python" => "Python",
        "html" => "HTML",
        "css" => "CSS",
        "json" => "JSON",
        "md" => "Markdown",
        "bash" => "Bash",
        "sh" | "shell" => "Shell",
        "c" => "C",
        "cpp" => "C++",
        "csharp" => "C#",
        "java" => "Java",
        "go" => "Go",
        "php" => "PHP",
        "ruby" => "Ruby",
        "swift" => "Swift",
        "rust" => "Rust",
        "dart" => "Dart",
        "kotlin" => "Kotlin",
        "sql" => "SQL",
        "yaml" => "YAML",
        "xml" => "XML",
        "txt" | "text" => "Text",
        _ => {
            let mut chars = language.chars();
            return match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => "Text".into(),
            };
        }
    };
    known.to_string()
}

/// HTML for one code block. `code` is raw and escaped here.
pub fn render_code_block(language: &str, code: &str) -> String {
    let lang = escape_html(language);
    format!(
        concat!(
            r#"<pre class="code-block" data-language="{lang}">"#,
            r#"<div class="code-block-header"><span class="code-lang">{display}</span>"#,
            r#"<div class="code-controls">"#,
            r#"<button class="code-control-btn copy-btn" title="Copy code">{copy}</button>"#,
            r#"<button class="code-control-btn collapse-btn" title="{collapse_title}">{collapse}</button>"#,
            r#"</div></div>"#,
            r#"<code class="language-{lang}">{code}</code></pre>"#,
        ),
        lang = lang,
        display = escape_html(&language_display_name(language)),
        copy = COPY_ICON,
        collapse_title = COLLAPSE_TITLE,
        collapse = COLLAPSE_ICON,
        code = escape_html(code),
    )
}

// ---------------------------------------------------------------------------
// Controls
// ---------------------------------------------------------------------------

/// Interactive state of one rendered code block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeBlockControl {
    language: String,
    /// Code as it appears in the markup.
    escaped_code: String,
    collapsed: bool,
    initialized: bool,
}

impl CodeBlockControl {
    pub fn new(language: &str, code: &str) -> Self {
        Self {
            language: language.to_string(),
            escaped_code: escape_html(code),
            collapsed: false,
            initialized: false,
        }
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    pub fn display_language(&self) -> String {
        language_display_name(&self.language)
    }

    /// The original code, indentation included.
    pub fn copy_text(&self) -> String {
        unescape_html(&self.escaped_code)
    }

    pub fn is_collapsed(&self) -> bool {
        self.collapsed
    }

    /// Flip the collapsed state and return the new value.
    pub fn toggle_collapse(&mut self) -> bool {
        self.collapsed = !self.collapsed;
        self.collapsed
    }

    /// Title of the collapse control for the current state.
    pub fn collapse_title(&self) -> &'static str {
        if self.collapsed { EXPAND_TITLE } else { COLLAPSE_TITLE }
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }
}

/// Wire up controls on every block not yet marked. Returns how many were
/// newly attached; calling it again on the same blocks attaches none.
pub fn attach_controls(blocks: &mut [CodeBlockControl]) -> usize {
    let mut attached = 0;
    for block in blocks.iter_mut().filter(|b| !b.initialized) {
        block.initialized = true;
        attached += 1;
    }
    attached
}
