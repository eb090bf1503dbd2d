//! Cleanup applied to raw completion text before it is rendered.
//!
//! Runs on the cumulative text after every streamed increment and once more
//! on the final result, so it must be cheap and deterministic. Fenced code is
//! passed through byte-for-byte; only prose lines are touched.

use once_cell::sync::Lazy;
use regex::Regex;

static UNDERSCORE_BOLD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"__(\S(?:.*?\S)?)__").expect("valid underscore bold regex")
});

/// Normalize a model response for display:
///
/// - `\r\n` and `\r` become `\n`
/// - heading lines are rewritten as `<hashes> <text>`
/// - `__bold__` becomes `**bold**` (outside inline code)
/// - prose lines are trimmed
/// - runs of blank lines collapse to a single blank line
/// - the whole text is trimmed
pub fn format_api_response(text: &str) -> String {
    let normalized = text.replace("\r\n", "\n").replace('\r', "\n");

    let mut lines: Vec<String> = Vec::new();
    let mut in_fence = false;
    let mut previous_blank = false;

    for line in normalized.split('\n') {
        let trimmed = line.trim();

        if trimmed.starts_with("```") {
            in_fence = !in_fence;
            lines.push(trimmed.to_string());
            previous_blank = false;
            continue;
        }

        if in_fence {
            lines.push(line.to_string());
            continue;
        }

        if trimmed.is_empty() {
            if !previous_blank {
                lines.push(String::new());
            }
            previous_blank = true;
            continue;
        }

        previous_blank = false;
        lines.push(format_prose_line(trimmed));
    }

    lines.join("\n").trim().to_string()
}

fn format_prose_line(line: &str) -> String {
    if let Some(heading) = normalize_heading(line) {
        return heading;
    }
    rewrite_underscore_bold(line)
}

/// `##   Title  ` -> `## Title`. Returns `None` for lines that are not
/// headings (including `#hashtag`).
fn normalize_heading(line: &str) -> Option<String> {
    let level = line.chars().take_while(|c| *c == '#').count();
    if level == 0 || level > 6 {
        return None;
    }
    let rest = &line[level..];
    if !rest.starts_with(char::is_whitespace) {
        return None;
    }
    let title = rest.trim();
    if title.is_empty() {
        return None;
    }
    Some(format!("{} {}", "#".repeat(level), rewrite_underscore_bold(title)))
}

/// Apply `__x__` -> `**x**` only to the parts of the line outside
/// backtick spans.
fn rewrite_underscore_bold(line: &str) -> String {
    if !line.contains("__") {
        return line.to_string();
    }
    line.split('`')
        .enumerate()
        .map(|(i, piece)| {
            if i % 2 == 0 {
                UNDERSCORE_BOLD.replace_all(piece, "**$1**").into_owned()
            } else {
                piece.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("`")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_line_endings_and_trims() {
        assert_eq!(format_api_response("  Hello\r\nworld  \r\n"), "Hello\nworld");
        assert_eq!(format_api_response("a\rb"), "a\nb");
    }

    #[test]
    fn collapses_blank_runs() {
        assert_eq!(format_api_response("a\n\n\n\nb"), "a\n\nb");
        assert_eq!(format_api_response("a\n  \n \n\nb"), "a\n\nb");
    }

    #[test]
    fn headings_normalized() {
        assert_eq!(format_api_response("##   Setup   "), "## Setup");
        assert_eq!(format_api_response("### C# tips"), "### C# tips");
        assert_eq!(format_api_response("#hashtag"), "#hashtag");
        assert_eq!(format_api_response("#######too deep"), "#######too deep");
    }

    #[test]
    fn underscore_bold_rewritten_outside_code() {
        assert_eq!(format_api_response("this is __bold__ text"), "this is **bold** text");
        assert_eq!(
            format_api_response("call `__init__` then __go__"),
            "call `__init__` then **go**"
        );
    }

    #[test]
    fn fenced_code_untouched() {
        let raw = "Intro\n```python\ndef f():\n    return 1   \n\n\n\n    # __x__\n```\nDone";
        let formatted = format_api_response(raw);
        assert_eq!(
            formatted,
            "Intro\n```python\ndef f():\n    return 1   \n\n\n\n    # __x__\n```\nDone"
        );
    }

    #[test]
    fn unterminated_fence_keeps_code_verbatim() {
        let raw = "```rust\nfn main() {\n    let x = 1;";
        assert_eq!(format_api_response(raw), raw);
    }

    #[test]
    fn cumulative_prefixes_are_stable() {
        assert_eq!(format_api_response("Hel"), "Hel");
        assert_eq!(format_api_response("Hello"), "Hello");
    }
}
