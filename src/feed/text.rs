use std::sync::OnceLock;

use regex::Regex;

const BLURB_MAX_CHARS: usize = 220;
const BLURB_CUT_CHARS: usize = 217;
const HTML_WRAP_WIDTH: usize = 10_000;

struct Patterns {
    fenced_code: Regex,
    inline_code: Regex,
    md_link: Regex,
    ref_link: Regex,
    footnote: Regex,
    markers: Regex,
}

fn patterns() -> Option<&'static Patterns> {
    static PATTERNS: OnceLock<Option<Patterns>> = OnceLock::new();
    PATTERNS
        .get_or_init(|| {
            Some(Patterns {
                fenced_code: Regex::new(r"(?s)```.*?```").ok()?,
                inline_code: Regex::new(r"`[^`]*`").ok()?,
                md_link: Regex::new(r"\[([^\]]*)\]\([^)]*\)").ok()?,
                ref_link: Regex::new(r"\[([^\]]*)\]\[\d+\]").ok()?,
                footnote: Regex::new(r"(?m)^\s*\[\d+\]:\s*\S+\s*$").ok()?,
                markers: Regex::new(r"[#>*_~\r\n]").ok()?,
            })
        })
        .as_ref()
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Drop markdown markup and collapse whitespace to a single line.
pub fn to_plain_text(text: &str) -> String {
    let Some(p) = patterns() else {
        return collapse_whitespace(text);
    };
    let text = p.fenced_code.replace_all(text, " ");
    let text = p.inline_code.replace_all(&text, " ");
    let text = p.footnote.replace_all(&text, " ");
    let text = p.md_link.replace_all(&text, "$1");
    let text = p.ref_link.replace_all(&text, "$1");
    let text = p.markers.replace_all(&text, " ");
    collapse_whitespace(&text)
}

/// Local fallback blurb: plain text capped at 220 chars with an ellipsis.
pub fn to_plain_summary(text: &str) -> Option<String> {
    let cleaned = to_plain_text(text);
    if cleaned.is_empty() {
        return None;
    }
    Some(truncate_chars(&cleaned, BLURB_MAX_CHARS, BLURB_CUT_CHARS))
}

/// Visible text of an HTML fragment on one line.
pub fn strip_html(html: &str) -> String {
    match html2text::from_read(html.as_bytes(), HTML_WRAP_WIDTH) {
        Ok(text) => to_plain_text(&text),
        Err(e) => {
            tracing::debug!("Failed to convert HTML to text: {}", e);
            String::new()
        }
    }
}

/// Keep `text` when it fits in `max` chars, else cut to `keep` chars and add an ellipsis.
pub fn truncate_chars(text: &str, max: usize, keep: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let cut: String = text.chars().take(keep).collect();
    format!("{}…", cut.trim_end())
}

/// First `max` chars, no ellipsis.
pub fn take_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}
