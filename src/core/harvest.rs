//! Semantic text composition and display snippets.
//!
//! The harvester flattens a page into one "semantic text" blob that is both
//! embedded and keyword-matched. The dashboard later strips the labelled
//! header off that blob to show a readable snippet.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref WHITESPACE_RE: Regex = Regex::new(r"\s+").unwrap();
    // "Title: ... Content:" header written by compose_semantic_text
    static ref HEADER_RE: Regex = Regex::new(r"Title:.*?Content:").unwrap();
}

/// Default number of body characters kept in the semantic text
pub const DEFAULT_BODY_CHARS: usize = 500;

/// Default snippet length for result display
pub const DEFAULT_SNIPPET_CHARS: usize = 200;

/// Raw pieces of a page as extracted by a harvester.
#[derive(Debug, Clone, Default)]
pub struct PageParts {
    pub title: String,
    pub description: String,
    pub heading: String,
    pub body: String,
}

/// Build the semantic text for a page.
///
/// Only the first `body_chars` characters of the body are kept, then
/// whitespace runs are collapsed and the result trimmed.
pub fn compose_semantic_text(parts: &PageParts, body_chars: usize) -> String {
    let body: String = parts.body.chars().take(body_chars).collect();
    let body = WHITESPACE_RE.replace_all(&body, " ");

    format!(
        "Title: {}. Description: {}. Header: {}. Content: {}",
        parts.title,
        parts.description,
        parts.heading,
        body.trim()
    )
}

/// Readable excerpt of a stored semantic text.
pub fn snippet(text: &str, max_chars: usize) -> String {
    let stripped = HEADER_RE.replacen(text, 1, "");
    let stripped = stripped.trim();

    if stripped.chars().count() > max_chars {
        format!("{}...", stripped.chars().take(max_chars).collect::<String>())
    } else {
        stripped.to_string()
    }
}
