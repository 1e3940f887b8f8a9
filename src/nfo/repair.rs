//! Textual repairs applied before structural parsing.
//!
//! Scraper-generated descriptors recur with three corruptions that break a
//! strict XML parser: raw `&` in URLs, HTML/script fragments pasted into
//! element content, and tag names starting with a digit. Each repair is a
//! plain text rewrite so the parser only ever sees well-formed-enough input.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    // Matches any `&`; an entity tail is captured so it can be kept as-is.
    static ref AMPERSAND_RE: Regex =
        Regex::new(r"(?i)&(amp;|lt;|gt;|quot;|apos;|#[0-9]+;|#x[0-9a-f]+;)?").unwrap();
    static ref SCRIPT_CLOSE_RE: Regex = Regex::new(r"(?i)</script\s*>").unwrap();
    static ref SCRIPT_OPEN_RE: Regex = Regex::new(r"(?i)<script\s*>").unwrap();
    static ref SCRIPT_OPEN_ATTRS_RE: Regex = Regex::new(r"(?i)<script\s+").unwrap();
    static ref DIGIT_TAG_OPEN_RE: Regex = Regex::new(r"<([0-9][a-zA-Z0-9_-]*)\s*>").unwrap();
    static ref DIGIT_TAG_CLOSE_RE: Regex = Regex::new(r"</([0-9][a-zA-Z0-9_-]*)\s*>").unwrap();
}

/// Escape `&` characters that are not already part of an entity reference.
fn fix_unescaped_ampersands(content: &str) -> String {
    AMPERSAND_RE
        .replace_all(content, |caps: &regex::Captures| match caps.get(1) {
            Some(entity) => format!("&{}", entity.as_str()),
            None => "&amp;".to_string(),
        })
        .into_owned()
}

/// Neutralize `<script>` fragments embedded in element content so they stop
/// reading as markup.
fn fix_script_fragments(content: &str) -> String {
    let content = SCRIPT_CLOSE_RE.replace_all(content, "&lt;/script&gt;");
    let content = SCRIPT_OPEN_RE.replace_all(&content, "&lt;script&gt;");
    SCRIPT_OPEN_ATTRS_RE
        .replace_all(&content, "&lt;script ")
        .into_owned()
}

/// Rewrite tag names that start with a digit (illegal in XML) to an `n_`
/// alias. The aliased tags are never fields we read.
fn fix_digit_tag_names(content: &str) -> String {
    let content = DIGIT_TAG_OPEN_RE.replace_all(content, "<n_$1>");
    DIGIT_TAG_CLOSE_RE.replace_all(&content, "</n_$1>").into_owned()
}

/// Apply all repairs in order.
pub fn repair_markup(content: &str) -> String {
    let content = fix_unescaped_ampersands(content);
    let content = fix_script_fragments(&content);
    fix_digit_tag_names(&content)
}
