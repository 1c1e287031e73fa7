//! Small shared helpers: text normalization and log deduplication.

mod log_once;

pub use log_once::LogOnce;

/// What: Normalize a searchable string.
///
/// Inputs:
/// - `text`: Raw display or tooltip text.
///
/// Output:
/// - Lower-cased text with `§x` formatting codes removed and surrounding
///   whitespace trimmed.
///
/// Details:
/// - Formatting codes are a section sign followed by one code character;
///   a trailing lone section sign is dropped.
#[must_use]
pub fn normalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c == '\u{a7}' {
            chars.next();
            continue;
        }
        out.extend(c.to_lowercase());
    }
    let trimmed = out.trim();
    if trimmed.len() == out.len() {
        out
    } else {
        trimmed.to_string()
    }
}

/// Remove every whitespace character.
#[must_use]
pub fn strip_whitespace(text: &str) -> String {
    text.chars().filter(|c| !c.is_whitespace()).collect()
}
