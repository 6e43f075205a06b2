//! # Text Processing Module
//!
//! Text helpers shared by every parser in the pipeline.
//!
//! ## Features
//!
//! - Slack paste cleanup (non-breaking spaces, CRLF)
//! - Bullet and checkbox stripping for arbitrary lines
//! - The non-food heading predicate ("Picked up from ...", "Dropped off at ...")
//! - Item name cleanup and the normalized forms used as reconciliation keys

use crate::measurement_patterns::{
    ANY_PAREN_REGEX, LEADING_BULLET_REGEX, NON_FOOD_HEADING_REGEX, TRAILING_PAREN_REGEX,
};
use log::trace;

/// Normalize pasted Slack text: NBSPs become spaces, line endings become `\n`
pub fn normalize_text(text: &str) -> String {
    text.replace('\u{00a0}', " ")
        .replace("\r\n", "\n")
        .replace('\r', "\n")
        .trim()
        .to_string()
}

/// Remove leading bullet/checkbox punctuation and surrounding whitespace
pub fn strip_leading_bullet(line: &str) -> &str {
    let stripped = match LEADING_BULLET_REGEX.find(line) {
        Some(m) => &line[m.end()..],
        None => line,
    };
    stripped.trim()
}

/// Whether a line announces a pickup or drop-off instead of describing food.
///
/// Bullet punctuation is ignored, so "• Dropped off at UC" is a heading too.
///
/// # Examples
///
/// ```rust
/// use rescue_intake::text_processing::is_non_food_heading;
///
/// assert!(is_non_food_heading("Picked up from Aldi Wicker Park"));
/// assert!(is_non_food_heading("- dropped off at the Love Fridge"));
/// assert!(!is_non_food_heading("3 cases bananas"));
/// assert!(!is_non_food_heading("drop offs are on tuesdays"));
/// ```
pub fn is_non_food_heading(line: &str) -> bool {
    let candidate = strip_leading_bullet(line);
    let result = NON_FOOD_HEADING_REGEX.is_match(candidate);
    if result {
        trace!("Non-food heading: '{}'", candidate);
    }
    result
}

/// Clean up an item name: leading non-alphanumerics and trailing `.,;` go,
/// inner whitespace is collapsed
pub fn clean_item_name(raw: &str) -> String {
    let trimmed = raw
        .trim_start_matches(|c: char| !c.is_alphanumeric())
        .trim_end_matches(|c: char| c == '.' || c == ',' || c == ';' || c.is_whitespace());
    trimmed.split_whitespace().collect::<Vec<&str>>().join(" ")
}

/// Split a trailing parenthetical off a name: "bananas (ripe)" -> ("bananas", Some("ripe"))
pub fn split_trailing_note(text: &str) -> (String, Option<String>) {
    match TRAILING_PAREN_REGEX.captures(text) {
        Some(caps) => {
            let start = caps.get(0).map_or(text.len(), |m| m.start());
            let note = caps["note"].trim().to_string();
            let note = if note.is_empty() { None } else { Some(note) };
            (text[..start].to_string(), note)
        }
        None => (text.to_string(), None),
    }
}

/// Append a note, joining with "; " when one already exists
pub fn append_note(existing: Option<String>, note: &str) -> Option<String> {
    let note = note.trim();
    if note.is_empty() {
        return existing;
    }
    match existing {
        Some(current) if !current.is_empty() => Some(format!("{current}; {note}")),
        _ => Some(note.to_string()),
    }
}

/// Name form used for matching items across sources: lowercase, no
/// parentheticals, no punctuation, single spaces
pub fn match_key_name(name: &str) -> String {
    let without_parens = ANY_PAREN_REGEX.replace_all(name, " ");
    without_parens
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() || c.is_whitespace() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<&str>>()
        .join(" ")
}

/// Name form used for exact deduplication: lowercase with whitespace collapsed
pub fn dedup_name(name: &str) -> String {
    name.to_lowercase().split_whitespace().collect::<Vec<&str>>().join(" ")
}
