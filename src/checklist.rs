//! # Checklist Extractor
//!
//! Deterministic parsing of bulleted (`•`) and checkbox (`[ ]`, `[x]`)
//! messages, one item per marker.
//!
//! The remainder rules here (dozen containers, size adjectives, trailing
//! parenthetical notes) are shared with the fallback parser through
//! [`split_remainder`], so both passes produce the same reconciliation keys
//! for the same line.

use crate::item_model::ParsedItem;
use crate::measurement_patterns::{
    parse_number, CHECKLIST_MARKER_REGEX, CHECKLIST_QUANTITY_REGEX, DOZEN_CONTAINERS, SIZE_ADJECTIVES,
    TRAILING_CONTAINER_UNITS,
};
use crate::quantity_lexer::resolve_leading_unit;
use crate::text_processing::{append_note, clean_item_name, is_non_food_heading, split_trailing_note};
use crate::unit_registry::{UnitRegistry, UnitSpec};
use log::{debug, trace};

/// Unit, name and notes split out of the text following a quantity
#[derive(Debug, Clone, PartialEq)]
pub struct Remainder<'r> {
    /// Unit text as written plus its spec
    pub unit: Option<(String, &'r UnitSpec)>,
    pub name: String,
    pub notes: Option<String>,
}

/// Split the text after a quantity into unit, item name and notes.
///
/// - A trailing `(...)` becomes the notes.
/// - `dozen` is the unit; a following package/bottle word joins the notes.
/// - A size adjective may precede the unit ("small boxes").
/// - One- and two-token registry aliases are tried before single tokens.
/// - A leading "of" after the unit is dropped.
/// - With no leading unit, a trailing container word is the unit ("banana boxes").
pub fn split_remainder<'r>(rest: &str, registry: &'r UnitRegistry) -> Remainder<'r> {
    let (body, mut notes) = split_trailing_note(rest);
    let tokens: Vec<&str> = body.split_whitespace().collect();

    let mut unit = None;
    let mut used = 0;

    if tokens.first().is_some_and(|t| t.eq_ignore_ascii_case("dozen")) {
        if let Some(spec) = registry.resolve("dozen") {
            unit = Some((tokens[0].to_string(), spec));
            used = 1;
            if let Some(next) = tokens.get(1) {
                if DOZEN_CONTAINERS.contains(&next.to_lowercase().as_str()) {
                    notes = append_note(notes, next);
                    used = 2;
                }
            }
        }
    }

    if unit.is_none() {
        if let Some((written, spec, count)) = resolve_leading_unit(&tokens, registry) {
            unit = Some((written, spec));
            used = count;
        } else if tokens.len() >= 2 && SIZE_ADJECTIVES.contains(&tokens[0].to_lowercase().as_str()) {
            if let Some((written, spec, count)) = resolve_leading_unit(&tokens[1..], registry) {
                unit = Some((format!("{} {}", tokens[0], written), spec));
                used = count + 1;
            }
        }
    }

    let mut item_tokens = &tokens[used..];
    if unit.is_none() {
        if let Some((last, leading)) = tokens.split_last().filter(|(_, leading)| !leading.is_empty()) {
            if TRAILING_CONTAINER_UNITS.contains(&last.to_lowercase().as_str()) {
                if let Some(spec) = registry.resolve(last) {
                    unit = Some((last.to_string(), spec));
                    item_tokens = leading;
                }
            }
        }
    }
    if unit.is_some() && item_tokens.first().is_some_and(|t| t.eq_ignore_ascii_case("of")) {
        item_tokens = &item_tokens[1..];
    }

    Remainder {
        unit,
        name: clean_item_name(&item_tokens.join(" ")),
        notes,
    }
}

/// Build an item from a quantity (or range) and the text that follows it.
///
/// Returns None when no item name is left once the unit is taken off.
pub(crate) fn item_from_quantity(
    raw: &str,
    first: f64,
    second: Option<f64>,
    rest: &str,
    approx: bool,
    registry: &UnitRegistry,
) -> Option<ParsedItem> {
    let remainder = split_remainder(rest, registry);
    if remainder.name.is_empty() {
        trace!("No item name after the quantity in '{}'", raw);
        return None;
    }
    let item = ParsedItem::new(raw, &remainder.name).with_range(first, second.unwrap_or(first));
    let item = match remainder.unit {
        Some((written, spec)) => item.with_unit(Some(written.as_str()), spec),
        None => item.with_unit(None, registry.each()),
    };
    Some(item.with_notes(remainder.notes).approximate(approx))
}

/// Build a name-only item, or None when nothing is left after cleanup
pub(crate) fn name_only_item(raw: &str, text: &str, approx: bool) -> Option<ParsedItem> {
    let (body, notes) = split_trailing_note(text);
    let name = clean_item_name(&body);
    if name.is_empty() {
        return None;
    }
    Some(ParsedItem::new(raw, &name).with_notes(notes).approximate(approx))
}

/// Strip a leading `~`/`≈`, reporting whether one was present
pub(crate) fn strip_approx_marker(text: &str) -> (&str, bool) {
    let trimmed = text.trim_start();
    match trimmed.strip_prefix('~').or_else(|| trimmed.strip_prefix('≈')) {
        Some(rest) => (rest.trim_start(), true),
        None => (trimmed, false),
    }
}

/// Whether the message uses bullet or checkbox markers at all
pub fn has_checklist_markers(text: &str) -> bool {
    CHECKLIST_MARKER_REGEX.is_match(text)
}

/// Split a message into one segment per marker, ending at the next marker or newline
fn checklist_segments(text: &str) -> Vec<&str> {
    let markers: Vec<_> = CHECKLIST_MARKER_REGEX.find_iter(text).collect();
    markers
        .iter()
        .enumerate()
        .map(|(i, marker)| {
            let start = marker.end();
            let next_marker = markers.get(i + 1).map_or(text.len(), |m| m.start());
            let line_end = text[start..].find('\n').map_or(text.len(), |offset| start + offset);
            &text[start..next_marker.min(line_end)]
        })
        .collect()
}

/// Parse one checklist segment (marker already removed)
fn parse_segment(segment: &str, registry: &UnitRegistry) -> Option<ParsedItem> {
    let raw = segment.trim();
    let (body, approx) = strip_approx_marker(raw);
    if body.is_empty() {
        return None;
    }
    if is_non_food_heading(body) {
        debug!("Skipping checklist heading: '{}'", body);
        return None;
    }

    let Some(captures) = CHECKLIST_QUANTITY_REGEX.captures(body) else {
        return name_only_item(raw, body, approx);
    };
    let Some(first) = parse_number(&captures["num"]) else {
        return name_only_item(raw, body, approx);
    };
    let second = captures.name("num2").and_then(|m| parse_number(m.as_str()));

    item_from_quantity(raw, first, second, &captures["rest"], approx, registry)
}

/// Extract one item per bullet or checkbox.
///
/// Returns an empty list when the message has no markers.
pub fn extract_checklist(text: &str, registry: &UnitRegistry) -> Vec<ParsedItem> {
    if !has_checklist_markers(text) {
        trace!("No checklist markers found");
        return Vec::new();
    }

    let items: Vec<ParsedItem> = checklist_segments(text)
        .into_iter()
        .filter_map(|segment| parse_segment(segment, registry))
        .collect();

    debug!("Checklist extractor produced {} items", items.len());
    items
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::unit_registry::UnitKind;

    fn names(items: &[ParsedItem]) -> Vec<&str> {
        items.iter().map(|i| i.name.as_str()).collect()
    }

    #[test]
    fn test_no_markers_is_empty() {
        let registry = UnitRegistry::standard();
        assert!(extract_checklist("2 cases apples\n3 bags rice", &registry).is_empty());
        assert!(extract_checklist("- 2 cases apples", &registry).is_empty());
    }

    #[test]
    fn test_bullets_and_checkboxes() {
        let registry = UnitRegistry::standard();
        let items = extract_checklist("• 2 cases apples\n[x] 3 bags rice\n[ ] 10 lbs carrots", &registry);
        assert_eq!(names(&items), vec!["apples", "rice", "carrots"]);
        assert_eq!(items[0].canonical_unit, "case");
        assert_eq!(items[1].canonical_unit, "bag");
        assert_eq!(items[2].unit_kind, UnitKind::Weight);
        assert_eq!(items[2].canonical_quantity, Some(10.0));
    }

    #[test]
    fn test_inline_bullets_split() {
        let registry = UnitRegistry::standard();
        let items = extract_checklist("Today: • 2 cases apples • 1 bag onions", &registry);
        assert_eq!(names(&items), vec!["apples", "onions"]);
    }

    #[test]
    fn test_dozen_container_goes_to_notes() {
        let registry = UnitRegistry::standard();
        let items = extract_checklist("• 2 dozen packages tortillas", &registry);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].unit.as_deref(), Some("dozen"));
        assert_eq!(items[0].canonical_quantity, Some(24.0));
        assert_eq!(items[0].name, "tortillas");
        assert_eq!(items[0].notes.as_deref(), Some("packages"));
    }

    #[test]
    fn test_size_adjective_unit() {
        let registry = UnitRegistry::standard();
        let items = extract_checklist("• 3 small boxes of strawberries", &registry);
        assert_eq!(items[0].unit.as_deref(), Some("small boxes"));
        assert_eq!(items[0].canonical_unit, "box");
        assert_eq!(items[0].name, "strawberries");
    }

    #[test]
    fn test_trailing_parenthetical_and_approx() {
        let registry = UnitRegistry::standard();
        let items = extract_checklist("• ~4 cases bananas (very ripe)", &registry);
        assert!(items[0].approx);
        assert_eq!(items[0].name, "bananas");
        assert_eq!(items[0].notes.as_deref(), Some("very ripe"));
    }

    #[test]
    fn test_headings_discarded_and_name_only_kept() {
        let registry = UnitRegistry::standard();
        let items = extract_checklist("• Picked up from Aldi\n• bread\n• 6 cucumbers", &registry);
        assert_eq!(names(&items), vec!["bread", "cucumbers"]);
        assert!(!items[0].has_quantity());
        assert_eq!(items[1].unit, None);
        assert!(items[1].implicit_unit);
        assert_eq!(items[1].canonical_unit, "each");
    }

    #[test]
    fn test_range_in_checklist() {
        let registry = UnitRegistry::standard();
        let items = extract_checklist("• 3-2 cases milk", &registry);
        assert_eq!(items[0].quantity, Some(2.5));
        assert_eq!(items[0].quantity_min, Some(2.0));
        assert_eq!(items[0].quantity_max, Some(3.0));
    }

    #[test]
    fn test_split_remainder_unknown_unit() {
        let registry = UnitRegistry::standard();
        let remainder = split_remainder("heads lettuce", &registry);
        assert!(remainder.unit.is_none());
        assert_eq!(remainder.name, "heads lettuce");
    }

    #[test]
    fn test_trailing_container_word_is_the_unit() {
        let registry = UnitRegistry::standard();
        let remainder = split_remainder("banana boxes", &registry);
        let (written, spec) = remainder.unit.unwrap();
        assert_eq!(written, "boxes");
        assert_eq!(spec.canonical_unit, "box");
        assert_eq!(remainder.name, "banana");

        // a lone container word is the unit, not the name
        let remainder = split_remainder("boxes", &registry);
        assert_eq!(remainder.unit.unwrap().1.canonical_unit, "box");
        assert_eq!(remainder.name, "");
    }

    #[test]
    fn test_quantity_without_name_is_dropped() {
        let registry = UnitRegistry::standard();
        let items = extract_checklist("• 2 banana boxes\n• 3 boxes\n• 5 lbs", &registry);
        assert_eq!(names(&items), vec!["banana"]);
        assert_eq!(items[0].canonical_unit, "box");
        assert_eq!(items[0].quantity, Some(2.0));
    }
}
