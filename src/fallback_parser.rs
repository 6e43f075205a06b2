//! # Fallback Line Parser
//!
//! Second deterministic pass over every line of a message, whether or not
//! it is bulleted. Lines that open with a quantity become measured items;
//! anything else becomes a name-only item.
//!
//! Volunteer channels carry plenty of chatter, so a line only becomes an
//! item when it reads like food: links, mentions, clock times, exclamations
//! and warehouse housekeeping are skipped, and a line with no written unit
//! must name something the categorizer recognizes.

use crate::checklist::{item_from_quantity, name_only_item, strip_approx_marker};
use crate::item_model::ParsedItem;
use crate::measurement_patterns::{
    number_word_value, parse_number, CHATTER_TOKENS, CLOCK_TIME_REGEX, GLUED_UNIT_REGEX, NUMERIC_TOKEN_REGEX,
};
use crate::text_processing::{is_non_food_heading, normalize_text, strip_leading_bullet};
use crate::unit_registry::UnitRegistry;
use crate::weight_estimator::categorize_item;
use log::{debug, trace};

/// No single rescued item is counted above this
const MAX_ITEM_QUANTITY: f64 = 500.0;
/// Above this a quantity needs a written unit
const MAX_UNITLESS_QUANTITY: f64 = 150.0;

/// A leading quantity and the text after it
#[derive(Debug, Clone, PartialEq)]
struct LeadingQuantity {
    first: f64,
    second: Option<f64>,
    rest: String,
}

/// Read a quantity from the first token(s) of a line.
///
/// Accepts "3", "1,200", "2-3", "2 to 3", number words ("two", "a dozen")
/// and numbers glued to a known unit ("4kg").
fn leading_quantity(tokens: &[&str], registry: &UnitRegistry) -> Option<LeadingQuantity> {
    let (first_token, tokens) = match tokens {
        [article, word, ..] if matches!(article.to_lowercase().as_str(), "a" | "an") && number_word_value(word).is_some() => {
            (*word, &tokens[1..])
        }
        [first, ..] => (*first, tokens),
        [] => return None,
    };
    let rest_after = |skip: usize| tokens.get(skip..).map(|t| t.join(" ")).unwrap_or_default();

    if let Some(value) = number_word_value(first_token) {
        return Some(LeadingQuantity { first: value, second: None, rest: rest_after(1) });
    }

    if let Some(caps) = NUMERIC_TOKEN_REGEX.captures(first_token) {
        let first = parse_number(&caps["num"])?;
        if let Some(second) = caps.name("num2").and_then(|m| parse_number(m.as_str())) {
            return Some(LeadingQuantity { first, second: Some(second), rest: rest_after(1) });
        }
        // "2 to 3", "2 - 3"
        if let (Some(sep), Some(next)) = (tokens.get(1), tokens.get(2)) {
            if matches!(sep.to_lowercase().as_str(), "to" | "-" | "–" | "—") {
                if let Some(second) = NUMERIC_TOKEN_REGEX
                    .captures(next)
                    .filter(|c| c.name("num2").is_none())
                    .and_then(|c| parse_number(&c["num"]))
                {
                    return Some(LeadingQuantity { first, second: Some(second), rest: rest_after(3) });
                }
            }
        }
        return Some(LeadingQuantity { first, second: None, rest: rest_after(1) });
    }

    let caps = GLUED_UNIT_REGEX.captures(first_token)?;
    registry.resolve(&caps["unit"])?;
    let first = parse_number(&caps["num"])?;
    let rest = std::iter::once(&caps["unit"])
        .chain(tokens[1..].iter().copied())
        .collect::<Vec<&str>>()
        .join(" ");
    Some(LeadingQuantity { first, second: None, rest })
}

/// Strip a leading "about"/"around"/"approx(imately)" word
fn strip_approx_word(text: &str) -> (&str, bool) {
    let Some((first, rest)) = text.split_once(char::is_whitespace) else {
        return (text, false);
    };
    match first.to_lowercase().as_str() {
        "about" | "around" | "approx" | "approx." | "approximately" => (rest.trim_start(), true),
        _ => (text, false),
    }
}

/// Links and mentions
fn is_link_or_mention(line: &str) -> bool {
    let lower = line.to_lowercase();
    lower.starts_with("http") || lower.starts_with("<http") || lower.contains("google.com/maps") || line.contains("<@")
}

/// Whether a parsed line reads as chatter rather than a donation
fn is_chatter(item: &ParsedItem) -> bool {
    let name = item.name.to_lowercase();
    let unitless = item.implicit_unit;
    let quantity = item.quantity.unwrap_or_default();

    name.chars().filter(char::is_ascii_lowercase).count() < 3
        || name.contains("<@")
        || name.contains("http")
        || name.contains('!')
        || quantity > MAX_ITEM_QUANTITY
        || (unitless && quantity > MAX_UNITLESS_QUANTITY)
        || CHATTER_TOKENS.iter().any(|token| name.contains(token))
        || (unitless && CLOCK_TIME_REGEX.is_match(&name))
        || (unitless && categorize_item(&name).is_none())
}

/// Parse one line; headings, blank lines and chatter yield nothing
pub fn parse_fallback_line(line: &str, registry: &UnitRegistry) -> Option<ParsedItem> {
    let stripped = strip_leading_bullet(line);
    if stripped.is_empty() || is_non_food_heading(stripped) || is_link_or_mention(stripped) {
        return None;
    }
    let (body, marker) = strip_approx_marker(stripped);
    let (body, word) = strip_approx_word(body);
    let approx = marker || word;
    let tokens: Vec<&str> = body.split_whitespace().collect();

    let item = match leading_quantity(&tokens, registry) {
        Some(quantity) => item_from_quantity(
            stripped,
            quantity.first,
            quantity.second,
            &quantity.rest,
            approx,
            registry,
        ),
        None => {
            trace!("No leading quantity, trying name only: '{}'", body);
            name_only_item(stripped, body, approx)
        }
    }?;

    if is_chatter(&item) {
        debug!("Skipping chatter line: '{}'", stripped);
        return None;
    }
    Some(item)
}

/// Parse every line of a message independent of bullet formatting
pub fn parse_fallback_lines(text: &str, registry: &UnitRegistry) -> Vec<ParsedItem> {
    let items: Vec<ParsedItem> = normalize_text(text)
        .lines()
        .filter_map(|line| parse_fallback_line(line, registry))
        .collect();
    debug!("Fallback parser produced {} items", items.len());
    items
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item_model::Totals;

    #[test]
    fn test_dash_list_with_typos() {
        let registry = UnitRegistry::standard();
        let items = parse_fallback_lines("- 2 sacks potatoes\n- 5 cartons of milk\n-1 pallett blackberries", &registry);
        assert_eq!(items.len(), 3);
        assert_eq!(items[0].name, "potatoes");
        assert_eq!(items[0].canonical_unit, "bag");
        assert_eq!(items[0].quantity, Some(2.0));
        assert_eq!(items[1].name, "milk");
        assert_eq!(items[1].canonical_unit, "case");
        assert_eq!(items[2].name, "blackberries");
        assert_eq!(items[2].canonical_unit, "pallet");

        let totals = Totals::from_items(&items);
        assert_eq!(totals.containers.get("bag"), Some(&2.0));
        assert_eq!(totals.containers.get("case"), Some(&5.0));
        assert_eq!(totals.containers.get("pallet"), Some(&1.0));
    }

    #[test]
    fn test_unknown_unit_keeps_remainder_as_name() {
        let registry = UnitRegistry::standard();
        let item = parse_fallback_line("4 heads lettuce", &registry).unwrap();
        assert_eq!(item.unit, None);
        assert_eq!(item.name, "heads lettuce");
        assert_eq!(item.canonical_unit, "each");
        assert_eq!(item.quantity, Some(4.0));
    }

    #[test]
    fn test_glued_unit_and_words() {
        let registry = UnitRegistry::standard();
        let item = parse_fallback_line("4kg rice", &registry).unwrap();
        assert_eq!(item.unit.as_deref(), Some("kg"));
        assert_eq!(item.name, "rice");

        let item = parse_fallback_line("two bags onions", &registry).unwrap();
        assert_eq!(item.quantity, Some(2.0));
        assert_eq!(item.canonical_unit, "bag");

        let item = parse_fallback_line("a dozen eggs", &registry).unwrap();
        assert_eq!(item.quantity, Some(12.0));
        assert_eq!(item.name, "eggs");
    }

    #[test]
    fn test_approximation_words() {
        let registry = UnitRegistry::standard();
        let item = parse_fallback_line("about 3-5 cases apples", &registry).unwrap();
        assert!(item.approx);
        assert_eq!(item.quantity, Some(4.0));
        assert_eq!(item.name, "apples");

        let item = parse_fallback_line("approx. 20 lbs chicken", &registry).unwrap();
        assert!(item.approx);
        assert_eq!(item.canonical_quantity, Some(20.0));
    }

    #[test]
    fn test_ranges() {
        let registry = UnitRegistry::standard();
        let item = parse_fallback_line("2-3 cases apples", &registry).unwrap();
        assert_eq!(item.quantity, Some(2.5));
        let item = parse_fallback_line("2 to 4 bags rice", &registry).unwrap();
        assert_eq!(item.quantity, Some(3.0));
        assert_eq!(item.name, "rice");
    }

    #[test]
    fn test_headings_and_name_only() {
        let registry = UnitRegistry::standard();
        let items = parse_fallback_lines("Dropped off at UC\n\n• bread\nsome bagels (day old)", &registry);
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].name, "bread");
        assert!(!items[0].has_quantity());
        assert_eq!(items[1].name, "some bagels");
        assert_eq!(items[1].notes.as_deref(), Some("day old"));
    }

    #[test]
    fn test_keys_match_checklist() {
        let registry = UnitRegistry::standard();
        let line = "• 3 small boxes of strawberries (local)";
        let from_checklist = crate::checklist::extract_checklist(line, &registry);
        let from_fallback = parse_fallback_line(line, &registry).unwrap();
        assert_eq!(from_checklist[0].name, from_fallback.name);
        assert_eq!(from_checklist[0].canonical_unit, from_fallback.canonical_unit);
        assert_eq!(from_checklist[0].notes, from_fallback.notes);
        assert_eq!(from_checklist[0].quantity, from_fallback.quantity);
    }

    #[test]
    fn test_chatter_lines_are_skipped() {
        let registry = UnitRegistry::standard();
        for line in [
            "thanks everyone, great job today!",
            "https://docs.google.com/spreadsheets/d/abc",
            "<@U123> can you grab the keys",
            "see the guide in the channel",
            "door code is 4821",
            "pickup at 3 pm",
            "lots of random stuff",
            "600 lbs potatoes",
            "200 apples",
            "2 ok",
            "2 boxes cardboard for recycling",
        ] {
            assert_eq!(parse_fallback_line(line, &registry), None, "{line}");
        }
    }

    #[test]
    fn test_food_lines_survive_the_chatter_filter() {
        let registry = UnitRegistry::standard();
        let items = parse_fallback_lines(
            "Picked up from Aldi Lyons\n2 cases apples\nthanks everyone, great job today!\nsome bread\n120 cucumbers\n300 lbs potatoes",
            &registry,
        );
        let names: Vec<&str> = items.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["apples", "some bread", "cucumbers", "potatoes"]);
    }

    #[test]
    fn test_quantity_with_unit_but_no_name_is_skipped() {
        let registry = UnitRegistry::standard();
        assert_eq!(parse_fallback_line("5 lbs", &registry), None);
        let item = parse_fallback_line("2 banana boxes", &registry).unwrap();
        assert_eq!(item.name, "banana");
        assert_eq!(item.canonical_unit, "box");
    }
}
