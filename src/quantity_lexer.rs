//! # Quantity/Unit Lexer
//!
//! Parses one line of volunteer text into a quantity, an optional range, a
//! unit and an item name.
//!
//! ## Features
//!
//! - Numeric quantities with thousands separators and decimals ("1,200", "2.5")
//! - Number words ("two", "a dozen", "half", "a couple")
//! - Ranges ("2-3", "2 to 3", "2–3"), averaged for the point quantity
//! - Approximation markers ("about", "approx.", "around", "~")
//! - One- and two-token unit aliases from the [`UnitRegistry`]
//!
//! ## Usage
//!
//! ```rust
//! use rescue_intake::item_model::ParseOutcome;
//! use rescue_intake::quantity_lexer::parse_line;
//! use rescue_intake::unit_registry::UnitRegistry;
//!
//! let registry = UnitRegistry::standard();
//! match parse_line("3 gallons soup", &registry) {
//!     ParseOutcome::Parsed(item) => {
//!         assert_eq!(item.canonical_unit, "gallon");
//!         assert_eq!(item.canonical_quantity, Some(3.0));
//!     }
//!     ParseOutcome::Unparsed(line) => panic!("unexpected: {line}"),
//! }
//! ```

use crate::item_model::{ParseOutcome, ParsedItem};
use crate::measurement_patterns::{number_word_value, parse_number, QUANTITY_LINE_REGEX};
use crate::text_processing::{clean_item_name, is_non_food_heading, normalize_text};
use crate::unit_registry::{UnitRegistry, UnitSpec};
use log::{debug, trace};

/// Parse a single line.
///
/// A line without a leading quantity is returned as [`ParseOutcome::Unparsed`].
pub fn parse_line(line: &str, registry: &UnitRegistry) -> ParseOutcome {
    let Some(captures) = QUANTITY_LINE_REGEX.captures(line) else {
        trace!("No quantity in line: '{}'", line);
        return ParseOutcome::Unparsed(line.trim().to_string());
    };

    let first = match (captures.name("word"), captures.name("num")) {
        (Some(word), _) => number_word_value(word.as_str()),
        (None, Some(num)) => parse_number(num.as_str()),
        (None, None) => None,
    };
    let Some(first) = first else {
        return ParseOutcome::Unparsed(line.trim().to_string());
    };
    let second = captures.name("num2").and_then(|m| parse_number(m.as_str()));
    let approx = captures.name("approx").is_some();

    let end = captures.get(0).map_or(0, |m| m.end());
    let mut tokens: Vec<&str> = line[end..].split_whitespace().collect();
    if tokens.first().is_some_and(|t| t.eq_ignore_ascii_case("of")) {
        tokens.remove(0);
    }

    let (unit, item_tokens) = match resolve_leading_unit(&tokens, registry) {
        Some((written, spec, used)) => (Some((written, spec)), &tokens[used..]),
        None => (None, &tokens[..]),
    };
    let item_tokens = match item_tokens.first() {
        Some(t) if unit.is_some() && t.eq_ignore_ascii_case("of") => &item_tokens[1..],
        _ => item_tokens,
    };

    let name = clean_item_name(&item_tokens.join(" "));
    let item = ParsedItem::new(line.trim(), &name).with_range(first, second.unwrap_or(first));
    let item = match unit {
        Some((written, spec)) => item.with_unit(Some(written.as_str()), spec),
        None => item.with_unit(Some("each"), registry.each()).implicit(),
    };
    let item = item.approximate(approx);

    debug!(
        "Parsed line '{}' -> qty={:?} unit={:?} name='{}' confidence={:.2}",
        line.trim(),
        item.quantity,
        item.unit,
        item.name,
        item.confidence
    );
    ParseOutcome::Parsed(item)
}

/// Try the first two tokens as one alias, then the first token alone.
/// Returns the unit text as written, its spec and how many tokens it used.
pub fn resolve_leading_unit<'r>(tokens: &[&str], registry: &'r UnitRegistry) -> Option<(String, &'r UnitSpec, usize)> {
    if tokens.len() >= 2 {
        if let Some(spec) = registry.resolve_tokens(&tokens[..2]) {
            return Some((tokens[..2].join(" "), spec, 2));
        }
    }
    let first = tokens.first()?;
    registry
        .resolve(first)
        .map(|spec| (first.trim_end_matches(|c: char| !c.is_alphanumeric()).to_string(), spec, 1))
}

/// Parse every non-blank line of a message.
///
/// Returns the parsed items and the lines that had no quantity. Pickup and
/// drop-off headings are neither items nor unparsed lines.
pub fn parse_text(text: &str, registry: &UnitRegistry) -> (Vec<ParsedItem>, Vec<String>) {
    let mut items = Vec::new();
    let mut unparsed = Vec::new();

    for line in normalize_text(text).lines() {
        if line.trim().is_empty() || is_non_food_heading(line) {
            continue;
        }
        match parse_line(line, registry) {
            ParseOutcome::Parsed(item) => items.push(item),
            ParseOutcome::Unparsed(line) => unparsed.push(line),
        }
    }

    debug!("Lexed {} items, {} unparsed lines", items.len(), unparsed.len());
    (items, unparsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::unit_registry::UnitKind;

    fn parsed(line: &str) -> ParsedItem {
        match parse_line(line, &UnitRegistry::standard()) {
            ParseOutcome::Parsed(item) => item,
            ParseOutcome::Unparsed(line) => panic!("expected '{line}' to parse"),
        }
    }

    #[test]
    fn test_parse_weight_conversion() {
        let item = parsed("4 kg rice");
        assert_eq!(item.name, "rice");
        assert_eq!(item.unit.as_deref(), Some("kg"));
        assert_eq!(item.canonical_unit, "lb");
        assert!((item.canonical_quantity.unwrap() - 8.818).abs() < 0.05);
    }

    #[test]
    fn test_parse_volume() {
        let item = parsed("3 gallons soup");
        assert_eq!(item.canonical_unit, "gallon");
        assert_eq!(item.canonical_quantity, Some(3.0));
        assert_eq!(item.unit_kind, UnitKind::Volume);
    }

    #[test]
    fn test_implicit_unit() {
        let item = parsed("12 cucumbers");
        assert_eq!(item.quantity, Some(12.0));
        assert_eq!(item.unit.as_deref(), Some("each"));
        assert_eq!(item.canonical_unit, "each");
        assert_eq!(item.unit_kind, UnitKind::Count);
        assert!(item.implicit_unit);
        assert!(item.confidence < 0.8);
    }

    #[test]
    fn test_range_quantities() {
        let item = parsed("2-3 cases apples");
        assert_eq!(item.quantity, Some(2.5));
        assert_eq!(item.quantity_min, Some(2.0));
        assert_eq!(item.quantity_max, Some(3.0));

        let reversed = parsed("3 to 2 kg rice");
        assert_eq!(reversed.quantity, Some(2.5));
        assert_eq!(reversed.quantity_min, Some(2.0));
        assert_eq!(reversed.quantity_max, Some(3.0));
        assert!((reversed.canonical_quantity_min.unwrap() - 4.40924).abs() < 1e-6);
        assert!((reversed.canonical_quantity_max.unwrap() - 6.61386).abs() < 1e-6);

        let dashed = parsed("2–4 bags onions");
        assert_eq!(dashed.quantity, Some(3.0));
    }

    #[test]
    fn test_number_words_and_approx() {
        let item = parsed("about a dozen bagels");
        assert_eq!(item.quantity, Some(12.0));
        assert!(item.approx);
        assert_eq!(item.name, "bagels");

        let item = parsed("a couple cases of yogurt");
        assert_eq!(item.quantity, Some(2.0));
        assert_eq!(item.canonical_unit, "case");
        assert_eq!(item.name, "yogurt");

        let item = parsed("~5 lbs carrots");
        assert!(item.approx);
        assert!((item.confidence - 0.90).abs() < 1e-9);
    }

    #[test]
    fn test_thousands_and_decimals() {
        assert_eq!(parsed("1,200 lbs potatoes").quantity, Some(1200.0));
        assert_eq!(parsed("2.5 gal milk").quantity, Some(2.5));
    }

    #[test]
    fn test_two_token_unit() {
        let item = parsed("3 shopping bags bread");
        assert_eq!(item.unit.as_deref(), Some("shopping bags"));
        assert_eq!(item.canonical_unit, "bag");
        assert_eq!(item.name, "bread");
    }

    #[test]
    fn test_glued_and_bulleted() {
        let item = parsed("- 5 cartons of milk");
        assert_eq!(item.canonical_unit, "case");
        assert_eq!(item.name, "milk");

        let item = parsed("-1 pallett blackberries");
        assert_eq!(item.canonical_unit, "pallet");
        assert_eq!(item.name, "blackberries");
    }

    #[test]
    fn test_unparsed_lines() {
        let registry = UnitRegistry::standard();
        assert_eq!(
            parse_line("thanks everyone!", &registry),
            ParseOutcome::Unparsed("thanks everyone!".to_string())
        );

        let (items, unparsed) = parse_text(
            "Picked up from Aldi\n2 cases apples\n\nlots of stuff today\n3 bags rice",
            &registry,
        );
        assert_eq!(items.len(), 2);
        assert_eq!(unparsed, vec!["lots of stuff today".to_string()]);
    }

    #[test]
    fn test_every_alias_resolves() {
        let registry = UnitRegistry::standard();
        for (alias, spec) in registry.aliases() {
            let line = format!("3 {alias} widgets");
            match parse_line(&line, &registry) {
                ParseOutcome::Parsed(item) => {
                    assert_eq!(item.canonical_unit, spec.canonical_unit, "alias {alias}");
                    assert_eq!(item.unit_kind, spec.kind, "alias {alias}");
                    assert_eq!(item.name, "widgets", "alias {alias}");
                }
                ParseOutcome::Unparsed(_) => panic!("alias {alias} failed to parse"),
            }
        }
    }
}
