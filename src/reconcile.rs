//! # Reconciliation Engine
//!
//! Merges the three candidate item lists of a message (checklist, AI,
//! fallback, always in that order) into one list.
//!
//! ## Merge policy
//!
//! Items are matched on `(name without parentheticals/punctuation,
//! canonical unit)`. When an item matches an existing entry:
//!
//! - quantity fields are taken from the incoming item only if it has a quantity
//! - unit fields are taken from the incoming item only if it names a unit
//! - every other field is overwritten by the incoming item
//! - source sets are unioned
//!
//! So later sources win on names and notes even where the checklist was
//! more reliable. After merging, items that are identical on
//! `(name, quantity, unit, notes, pounds)` collapse into one, and items
//! whose name is a pickup/drop-off heading are dropped.

use crate::item_model::{ItemSource, ParsedItem};
use crate::oracle::OracleItem;
use crate::text_processing::{dedup_name, is_non_food_heading, match_key_name};
use crate::unit_registry::UnitRegistry;
use log::{debug, trace};
use std::collections::{BTreeSet, HashMap};

/// Reconciliation key: normalized name plus canonical unit
pub fn match_key(item: &ParsedItem) -> (String, String) {
    (match_key_name(&item.name), item.canonical_unit.clone())
}

fn has_unit(item: &ParsedItem) -> bool {
    item.unit.as_deref().is_some_and(|u| !u.trim().is_empty())
}

/// Fold `incoming` into `existing` using the merge policy
pub fn merge_into(existing: &mut ParsedItem, incoming: &ParsedItem) {
    let mut merged = incoming.clone();

    if !incoming.has_quantity() {
        merged.take_quantity_from(existing);
    }
    if !has_unit(incoming) {
        merged.take_unit_from(existing);
    }
    merged.sources = existing.sources.union(&incoming.sources).copied().collect();
    merged.refresh_canonical();

    trace!("Merged '{}' into '{}'", incoming.raw_text, existing.raw_text);
    *existing = merged;
}

fn merge_sources(sources: impl IntoIterator<Item = Vec<ParsedItem>>) -> Vec<ParsedItem> {
    let mut merged: Vec<ParsedItem> = Vec::new();
    let mut index: HashMap<(String, String), usize> = HashMap::new();

    for source in sources {
        for item in source {
            let key = match_key(&item);
            match index.get(&key) {
                Some(&position) => merge_into(&mut merged[position], &item),
                None => {
                    index.insert(key, merged.len());
                    merged.push(item);
                }
            }
        }
    }
    merged
}

/// Exact-duplicate key: name, quantity, unit, notes and estimated pounds
fn dedup_key(item: &ParsedItem) -> (String, Option<u64>, String, String, Option<u64>) {
    (
        dedup_name(&item.name),
        item.quantity.map(f64::to_bits),
        item.canonical_unit.clone(),
        item.notes.as_deref().map(str::trim).unwrap_or_default().to_lowercase(),
        item.estimated_weight_lbs.map(f64::to_bits),
    )
}

/// Collapse exact duplicates, unioning their sources; first occurrence keeps its place
pub fn dedupe_items(items: Vec<ParsedItem>) -> Vec<ParsedItem> {
    let mut kept: Vec<ParsedItem> = Vec::with_capacity(items.len());
    let mut seen = HashMap::new();

    for item in items {
        let key = dedup_key(&item);
        match seen.get(&key) {
            Some(&position) => {
                let existing: &mut ParsedItem = &mut kept[position];
                existing.sources.extend(item.sources.iter().copied());
            }
            None => {
                seen.insert(key, kept.len());
                kept.push(item);
            }
        }
    }
    kept
}

/// Drop items whose name is a pickup/drop-off announcement
pub fn filter_non_food(items: Vec<ParsedItem>) -> Vec<ParsedItem> {
    items
        .into_iter()
        .filter(|item| {
            let heading = is_non_food_heading(&item.name);
            if heading {
                debug!("Dropping non-food item '{}'", item.name);
            }
            !heading
        })
        .collect()
}

/// Merge the three candidate lists, then dedupe and filter
pub fn reconcile(checklist: Vec<ParsedItem>, ai: Vec<ParsedItem>, fallback: Vec<ParsedItem>) -> Vec<ParsedItem> {
    let counts = (checklist.len(), ai.len(), fallback.len());
    let merged = merge_sources([checklist, ai, fallback]);
    let deduped = dedupe_items(merged);
    let filtered = filter_non_food(deduped);

    debug!(
        "Reconciled checklist={} ai={} fallback={} into {} items",
        counts.0,
        counts.1,
        counts.2,
        filtered.len()
    );
    filtered
}

/// Convert oracle items into parsed items.
///
/// The oracle's `unit` wins over its `container`; units the registry does
/// not know become their own container. A reported confidence replaces the
/// heuristic score; missing sources default to text.
pub fn oracle_items_to_parsed(items: &[OracleItem], registry: &UnitRegistry) -> Vec<ParsedItem> {
    items
        .iter()
        .filter(|item| !item.name.trim().is_empty())
        .map(|item| {
            let name = item.name.trim();
            let raw = match item.quantity {
                Some(quantity) => format!("{quantity} {} {name}", item.unit.as_deref().unwrap_or("")),
                None => name.to_string(),
            };
            let mut parsed = ParsedItem::new(raw.split_whitespace().collect::<Vec<_>>().join(" ").as_str(), name);

            if let Some(quantity) = item.quantity.filter(|q| q.is_finite()) {
                parsed = parsed.with_quantity(quantity);
            }

            let unit = item
                .unit
                .as_deref()
                .or(item.container.as_deref())
                .map(str::trim)
                .filter(|u| !u.is_empty());
            parsed = match unit {
                Some(unit) => match registry.resolve(unit) {
                    Some(spec) => parsed.with_unit(Some(unit), spec),
                    None => parsed.with_unknown_unit(unit),
                },
                None if parsed.has_quantity() => parsed.with_unit(None, registry.each()),
                None => parsed,
            };

            let sources: BTreeSet<ItemSource> = if item.sources.is_empty() {
                BTreeSet::from([ItemSource::Text])
            } else {
                item.sources.iter().copied().collect()
            };
            parsed = parsed.with_notes(item.notes.clone()).with_sources(sources);

            match item.confidence {
                Some(confidence) => parsed.with_confidence(confidence),
                None => parsed,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::unit_registry::UnitKind;

    fn registry() -> UnitRegistry {
        UnitRegistry::standard()
    }

    fn item(name: &str, quantity: Option<f64>, unit: Option<&str>) -> ParsedItem {
        let registry = registry();
        let mut parsed = ParsedItem::new(name, name);
        if let Some(q) = quantity {
            parsed = parsed.with_quantity(q);
        }
        match unit {
            Some(u) => parsed.with_unit(Some(u), registry.resolve(u).unwrap()),
            None => parsed.with_unit(None, registry.each()),
        }
    }

    fn oracle_item(name: &str, quantity: Option<f64>, unit: Option<&str>) -> OracleItem {
        OracleItem {
            name: name.to_string(),
            quantity,
            unit: unit.map(str::to_string),
            container: None,
            notes: None,
            confidence: None,
            sources: vec![],
        }
    }

    #[test]
    fn test_insert_when_keys_differ() {
        let result = reconcile(
            vec![item("apples", Some(2.0), Some("cases"))],
            vec![],
            vec![item("apples", Some(3.0), Some("bags"))],
        );
        assert_eq!(result.len(), 2);
    }

    #[test]
    fn test_later_source_wins_non_quantity_fields() {
        let checklist = vec![item("Bananas", Some(2.0), Some("cases")).with_notes(Some("ripe".into()))];
        let ai = vec![item("bananas!", None, Some("cases")).with_notes(Some("from AI".into()))];
        let result = reconcile(checklist, ai, vec![]);

        assert_eq!(result.len(), 1);
        assert_eq!(result[0].name, "bananas!");
        assert_eq!(result[0].notes.as_deref(), Some("from AI"));
        // quantity kept because the AI item had none
        assert_eq!(result[0].quantity, Some(2.0));
        assert_eq!(result[0].canonical_quantity, Some(2.0));
    }

    #[test]
    fn test_incoming_quantity_replaces_existing() {
        let result = reconcile(
            vec![item("rice", Some(2.0), Some("bags"))],
            vec![item("rice", Some(3.0), Some("sacks"))],
            vec![],
        );
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].quantity, Some(3.0));
        assert_eq!(result[0].unit.as_deref(), Some("sacks"));
    }

    #[test]
    fn test_unit_kept_when_incoming_has_none() {
        let mut existing = item("milk", Some(2.0), Some("gallons"));
        let mut incoming = item("milk", Some(4.0), Some("gallons"));
        incoming.unit = None;
        merge_into(&mut existing, &incoming);
        assert_eq!(existing.unit.as_deref(), Some("gallons"));
        assert_eq!(existing.canonical_unit, "gallon");
        assert_eq!(existing.quantity, Some(4.0));
        assert_eq!(existing.canonical_quantity, Some(4.0));
    }

    #[test]
    fn test_dedup_unions_sources() {
        let text = item("Apples", Some(2.0), Some("cases"));
        let image = item("apples", Some(2.0), Some("case"))
            .with_sources(BTreeSet::from([ItemSource::Image]));
        let deduped = dedupe_items(vec![text, image]);
        assert_eq!(deduped.len(), 1);
        assert_eq!(deduped[0].sources, BTreeSet::from([ItemSource::Text, ItemSource::Image]));
    }

    #[test]
    fn test_dedup_keeps_different_notes_apart() {
        let a = item("apples", Some(2.0), Some("cases")).with_notes(Some("gala".into()));
        let b = item("apples", Some(2.0), Some("cases")).with_notes(Some("fuji".into()));
        assert_eq!(dedupe_items(vec![a, b]).len(), 2);
    }

    #[test]
    fn test_headings_filtered_after_merge() {
        let ai = vec![ParsedItem::new("", "Picked up from Aldi Lyons")];
        let result = reconcile(vec![], ai, vec![item("onions", Some(1.0), Some("bag"))]);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].name, "onions");
    }

    #[test]
    fn test_oracle_conversion() {
        let registry = registry();
        let mut with_container = oracle_item("yogurt", Some(3.0), None);
        with_container.container = Some("cases".to_string());
        with_container.confidence = Some(1.5);
        with_container.sources = vec![ItemSource::Image];

        let items = oracle_items_to_parsed(
            &[
                oracle_item("rice", Some(4.0), Some("kg")),
                with_container,
                oracle_item("lettuce", Some(6.0), Some("heads")),
                oracle_item("bread", None, None),
                oracle_item("  ", Some(1.0), None),
            ],
            &registry,
        );

        assert_eq!(items.len(), 4);
        assert_eq!(items[0].canonical_unit, "lb");
        assert!((items[0].canonical_quantity.unwrap() - 8.818).abs() < 0.05);
        assert_eq!(items[0].sources, BTreeSet::from([ItemSource::Text]));

        assert_eq!(items[1].canonical_unit, "case");
        assert_eq!(items[1].confidence, crate::item_model::MAX_CONFIDENCE);
        assert_eq!(items[1].sources, BTreeSet::from([ItemSource::Image]));

        assert_eq!(items[2].canonical_unit, "heads");
        assert_eq!(items[2].unit_kind, UnitKind::Container);

        assert!(!items[3].has_quantity());
        assert_eq!(items[3].canonical_unit, "each");
    }
}
