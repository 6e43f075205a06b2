use rescue_intake::item_model::ParseOutcome;
use rescue_intake::quantity_lexer::{parse_line, parse_text};
use rescue_intake::text_processing::{is_non_food_heading, match_key_name, strip_leading_bullet};
use rescue_intake::unit_registry::UnitRegistry;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn parsed(line: &str, registry: &UnitRegistry) -> rescue_intake::item_model::ParsedItem {
    match parse_line(line, registry) {
        ParseOutcome::Parsed(item) => item,
        ParseOutcome::Unparsed(line) => panic!("expected '{line}' to parse"),
    }
}

#[test]
fn test_every_alias_resolves_to_its_spec() {
    init_logging();
    let registry = UnitRegistry::standard();
    for (alias, spec) in registry.aliases() {
        let item = parsed(&format!("3 {alias} widgets"), &registry);
        assert_eq!(item.canonical_unit, spec.canonical_unit, "alias '{alias}'");
        assert_eq!(item.unit_kind, spec.kind, "alias '{alias}'");
    }
}

#[test]
fn test_pallet_typos() {
    let registry = UnitRegistry::standard();
    for line in ["1 pallett blackberries", "2 palletts of melons", "1 pallet squash"] {
        assert_eq!(parsed(line, &registry).canonical_unit, "pallet");
    }
}

#[test]
fn test_range_endpoints_are_order_independent() {
    let registry = UnitRegistry::standard();
    let forward = parsed("2-4 kg rice", &registry);
    let backward = parsed("4-2 kg rice", &registry);

    assert_eq!(forward.quantity, Some(3.0));
    assert_eq!(backward.quantity, Some(3.0));
    assert_eq!(forward.quantity_min, backward.quantity_min);
    assert_eq!(forward.quantity_max, backward.quantity_max);
    assert_eq!(forward.canonical_quantity_min, backward.canonical_quantity_min);
    assert!(forward.canonical_quantity_min.unwrap() < forward.canonical_quantity_max.unwrap());
}

#[test]
fn test_confidence_always_in_bounds() {
    let registry = UnitRegistry::standard();
    for line in ["4 kg rice", "about 3 apples", "~2 to 5 cases pears", "12 cucumbers", "1,200 lbs potatoes"] {
        let item = parsed(line, &registry);
        assert!((0.05..=0.98).contains(&item.confidence), "{line}: {}", item.confidence);
    }
}

#[test]
fn test_mixed_message_lexing() {
    init_logging();
    let registry = UnitRegistry::standard();
    let text = "Picked up from Aldi Lyons\r\n- 2 cases apples\r\n\r\nlots of random stuff\r\nDropped off at UC";
    let (items, unparsed) = parse_text(text, &registry);

    assert_eq!(items.len(), 1);
    assert_eq!(items[0].name, "apples");
    assert_eq!(unparsed, vec!["lots of random stuff"]);
}

#[test]
fn test_heading_predicate() {
    assert!(is_non_food_heading("Earlier today from 1440 Kostner Aldi:"));
    assert!(is_non_food_heading("[x] Delivered to Love Fridge"));
    assert!(is_non_food_heading("PICKUPED FROM lyons"));
    assert!(!is_non_food_heading("bread from the bakery"));
    assert!(!is_non_food_heading(""));
}

#[test]
fn test_bullets_and_match_keys() {
    assert_eq!(strip_leading_bullet("  • 2 cases apples "), "2 cases apples");
    assert_eq!(strip_leading_bullet("[ ] milk"), "milk");
    assert_eq!(match_key_name("Apples (Gala)!"), "apples");
    assert_eq!(match_key_name("  Sweet   Potatoes. "), "sweet potatoes");
}
