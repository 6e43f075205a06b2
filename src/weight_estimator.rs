//! # Weight Estimator
//!
//! Rough pound estimates for rescued items, used for the record's estimated
//! total. The lookup tables are static; nothing here is configurable at
//! runtime.
//!
//! ```rust
//! use rescue_intake::weight_estimator::{categorize_item, estimate_weight_lbs};
//!
//! assert_eq!(estimate_weight_lbs("bananas", Some(2.0), Some("cases")), Some(80.0));
//! assert_eq!(estimate_weight_lbs("rice", Some(3.0), Some("bags")), Some(24.0));
//! assert_eq!(categorize_item("Honeycrisp apples"), Some("produce"));
//! ```

use crate::unit_registry::alias_key;
use log::trace;
use std::collections::HashMap;
use std::sync::LazyLock;

/// Per-case weight when nothing about the item is recognized
pub const DEFAULT_CASE_LBS: f64 = 18.0;
/// Per-unit weight when the unit is unknown or implicit
pub const DEFAULT_UNIT_LBS: f64 = 5.0;
/// Per-unit weight for loose bread and desserts
pub const BAKED_UNIT_LBS: f64 = 2.5;

/// Name keywords checked, in order, for case/box weights
const CASE_KEYWORDS: &[(&str, f64)] = &[
    ("banana", 40.0),
    ("produce", 30.0),
    ("fruit", 30.0),
    ("vegetable", 30.0),
    ("veggie", 30.0),
    ("meat", 40.0),
    ("chicken", 40.0),
    ("beef", 40.0),
    ("pork", 40.0),
    ("dairy", 35.0),
    ("milk", 35.0),
    ("yogurt", 35.0),
    ("bread", 20.0),
    ("baked", 20.0),
    ("bakery", 20.0),
    ("frozen", 30.0),
];

/// Per-case weight by subcategory, when no name keyword matched
static SUBCATEGORY_CASE_LBS: LazyLock<HashMap<&'static str, f64>> = LazyLock::new(|| {
    HashMap::from([
        ("produce", 30.0),
        ("meat", 40.0),
        ("seafood", 40.0),
        ("dairy", 35.0),
        ("drinks", 30.0),
        ("grain", 20.0),
        ("dry goods", 25.0),
        ("snacks", 15.0),
    ])
});

/// Subcategory keywords, checked in order; the first group with a hit wins
const SUBCATEGORY_KEYWORDS: &[(&str, &[&str])] = &[
    (
        "drinks",
        &["water", "juice", "soda", "coffee", "tea", "latte", "drink", "beverage", "milk", "kombucha", "sparkling"],
    ),
    (
        "snacks",
        &[
            "snack", "chips", "cracker", "pretzel", "cookie", "popcorn", "granola", "trail mix", "protein bar",
            "candy", "nuts", "almond", "peanut", "cashew", "pistachio",
        ],
    ),
    (
        "produce",
        &[
            "apple", "orange", "banana", "berry", "berries", "grape", "melon", "clementine", "fruit", "green",
            "lettuce", "cabbage", "potato", "onion", "pepper", "tomato", "carrot", "spinach", "produce",
            "vegetable", "brussel", "pear", "lemon", "grapefruit", "guava", "cuke", "cucumber", "bean",
            "split pea", "broccoli", "brocolli", "eggplant",
        ],
    ),
    ("grain", &["bread", "loaf", "loaves", "rice", "pasta", "grain", "tortilla", "dessert", "cake", "bun", "bagel"]),
    ("meat", &["chicken", "beef", "pork", "turkey", "meat", "steak", "sausage", "ribs"]),
    (
        "dry goods",
        &[
            "canned", "dry goods", "pantry", "shelf stable", "flour", "sugar", "salt", "spice", "seasoning", "oil",
            "vinegar", "lentil", "chickpea", "oat", "cereal", "broth", "stock", "sauce", "condiment",
        ],
    ),
    ("dairy", &["cheese", "yogurt", "butter", "cream", "kefir", "egg"]),
    ("seafood", &["scallop", "fish", "shrimp", "salmon", "tuna"]),
];

/// Coarse food subcategory from keywords in the item name
pub fn categorize_item(name: &str) -> Option<&'static str> {
    let lower = name.to_lowercase();
    SUBCATEGORY_KEYWORDS
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|k| lower.contains(k)))
        .map(|(category, _)| *category)
}

/// Unit groups the estimator distinguishes
#[derive(Debug, Clone, Copy, PartialEq)]
enum UnitFamily {
    Pound,
    CaseOrBox,
    Bag,
    BinToteCrate,
    Flat,
    Gallon,
    Dozen,
    Pallet { per_unit: f64 },
    Other,
}

fn unit_family(unit: &str) -> UnitFamily {
    let key = alias_key(unit);
    match key.as_str() {
        "lb" | "lbs" | "pound" | "pounds" => return UnitFamily::Pound,
        "gallon" | "gallons" | "gal" | "gals" => return UnitFamily::Gallon,
        "dozen" | "dz" | "doz" => return UnitFamily::Dozen,
        "cs" | "bx" => return UnitFamily::CaseOrBox,
        _ => {}
    }
    if key.contains("pallet") || key.contains("palett") {
        let per_unit = if key.contains("full") {
            800.0
        } else if key.contains("small") {
            250.0
        } else {
            500.0
        };
        UnitFamily::Pallet { per_unit }
    } else if key.contains("case") || key.contains("box") || key.contains("carton") {
        UnitFamily::CaseOrBox
    } else if key.contains("bag") || key.contains("sack") {
        UnitFamily::Bag
    } else if key.contains("bin") || key.contains("tote") || key.contains("crate") {
        UnitFamily::BinToteCrate
    } else if key.contains("flat") {
        UnitFamily::Flat
    } else {
        UnitFamily::Other
    }
}

fn case_weight(name: &str) -> f64 {
    let lower = name.to_lowercase();
    if let Some((_, lbs)) = CASE_KEYWORDS.iter().find(|(keyword, _)| lower.contains(keyword)) {
        return *lbs;
    }
    categorize_item(&lower)
        .and_then(|category| SUBCATEGORY_CASE_LBS.get(category).copied())
        .unwrap_or(DEFAULT_CASE_LBS)
}

/// Estimate pounds for `quantity` of `unit` of the named item.
///
/// Pounds come back exactly as given; every other estimate is rounded to
/// hundredths. Returns None when the quantity is missing, non-positive or
/// non-finite.
pub fn estimate_weight_lbs(name: &str, quantity: Option<f64>, unit: Option<&str>) -> Option<f64> {
    let quantity = quantity.filter(|q| q.is_finite() && *q > 0.0)?;
    let family = unit.map_or(UnitFamily::Other, unit_family);

    let per_unit = match family {
        UnitFamily::Pound => return Some(quantity),
        UnitFamily::CaseOrBox => case_weight(name),
        UnitFamily::Bag => 8.0,
        UnitFamily::BinToteCrate => 25.0,
        UnitFamily::Flat => 12.0,
        UnitFamily::Gallon => 8.0,
        UnitFamily::Dozen => 6.0,
        UnitFamily::Pallet { per_unit } => per_unit,
        UnitFamily::Other => {
            let lower = name.to_lowercase();
            if lower.contains("bread") || lower.contains("dessert") {
                BAKED_UNIT_LBS
            } else {
                DEFAULT_UNIT_LBS
            }
        }
    };

    let estimate = (quantity * per_unit * 100.0).round() / 100.0;
    trace!("Estimated {} x {:?} '{}' at {} lbs", quantity, unit, name, estimate);
    Some(estimate)
}
