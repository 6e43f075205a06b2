//! # Rescue Item and Record Data Model
//!
//! Data structures for donations extracted from volunteer messages.
//!
//! ## Core Concepts
//!
//! - **ParsedItem**: one food line with its quantity, unit and canonical conversion
//! - **ParseOutcome**: a line either parses into an item or is kept as unparsed text
//! - **Totals**: per-bucket sums derived from the items, never stored separately
//! - **NormalizedRecord**: everything extracted from one inbound message
//!
//! ## Usage
//!
//! ```rust
//! use rescue_intake::item_model::ParsedItem;
//! use rescue_intake::unit_registry::UnitRegistry;
//!
//! let registry = UnitRegistry::standard();
//! let kg = registry.resolve("kg").unwrap();
//! let rice = ParsedItem::new("4 kg rice", "rice")
//!     .with_quantity(4.0)
//!     .with_unit(Some("kg"), kg);
//!
//! assert_eq!(rice.canonical_unit, "lb");
//! assert!((rice.canonical_quantity.unwrap() - 8.818).abs() < 0.05);
//! ```

use crate::location::{Direction, LocationSection};
use crate::unit_registry::{UnitKind, UnitSpec};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

pub const MIN_CONFIDENCE: f64 = 0.05;
pub const MAX_CONFIDENCE: f64 = 0.98;

/// Where the extraction saw an item
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemSource {
    Text,
    Image,
}

/// A single donated item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedItem {
    /// The line (or oracle item) this came from
    pub raw_text: String,

    /// Point quantity; the midpoint for ranges
    pub quantity: Option<f64>,
    pub quantity_min: Option<f64>,
    pub quantity_max: Option<f64>,

    /// Unit as written ("sacks", "big bags"); None when the text named none
    pub unit: Option<String>,
    pub canonical_unit: String,
    pub unit_kind: UnitKind,

    pub canonical_quantity: Option<f64>,
    pub canonical_quantity_min: Option<f64>,
    pub canonical_quantity_max: Option<f64>,

    pub name: String,

    /// Heuristic parse reliability, always within [0.05, 0.98]
    pub confidence: f64,

    /// Quantity was marked approximate ("~", "about")
    pub approx: bool,

    /// No unit was written; "each" was assumed
    pub implicit_unit: bool,

    pub sources: BTreeSet<ItemSource>,
    pub subcategory: Option<String>,
    pub estimated_weight_lbs: Option<f64>,
    pub notes: Option<String>,

    /// Multiplier from `quantity` to `canonical_quantity`; stored so a
    /// reloaded item can still recompute its canonical quantities
    #[serde(default = "unit_factor")]
    conversion_factor: f64,
}

fn unit_factor() -> f64 {
    1.0
}

/// Result of parsing a single line
#[derive(Debug, Clone, PartialEq)]
pub enum ParseOutcome {
    Parsed(ParsedItem),
    Unparsed(String),
}

/// Per-bucket sums over a record's items
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Totals {
    pub weight_lb: f64,
    pub volume_gallons: f64,
    pub containers: BTreeMap<String, f64>,
    pub count_each: f64,
}

/// Everything extracted from one inbound message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedRecord {
    pub raw_text: String,
    /// Canonical pickup location, empty when unresolved
    pub location: String,
    /// Canonical drop-off location, empty when unresolved
    pub drop_off_location: String,
    #[serde(default)]
    pub direction: Direction,
    /// Per-site item lists when the message covers several stops
    #[serde(default)]
    pub sections: Vec<LocationSection>,
    pub items: Vec<ParsedItem>,
    pub unparsed_lines: Vec<String>,
    /// Why the AI extraction contributed nothing, if it failed
    pub oracle_error: Option<String>,
    /// Per-image download or decode failures
    pub image_errors: Vec<String>,
}

/// Confidence heuristic shared by every deterministic parser
pub fn score_confidence(has_quantity: bool, explicit_unit: bool, has_name: bool, approx: bool) -> f64 {
    let mut score = 0.30;
    if has_quantity {
        score += 0.30;
    }
    if explicit_unit {
        score += 0.25;
    } else {
        score -= 0.10;
    }
    if has_name {
        score += 0.10;
    }
    if approx {
        score -= 0.05;
    }
    clamp_confidence(score)
}

pub fn clamp_confidence(value: f64) -> f64 {
    if value.is_nan() {
        return MIN_CONFIDENCE;
    }
    value.clamp(MIN_CONFIDENCE, MAX_CONFIDENCE)
}

impl ParsedItem {
    /// A name-only item: no quantity, implicit "each"
    pub fn new(raw_text: &str, name: &str) -> Self {
        let mut item = Self {
            raw_text: raw_text.to_string(),
            quantity: None,
            quantity_min: None,
            quantity_max: None,
            unit: None,
            canonical_unit: "each".to_string(),
            unit_kind: UnitKind::Count,
            canonical_quantity: None,
            canonical_quantity_min: None,
            canonical_quantity_max: None,
            name: name.to_string(),
            confidence: MIN_CONFIDENCE,
            approx: false,
            implicit_unit: true,
            sources: BTreeSet::from([ItemSource::Text]),
            subcategory: None,
            estimated_weight_lbs: None,
            notes: None,
            conversion_factor: 1.0,
        };
        item.rescore();
        item
    }

    /// Set a single quantity
    pub fn with_quantity(self, quantity: f64) -> Self {
        self.with_range(quantity, quantity)
    }

    /// Set a quantity range; endpoint order does not matter
    pub fn with_range(mut self, first: f64, second: f64) -> Self {
        let (min, max) = if first <= second { (first, second) } else { (second, first) };
        self.quantity = Some((first + second) / 2.0);
        self.quantity_min = Some(min);
        self.quantity_max = Some(max);
        self.refresh_canonical();
        self.rescore();
        self
    }

    /// Set the unit. `written` is the text as it appeared; `None` marks the
    /// unit as implicit while still applying `spec`'s conversion.
    pub fn with_unit(mut self, written: Option<&str>, spec: &UnitSpec) -> Self {
        self.unit = written.map(str::to_string);
        self.implicit_unit = written.is_none();
        self.canonical_unit = spec.canonical_unit.clone();
        self.unit_kind = spec.kind;
        self.conversion_factor = spec.factor;
        self.refresh_canonical();
        self.rescore();
        self
    }

    /// Keep a unit the registry does not know; it counts as its own container
    pub fn with_unknown_unit(mut self, written: &str) -> Self {
        self.unit = Some(written.to_string());
        self.implicit_unit = false;
        self.canonical_unit = written.trim().to_lowercase();
        self.unit_kind = UnitKind::Container;
        self.conversion_factor = 1.0;
        self.refresh_canonical();
        self.rescore();
        self
    }

    /// Mark the current unit as assumed rather than written
    pub fn implicit(mut self) -> Self {
        self.implicit_unit = true;
        self.rescore();
        self
    }

    pub fn with_notes(mut self, notes: Option<String>) -> Self {
        self.notes = notes.filter(|n| !n.trim().is_empty());
        self
    }

    pub fn approximate(mut self, approx: bool) -> Self {
        self.approx = approx;
        self.rescore();
        self
    }

    pub fn with_sources(mut self, sources: BTreeSet<ItemSource>) -> Self {
        self.sources = sources;
        self
    }

    /// Override the heuristic score (oracle-reported confidence)
    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = clamp_confidence(confidence);
        self
    }

    pub fn has_quantity(&self) -> bool {
        self.quantity.is_some()
    }

    pub fn conversion_factor(&self) -> f64 {
        self.conversion_factor
    }

    /// Recompute canonical quantities from the current quantities and unit
    pub fn refresh_canonical(&mut self) {
        let factor = self.conversion_factor;
        self.canonical_quantity = self.quantity.map(|q| q * factor);
        self.canonical_quantity_min = self.quantity_min.map(|q| q * factor);
        self.canonical_quantity_max = self.quantity_max.map(|q| q * factor);
    }

    /// Copy quantity fields from another item
    pub(crate) fn take_quantity_from(&mut self, other: &ParsedItem) {
        self.quantity = other.quantity;
        self.quantity_min = other.quantity_min;
        self.quantity_max = other.quantity_max;
    }

    /// Copy unit fields from another item
    pub(crate) fn take_unit_from(&mut self, other: &ParsedItem) {
        self.unit = other.unit.clone();
        self.canonical_unit = other.canonical_unit.clone();
        self.unit_kind = other.unit_kind;
        self.implicit_unit = other.implicit_unit;
        self.conversion_factor = other.conversion_factor;
    }

    fn rescore(&mut self) {
        self.confidence = score_confidence(
            self.quantity.is_some(),
            !self.implicit_unit,
            !self.name.is_empty(),
            self.approx,
        );
    }
}

impl Totals {
    /// Fold items into their unit-kind buckets; items without a quantity add nothing
    pub fn from_items(items: &[ParsedItem]) -> Self {
        let mut totals = Totals::default();
        for item in items {
            let Some(quantity) = item.canonical_quantity else {
                continue;
            };
            match item.unit_kind {
                UnitKind::Weight => totals.weight_lb += quantity,
                UnitKind::Volume => totals.volume_gallons += quantity,
                UnitKind::Container => {
                    *totals.containers.entry(item.canonical_unit.clone()).or_insert(0.0) += quantity;
                }
                UnitKind::Count => totals.count_each += quantity,
            }
        }
        totals
    }

    pub fn is_empty(&self) -> bool {
        self.weight_lb == 0.0
            && self.volume_gallons == 0.0
            && self.count_each == 0.0
            && self.containers.values().all(|v| *v == 0.0)
    }
}

impl NormalizedRecord {
    pub fn new(raw_text: &str) -> Self {
        Self {
            raw_text: raw_text.to_string(),
            location: String::new(),
            drop_off_location: String::new(),
            direction: Direction::Unknown,
            sections: Vec::new(),
            items: Vec::new(),
            unparsed_lines: Vec::new(),
            oracle_error: None,
            image_errors: Vec::new(),
        }
    }

    pub fn totals(&self) -> Totals {
        Totals::from_items(&self.items)
    }

    /// Sum of per-item weight estimates
    pub fn estimated_total_lbs(&self) -> f64 {
        let total: f64 = self.items.iter().filter_map(|i| i.estimated_weight_lbs).sum();
        (total * 100.0).round() / 100.0
    }

    pub fn parsed_count(&self) -> usize {
        self.items.len()
    }

    pub fn unparsed_count(&self) -> usize {
        self.unparsed_lines.len()
    }
}

/// Render a quantity without trailing zeros: 2, 2.5, 8.82
pub fn format_quantity(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        let rounded = format!("{value:.2}");
        rounded.trim_end_matches('0').trim_end_matches('.').to_string()
    }
}

impl fmt::Display for ParsedItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.approx {
            write!(f, "~")?;
        }
        match (self.quantity_min, self.quantity_max) {
            (Some(min), Some(max)) if min != max => {
                write!(f, "{}-{} ", format_quantity(min), format_quantity(max))?
            }
            _ => {
                if let Some(quantity) = self.quantity {
                    write!(f, "{} ", format_quantity(quantity))?;
                }
            }
        }
        if self.quantity.is_some() {
            write!(f, "{} ", self.unit.as_deref().unwrap_or(&self.canonical_unit))?;
        }
        write!(f, "{}", self.name)?;
        if let Some(notes) = &self.notes {
            write!(f, " ({notes})")?;
        }
        Ok(())
    }
}
