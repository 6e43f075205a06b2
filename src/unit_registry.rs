//! # Unit Registry
//!
//! Static table of the units volunteers use when logging rescues, and the
//! alias index used to resolve free-form tokens ("cs", "sacks", "pallett")
//! to a canonical unit.
//!
//! The registry is built once and shared read-only (`Arc<UnitRegistry>`);
//! callers construct and inject it so tests can swap in their own tables.
//!
//! ## Usage
//!
//! ```rust
//! use rescue_intake::unit_registry::{UnitKind, UnitRegistry};
//!
//! let registry = UnitRegistry::standard();
//! let spec = registry.resolve("Palletts").unwrap();
//! assert_eq!(spec.canonical_unit, "pallet");
//! assert_eq!(spec.kind, UnitKind::Container);
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Which totals bucket a unit contributes to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitKind {
    /// Canonical unit is pounds
    Weight,
    /// Canonical unit is gallons
    Volume,
    /// Each container is canonical to itself (bag, case, pallet...)
    Container,
    /// Loose items, canonical unit "each"
    Count,
}

/// A unit and every spelling that resolves to it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitSpec {
    /// Registry key (e.g. "kg")
    pub key: String,
    /// Totals bucket
    pub kind: UnitKind,
    /// Unit quantities are converted to (e.g. "lb")
    pub canonical_unit: String,
    /// Spellings, including typos, that resolve to this unit
    pub aliases: Vec<String>,
    /// Multiplier from this unit to the canonical unit
    pub factor: f64,
}

impl UnitSpec {
    pub fn new(key: &str, kind: UnitKind, canonical_unit: &str, factor: f64, aliases: &[&str]) -> Self {
        Self {
            key: key.to_string(),
            kind,
            canonical_unit: canonical_unit.to_string(),
            aliases: aliases.iter().map(|a| a.to_string()).collect(),
            factor,
        }
    }

    /// Container that is canonical to itself
    fn container(key: &str, aliases: &[&str]) -> Self {
        Self::new(key, UnitKind::Container, key, 1.0, aliases)
    }

    /// Convert a quantity in this unit to the canonical unit
    pub fn to_canonical(&self, quantity: f64) -> f64 {
        quantity * self.factor
    }
}

impl fmt::Display for UnitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            UnitKind::Weight => "weight",
            UnitKind::Volume => "volume",
            UnitKind::Container => "container",
            UnitKind::Count => "count",
        };
        write!(f, "{name}")
    }
}

/// Lookup key for aliases: lowercase, alphanumerics only
pub fn alias_key(token: &str) -> String {
    token
        .chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(|c| c.to_lowercase())
        .collect()
}

/// Immutable unit table plus its derived alias index
#[derive(Debug, Clone)]
pub struct UnitRegistry {
    specs: Vec<UnitSpec>,
    index: HashMap<String, usize>,
    each: usize,
}

impl UnitRegistry {
    /// Build a registry from an explicit table.
    ///
    /// The first spec whose canonical unit is "each" is used for implicit
    /// units; if none is supplied, one is appended. Later aliases never
    /// replace an earlier one.
    pub fn new(mut specs: Vec<UnitSpec>) -> Self {
        let each = match specs.iter().position(|s| s.canonical_unit == "each" && s.factor == 1.0) {
            Some(idx) => idx,
            None => {
                specs.push(UnitSpec::new("each", UnitKind::Count, "each", 1.0, &["each"]));
                specs.len() - 1
            }
        };

        let mut index = HashMap::new();
        for (idx, spec) in specs.iter().enumerate() {
            for alias in spec.aliases.iter().chain(std::iter::once(&spec.key)) {
                let key = alias_key(alias);
                if !key.is_empty() {
                    index.entry(key).or_insert(idx);
                }
            }
        }

        log::debug!("Unit registry built with {} specs, {} aliases", specs.len(), index.len());
        Self { specs, index, each }
    }

    /// The fixed table used in production
    pub fn standard() -> Self {
        use UnitKind::*;
        Self::new(vec![
            // Weight
            UnitSpec::new("lb", Weight, "lb", 1.0, &["lb", "lbs", "pound", "pounds"]),
            UnitSpec::new("kg", Weight, "lb", 2.20462, &["kg", "kgs", "kilo", "kilos", "kilogram", "kilograms"]),
            UnitSpec::new("g", Weight, "lb", 0.00220462, &["g", "gram", "grams"]),
            UnitSpec::new("oz", Weight, "lb", 1.0 / 16.0, &["oz", "ounce", "ounces"]),
            UnitSpec::new("ton", Weight, "lb", 2000.0, &["ton", "tons"]),
            // Volume
            UnitSpec::new("gallon", Volume, "gallon", 1.0, &["gallon", "gallons", "gal", "gals"]),
            UnitSpec::new("liter", Volume, "gallon", 0.264172, &["l", "liter", "liters", "litre", "litres"]),
            UnitSpec::new("quart", Volume, "gallon", 0.25, &["quart", "quarts", "qt", "qts"]),
            UnitSpec::new("pint", Volume, "gallon", 0.125, &["pint", "pints", "pt", "pts"]),
            // Containers
            UnitSpec::container(
                "bag",
                &["bag", "bags", "sack", "sacks", "shopping bag", "shopping bags", "big bag", "big bags", "large bag", "large bags"],
            ),
            UnitSpec::container("case", &["case", "cases", "cs", "carton", "cartons"]),
            UnitSpec::container("pallet", &["pallet", "pallets", "pallett", "palletts", "palette", "palettes"]),
            UnitSpec::container("box", &["box", "boxes", "bx"]),
            UnitSpec::container("bunch", &["bunch", "bunches"]),
            UnitSpec::container("bottle", &["bottle", "bottles"]),
            UnitSpec::container("can", &["can", "cans"]),
            UnitSpec::container("jar", &["jar", "jars"]),
            UnitSpec::container("tray", &["tray", "trays"]),
            UnitSpec::container("clamshell", &["clamshell", "clamshells"]),
            UnitSpec::container("loaf", &["loaf", "loaves"]),
            UnitSpec::container("bin", &["bin", "bins"]),
            UnitSpec::container("tote", &["tote", "totes"]),
            UnitSpec::container("crate", &["crate", "crates"]),
            UnitSpec::container("flat", &["flat", "flats"]),
            UnitSpec::container("package", &["package", "packages", "pkg", "pkgs"]),
            // Count
            UnitSpec::new("each", Count, "each", 1.0, &["each", "ea", "pc", "pcs", "piece", "pieces"]),
            UnitSpec::new("dozen", Count, "each", 12.0, &["dozen", "dz", "doz"]),
        ])
    }

    /// Resolve a single token or phrase, ignoring case and punctuation
    pub fn resolve(&self, token: &str) -> Option<&UnitSpec> {
        let key = alias_key(token);
        if key.is_empty() {
            return None;
        }
        self.index.get(&key).map(|&idx| &self.specs[idx])
    }

    /// Resolve a run of tokens as one alias ("shopping", "bags" -> bag)
    pub fn resolve_tokens(&self, tokens: &[&str]) -> Option<&UnitSpec> {
        self.resolve(&tokens.concat())
    }

    /// Spec used when a line names no unit
    pub fn each(&self) -> &UnitSpec {
        &self.specs[self.each]
    }

    pub fn specs(&self) -> &[UnitSpec] {
        &self.specs
    }

    /// Every alias paired with the spec it resolves to
    pub fn aliases(&self) -> impl Iterator<Item = (&str, &UnitSpec)> {
        self.specs
            .iter()
            .flat_map(|spec| spec.aliases.iter().map(move |alias| (alias.as_str(), spec)))
    }
}

impl Default for UnitRegistry {
    fn default() -> Self {
        Self::standard()
    }
}
