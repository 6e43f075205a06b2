//! # Location Resolver
//!
//! Finds the pickup location named in a message and maps free-form
//! spellings ("aldi wp", "Wicker Park Aldi") to one canonical site name.
//!
//! Matching is deliberately simple: an exact hit on the normalized key wins,
//! otherwise the first alias (in table construction order) contained in the
//! candidate is accepted. Aliases of three characters or fewer ("uc") only
//! match as whole words. Unresolved locations are the empty string.
//!
//! The same module finds where food went ([`extract_dropoff_location`]),
//! classifies a message as inbound or outbound ([`detect_direction`]) and
//! splits multi-site messages into per-location sections ([`parse_sections`]).
//!
//! ## Usage
//!
//! ```rust
//! use rescue_intake::location::{extract_location, LocationAliasTable, LocationResolver};
//!
//! let resolver = LocationResolver::new(&[], &LocationAliasTable::builtin().unwrap());
//! let candidate = extract_location("Picked up from aldi wp - lots of bread").unwrap();
//! assert_eq!(candidate, "aldi wp");
//! assert_eq!(resolver.canonicalize(&candidate), "Aldi Wicker Park");
//! ```

use crate::fallback_parser::parse_fallback_lines;
use crate::item_model::ParsedItem;
use crate::measurement_patterns::{
    DROP_OFF_REGEXES, LOCATION_DASH_REGEX, LOCATION_FROM_REGEX, LOCATION_HEADER_REGEX, SECTION_HEADING_REGEX,
    TRAILING_AND_REGEX,
};
use crate::text_processing::normalize_text;
use crate::unit_registry::UnitRegistry;
use anyhow::{Context, Result};
use lazy_static::lazy_static;
use log::{debug, trace};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;

const BUILTIN_ALIASES: &str = include_str!("../data/location_aliases.json");

/// Aliases this short only match whole words
const SHORT_ALIAS_LEN: usize = 3;

/// Phrases that mean food came in to the warehouse
const INBOUND_PHRASES: &[&str] = &[
    "rescued from",
    "rescue from",
    "picked up from",
    "pickup from",
    "picked up at",
    "today from",
    "earlier today from",
    "drop off at uc",
    "dropped off at uc",
    "dropped at uc",
    "left at uc",
    "left in the warehouse",
    "dropped at warehouse",
    "dropped ",
    "left in",
    "left at",
    "drop off",
];

/// Phrases that mean food went out to a partner
const OUTBOUND_PHRASES: &[&str] = &[
    "dropped off",
    "drop off",
    "delivered to",
    "deliver to",
    "brought to",
    "took to",
    "taking to",
    "grabbed",
    "took",
    "picked up for",
    "for distro",
    "headed to",
    "delivered",
    "delivery to",
    "for love fridge",
    "for lf",
    "stocked",
];

lazy_static! {
    /// Volunteer lead-ins before the site: "SWC picked up this morning at X", "Sam took from X"
    static ref LEAD_IN_REGEX: Regex = Regex::new(
        r"(?i)^[a-z0-9 /&'’.-]+?\s+(?:picked\s+up\s+(?:(?:this\s+morning|earlier\s+today|today)\s+)?(?:at|from)|took\s+(?:directly\s+)?from)\s+(?P<loc>.+)$"
    )
    .expect("Location lead-in pattern should be valid");

    static ref LEADING_FROM_REGEX: Regex =
        Regex::new(r"(?i)^\s*from\s+").expect("Leading from pattern should be valid");
}

/// Location key form: lowercase, non-alphanumerics become spaces, whitespace collapsed
pub fn normalize_location(value: &str) -> String {
    value
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == ' ' { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<&str>>()
        .join(" ")
}

/// Ordered canonical name -> aliases table
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LocationAliasTable {
    entries: Vec<(String, Vec<String>)>,
}

impl LocationAliasTable {
    pub fn new(entries: Vec<(String, Vec<String>)>) -> Self {
        Self { entries }
    }

    /// Parse `{"Canonical": ["alias", ...], ...}`, keeping file order
    pub fn from_json_str(json: &str) -> Result<Self> {
        let map: Map<String, Value> =
            serde_json::from_str(json).context("Location alias table must be a JSON object")?;

        let mut entries = Vec::with_capacity(map.len());
        for (canonical, aliases) in map {
            let canonical = canonical.trim().to_string();
            if canonical.is_empty() {
                continue;
            }
            let aliases: Vec<String> = match aliases {
                Value::Null => Vec::new(),
                other => serde_json::from_value(other)
                    .with_context(|| format!("Aliases for '{canonical}' must be a list of strings"))?,
            };
            entries.push((canonical, aliases));
        }

        debug!("Loaded {} canonical locations", entries.len());
        Ok(Self { entries })
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read location aliases from {}", path.display()))?;
        Self::from_json_str(&json)
    }

    /// The table shipped with the crate
    pub fn builtin() -> Result<Self> {
        Self::from_json_str(BUILTIN_ALIASES)
    }

    pub fn entries(&self) -> &[(String, Vec<String>)] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Combined lookup built from known locations and an alias table
#[derive(Debug, Clone, Default)]
pub struct LocationResolver {
    /// (normalized alias, canonical) in construction order
    ordered: Vec<(String, String)>,
    exact: HashMap<String, String>,
}

impl LocationResolver {
    /// Known locations come first, then each canonical name and its aliases
    /// in table order. A key seen twice maps to its last canonical.
    pub fn new(known_locations: &[String], table: &LocationAliasTable) -> Self {
        let mut resolver = Self::default();

        for known in known_locations {
            resolver.insert(known, known);
        }
        for (canonical, aliases) in table.entries() {
            resolver.insert(canonical, canonical);
            for alias in aliases {
                resolver.insert(alias, canonical);
            }
        }

        debug!("Location resolver built with {} alias keys", resolver.ordered.len());
        resolver
    }

    /// A repeated key keeps its first position but takes the new canonical
    fn insert(&mut self, alias: &str, canonical: &str) {
        let key = normalize_location(alias);
        let canonical = canonical.trim();
        if key.is_empty() || canonical.is_empty() {
            return;
        }
        match self.ordered.iter_mut().find(|(existing, _)| *existing == key) {
            Some((_, previous)) => {
                trace!("Alias '{}' remapped from '{}' to '{}'", key, previous, canonical);
                *previous = canonical.to_string();
            }
            None => self.ordered.push((key.clone(), canonical.to_string())),
        }
        self.exact.insert(key, canonical.to_string());
    }

    /// Map a candidate to its canonical name, or "" when nothing matches
    pub fn canonicalize(&self, candidate: &str) -> String {
        let cleaned = clean_candidate(candidate);
        let key = normalize_location(&cleaned);
        if key.is_empty() {
            return String::new();
        }

        if let Some(canonical) = self.exact.get(&key) {
            trace!("Exact location match '{}' -> '{}'", key, canonical);
            return canonical.clone();
        }

        match self.ordered.iter().find(|(alias, _)| contains_alias(&key, alias)) {
            Some((alias, canonical)) => {
                trace!("Substring location match '{}' in '{}' -> '{}'", alias, key, canonical);
                canonical.clone()
            }
            None => {
                debug!("Unresolved location candidate: '{}'", candidate);
                String::new()
            }
        }
    }

    /// Canonicalize the location named in a whole message
    pub fn resolve_text(&self, text: &str) -> String {
        extract_location(text)
            .map(|candidate| self.canonicalize(&candidate))
            .unwrap_or_default()
    }
}

/// Substring match on normalized keys; short aliases must be whole words
fn contains_alias(key: &str, alias: &str) -> bool {
    if alias.len() <= SHORT_ALIAS_LEN {
        format!(" {key} ").contains(&format!(" {alias} "))
    } else {
        key.contains(alias)
    }
}

/// Strip lead-ins, a leading "from", the first line only, parenthetical tails
/// and trailing punctuation
fn clean_candidate(candidate: &str) -> String {
    let mut cleaned = candidate.trim().to_string();
    if let Some(loc) = LEAD_IN_REGEX.captures(&cleaned).map(|c| c["loc"].to_string()) {
        cleaned = loc;
    }
    let cleaned = LEADING_FROM_REGEX.replace(&cleaned, "");
    let first_line = cleaned.lines().next().unwrap_or_default();
    let without_paren = first_line.split('(').next().unwrap_or_default();
    trim_trailing_punctuation(without_paren).to_string()
}

fn trim_trailing_punctuation(value: &str) -> &str {
    value.trim_end_matches(|c: char| c.is_whitespace() || matches!(c, '.' | ',' | ';' | ':' | '!' | '-' | '–' | '—'))
}

/// Find the location a message names after a pickup header or a leading "from"
pub fn extract_location(text: &str) -> Option<String> {
    let captures = LOCATION_HEADER_REGEX
        .captures(text)
        .or_else(|| LOCATION_FROM_REGEX.captures(text))?;
    let rest = captures.name("loc")?.as_str();

    let rest = rest.split(':').next().unwrap_or_default();
    let rest = match LOCATION_DASH_REGEX.find(rest) {
        Some(dash) => &rest[..dash.start()],
        None => rest,
    };
    let location = trim_trailing_punctuation(rest.trim()).trim();

    if location.is_empty() {
        None
    } else {
        trace!("Extracted location candidate '{}'", location);
        Some(location.to_string())
    }
}

/// Collapse whitespace and drop trailing punctuation from a site name
fn clean_location(value: &str) -> String {
    trim_trailing_punctuation(value.trim())
        .split_whitespace()
        .collect::<Vec<&str>>()
        .join(" ")
}

/// Find where the food was taken ("dropped off at UC", "delivered to the
/// love fridge", "grabbed 2 cases for LSRSN").
///
/// The first matching phrasing wins; its site ends at the line end, a `;`
/// or `,`, or a trailing "and ..." clause.
pub fn extract_dropoff_location(text: &str) -> Option<String> {
    let Some(rest) = DROP_OFF_REGEXES
        .iter()
        .find_map(|regex| regex.captures(text))
        .and_then(|caps| caps.name("loc").map(|m| m.as_str()))
    else {
        let lower = text.to_lowercase();
        return (lower.contains("taken to") && lower.contains("fridge")).then(|| "Love Fridge".to_string());
    };

    let rest = rest.lines().next().unwrap_or_default();
    let rest = rest.split([';', ',']).next().unwrap_or_default();
    let location = clean_location(&TRAILING_AND_REGEX.replace(rest, ""));
    if location.is_empty() {
        None
    } else {
        trace!("Extracted drop-off candidate '{}'", location);
        Some(location)
    }
}

/// Which way food moved in a message
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Picked up from a donor
    Inbound,
    /// Handed on to a partner or fridge
    Outbound,
    Both,
    #[default]
    Unknown,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Direction::Inbound => "inbound",
            Direction::Outbound => "outbound",
            Direction::Both => "both",
            Direction::Unknown => "unknown",
        };
        write!(f, "{name}")
    }
}

/// Classify a message from its resolved locations, falling back to its wording
pub fn detect_direction(text: &str, pickup: &str, drop_off: &str) -> Direction {
    match (pickup.is_empty(), drop_off.is_empty()) {
        (false, false) => return Direction::Both,
        (false, true) => return Direction::Inbound,
        (true, false) => return Direction::Outbound,
        (true, true) => {}
    }

    let lower = text.to_lowercase();
    let inbound = INBOUND_PHRASES.iter().any(|phrase| lower.contains(phrase));
    let outbound = OUTBOUND_PHRASES.iter().any(|phrase| lower.contains(phrase));
    match (inbound, outbound) {
        (true, true) => Direction::Both,
        (true, false) => Direction::Inbound,
        (false, true) => Direction::Outbound,
        (false, false) => Direction::Unknown,
    }
}

/// Items listed under one `Site name:` heading
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationSection {
    pub location: String,
    pub items: Vec<ParsedItem>,
}

/// Split a message at `Site name:` lines and parse the lines under each.
///
/// Text before the first heading belongs to no section; sections whose
/// lines yield no items are dropped.
pub fn parse_sections(text: &str, registry: &UnitRegistry) -> Vec<LocationSection> {
    let normalized = normalize_text(text);
    let mut chunks: Vec<(String, Vec<&str>)> = Vec::new();

    for line in normalized.lines() {
        if let Some(caps) = SECTION_HEADING_REGEX.captures(line.trim()) {
            chunks.push((clean_location(&caps["loc"]), Vec::new()));
        } else if let Some((_, lines)) = chunks.last_mut() {
            lines.push(line);
        }
    }

    let sections: Vec<LocationSection> = chunks
        .into_iter()
        .filter(|(location, _)| !location.is_empty())
        .filter_map(|(location, lines)| {
            let items = parse_fallback_lines(&lines.join("\n"), registry);
            if items.is_empty() {
                trace!("Section '{}' has no items", location);
                return None;
            }
            Some(LocationSection { location, items })
        })
        .collect();
    debug!("Found {} location sections", sections.len());
    sections
}
