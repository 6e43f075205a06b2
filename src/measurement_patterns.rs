//! # Measurement Patterns Module
//!
//! This module contains the regex patterns and word lists shared by the
//! lexer, the checklist extractor, the fallback parser and the location
//! resolver.

use lazy_static::lazy_static;
use regex::Regex;

/// Number words accepted in place of a numeric quantity
pub const NUMBER_WORDS: &[(&str, f64)] = &[
    ("zero", 0.0),
    ("one", 1.0),
    ("two", 2.0),
    ("three", 3.0),
    ("four", 4.0),
    ("five", 5.0),
    ("six", 6.0),
    ("seven", 7.0),
    ("eight", 8.0),
    ("nine", 9.0),
    ("ten", 10.0),
    ("eleven", 11.0),
    ("twelve", 12.0),
    ("dozen", 12.0),
    ("half", 0.5),
    ("quarter", 0.25),
    ("couple", 2.0),
    ("few", 3.0),
];

/// Size adjectives that may precede a unit ("big bags", "small boxes")
pub const SIZE_ADJECTIVES: &[&str] = &["big", "large", "lrg", "small", "sm"];

/// Words after "dozen" that describe packaging rather than the item
pub const DOZEN_CONTAINERS: &[&str] = &["package", "packages", "bottle", "bottles"];

/// Container words that may trail the item name ("2 banana boxes")
pub const TRAILING_CONTAINER_UNITS: &[&str] = &[
    "box", "boxes", "case", "cases", "crate", "crates", "tote", "totes", "bin", "bins", "bag", "bags",
];

/// Name fragments that mark warehouse chatter rather than food
pub const CHATTER_TOKENS: &[&str] = &[
    "google",
    "docs.google",
    "guide",
    "meeting",
    "channel",
    "thermometer",
    "dumpster",
    "door",
    "code",
    "recycling",
    "compost",
    "cardboard",
    "loading",
    "schedule",
];

// Numeric literal: thousands commas or plain decimals
const NUMBER: &str = r"(?:\d{1,3}(?:,\d{3})+(?:\.\d+)?|\d+(?:\.\d+)?|\.\d+)";

// Optional leading bullet or checkbox
const BULLET: &str = r"(?:[-*•▪◦‣]+|\[[ xX]?\])?";

// Pickup/drop-off announcements that are not food items
pub const NON_FOOD_HEADING_PATTERN: &str = r"(?i)^(?:picked up from|rescued from|rescue from|pickup(?:ed)? from|dropped off|drop off|dropped at|delivered to|earlier today from)\b";

lazy_static! {
    /// Full lexer grammar: bullet, approximation marker, quantity, optional range
    pub static ref QUANTITY_LINE_REGEX: Regex = Regex::new(&format!(
        r"(?i)^\s*{BULLET}\s*(?P<approx>(?:about|around|approx(?:imately|\.)?)\s+|[~≈]\s*)?(?:(?:an?\s+)?(?P<word>zero|one|two|three|four|five|six|seven|eight|nine|ten|eleven|twelve|dozen|half|quarter|couple|few)\b|(?P<num>{NUMBER}))(?:\s*(?:-|–|—|\bto\b)\s*(?P<num2>{NUMBER}))?"
    ))
    .expect("Quantity line pattern should be valid");

    /// Leading numeric quantity (optionally a range) inside a checklist bullet
    pub static ref CHECKLIST_QUANTITY_REGEX: Regex = Regex::new(&format!(
        r"^(?P<num>{NUMBER})(?:\s*(?:-|–|—|\bto\b)\s*(?P<num2>{NUMBER}))?\s*(?P<rest>.*)$"
    ))
    .expect("Checklist quantity pattern should be valid");

    /// A standalone numeric token, optionally a range ("3", "1,200", "2-3")
    pub static ref NUMERIC_TOKEN_REGEX: Regex = Regex::new(&format!(
        r"^~?(?P<num>{NUMBER})(?:[-–—](?P<num2>{NUMBER}))?$"
    ))
    .expect("Numeric token pattern should be valid");

    /// A number glued to a unit ("4kg", "20lbs")
    pub static ref GLUED_UNIT_REGEX: Regex = Regex::new(&format!(r"(?i)^(?P<num>{NUMBER})(?P<unit>[a-z]+)$"))
        .expect("Glued unit pattern should be valid");

    /// Bullet and checkbox markers that start a checklist entry
    pub static ref CHECKLIST_MARKER_REGEX: Regex =
        Regex::new(r"•|\[[ xX]\]").expect("Checklist marker pattern should be valid");

    /// Leading bullet/checkbox punctuation on an arbitrary line
    pub static ref LEADING_BULLET_REGEX: Regex =
        Regex::new(r"^\s*(?:[-*•▪◦‣]|\[[ xX]?\]|\s)*").expect("Leading bullet pattern should be valid");

    /// Trailing parenthetical note: "bananas (very ripe)"
    pub static ref TRAILING_PAREN_REGEX: Regex =
        Regex::new(r"\s*\((?P<note>[^()]*)\)\s*[.,;]*\s*$").expect("Trailing parenthetical pattern should be valid");

    /// Any parenthetical, used when building match keys
    pub static ref ANY_PAREN_REGEX: Regex =
        Regex::new(r"\([^()]*\)").expect("Parenthetical pattern should be valid");

    pub static ref NON_FOOD_HEADING_REGEX: Regex =
        Regex::new(NON_FOOD_HEADING_PATTERN).expect("Non-food heading pattern should be valid");

    /// Pickup headers that introduce the rescue location
    pub static ref LOCATION_HEADER_REGEX: Regex = Regex::new(
        r"(?i)(?:picked\s+up\s+(?:some\s+)?(?:produce\s+)?from|rescued\s+from|rescue\s+from|pickup(?:ed)?\s+from|earlier\s+today\s+from|today\s+from|scooped\s+(?:this\s+)?from)\s+(?P<loc>[^\n]+)"
    )
    .expect("Location header pattern should be valid");

    /// Generic "From X" at the start of a line
    pub static ref LOCATION_FROM_REGEX: Regex =
        Regex::new(r"(?im)^\s*from\s+(?P<loc>[^\n]+)").expect("Location from pattern should be valid");

    /// Clause separator inside a location remainder: " - ", " – ", " — "
    pub static ref LOCATION_DASH_REGEX: Regex =
        Regex::new(r"\s[-–—]\s").expect("Location dash pattern should be valid");

    /// A line that is only a site name and a colon, opening a per-location section
    pub static ref SECTION_HEADING_REGEX: Regex =
        Regex::new(r"^(?P<loc>[A-Za-z0-9 /&'’.-]+):\s*$").expect("Section heading pattern should be valid");

    /// A standalone "am"/"pm", as in "pickup at 3 pm"
    pub static ref CLOCK_TIME_REGEX: Regex =
        Regex::new(r"(?i)\b(?:am|pm)\b").expect("Clock time pattern should be valid");

    /// Drop-off phrasings, tried in order; the first match wins
    pub static ref DROP_OFF_REGEXES: Vec<Regex> = [
        r"(?i)(?:dropped\s+off|dropped)\s+(?:at|to|surplus\s+at)\s+(?P<loc>.+)",
        r"(?i)(?:delivered|deliver|delivering)\s+(?:to|at)\s+(?P<loc>.+)",
        r"(?i)(?:brought|bringing|took|taking|sent|sending)\s+(?:to|at)\s+(?P<loc>.+)",
        r"(?i)(?:taken\s+to|going\s+to)\s+(?P<loc>.+)",
        r"(?i)\bfor\s+(?P<loc>[A-Z][A-Za-z0-9 &'-]{2,})",
        r"(?i)^(?P<loc>[A-Za-z0-9 &'-]{2,})\s+(?:took|grabbed|picked\s+up)\b",
        r"(?i)(?:claimed|labeled)\s+for\s+(?P<loc>[A-Z][A-Za-z0-9 &'-]{2,})",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("Drop-off pattern should be valid"))
    .collect();

    /// Trailing "and ..." clause after a drop-off site
    pub static ref TRAILING_AND_REGEX: Regex =
        Regex::new(r"\s+and\s+.*$").expect("Trailing and pattern should be valid");
}

/// Value of a number word, if `word` is one
pub fn number_word_value(word: &str) -> Option<f64> {
    let lower = word.to_lowercase();
    NUMBER_WORDS
        .iter()
        .find(|(w, _)| *w == lower)
        .map(|(_, value)| *value)
}

/// Parse a numeric literal, ignoring thousands separators
pub fn parse_number(text: &str) -> Option<f64> {
    let value: f64 = text.replace(',', "").parse().ok()?;
    value.is_finite().then_some(value)
}
