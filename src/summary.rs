//! # Rescue Summary
//!
//! Human-readable text posted back to the channel once a message has been
//! processed.

use crate::item_model::{format_quantity, NormalizedRecord, ParsedItem, Totals};
use log::info;

/// One line per item: `• 2 sacks potatoes → 2 bag`, or `• bread` without a quantity
pub fn format_item_line(item: &ParsedItem) -> String {
    let (Some(quantity), Some(canonical)) = (item.quantity, item.canonical_quantity) else {
        return format!("• {}", item.name);
    };
    let unit = item.unit.as_deref().unwrap_or(&item.canonical_unit);
    format!(
        "• {} {unit} {} → {} {}",
        format_quantity(quantity),
        item.name,
        format_quantity(canonical),
        item.canonical_unit
    )
}

/// `Totals: 12 lb · 3 gal · bag 2 · case 5 · 12 each`, zero buckets omitted
pub fn format_totals(totals: &Totals) -> String {
    let mut parts = Vec::new();
    if totals.weight_lb != 0.0 {
        parts.push(format!("{} lb", format_quantity(totals.weight_lb)));
    }
    if totals.volume_gallons != 0.0 {
        parts.push(format!("{} gal", format_quantity(totals.volume_gallons)));
    }
    for (unit, quantity) in &totals.containers {
        if *quantity != 0.0 {
            parts.push(format!("{unit} {}", format_quantity(*quantity)));
        }
    }
    if totals.count_each != 0.0 {
        parts.push(format!("{} each", format_quantity(totals.count_each)));
    }

    if parts.is_empty() {
        "Totals: none".to_string()
    } else {
        format!("Totals: {}", parts.join(" · "))
    }
}

/// Full summary for posting: location header, item lines, totals
pub fn format_summary(record: &NormalizedRecord) -> String {
    let mut output = String::new();

    if !record.location.is_empty() {
        output.push_str(&format!("📍 {}", record.location));
        if !record.drop_off_location.is_empty() {
            output.push_str(&format!(" → {}", record.drop_off_location));
        }
        output.push('\n');
    }

    for item in &record.items {
        output.push_str(&format_item_line(item));
        output.push('\n');
    }

    output.push_str(&format_totals(&record.totals()));

    let estimated = record.estimated_total_lbs();
    if estimated > 0.0 {
        output.push_str(&format!("\n≈ {} lb estimated", format_quantity(estimated)));
    }
    if !record.unparsed_lines.is_empty() {
        output.push_str(&format!("\n❓ Could not parse: {}", record.unparsed_lines.join(" | ")));
    }

    info!(
        "Formatted summary with {} items, {} unparsed lines",
        record.parsed_count(),
        record.unparsed_count()
    );
    output
}
