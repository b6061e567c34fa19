//! Spreadsheet rows to menu items.
//!
//! Purely local: no network, no knowledge of the current collection. Every
//! row becomes a fresh [`MenuItem`], keeping any `id` column as-is.

use crate::model::{split_tags, ItemId, MenuItem};
use crate::spreadsheet::{CellValue, Row};

/// Normalize every row, preserving row order.
pub fn normalize(rows: &[Row]) -> Vec<MenuItem> {
    rows.iter().map(normalize_row).collect()
}

pub fn normalize_row(row: &Row) -> MenuItem {
    let text = |field: &str| cell(row, field).and_then(CellValue::as_text);
    let number = |field: &str| cell(row, field).and_then(CellValue::as_number);

    let available = match text("available") {
        Some(value) => !value.eq_ignore_ascii_case("false"),
        None => true,
    };

    MenuItem {
        id: cell(row, "id").and_then(item_id),
        name: text("name").unwrap_or_default(),
        price: Some(number("price").unwrap_or(0.0)),
        category: text("category"),
        available,
        description: text("description"),
        prep_time_min: number("prepTimeMin").map_or(0, |n| n.round().max(0.0) as u32),
        tags: text("tags").map(|t| split_tags(&t)).unwrap_or_default(),
        ..MenuItem::default()
    }
}

/// First non-empty cell whose header matches `field` ignoring case.
fn cell<'a>(row: &'a Row, field: &str) -> Option<&'a CellValue> {
    row.iter()
        .filter(|(header, _)| header.trim().eq_ignore_ascii_case(field))
        .map(|(_, value)| value)
        .find(|value| !value.is_empty())
}

fn item_id(value: &CellValue) -> Option<ItemId> {
    match value {
        CellValue::Number(n) if n.fract() == 0.0 && n.abs() < i64::MAX as f64 => {
            Some(ItemId::Int(*n as i64))
        }
        other => other.as_text().map(ItemId::Text),
    }
}
