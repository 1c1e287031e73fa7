//! Rendering of the visible list for the terminal.

use std::fmt::Write as _;

use serde::Serialize;

use item_catalog::catalog::CatalogEntry;
use item_catalog::engine::VisibleList;

/// JSON shape of one entry.
#[derive(Serialize)]
struct EntryView<'a> {
    name: &'a str,
    item: u32,
    damage: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<&'a str>,
    mod_id: &'a str,
    mod_name: &'a str,
    ordinal: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tags: Vec<&'a str>,
}

impl<'a> From<&'a CatalogEntry> for EntryView<'a> {
    fn from(entry: &'a CatalogEntry) -> Self {
        let variant = entry.variant();
        Self {
            name: entry.display_name(),
            item: variant.item.0,
            damage: variant.damage,
            data: variant.data.as_deref(),
            mod_id: entry.mod_id(),
            mod_name: entry.mod_name(),
            ordinal: entry.ordinal(),
            tags: entry.tags().iter().map(AsRef::as_ref).collect(),
        }
    }
}

/// JSON shape of the whole list.
#[derive(Serialize)]
struct ListView<'a> {
    query: &'a str,
    generation: u64,
    total: usize,
    entries: Vec<EntryView<'a>>,
}

/// What: One line per entry: name, mod name and variant handle.
///
/// Inputs:
/// - `list`: Published visible list.
/// - `limit`: Maximum number of entries to print.
///
/// Output:
/// - Text ending in a summary line.
pub fn render_plain(list: &VisibleList, limit: Option<usize>) -> String {
    let shown = limit.unwrap_or(usize::MAX).min(list.len());
    let mut out = String::new();
    for entry in list.entries().iter().take(shown) {
        let _ = writeln!(
            out,
            "{}  [{}] {}",
            entry.display_name(),
            entry.mod_name(),
            entry.variant()
        );
    }
    let _ = writeln!(out, "{shown} of {} entries", list.len());
    out
}

/// Pretty-printed JSON of the list, truncated to `limit` entries.
///
/// # Errors
/// - Serialization failure from `serde_json`.
pub fn render_json(list: &VisibleList, limit: Option<usize>) -> Result<String, serde_json::Error> {
    let view = ListView {
        query: list.query(),
        generation: list.generation(),
        total: list.len(),
        entries: list
            .entries()
            .iter()
            .take(limit.unwrap_or(usize::MAX))
            .map(|e| EntryView::from(e.as_ref()))
            .collect(),
    };
    serde_json::to_string_pretty(&view)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    /// What: Empty list renders a zero summary in both formats
    fn empty_list_renders() {
        let list = VisibleList::default();
        assert_eq!(render_plain(&list, None), "0 of 0 entries\n");
        let json: serde_json::Value =
            serde_json::from_str(&render_json(&list, Some(3)).expect("json")).expect("parse");
        assert_eq!(json["total"], 0);
        assert_eq!(json["entries"].as_array().map(Vec::len), Some(0));
    }
}
