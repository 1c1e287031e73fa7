//! Catalog data model and the loader that builds it.
//!
//! A `CatalogSnapshot` is an immutable, ordered list of `CatalogEntry` values
//! (one per displayable variant) plus a grouping by item identity. The
//! snapshot and the `SearchIndex` built from it are published together as a
//! `Catalog` and replaced wholesale whenever the catalog is rebuilt.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::index::SearchIndex;

mod intern;
pub mod loader;
pub mod manifest;
pub mod source;

pub use intern::StringPool;
pub use loader::{CatalogLoader, LoadOutcome, LoadSettings};
pub use manifest::{CatalogManifest, ManifestError, ManifestSource};
pub use source::{
    CatalogSources, ItemRegistry, ModIdHelper, ModNameTable, OverrideTable, SourceError,
    TooltipResolver, VariantOverrides,
};

/// Opaque registry handle of an item identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(pub u32);

impl std::fmt::Display for ItemId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What: Concrete permutation of an item (the identity handle of an entry).
///
/// Details:
/// - `damage` is the metadata value probed by the loader.
/// - `data` distinguishes explicitly registered variants that share a damage
///   value (e.g. items carrying extra NBT-like payloads).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Variant {
    /// Owning item identity.
    pub item: ItemId,
    /// Damage/metadata value.
    #[serde(default)]
    pub damage: u16,
    /// Extra distinguishing payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
}

impl Variant {
    /// Plain variant without extra payload.
    #[must_use]
    pub const fn new(item: ItemId, damage: u16) -> Self {
        Self {
            item,
            damage,
            data: None,
        }
    }

    /// Variant carrying an extra payload.
    #[must_use]
    pub fn with_data(item: ItemId, damage: u16, data: impl Into<String>) -> Self {
        Self {
            item,
            damage,
            data: Some(data.into()),
        }
    }
}

impl std::fmt::Display for Variant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.item, self.damage)?;
        if let Some(data) = &self.data {
            write!(f, "{{{data}}}")?;
        }
        Ok(())
    }
}

/// One concrete, displayable variant of an item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    variant: Variant,
    display_name: String,
    mod_id: Arc<str>,
    mod_name: Arc<str>,
    ordinal: usize,
    visible: bool,
    tooltip: Vec<String>,
    tags: Vec<Arc<str>>,
    categories: Vec<Arc<str>>,
}

impl CatalogEntry {
    /// What: Construct a visible entry without tooltip, tags or categories.
    ///
    /// Inputs:
    /// - `variant`: Identity handle.
    /// - `display_name`: Resolved display name.
    /// - `mod_id` / `mod_name`: Raw mod identifier and its human-readable name.
    /// - `ordinal`: Position in source order, used as the final sort tiebreak.
    #[must_use]
    pub fn new(
        variant: Variant,
        display_name: impl Into<String>,
        mod_id: impl Into<Arc<str>>,
        mod_name: impl Into<Arc<str>>,
        ordinal: usize,
    ) -> Self {
        Self {
            variant,
            display_name: display_name.into(),
            mod_id: mod_id.into(),
            mod_name: mod_name.into(),
            ordinal,
            visible: true,
            tooltip: Vec::new(),
            tags: Vec::new(),
            categories: Vec::new(),
        }
    }

    /// Attach tooltip lines.
    #[must_use]
    pub fn with_tooltip(mut self, lines: Vec<String>) -> Self {
        self.tooltip = lines;
        self
    }

    /// Attach tag strings.
    #[must_use]
    pub fn with_tags(mut self, tags: Vec<Arc<str>>) -> Self {
        self.tags = tags;
        self
    }

    /// Attach category strings.
    #[must_use]
    pub fn with_categories(mut self, categories: Vec<Arc<str>>) -> Self {
        self.categories = categories;
        self
    }

    /// Set visibility at construction time.
    #[must_use]
    pub const fn with_visible(mut self, visible: bool) -> Self {
        self.visible = visible;
        self
    }

    /// Identity handle.
    #[must_use]
    pub const fn variant(&self) -> &Variant {
        &self.variant
    }

    /// Resolved display name.
    #[must_use]
    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    /// Raw mod identifier.
    #[must_use]
    pub fn mod_id(&self) -> &str {
        &self.mod_id
    }

    /// Human-readable mod name.
    #[must_use]
    pub fn mod_name(&self) -> &str {
        &self.mod_name
    }

    /// Position in source order.
    #[must_use]
    pub const fn ordinal(&self) -> usize {
        self.ordinal
    }

    /// Whether the entry may appear in search results.
    #[must_use]
    pub const fn is_visible(&self) -> bool {
        self.visible
    }

    /// Tooltip lines.
    #[must_use]
    pub fn tooltip(&self) -> &[String] {
        &self.tooltip
    }

    /// Tag strings.
    #[must_use]
    pub fn tags(&self) -> &[Arc<str>] {
        &self.tags
    }

    /// Category strings.
    #[must_use]
    pub fn categories(&self) -> &[Arc<str>] {
        &self.categories
    }
}

/// What: Immutable ordered catalog plus item-identity grouping.
///
/// Details:
/// - Entries are shared as `Arc` so visible lists can hold them after the
///   snapshot itself is superseded.
/// - `generation` increases with every successful rebuild.
#[derive(Debug, Default)]
pub struct CatalogSnapshot {
    entries: Vec<Arc<CatalogEntry>>,
    by_item: HashMap<ItemId, Vec<usize>>,
    generation: u64,
}

impl CatalogSnapshot {
    /// Build the grouping from entries already in catalog order.
    #[must_use]
    pub fn new(entries: Vec<CatalogEntry>, generation: u64) -> Self {
        let entries: Vec<Arc<CatalogEntry>> = entries.into_iter().map(Arc::new).collect();
        let mut by_item: HashMap<ItemId, Vec<usize>> = HashMap::new();
        for (i, entry) in entries.iter().enumerate() {
            by_item.entry(entry.variant.item).or_default().push(i);
        }
        Self {
            entries,
            by_item,
            generation,
        }
    }

    /// All entries in catalog order.
    #[must_use]
    pub fn entries(&self) -> &[Arc<CatalogEntry>] {
        &self.entries
    }

    /// Entry at `index`.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Arc<CatalogEntry>> {
        self.entries.get(index)
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// `true` when the snapshot holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Rebuild counter this snapshot was produced by.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Entries belonging to `item`, in catalog order.
    pub fn variants_of(&self, item: ItemId) -> impl Iterator<Item = &Arc<CatalogEntry>> {
        self.by_item
            .get(&item)
            .into_iter()
            .flatten()
            .filter_map(|&i| self.entries.get(i))
    }

    /// Number of distinct item identities represented.
    #[must_use]
    pub fn item_count(&self) -> usize {
        self.by_item.len()
    }
}

/// A snapshot and the search index built from it, published as one unit.
#[derive(Debug, Default)]
pub struct Catalog {
    snapshot: CatalogSnapshot,
    index: SearchIndex,
}

impl Catalog {
    /// Build the snapshot and its index.
    #[must_use]
    pub fn build(entries: Vec<CatalogEntry>, generation: u64) -> Self {
        let snapshot = CatalogSnapshot::new(entries, generation);
        let index = SearchIndex::build(&snapshot);
        Self { snapshot, index }
    }

    /// Ordered entries and grouping.
    #[must_use]
    pub const fn snapshot(&self) -> &CatalogSnapshot {
        &self.snapshot
    }

    /// Search index over the snapshot.
    #[must_use]
    pub const fn index(&self) -> &SearchIndex {
        &self.index
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(item: u32, damage: u16, name: &str, ordinal: usize) -> CatalogEntry {
        CatalogEntry::new(
            Variant::new(ItemId(item), damage),
            name,
            "basic",
            "Basic",
            ordinal,
        )
    }

    #[test]
    /// What: Snapshot groups entries by item identity in catalog order
    ///
    /// - Input: Two variants of item 1 around one variant of item 2
    /// - Output: variants_of(1) yields both in order; item_count == 2
    fn snapshot_groups_by_item() {
        let snap = CatalogSnapshot::new(
            vec![
                entry(1, 0, "White Wool", 0),
                entry(2, 0, "Stone", 1),
                entry(1, 1, "Orange Wool", 2),
            ],
            7,
        );
        let names: Vec<&str> = snap
            .variants_of(ItemId(1))
            .map(|e| e.display_name())
            .collect();
        assert_eq!(names, vec!["White Wool", "Orange Wool"]);
        assert_eq!(snap.item_count(), 2);
        assert_eq!(snap.generation(), 7);
        assert_eq!(snap.variants_of(ItemId(9)).count(), 0);
    }

    #[test]
    /// What: Variant display includes the payload when present
    fn variant_display() {
        assert_eq!(Variant::new(ItemId(3), 2).to_string(), "#3:2");
        assert_eq!(Variant::with_data(ItemId(3), 0, "x").to_string(), "#3:0{x}");
    }
}
