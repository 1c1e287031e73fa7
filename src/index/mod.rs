//! Multi-field search index over a catalog snapshot.
//!
//! Built once per snapshot and never mutated. Every field keeps its own
//! vocabulary of normalized values so a token restricted to one field never
//! scans the others.

use serde::{Deserialize, Serialize};

use crate::catalog::CatalogSnapshot;
use crate::logic::query::{MatchMode, SearchToken};
use crate::util::{normalize, strip_whitespace};

mod field;

use field::{FieldIndex, FieldIndexBuilder};

/// Searchable attribute of an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchField {
    /// Display name.
    Name,
    /// Mod id and mod display name, with and without whitespace.
    Mod,
    /// Each tooltip line.
    Tooltip,
    /// Tag strings.
    Tag,
    /// Category strings.
    Category,
}

impl SearchField {
    /// Every field, in lookup order.
    pub const ALL: [Self; 5] = [
        Self::Name,
        Self::Mod,
        Self::Tooltip,
        Self::Tag,
        Self::Category,
    ];

    /// Field selected by a query prefix character.
    #[must_use]
    pub const fn from_prefix(c: char) -> Option<Self> {
        match c {
            '@' => Some(Self::Mod),
            '#' => Some(Self::Tooltip),
            '$' => Some(Self::Tag),
            '%' => Some(Self::Category),
            _ => None,
        }
    }
}

/// What: Per-field indexes plus the visibility of every entry.
///
/// Details:
/// - Entry numbers are positions in the snapshot the index was built from.
/// - Lookups never return hidden entries.
#[derive(Debug, Default)]
pub struct SearchIndex {
    name: FieldIndex,
    mods: FieldIndex,
    tooltip: FieldIndex,
    tags: FieldIndex,
    categories: FieldIndex,
    visible: Vec<bool>,
}

impl SearchIndex {
    /// What: Index every entry of `snapshot`.
    ///
    /// Inputs:
    /// - `snapshot`: Entries in catalog order.
    ///
    /// Output:
    /// - Index whose entry numbers are positions in `snapshot`.
    #[must_use]
    pub fn build(snapshot: &CatalogSnapshot) -> Self {
        let mut name = FieldIndexBuilder::default();
        let mut mods = FieldIndexBuilder::default();
        let mut tooltip = FieldIndexBuilder::default();
        let mut tags = FieldIndexBuilder::default();
        let mut categories = FieldIndexBuilder::default();
        let mut visible = Vec::with_capacity(snapshot.len());

        for (position, entry) in snapshot.entries().iter().enumerate() {
            let Ok(id) = u32::try_from(position) else {
                tracing::warn!(entries = snapshot.len(), "[Index] catalog too large; truncating index");
                break;
            };
            visible.push(entry.is_visible());
            name.add(id, normalize(entry.display_name()));
            for raw in [entry.mod_id(), entry.mod_name()] {
                let value = normalize(raw);
                mods.add(id, strip_whitespace(&value));
                mods.add(id, value);
            }
            for line in entry.tooltip() {
                tooltip.add(id, normalize(line));
            }
            for tag in entry.tags() {
                tags.add(id, normalize(tag));
            }
            for category in entry.categories() {
                categories.add(id, normalize(category));
            }
        }

        let index = Self {
            name: name.finish(),
            mods: mods.finish(),
            tooltip: tooltip.finish(),
            tags: tags.finish(),
            categories: categories.finish(),
            visible,
        };
        tracing::debug!(
            entries = index.visible.len(),
            names = index.name.vocabulary_len(),
            tooltip_lines = index.tooltip.vocabulary_len(),
            "[Index] search index built"
        );
        index
    }

    const fn field(&self, field: SearchField) -> &FieldIndex {
        match field {
            SearchField::Name => &self.name,
            SearchField::Mod => &self.mods,
            SearchField::Tooltip => &self.tooltip,
            SearchField::Tag => &self.tags,
            SearchField::Category => &self.categories,
        }
    }

    /// What: Visible entries matching one token.
    ///
    /// Output:
    /// - Sorted, deduplicated entry numbers.
    ///
    /// Details:
    /// - A token without a field restriction is looked up in every field and
    ///   the hits are unioned.
    #[must_use]
    pub fn lookup(&self, token: &SearchToken) -> Vec<u32> {
        let single;
        let fields: &[SearchField] = match token.field {
            Some(field) => {
                single = [field];
                &single
            }
            None => &SearchField::ALL,
        };
        let mut hits: Vec<u32> = Vec::new();
        for &field in fields {
            let index = self.field(field);
            hits = match token.mode {
                MatchMode::Exact => union(&hits, index.exact(&token.text)),
                MatchMode::Substring => union(&hits, &index.substring(&token.text)),
            };
        }
        hits.retain(|&id| self.is_visible(id));
        hits
    }

    /// Every visible entry number, ascending.
    #[must_use]
    pub fn all_visible(&self) -> Vec<u32> {
        (0..self.visible.len())
            .filter(|&i| self.visible[i])
            .filter_map(|i| u32::try_from(i).ok())
            .collect()
    }

    /// Number of indexed entries, hidden ones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.visible.len()
    }

    /// `true` when nothing was indexed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.visible.is_empty()
    }

    fn is_visible(&self, id: u32) -> bool {
        self.visible.get(id as usize).copied().unwrap_or(false)
    }
}

/// Intersection of two ascending, deduplicated lists.
#[must_use]
pub fn intersect(a: &[u32], b: &[u32]) -> Vec<u32> {
    let mut out = Vec::with_capacity(a.len().min(b.len()));
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                out.push(a[i]);
                i += 1;
                j += 1;
            }
        }
    }
    out
}

/// Union of two ascending, deduplicated lists.
#[must_use]
pub fn union(a: &[u32], b: &[u32]) -> Vec<u32> {
    let mut out = Vec::with_capacity(a.len() + b.len());
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            std::cmp::Ordering::Less => {
                out.push(a[i]);
                i += 1;
            }
            std::cmp::Ordering::Greater => {
                out.push(b[j]);
                j += 1;
            }
            std::cmp::Ordering::Equal => {
                out.push(a[i]);
                i += 1;
                j += 1;
            }
        }
    }
    out.extend_from_slice(&a[i..]);
    out.extend_from_slice(&b[j..]);
    out
}
