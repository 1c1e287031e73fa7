use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::catalog::CatalogEntry;

/// Ordering applied to the visible list; the ordinal always breaks ties.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortMode {
    /// Default: mod name (case-insensitive), then catalog order.
    #[default]
    ModThenOrdinal,
    /// Mod name, then display name, then catalog order.
    ModThenName,
    /// Catalog order only.
    Ordinal,
    /// Display name, then catalog order.
    Name,
}

impl SortMode {
    /// Return the string key used in settings files for this sort mode.
    ///
    /// Inputs: none
    ///
    /// Output: Static config key string.
    #[must_use]
    pub const fn as_config_key(&self) -> &'static str {
        match self {
            Self::ModThenOrdinal => "mod",
            Self::ModThenName => "mod_then_name",
            Self::Ordinal => "registry",
            Self::Name => "name",
        }
    }

    /// Parse a sort mode from its settings key or aliases.
    ///
    /// Inputs: `s` config string (case-insensitive).
    ///
    /// Output: `Some(SortMode)` on recognized value; `None` otherwise.
    #[must_use]
    pub fn from_config_key(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "mod" | "mod_then_ordinal" | "default" => Some(Self::ModThenOrdinal),
            "mod_then_name" => Some(Self::ModThenName),
            "registry" | "ordinal" | "id" => Some(Self::Ordinal),
            "name" | "alphabetical" => Some(Self::Name),
            _ => None,
        }
    }

    /// Total order over entries for this mode.
    #[must_use]
    pub fn compare(self, a: &CatalogEntry, b: &CatalogEntry) -> Ordering {
        let primary = match self {
            Self::ModThenOrdinal => cmp_folded(a.mod_name(), b.mod_name()),
            Self::ModThenName => cmp_folded(a.mod_name(), b.mod_name())
                .then_with(|| cmp_folded(a.display_name(), b.display_name())),
            Self::Ordinal => Ordering::Equal,
            Self::Name => cmp_folded(a.display_name(), b.display_name()),
        };
        primary.then_with(|| a.ordinal().cmp(&b.ordinal()))
    }
}

/// Case-insensitive comparison without allocating.
fn cmp_folded(a: &str, b: &str) -> Ordering {
    a.chars()
        .flat_map(char::to_lowercase)
        .cmp(b.chars().flat_map(char::to_lowercase))
}
