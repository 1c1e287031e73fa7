//! JSON catalog manifest acting as a registry and tooltip collaborator.
//!
//! Used by the command-line front end and by tests to stand in for a live
//! game registry. The manifest describes items, their explicit or probed
//! variants, and mod display names.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::source::{
    CatalogSources, ItemRegistry, ModNameTable, OverrideTable, SourceError, TooltipResolver,
};
use super::{ItemId, Variant};

/// Serialized catalog description.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CatalogManifest {
    /// Mod id → display name.
    #[serde(default)]
    pub mods: BTreeMap<String, String>,
    /// Items in registry order.
    #[serde(default)]
    pub items: Vec<ItemManifest>,
}

/// What: One item identity in the manifest.
///
/// Details:
/// - With `probe == false` and a non-empty `variants` list, the variants are
///   reported as native sub-items.
/// - Otherwise the loader probes damage values; listed variants answer for
///   their damage value and every other value renders as the base item.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ItemManifest {
    /// Registry id.
    pub id: u32,
    /// Owning mod id.
    pub mod_id: String,
    /// Base display name.
    pub name: String,
    /// Base icon hash.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<u64>,
    /// Base tooltip lines after the name.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tooltip: Vec<String>,
    /// Tags shared by every variant.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    /// Categories shared by every variant.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub categories: Vec<String>,
    /// Per-damage variants.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub variants: Vec<VariantManifest>,
    /// Force damage probing even when variants are listed.
    #[serde(default)]
    pub probe: bool,
    /// Extra variants appended after resolution.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extras: Vec<Variant>,
    /// Simulate a registry fault for this identity.
    #[serde(default)]
    pub broken: bool,
}

/// A listed damage value of an item.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct VariantManifest {
    /// Damage value.
    pub damage: u16,
    /// Display name; falls back to the item name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Icon hash; falls back to the item icon.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<u64>,
    /// Extra tooltip lines.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tooltip: Vec<String>,
    /// Extra tags.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    /// Hide from search results.
    #[serde(default)]
    pub hidden: bool,
}

/// Failure to read or validate a manifest.
#[derive(Debug)]
pub enum ManifestError {
    /// The file could not be read.
    Io {
        /// Manifest path.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },
    /// The JSON did not match the manifest schema.
    Parse(serde_json::Error),
    /// Two items share an id.
    DuplicateItem(ItemId),
}

impl fmt::Display for ManifestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "cannot read manifest {}: {source}", path.display())
            }
            Self::Parse(err) => write!(f, "invalid manifest: {err}"),
            Self::DuplicateItem(id) => write!(f, "duplicate item id {id} in manifest"),
        }
    }
}

impl std::error::Error for ManifestError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse(err) => Some(err),
            Self::DuplicateItem(_) => None,
        }
    }
}

impl From<serde_json::Error> for ManifestError {
    fn from(value: serde_json::Error) -> Self {
        Self::Parse(value)
    }
}

/// What: In-memory registry built from a `CatalogManifest`.
///
/// Output:
/// - Implements `ItemRegistry` and `TooltipResolver`; `into_sources()` adds
///   the override table and mod-name table derived from the same manifest.
#[derive(Debug)]
pub struct ManifestSource {
    order: Vec<ItemId>,
    items: HashMap<ItemId, ItemManifest>,
    mods: BTreeMap<String, String>,
}

impl ManifestSource {
    /// What: Validate a manifest and index its items.
    ///
    /// # Errors
    /// - `ManifestError::DuplicateItem` when two items share an id.
    pub fn new(manifest: CatalogManifest) -> Result<Self, ManifestError> {
        let mut order = Vec::with_capacity(manifest.items.len());
        let mut items = HashMap::with_capacity(manifest.items.len());
        for item in manifest.items {
            let id = ItemId(item.id);
            if items.insert(id, item).is_some() {
                return Err(ManifestError::DuplicateItem(id));
            }
            order.push(id);
        }
        Ok(Self {
            order,
            items,
            mods: manifest.mods,
        })
    }

    /// Parse and validate a manifest from JSON text.
    ///
    /// # Errors
    /// - `Parse` for malformed JSON, `DuplicateItem` for repeated ids.
    pub fn from_json(text: &str) -> Result<Self, ManifestError> {
        Self::new(serde_json::from_str(text)?)
    }

    /// Read, parse and validate a manifest file.
    ///
    /// # Errors
    /// - `Io` when the file cannot be read, plus the `from_json` errors.
    pub fn from_path(path: &Path) -> Result<Self, ManifestError> {
        let text = std::fs::read_to_string(path).map_err(|source| ManifestError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::debug!(path = %path.display(), bytes = text.len(), "[Manifest] loaded catalog manifest");
        Self::from_json(&text)
    }

    /// Number of item identities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// `true` when the manifest lists no items.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// What: Bundle this source with derived override and mod-name tables.
    ///
    /// Output:
    /// - `CatalogSources` plus the `OverrideTable`, which stays writable so
    ///   callers can register more overrides later.
    #[must_use]
    pub fn into_sources(self) -> (CatalogSources, Arc<OverrideTable>) {
        let overrides = Arc::new(OverrideTable::new());
        for id in &self.order {
            let Some(item) = self.items.get(id) else {
                continue;
            };
            for extra in &item.extras {
                overrides.add_extra(Variant {
                    item: *id,
                    ..extra.clone()
                });
            }
            for variant in item.variants.iter().filter(|v| v.hidden) {
                overrides.hide(Variant::new(*id, variant.damage));
            }
        }
        let mod_names = Arc::new(ModNameTable::new(self.mods.clone()));
        let this = Arc::new(self);
        let sources = CatalogSources {
            registry: this.clone(),
            tooltips: this,
            overrides: overrides.clone(),
            mod_names,
        };
        (sources, overrides)
    }

    fn item(&self, item: ItemId) -> Result<&ItemManifest, SourceError> {
        self.items
            .get(&item)
            .ok_or_else(|| SourceError::Unavailable(format!("unknown item {item}")))
    }

    fn listed(&self, variant: &Variant) -> Option<&VariantManifest> {
        self.items
            .get(&variant.item)?
            .variants
            .iter()
            .find(|v| v.damage == variant.damage)
    }
}

impl ItemRegistry for ManifestSource {
    fn identities(&self) -> Vec<ItemId> {
        self.order.clone()
    }

    fn mod_id(&self, item: ItemId) -> Result<String, SourceError> {
        Ok(self.item(item)?.mod_id.clone())
    }

    fn sub_items(&self, item: ItemId) -> Result<Vec<Variant>, SourceError> {
        let manifest = self.item(item)?;
        if manifest.broken {
            return Err(SourceError::Malformed {
                item,
                reason: "marked broken in manifest".into(),
            });
        }
        if manifest.probe {
            return Ok(Vec::new());
        }
        Ok(manifest
            .variants
            .iter()
            .map(|v| Variant::new(item, v.damage))
            .collect())
    }

    fn icon_hash(&self, variant: &Variant) -> Result<Option<u64>, SourceError> {
        let item = self.item(variant.item)?;
        Ok(self.listed(variant).and_then(|v| v.icon).or(item.icon))
    }

    fn tags(&self, variant: &Variant) -> Vec<String> {
        let Some(item) = self.items.get(&variant.item) else {
            return Vec::new();
        };
        let mut tags = item.tags.clone();
        if let Some(listed) = self.listed(variant) {
            tags.extend(listed.tags.iter().cloned());
        }
        tags
    }

    fn categories(&self, variant: &Variant) -> Vec<String> {
        self.items
            .get(&variant.item)
            .map(|item| item.categories.clone())
            .unwrap_or_default()
    }

    fn describe(&self, item: ItemId) -> String {
        self.items
            .get(&item)
            .map_or_else(|| format!("item {item}"), |m| format!("{}:{}", m.mod_id, m.name))
    }
}

impl TooltipResolver for ManifestSource {
    fn display_name(&self, variant: &Variant) -> Result<String, SourceError> {
        let item = self.item(variant.item)?;
        let base = self
            .listed(variant)
            .and_then(|v| v.name.clone())
            .unwrap_or_else(|| item.name.clone());
        Ok(match &variant.data {
            Some(data) => format!("{base} ({data})"),
            None => base,
        })
    }

    fn tooltip(&self, variant: &Variant) -> Result<Vec<String>, SourceError> {
        let item = self.item(variant.item)?;
        let mut lines = vec![self.display_name(variant)?];
        lines.extend(item.tooltip.iter().cloned());
        if let Some(listed) = self.listed(variant) {
            lines.extend(listed.tooltip.iter().cloned());
        }
        Ok(lines)
    }
}
