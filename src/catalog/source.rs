//! Collaborator interfaces consumed by the catalog loader.
//!
//! The host application owns item enumeration, tooltip rendering and mod
//! metadata; the loader only reads through these traits. Two concrete,
//! thread-safe tables (`OverrideTable`, `ModNameTable`) cover the registries
//! that external code populates at runtime.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use super::{ItemId, Variant};

/// What: Failure reported by a collaborator while resolving an item.
///
/// Details:
/// - `kind()` names the failure class; it is what the loader logs next to the
///   identity when excluding it.
#[derive(Debug)]
pub enum SourceError {
    /// The collaborator cannot answer for this identity right now.
    Unavailable(String),
    /// The collaborator's data for this identity is inconsistent.
    Malformed {
        /// Identity whose data is broken.
        item: ItemId,
        /// What was wrong.
        reason: String,
    },
    /// Any other failure raised by the host.
    Other(Box<dyn std::error::Error + Send + Sync>),
}

impl SourceError {
    /// Short failure class name.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Unavailable(_) => "Unavailable",
            Self::Malformed { .. } => "Malformed",
            Self::Other(_) => "Other",
        }
    }
}

impl fmt::Display for SourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable(msg) => write!(f, "unavailable: {msg}"),
            Self::Malformed { item, reason } => write!(f, "malformed data for {item}: {reason}"),
            Self::Other(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for SourceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Other(err) => Some(err.as_ref()),
            Self::Unavailable(_) | Self::Malformed { .. } => None,
        }
    }
}

/// Ordered enumeration of item identities and their raw metadata.
pub trait ItemRegistry: Send + Sync {
    /// Every known identity in stable registry order.
    fn identities(&self) -> Vec<ItemId>;

    /// Raw mod identifier owning `item`.
    ///
    /// # Errors
    /// - Any collaborator failure; the loader excludes the identity.
    fn mod_id(&self, item: ItemId) -> Result<String, SourceError>;

    /// Native sub-item expansion; an empty list means "probe damage values".
    ///
    /// # Errors
    /// - Any collaborator failure; the loader excludes the identity.
    fn sub_items(&self, item: ItemId) -> Result<Vec<Variant>, SourceError>;

    /// Icon identity used to collapse visually identical probed variants.
    ///
    /// # Errors
    /// - Any collaborator failure; the loader omits that damage value.
    fn icon_hash(&self, variant: &Variant) -> Result<Option<u64>, SourceError>;

    /// Tag strings attached to `variant`.
    fn tags(&self, _variant: &Variant) -> Vec<String> {
        Vec::new()
    }

    /// Category strings attached to `variant`.
    fn categories(&self, _variant: &Variant) -> Vec<String> {
        Vec::new()
    }

    /// Human-readable identity for log messages.
    fn describe(&self, item: ItemId) -> String {
        format!("item {item}")
    }
}

/// Display-name and tooltip rendering.
pub trait TooltipResolver: Send + Sync {
    /// Display name of `variant`.
    ///
    /// # Errors
    /// - Any rendering failure; the loader drops that entry.
    fn display_name(&self, variant: &Variant) -> Result<String, SourceError>;

    /// Tooltip lines of `variant`, display name first.
    ///
    /// # Errors
    /// - Any rendering failure; the loader treats it as "no text".
    fn tooltip(&self, variant: &Variant) -> Result<Vec<String>, SourceError>;
}

/// Explicit variant lists registered by external code.
pub trait VariantOverrides: Send + Sync {
    /// Pre-resolved permutations replacing sub-item expansion and probing.
    fn overrides(&self, item: ItemId) -> Vec<Variant>;

    /// Variants appended after resolution, unconditionally.
    fn extras(&self, item: ItemId) -> Vec<Variant>;

    /// Blacklist decision, fixed into the entry's visibility at load time.
    fn is_hidden(&self, _variant: &Variant) -> bool {
        false
    }
}

/// Maps raw mod identifiers to display names.
pub trait ModIdHelper: Send + Sync {
    /// Display name for `mod_id`.
    fn mod_name(&self, mod_id: &str) -> String;
}

/// What: Thread-safe override, extra-variant and hidden-variant tables.
///
/// Details:
/// - Writers may register from any thread; the loader reads at the start of
///   each identity's resolution.
#[derive(Debug, Default)]
pub struct OverrideTable {
    overrides: RwLock<HashMap<ItemId, Vec<Variant>>>,
    extras: RwLock<HashMap<ItemId, Vec<Variant>>>,
    hidden: RwLock<HashSet<Variant>>,
}

impl OverrideTable {
    /// Empty tables.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the resolved permutations of `item`.
    pub fn set_override(&self, item: ItemId, variants: Vec<Variant>) {
        self.overrides
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(item, variants);
    }

    /// Append an extra variant for its item.
    pub fn add_extra(&self, variant: Variant) {
        self.extras
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(variant.item)
            .or_default()
            .push(variant);
    }

    /// Hide `variant` from search results.
    pub fn hide(&self, variant: Variant) {
        self.hidden
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(variant);
    }
}

impl VariantOverrides for OverrideTable {
    fn overrides(&self, item: ItemId) -> Vec<Variant> {
        self.overrides
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&item)
            .cloned()
            .unwrap_or_default()
    }

    fn extras(&self, item: ItemId) -> Vec<Variant> {
        self.extras
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&item)
            .cloned()
            .unwrap_or_default()
    }

    fn is_hidden(&self, variant: &Variant) -> bool {
        self.hidden
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(variant)
    }
}

/// Mod display names keyed by mod id; unknown ids map to themselves.
#[derive(Debug, Default, Clone)]
pub struct ModNameTable {
    names: HashMap<String, String>,
}

impl ModNameTable {
    /// Table from `(mod id, display name)` pairs.
    pub fn new<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            names: pairs
                .into_iter()
                .map(|(k, v)| (k.into().to_lowercase(), v.into()))
                .collect(),
        }
    }
}

impl ModIdHelper for ModNameTable {
    fn mod_name(&self, mod_id: &str) -> String {
        self.names
            .get(&mod_id.to_lowercase())
            .cloned()
            .unwrap_or_else(|| mod_id.to_string())
    }
}

/// The collaborator set a loader reads from.
#[derive(Clone)]
pub struct CatalogSources {
    /// Identity enumeration and raw metadata.
    pub registry: Arc<dyn ItemRegistry>,
    /// Display names and tooltips.
    pub tooltips: Arc<dyn TooltipResolver>,
    /// Explicit permutations, extras and hidden variants.
    pub overrides: Arc<dyn VariantOverrides>,
    /// Mod display names.
    pub mod_names: Arc<dyn ModIdHelper>,
}

impl fmt::Debug for CatalogSources {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CatalogSources").finish_non_exhaustive()
    }
}
