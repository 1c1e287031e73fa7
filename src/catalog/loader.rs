//! Catalog loading: identity enumeration, variant resolution, entry building.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tracing::{debug, error, info, warn};

use super::intern::StringPool;
use super::source::{CatalogSources, SourceError};
use super::{CatalogEntry, ItemId, Variant};
use crate::task::{Interruptible, StepTimeout, StepTimer, TimeoutScope};
use crate::util::LogOnce;

/// Damage values probed when an item exposes neither overrides nor sub-items.
pub const DAMAGE_PROBE_LIMIT: u16 = 16;

/// Budgets read at the start of every load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadSettings {
    /// Budget for the whole load; zero disables it.
    pub total_timeout: Duration,
    /// Budget for resolving a single identity; zero disables it.
    pub item_timeout: Duration,
}

impl Default for LoadSettings {
    fn default() -> Self {
        Self {
            total_timeout: Duration::from_secs(60),
            item_timeout: Duration::from_millis(500),
        }
    }
}

/// Result of one load attempt.
#[derive(Debug)]
pub enum LoadOutcome {
    /// Entries in catalog order, ready to publish.
    Loaded(Vec<CatalogEntry>),
    /// The run was interrupted; nothing must be published.
    Interrupted,
    /// The job budget ran out; nothing must be published.
    TimedOut(StepTimeout),
}

/// Why resolving one identity failed.
#[derive(Debug)]
enum ResolveError {
    Timeout(StepTimeout),
    Fault(SourceError),
}

impl fmt::Display for ResolveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout(t) => write!(f, "{t}"),
            Self::Fault(e) => write!(f, "{e}"),
        }
    }
}

impl From<StepTimeout> for ResolveError {
    fn from(value: StepTimeout) -> Self {
        Self::Timeout(value)
    }
}

impl From<SourceError> for ResolveError {
    fn from(value: SourceError) -> Self {
        Self::Fault(value)
    }
}

/// What: Builds catalog entries from the collaborators.
///
/// Details:
/// - Keeps the permanent exclusion set across loads: an identity that faulted
///   once is never resolved again by this loader.
/// - Per-variant faults are logged once per distinct message.
pub struct CatalogLoader {
    sources: CatalogSources,
    errored: Mutex<HashSet<ItemId>>,
    logged: LogOnce,
}

impl fmt::Debug for CatalogLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CatalogLoader")
            .field("errored", &self.errored_items().len())
            .finish_non_exhaustive()
    }
}

/// Per-load scratch state shared by every identity.
struct LoadScratch {
    pool: StringPool,
    mod_names: HashMap<Arc<str>, Arc<str>>,
}

impl CatalogLoader {
    /// Loader over `sources` with an empty exclusion set.
    #[must_use]
    pub fn new(sources: CatalogSources) -> Self {
        Self {
            sources,
            errored: Mutex::new(HashSet::new()),
            logged: LogOnce::new(),
        }
    }

    /// Collaborators this loader reads from.
    #[must_use]
    pub const fn sources(&self) -> &CatalogSources {
        &self.sources
    }

    /// Permanently excluded identities, sorted.
    #[must_use]
    pub fn errored_items(&self) -> Vec<ItemId> {
        let mut items: Vec<ItemId> = self
            .errored
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .copied()
            .collect();
        items.sort_unstable();
        items
    }

    fn is_errored(&self, item: ItemId) -> bool {
        self.errored
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&item)
    }

    /// What: Resolve every identity into catalog entries.
    ///
    /// Inputs:
    /// - `job`: Polled once per identity and before returning entries.
    /// - `settings`: Job and per-identity budgets.
    ///
    /// Output:
    /// - `Loaded` with entries in registry order, or `Interrupted`/`TimedOut`
    ///   when nothing may be published.
    ///
    /// Details:
    /// - A per-identity timeout skips that identity for this load only.
    /// - A collaborator fault excludes the identity from every later load.
    pub fn load(&self, job: &impl Interruptible, settings: &LoadSettings) -> LoadOutcome {
        let mut timer = StepTimer::begin(settings.total_timeout, settings.item_timeout);
        let mut scratch = LoadScratch {
            pool: StringPool::new(),
            mod_names: HashMap::new(),
        };
        let mut entries: Vec<CatalogEntry> = Vec::new();
        let mut skipped = 0usize;

        for item in self.sources.registry.identities() {
            if job.interrupted() {
                return LoadOutcome::Interrupted;
            }
            if let Err(t) = timer.enforce_job() {
                warn!(last = %t.label, elapsed = ?t.elapsed, "[Loader] catalog load timed out");
                return LoadOutcome::TimedOut(t);
            }
            if self.is_errored(item) {
                continue;
            }

            let label = self.sources.registry.describe(item);
            timer.checkpoint(label.as_str());
            match self.resolve_item(item, &label, &timer, &mut scratch, entries.len()) {
                Ok(built) => entries.extend(built),
                Err(ResolveError::Timeout(t)) if t.scope == TimeoutScope::Step => {
                    skipped += 1;
                    warn!(item = %label, budget = ?t.budget, "[Loader] skipping slow item for this load");
                }
                Err(ResolveError::Timeout(t)) => {
                    warn!(last = %t.label, elapsed = ?t.elapsed, "[Loader] catalog load timed out");
                    return LoadOutcome::TimedOut(t);
                }
                Err(ResolveError::Fault(e)) => {
                    error!(item = %label, kind = e.kind(), error = %e, "[Loader] removing item from list");
                    self.errored
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .insert(item);
                }
            }
        }

        if job.interrupted() {
            return LoadOutcome::Interrupted;
        }
        info!(
            entries = entries.len(),
            skipped,
            excluded = self.errored_items().len(),
            interned = scratch.pool.len(),
            "[Loader] catalog resolved"
        );
        LoadOutcome::Loaded(entries)
    }

    /// Resolve one identity and build its entries, numbering from `base_ordinal`.
    fn resolve_item(
        &self,
        item: ItemId,
        label: &str,
        timer: &StepTimer,
        scratch: &mut LoadScratch,
        base_ordinal: usize,
    ) -> Result<Vec<CatalogEntry>, ResolveError> {
        let variants = self.resolve_variants(item, label, timer)?;
        timer.enforce()?;

        let mod_id = scratch.pool.intern(&self.sources.registry.mod_id(item)?);
        let mod_name = match scratch.mod_names.get(&mod_id) {
            Some(name) => Arc::clone(name),
            None => {
                let name = scratch
                    .pool
                    .intern(&self.sources.mod_names.mod_name(&mod_id));
                scratch
                    .mod_names
                    .insert(Arc::clone(&mod_id), Arc::clone(&name));
                name
            }
        };

        let mut built = Vec::with_capacity(variants.len());
        for variant in variants {
            timer.enforce()?;
            let ordinal = base_ordinal + built.len();
            if let Some(entry) =
                self.build_entry(variant, &mod_id, &mod_name, ordinal, &mut scratch.pool)
            {
                built.push(entry);
            }
        }
        Ok(built)
    }

    /// Overrides, else sub-items, else the damage probe; extras always appended.
    fn resolve_variants(
        &self,
        item: ItemId,
        label: &str,
        timer: &StepTimer,
    ) -> Result<Vec<Variant>, ResolveError> {
        let mut variants = self.sources.overrides.overrides(item);
        if variants.is_empty() {
            variants = self.sources.registry.sub_items(item)?;
        }
        timer.enforce()?;
        if variants.is_empty() {
            variants = self.damage_probe(item, label, timer)?;
        }
        variants.extend(self.sources.overrides.extras(item));
        Ok(variants)
    }

    /// What: Probe damage values `0..DAMAGE_PROBE_LIMIT`.
    ///
    /// Output:
    /// - One variant per distinct `(tooltip text, icon)` pair, in damage order.
    ///
    /// Details:
    /// - A collaborator fault on one damage value omits only that value.
    /// - A timeout aborts the whole probe.
    fn damage_probe(
        &self,
        item: ItemId,
        label: &str,
        timer: &StepTimer,
    ) -> Result<Vec<Variant>, StepTimeout> {
        let mut seen: HashSet<String> = HashSet::new();
        let mut found = Vec::new();
        for damage in 0..DAMAGE_PROBE_LIMIT {
            timer.enforce()?;
            let variant = Variant::new(item, damage);
            let icon = match self.sources.registry.icon_hash(&variant) {
                Ok(icon) => icon.unwrap_or(0),
                Err(e) => {
                    let key = format!("probe {label}:{damage} {}", e.kind());
                    if self.logged.first(&key) {
                        warn!(item = %label, damage, kind = e.kind(), error = %e, "[Loader] omitting probed variant");
                    }
                    continue;
                }
            };
            let text = self.tooltip_text(&variant);
            if seen.insert(format!("{text}@{icon}")) {
                found.push(variant);
            }
        }
        debug!(item = %label, variants = found.len(), "[Loader] damage probe finished");
        Ok(found)
    }

    /// Tooltip joined by newlines; a faulting resolver yields no text.
    fn tooltip_text(&self, variant: &Variant) -> String {
        self.sources
            .tooltips
            .tooltip(variant)
            .map(|lines| lines.join("\n"))
            .unwrap_or_default()
    }

    fn build_entry(
        &self,
        variant: Variant,
        mod_id: &Arc<str>,
        mod_name: &Arc<str>,
        ordinal: usize,
        pool: &mut StringPool,
    ) -> Option<CatalogEntry> {
        let display_name = match self.sources.tooltips.display_name(&variant) {
            Ok(name) => name,
            Err(e) => {
                if self.logged.first(&format!("broken {variant} {}", e.kind())) {
                    warn!(variant = %variant, error = %e, "[Loader] found a broken entry");
                }
                return None;
            }
        };
        let tooltip = self
            .sources
            .tooltips
            .tooltip(&variant)
            .unwrap_or_default();
        let tags = self
            .sources
            .registry
            .tags(&variant)
            .iter()
            .map(|t| pool.intern(t))
            .collect();
        let categories = self
            .sources
            .registry
            .categories(&variant)
            .iter()
            .map(|c| pool.intern(c))
            .collect();
        let visible = !self.sources.overrides.is_hidden(&variant);
        Some(
            CatalogEntry::new(
                variant,
                display_name,
                Arc::clone(mod_id),
                Arc::clone(mod_name),
                ordinal,
            )
            .with_tooltip(tooltip)
            .with_tags(tags)
            .with_categories(categories)
            .with_visible(visible),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::source::{
        ItemRegistry, ModNameTable, OverrideTable, TooltipResolver,
    };
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio_util::sync::CancellationToken;

    /// How a scripted identity behaves.
    #[derive(Clone)]
    enum Script {
        /// Native sub-items with the given damage values and names.
        SubItems(Vec<(u16, &'static str)>),
        /// No sub-items; damage `d` renders as `names[d % names.len()]`.
        Probe(Vec<&'static str>),
        /// sub_items() fails.
        Fault,
        /// sub_items() sleeps before answering.
        Slow(Duration),
        /// Probe where icon lookup fails for odd damage values.
        FlakyIcons,
    }

    struct Scripted {
        items: Vec<(ItemId, Script)>,
        sub_item_calls: AtomicUsize,
    }

    impl Scripted {
        fn new(items: Vec<(u32, Script)>) -> Self {
            Self {
                items: items.into_iter().map(|(i, s)| (ItemId(i), s)).collect(),
                sub_item_calls: AtomicUsize::new(0),
            }
        }

        fn script(&self, item: ItemId) -> Option<&Script> {
            self.items.iter().find(|(i, _)| *i == item).map(|(_, s)| s)
        }
    }

    impl ItemRegistry for Scripted {
        fn identities(&self) -> Vec<ItemId> {
            self.items.iter().map(|(i, _)| *i).collect()
        }

        fn mod_id(&self, _item: ItemId) -> Result<String, SourceError> {
            Ok("basic".into())
        }

        fn sub_items(&self, item: ItemId) -> Result<Vec<Variant>, SourceError> {
            self.sub_item_calls.fetch_add(1, Ordering::SeqCst);
            match self.script(item) {
                Some(Script::SubItems(list)) => {
                    Ok(list.iter().map(|(d, _)| Variant::new(item, *d)).collect())
                }
                Some(Script::Fault) => Err(SourceError::Unavailable("registry broken".into())),
                Some(Script::Slow(d)) => {
                    std::thread::sleep(*d);
                    Ok(vec![Variant::new(item, 0)])
                }
                _ => Ok(Vec::new()),
            }
        }

        fn icon_hash(&self, variant: &Variant) -> Result<Option<u64>, SourceError> {
            match self.script(variant.item) {
                Some(Script::FlakyIcons) if variant.damage % 2 == 1 => {
                    Err(SourceError::Unavailable("no icon".into()))
                }
                Some(Script::FlakyIcons) => Ok(Some(u64::from(variant.damage))),
                _ => Ok(Some(1)),
            }
        }
    }

    impl TooltipResolver for Scripted {
        fn display_name(&self, variant: &Variant) -> Result<String, SourceError> {
            Ok(match self.script(variant.item) {
                Some(Script::SubItems(list)) => list
                    .iter()
                    .find(|(d, _)| *d == variant.damage)
                    .map_or("?", |(_, n)| n)
                    .to_string(),
                Some(Script::Probe(names)) => {
                    names[usize::from(variant.damage) % names.len()].to_string()
                }
                _ => format!("Item {}", variant.damage),
            })
        }

        fn tooltip(&self, variant: &Variant) -> Result<Vec<String>, SourceError> {
            Ok(vec![self.display_name(variant)?])
        }
    }

    fn loader(scripted: Arc<Scripted>, overrides: Arc<OverrideTable>) -> CatalogLoader {
        CatalogLoader::new(CatalogSources {
            registry: scripted.clone(),
            tooltips: scripted,
            overrides,
            mod_names: Arc::new(ModNameTable::new([("basic", "Basic")])),
        })
    }

    fn names(outcome: &LoadOutcome) -> Vec<String> {
        match outcome {
            LoadOutcome::Loaded(entries) => entries
                .iter()
                .map(|e| e.display_name().to_string())
                .collect(),
            other => panic!("expected Loaded, got {other:?}"),
        }
    }

    #[test]
    /// What: Damage probe yields one entry per distinct (tooltip, icon) pair
    ///
    /// - Input: Probe item cycling through three names over 16 damage values
    /// - Output: Exactly three entries, in first-seen damage order
    fn probe_dedupes_identical_variants() {
        let scripted = Arc::new(Scripted::new(vec![(
            1,
            Script::Probe(vec!["White Wool", "Orange Wool", "Magenta Wool"]),
        )]));
        let outcome = loader(scripted, Arc::new(OverrideTable::new()))
            .load(&CancellationToken::new(), &LoadSettings::default());
        assert_eq!(names(&outcome), vec!["White Wool", "Orange Wool", "Magenta Wool"]);
    }

    #[test]
    /// What: Overrides win over sub-items and extras are appended
    fn overrides_then_extras() {
        let scripted = Arc::new(Scripted::new(vec![(
            2,
            Script::SubItems(vec![(0, "Plank"), (1, "Spruce Plank")]),
        )]));
        let overrides = Arc::new(OverrideTable::new());
        overrides.set_override(ItemId(2), vec![Variant::new(ItemId(2), 1)]);
        overrides.add_extra(Variant::new(ItemId(2), 0));
        let outcome = loader(scripted, overrides).load(&CancellationToken::new(), &LoadSettings::default());
        assert_eq!(names(&outcome), vec!["Spruce Plank", "Plank"]);
    }

    #[test]
    /// What: A faulting identity is excluded and never retried
    ///
    /// - Input: Item 1 fine, item 2 faults; load twice
    /// - Output: Both loads contain only item 1; sub_items called 3 times total
    fn faulting_item_is_excluded_permanently() {
        let scripted = Arc::new(Scripted::new(vec![
            (1, Script::SubItems(vec![(0, "Stone")])),
            (2, Script::Fault),
        ]));
        let loader = loader(scripted.clone(), Arc::new(OverrideTable::new()));
        let first = loader.load(&CancellationToken::new(), &LoadSettings::default());
        assert_eq!(names(&first), vec!["Stone"]);
        assert_eq!(loader.errored_items(), vec![ItemId(2)]);
        let second = loader.load(&CancellationToken::new(), &LoadSettings::default());
        assert_eq!(names(&second), vec!["Stone"]);
        assert_eq!(scripted.sub_item_calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    /// What: A slow identity is skipped for this load but not excluded
    fn slow_item_skipped_not_excluded() {
        let scripted = Arc::new(Scripted::new(vec![
            (1, Script::Slow(Duration::from_millis(40))),
            (2, Script::SubItems(vec![(0, "Dirt")])),
        ]));
        let loader = loader(scripted, Arc::new(OverrideTable::new()));
        let settings = LoadSettings {
            total_timeout: Duration::ZERO,
            item_timeout: Duration::from_millis(5),
        };
        let outcome = loader.load(&CancellationToken::new(), &settings);
        assert_eq!(names(&outcome), vec!["Dirt"]);
        assert!(loader.errored_items().is_empty());
    }

    #[test]
    /// What: Job budget exhaustion aborts the load
    fn job_timeout_publishes_nothing() {
        let scripted = Arc::new(Scripted::new(vec![
            (1, Script::Slow(Duration::from_millis(30))),
            (2, Script::SubItems(vec![(0, "Dirt")])),
        ]));
        let settings = LoadSettings {
            total_timeout: Duration::from_millis(5),
            item_timeout: Duration::ZERO,
        };
        let outcome = loader(scripted, Arc::new(OverrideTable::new()))
            .load(&CancellationToken::new(), &settings);
        assert!(matches!(outcome, LoadOutcome::TimedOut(t) if t.scope == TimeoutScope::Job));
    }

    #[test]
    /// What: Icon faults omit single damage values only
    ///
    /// - Input: Probe item whose odd damage values fail icon lookup
    /// - Output: Eight entries (even damage values), item not excluded
    fn flaky_icons_skip_damage_values() {
        let scripted = Arc::new(Scripted::new(vec![(3, Script::FlakyIcons)]));
        let loader = loader(scripted, Arc::new(OverrideTable::new()));
        let outcome = loader.load(&CancellationToken::new(), &LoadSettings::default());
        match outcome {
            LoadOutcome::Loaded(entries) => {
                assert_eq!(entries.len(), 8);
                assert!(entries.iter().all(|e| e.variant().damage % 2 == 0));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(loader.errored_items().is_empty());
    }

    #[test]
    /// What: An already-cancelled job returns Interrupted
    fn interrupted_before_start() {
        let scripted = Arc::new(Scripted::new(vec![(1, Script::SubItems(vec![(0, "Stone")]))]));
        let token = CancellationToken::new();
        token.cancel();
        let outcome = loader(scripted, Arc::new(OverrideTable::new()))
            .load(&token, &LoadSettings::default());
        assert!(matches!(outcome, LoadOutcome::Interrupted));
    }

    #[test]
    /// What: Hidden variants load as invisible entries with ordinals in order
    fn hidden_variants_and_ordinals() {
        let scripted = Arc::new(Scripted::new(vec![
            (1, Script::SubItems(vec![(0, "Stone"), (1, "Granite")])),
            (2, Script::SubItems(vec![(0, "Dirt")])),
        ]));
        let overrides = Arc::new(OverrideTable::new());
        overrides.hide(Variant::new(ItemId(1), 1));
        let outcome = loader(scripted, overrides).load(&CancellationToken::new(), &LoadSettings::default());
        let LoadOutcome::Loaded(entries) = outcome else {
            panic!("expected Loaded");
        };
        let ordinals: Vec<usize> = entries.iter().map(CatalogEntry::ordinal).collect();
        assert_eq!(ordinals, vec![0, 1, 2]);
        assert!(!entries[1].is_visible());
        assert_eq!(entries[2].mod_name(), "Basic");
    }
}
