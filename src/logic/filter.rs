//! Composable entry predicates and the provider registry that feeds them.

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, PoisonError, RwLock};

use regex::Regex;

use crate::catalog::CatalogEntry;
use crate::util::LogOnce;

/// Predicate fault messages already reported.
static LOGGED_FAULTS: LogOnce = LogOnce::new();

/// Failure while building or evaluating a filter.
#[derive(Debug)]
pub enum FilterError {
    /// The pattern given to `ItemFilter::pattern` does not compile.
    InvalidPattern(regex::Error),
    /// A custom predicate failed for one entry.
    Predicate {
        /// Predicate name.
        filter: String,
        /// What went wrong.
        message: String,
    },
}

impl fmt::Display for FilterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidPattern(err) => write!(f, "invalid filter pattern: {err}"),
            Self::Predicate { filter, message } => write!(f, "filter {filter} failed: {message}"),
        }
    }
}

impl std::error::Error for FilterError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::InvalidPattern(err) => Some(err),
            Self::Predicate { .. } => None,
        }
    }
}

impl From<regex::Error> for FilterError {
    fn from(value: regex::Error) -> Self {
        Self::InvalidPattern(value)
    }
}

/// Externally supplied predicate that may fail.
pub trait EntryPredicate: Send + Sync {
    /// Name used in log messages.
    fn name(&self) -> &str;

    /// Whether `entry` passes.
    ///
    /// # Errors
    /// - Any failure; the enclosing filter applies its fault default.
    fn test(&self, entry: &CatalogEntry) -> Result<bool, FilterError>;
}

/// What: Closed set of entry filters.
///
/// Details:
/// - `All` rejects an entry only when a child rejects it; a faulting child
///   counts as a pass.
/// - `Any` accepts an entry only when a child accepts it; a faulting child
///   counts as no match.
/// - `Negated(None)` rejects nothing.
#[derive(Clone)]
pub enum ItemFilter {
    /// Accepts every entry.
    Everything,
    /// Rejects every entry.
    Nothing,
    /// Inverts the wrapped filter.
    Negated(Option<Box<ItemFilter>>),
    /// Regex search over the display name.
    Pattern(Regex),
    /// Every child must accept.
    All(Vec<ItemFilter>),
    /// At least one child must accept.
    Any(Vec<ItemFilter>),
    /// External predicate.
    Custom(Arc<dyn EntryPredicate>),
}

impl fmt::Debug for ItemFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Everything => f.write_str("Everything"),
            Self::Nothing => f.write_str("Nothing"),
            Self::Negated(inner) => f.debug_tuple("Negated").field(inner).finish(),
            Self::Pattern(re) => f.debug_tuple("Pattern").field(&re.as_str()).finish(),
            Self::All(children) => f.debug_tuple("All").field(children).finish(),
            Self::Any(children) => f.debug_tuple("Any").field(children).finish(),
            Self::Custom(p) => f.debug_tuple("Custom").field(&p.name()).finish(),
        }
    }
}

impl ItemFilter {
    /// Regex filter over display names.
    ///
    /// # Errors
    /// - `FilterError::InvalidPattern` when `pattern` does not compile.
    pub fn pattern(pattern: &str) -> Result<Self, FilterError> {
        Ok(Self::Pattern(Regex::new(pattern)?))
    }

    /// Inverts `inner`.
    #[must_use]
    pub fn negate(inner: Self) -> Self {
        Self::Negated(Some(Box::new(inner)))
    }

    /// What: Evaluate the filter, surfacing faults.
    ///
    /// Output:
    /// - `Ok(bool)` for a decision; `Err` only when the decision itself hinges
    ///   on a faulting custom predicate (directly or under `Negated`).
    ///
    /// Details:
    /// - `All` and `Any` absorb child faults with their documented default
    ///   and keep evaluating the remaining children.
    ///
    /// # Errors
    /// - The predicate fault of a `Custom` filter, possibly under `Negated`.
    pub fn try_matches(&self, entry: &CatalogEntry) -> Result<bool, FilterError> {
        match self {
            Self::Everything | Self::Negated(None) => Ok(true),
            Self::Nothing => Ok(false),
            Self::Negated(Some(inner)) => inner.try_matches(entry).map(|m| !m),
            Self::Pattern(re) => Ok(re.is_match(entry.display_name())),
            Self::All(children) => {
                for child in children {
                    match child.try_matches(entry) {
                        Ok(false) => return Ok(false),
                        Ok(true) => {}
                        Err(e) => report(&e, entry),
                    }
                }
                Ok(true)
            }
            Self::Any(children) => {
                for child in children {
                    match child.try_matches(entry) {
                        Ok(true) => return Ok(true),
                        Ok(false) => {}
                        Err(e) => report(&e, entry),
                    }
                }
                Ok(false)
            }
            Self::Custom(predicate) => {
                match catch_unwind(AssertUnwindSafe(|| predicate.test(entry))) {
                    Ok(result) => result,
                    Err(_) => Err(FilterError::Predicate {
                        filter: predicate.name().to_string(),
                        message: "predicate panicked".into(),
                    }),
                }
            }
        }
    }

    /// Evaluate the filter; a top-level fault is reported and counts as a pass.
    #[must_use]
    pub fn matches(&self, entry: &CatalogEntry) -> bool {
        self.try_matches(entry).unwrap_or_else(|e| {
            report(&e, entry);
            true
        })
    }
}

fn report(err: &FilterError, entry: &CatalogEntry) {
    let message = err.to_string();
    if LOGGED_FAULTS.first(&message) {
        tracing::error!(entry = %entry.variant(), error = %message, "[Filter] exception filtering entry");
    }
}

/// Source of a filter, asked again on every pipeline run.
pub trait FilterProvider: Send + Sync {
    /// Current filter.
    fn filter(&self) -> ItemFilter;
}

impl<F> FilterProvider for F
where
    F: Fn() -> ItemFilter + Send + Sync,
{
    fn filter(&self) -> ItemFilter {
        self()
    }
}

/// Handle returned by `FilterRegistry::register`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProviderId(u64);

#[derive(Default)]
struct Providers {
    next_id: u64,
    list: Vec<(ProviderId, Arc<dyn FilterProvider>)>,
}

/// What: Thread-safe, ordered set of filter providers.
///
/// Details:
/// - Providers may be added or removed from any thread at any time; every
///   `chain()` call reads the current set under the shared lock.
#[derive(Default)]
pub struct FilterRegistry {
    providers: RwLock<Providers>,
}

impl fmt::Debug for FilterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterRegistry")
            .field("providers", &self.len())
            .finish()
    }
}

impl FilterRegistry {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a provider; its filters run after those already registered.
    pub fn register(&self, provider: impl FilterProvider + 'static) -> ProviderId {
        let provider: Arc<dyn FilterProvider> = Arc::new(provider);
        let mut guard = self.providers.write().unwrap_or_else(PoisonError::into_inner);
        let id = ProviderId(guard.next_id);
        guard.next_id += 1;
        guard.list.push((id, provider));
        id
    }

    /// Remove a provider; returns `false` when it was not registered.
    pub fn unregister(&self, id: ProviderId) -> bool {
        let mut guard = self.providers.write().unwrap_or_else(PoisonError::into_inner);
        let before = guard.list.len();
        guard.list.retain(|(pid, _)| *pid != id);
        guard.list.len() != before
    }

    /// Number of registered providers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.providers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .list
            .len()
    }

    /// `true` when no provider is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fresh filters from every provider, in registration order.
    #[must_use]
    pub fn filters(&self) -> Vec<ItemFilter> {
        let providers: Vec<Arc<dyn FilterProvider>> = self
            .providers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .list
            .iter()
            .map(|(_, p)| Arc::clone(p))
            .collect();
        providers.iter().map(|p| p.filter()).collect()
    }

    /// All current filters combined with `ItemFilter::All`.
    #[must_use]
    pub fn chain(&self) -> ItemFilter {
        ItemFilter::All(self.filters())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ItemId, Variant};

    struct Failing;

    impl EntryPredicate for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        fn test(&self, _entry: &CatalogEntry) -> Result<bool, FilterError> {
            Err(FilterError::Predicate {
                filter: "failing".into(),
                message: "boom".into(),
            })
        }
    }

    struct Panicking;

    impl EntryPredicate for Panicking {
        fn name(&self) -> &str {
            "panicking"
        }

        fn test(&self, _entry: &CatalogEntry) -> Result<bool, FilterError> {
            panic!("predicate bug")
        }
    }

    fn entry(name: &str) -> CatalogEntry {
        CatalogEntry::new(Variant::new(ItemId(1), 0), name, "basic", "Basic", 0)
    }

    #[test]
    /// What: Combinators follow their truth tables
    ///
    /// - Input: Everything/Nothing under All, Any and Negated
    /// - Output: All rejects if any child rejects; Any accepts if any accepts
    fn combinator_truth_tables() {
        let e = entry("Stone");
        let yes = ItemFilter::Everything;
        let no = ItemFilter::Nothing;
        assert!(ItemFilter::All(vec![yes.clone(), yes.clone()]).matches(&e));
        assert!(!ItemFilter::All(vec![yes.clone(), no.clone()]).matches(&e));
        assert!(ItemFilter::Any(vec![no.clone(), yes.clone()]).matches(&e));
        assert!(!ItemFilter::Any(vec![no.clone(), no.clone()]).matches(&e));
        assert!(!ItemFilter::negate(yes).matches(&e));
        assert!(ItemFilter::negate(no).matches(&e));
        assert!(ItemFilter::Negated(None).matches(&e));
        assert!(ItemFilter::All(Vec::new()).matches(&e));
        assert!(!ItemFilter::Any(Vec::new()).matches(&e));
    }

    #[test]
    /// What: Pattern searches the display name
    fn pattern_matches_display_name() {
        let f = ItemFilter::pattern("(?i)pick").expect("valid regex");
        assert!(f.matches(&entry("Iron Pickaxe")));
        assert!(!f.matches(&entry("Stone")));
        assert!(matches!(
            ItemFilter::pattern("(unclosed"),
            Err(FilterError::InvalidPattern(_))
        ));
    }

    #[test]
    /// What: Faulting children use per-kind defaults and do not stop evaluation
    ///
    /// - Input: Failing/panicking predicates beside ordinary filters
    /// - Output: All treats faults as pass; Any treats them as no match
    fn faults_use_kind_defaults() {
        let e = entry("Stone");
        let failing = ItemFilter::Custom(Arc::new(Failing));
        let panicking = ItemFilter::Custom(Arc::new(Panicking));
        assert!(ItemFilter::All(vec![failing.clone(), panicking.clone()]).matches(&e));
        assert!(!ItemFilter::All(vec![failing.clone(), ItemFilter::Nothing]).matches(&e));
        assert!(!ItemFilter::Any(vec![failing.clone(), panicking]).matches(&e));
        assert!(ItemFilter::Any(vec![failing.clone(), ItemFilter::Everything]).matches(&e));
        assert!(failing.try_matches(&e).is_err());
        assert!(failing.matches(&e));
    }

    #[test]
    /// What: Registry returns fresh filters in order and supports removal
    fn registry_register_unregister() {
        let registry = FilterRegistry::new();
        let a = registry.register(|| ItemFilter::Everything);
        let _b = registry.register(|| ItemFilter::Nothing);
        assert_eq!(registry.len(), 2);
        assert!(!registry.chain().matches(&entry("Stone")));
        assert!(registry.unregister(a));
        assert!(!registry.unregister(a));
        assert!(matches!(registry.filters().as_slice(), [ItemFilter::Nothing]));
    }
}
