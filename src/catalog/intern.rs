//! Content-keyed string pool used while loading.

use std::collections::HashSet;
use std::sync::Arc;

/// What: De-duplicating pool for short repeated strings.
///
/// Details:
/// - Mod ids, mod names, tags and categories repeat across thousands of
///   entries; interning makes every repeat share one allocation.
/// - Lives for one load; the published entries keep their `Arc`s alive.
#[derive(Debug, Default)]
pub struct StringPool {
    strings: HashSet<Arc<str>>,
}

impl StringPool {
    /// Empty pool.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared copy of `s`, allocating only on first sight.
    pub fn intern(&mut self, s: &str) -> Arc<str> {
        if let Some(existing) = self.strings.get(s) {
            return Arc::clone(existing);
        }
        let shared: Arc<str> = Arc::from(s);
        self.strings.insert(Arc::clone(&shared));
        shared
    }

    /// Number of distinct strings held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.strings.len()
    }

    /// `true` when nothing has been interned.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }
}
