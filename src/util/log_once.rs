//! Suppression of repeated log lines.

use std::collections::BTreeSet;
use std::sync::{Mutex, PoisonError};

/// What: Append-only set of messages that have already been logged.
///
/// Details:
/// - `first(key)` returns `true` exactly once per distinct key, so callers
///   can guard a `tracing` call with it and avoid flooding the log when the
///   same fault repeats for thousands of entries.
/// - Const-constructible so it can back a `static`.
#[derive(Debug, Default)]
pub struct LogOnce {
    seen: Mutex<BTreeSet<String>>,
}

impl LogOnce {
    /// Empty set.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            seen: Mutex::new(BTreeSet::new()),
        }
    }

    /// `true` the first time `key` is offered, `false` afterwards.
    pub fn first(&self, key: &str) -> bool {
        let mut seen = self.seen.lock().unwrap_or_else(PoisonError::into_inner);
        if seen.contains(key) {
            return false;
        }
        seen.insert(key.to_string());
        true
    }

    /// Number of distinct keys seen so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.seen.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// `true` when nothing has been logged through this set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
