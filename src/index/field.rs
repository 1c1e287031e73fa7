//! Vocabulary, posting lists and suffix array for one searchable field.

use std::collections::HashMap;

/// Suffix of `terms[term]` starting at byte `offset`.
fn suffix_of(terms: &[String], (term, offset): (u32, u32)) -> &str {
    terms
        .get(term as usize)
        .and_then(|t| t.get(offset as usize..))
        .unwrap_or("")
}

/// Accumulates normalized field values while walking a snapshot.
#[derive(Debug, Default)]
pub(crate) struct FieldIndexBuilder {
    terms: Vec<String>,
    postings: Vec<Vec<u32>>,
    exact: HashMap<String, u32>,
}

impl FieldIndexBuilder {
    /// What: Record that entry `entry` carries `value` in this field.
    ///
    /// Details:
    /// - `value` must already be normalized; empty values are ignored.
    /// - Entries must be added in non-decreasing order so posting lists stay
    ///   sorted without a final sort.
    pub(crate) fn add(&mut self, entry: u32, value: String) {
        if value.is_empty() {
            return;
        }
        let term = match self.exact.get(&value) {
            Some(&term) => term,
            None => {
                let Ok(term) = u32::try_from(self.terms.len()) else {
                    return;
                };
                self.exact.insert(value.clone(), term);
                self.terms.push(value);
                self.postings.push(Vec::new());
                term
            }
        };
        if let Some(list) = self.postings.get_mut(term as usize)
            && list.last() != Some(&entry)
        {
            list.push(entry);
        }
    }

    /// Sort every suffix of every term and freeze the field.
    pub(crate) fn finish(self) -> FieldIndex {
        let mut suffixes: Vec<(u32, u32)> = Vec::new();
        for (term, text) in self.terms.iter().enumerate() {
            let Ok(term) = u32::try_from(term) else {
                break;
            };
            suffixes.extend(
                text.char_indices()
                    .filter_map(|(offset, _)| u32::try_from(offset).ok())
                    .map(|offset| (term, offset)),
            );
        }
        let terms = self.terms;
        suffixes.sort_unstable_by(|a, b| suffix_of(&terms, *a).cmp(suffix_of(&terms, *b)));
        FieldIndex {
            terms,
            postings: self.postings,
            exact: self.exact,
            suffixes,
        }
    }
}

/// What: Immutable per-field lookup structure.
///
/// Details:
/// - `exact` maps whole normalized values to their term id.
/// - `suffixes` holds `(term id, byte offset)` for every character boundary of
///   every term, sorted by the suffix text, so every term containing a
///   needle sits in one contiguous run starting at the needle's lower bound.
#[derive(Debug, Default)]
pub(crate) struct FieldIndex {
    terms: Vec<String>,
    postings: Vec<Vec<u32>>,
    exact: HashMap<String, u32>,
    suffixes: Vec<(u32, u32)>,
}

impl FieldIndex {
    /// Entries whose value equals `needle` exactly, sorted.
    pub(crate) fn exact(&self, needle: &str) -> &[u32] {
        self.exact
            .get(needle)
            .and_then(|&term| self.postings.get(term as usize))
            .map_or(&[], Vec::as_slice)
    }

    /// Entries with a value containing `needle`, sorted and deduplicated.
    pub(crate) fn substring(&self, needle: &str) -> Vec<u32> {
        if needle.is_empty() {
            return Vec::new();
        }
        let start = self
            .suffixes
            .partition_point(|&s| suffix_of(&self.terms, s) < needle);
        let mut terms: Vec<u32> = self.suffixes[start..]
            .iter()
            .take_while(|&&s| suffix_of(&self.terms, s).starts_with(needle))
            .map(|&(term, _)| term)
            .collect();
        terms.sort_unstable();
        terms.dedup();

        let mut hits: Vec<u32> = terms
            .iter()
            .filter_map(|&term| self.postings.get(term as usize))
            .flatten()
            .copied()
            .collect();
        hits.sort_unstable();
        hits.dedup();
        hits
    }

    /// Distinct values held.
    pub(crate) fn vocabulary_len(&self) -> usize {
        self.terms.len()
    }
}
