//! Query → index lookup → sort → filter chain.

use std::fmt;
use std::sync::Arc;

use tracing::debug;

use super::filter::ItemFilter;
use super::query::{QueryError, parse_query};
use super::sort::SortMode;
use crate::catalog::{Catalog, CatalogEntry};
use crate::index::{intersect, union};
use crate::task::Interruptible;

/// Fault that aborts a pipeline run.
#[derive(Debug)]
pub enum PipelineError {
    /// The query text could not be parsed.
    Query(QueryError),
    /// The index referenced an entry the snapshot does not hold.
    MissingEntry(u32),
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Query(err) => write!(f, "bad query: {err}"),
            Self::MissingEntry(id) => write!(f, "index references missing entry {id}"),
        }
    }
}

impl std::error::Error for PipelineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Query(err) => Some(err),
            Self::MissingEntry(_) => None,
        }
    }
}

impl From<QueryError> for PipelineError {
    fn from(value: QueryError) -> Self {
        Self::Query(value)
    }
}

/// What: Compute the visible list for `query` over `catalog`.
///
/// Inputs:
/// - `job`: Polled before parsing, around the sort and before returning.
/// - `catalog`: Published snapshot and its index.
/// - `query`: Raw query text.
/// - `sort`: Ordering of the result.
/// - `filter`: Final predicate pass.
///
/// Output:
/// - `Ok(Some(list))` to publish, `Ok(None)` when interrupted.
///
/// Details:
/// - Tokens in a group are intersected, groups are unioned; an empty query
///   selects every visible entry.
///
/// # Errors
/// - `PipelineError` for a malformed query or an index/snapshot mismatch.
pub fn run_pipeline(
    job: &impl Interruptible,
    catalog: &Catalog,
    query: &str,
    sort: SortMode,
    filter: &ItemFilter,
) -> Result<Option<Vec<Arc<CatalogEntry>>>, PipelineError> {
    if job.interrupted() {
        return Ok(None);
    }
    let parsed = parse_query(query)?;
    let index = catalog.index();

    let ids = if parsed.is_empty() {
        index.all_visible()
    } else {
        let mut matched: Vec<u32> = Vec::new();
        for group in &parsed.groups {
            let mut hits: Option<Vec<u32>> = None;
            for token in group {
                let found = index.lookup(token);
                let next = match hits {
                    Some(prev) => intersect(&prev, &found),
                    None => found,
                };
                let done = next.is_empty();
                hits = Some(next);
                if done {
                    break;
                }
            }
            if let Some(hits) = hits {
                matched = union(&matched, &hits);
            }
        }
        matched
    };

    let snapshot = catalog.snapshot();
    let mut entries = ids
        .iter()
        .map(|&id| {
            snapshot
                .get(id as usize)
                .cloned()
                .ok_or(PipelineError::MissingEntry(id))
        })
        .collect::<Result<Vec<_>, _>>()?;

    if job.interrupted() {
        return Ok(None);
    }
    entries.sort_by(|a, b| sort.compare(a, b));
    if job.interrupted() {
        return Ok(None);
    }
    let matched = entries.len();
    entries.retain(|entry| filter.matches(entry));
    if job.interrupted() {
        return Ok(None);
    }
    debug!(
        query,
        matched,
        visible = entries.len(),
        generation = snapshot.generation(),
        "[Pipeline] visible list computed"
    );
    Ok(Some(entries))
}
