//! Query parsing, filtering and sorting of the visible list.

pub mod filter;
pub mod pipeline;
pub mod query;
pub mod sort;

pub use filter::{EntryPredicate, FilterError, FilterProvider, FilterRegistry, ItemFilter, ProviderId};
pub use pipeline::{PipelineError, run_pipeline};
pub use query::{MatchMode, Query, QueryError, SearchToken, parse_query};
pub use sort::SortMode;
