//! Library entry for item-catalog: background catalog loading, search index
//! and the restartable filter pipeline, exposed for the binary and tests.

pub mod catalog;
pub mod config;
pub mod engine;
pub mod index;
pub mod logic;
pub mod task;
pub mod util;
