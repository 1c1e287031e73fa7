//! Command-line argument parsing and output rendering.

pub mod definition;
pub mod output;
pub mod utils;

// Re-export commonly used items
pub use definition::Args;
pub use output::{render_json, render_plain};
pub use utils::determine_log_level;
