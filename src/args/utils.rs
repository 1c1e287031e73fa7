//! Shared utilities for argument processing.

use super::Args;

/// What: Determine the log level based on command-line arguments and environment variables.
///
/// Inputs:
/// - `args`: Parsed command-line arguments.
///
/// Output:
/// - Log level string (trace, debug, info, warn, error).
///
/// Details:
/// - Verbose flag overrides log_level argument.
/// - ITEM_CATALOG_TRACE=1 enables TRACE level for task scheduling details.
pub fn determine_log_level(args: &Args) -> String {
    if args.verbose {
        "debug".to_string()
    } else if std::env::var("ITEM_CATALOG_TRACE").ok().as_deref() == Some("1") {
        "trace".to_string()
    } else {
        args.log_level.clone()
    }
}
