//! Command-line argument definition.

use std::path::PathBuf;

use clap::Parser;

/// item-catalog - Load an item catalog in the background and search it
#[derive(Parser, Debug)]
#[command(name = "item-catalog")]
#[command(version)]
#[command(about = "Load an item catalog in the background and search it", long_about = None)]
pub struct Args {
    /// JSON catalog manifest to load
    #[arg(short, long)]
    pub catalog: PathBuf,

    /// Search query (`|` separates alternatives; prefixes @ mod, # tooltip, $ tag, % category)
    #[arg(short, long, default_value = "")]
    pub query: String,

    /// Keep only entries whose display name matches this regex
    #[arg(short, long)]
    pub pattern: Option<String>,

    /// Sort mode (mod, mod_then_name, registry, name); overrides settings.conf
    #[arg(short, long)]
    pub sort: Option<String>,

    /// Settings file (default: $XDG_CONFIG_HOME/item-catalog/settings.conf)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Print at most this many entries
    #[arg(short = 'n', long)]
    pub limit: Option<usize>,

    /// Print the visible list as JSON
    #[arg(long)]
    pub json: bool,

    /// Set the logging level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    pub log_level: String,

    /// Enable verbose output (equivalent to --log-level debug)
    #[arg(short, long)]
    pub verbose: bool,

    /// Write logs to this file instead of stderr
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}
