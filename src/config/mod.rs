//! Runtime settings read from `settings.conf`.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::catalog::LoadSettings;
use crate::logic::SortMode;

mod parse;

pub use parse::parse_settings;

/// Directory name under the XDG config home.
const APP_DIR: &str = "item-catalog";
/// Settings file name.
const SETTINGS_FILE: &str = "settings.conf";

/// Values read at the start of every load and pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Budget for a full catalog load; zero disables it.
    pub load_timeout: Duration,
    /// Budget for resolving one item identity; zero disables it.
    pub item_timeout: Duration,
    /// Ordering of the visible list.
    pub sort_mode: SortMode,
    /// Worker pool size; `None` picks two-thirds of the cores.
    pub worker_threads: Option<usize>,
}

impl Default for Settings {
    fn default() -> Self {
        let load = LoadSettings::default();
        Self {
            load_timeout: load.total_timeout,
            item_timeout: load.item_timeout,
            sort_mode: SortMode::default(),
            worker_threads: None,
        }
    }
}

impl Settings {
    /// Loader budgets derived from these settings.
    #[must_use]
    pub const fn load_settings(&self) -> LoadSettings {
        LoadSettings {
            total_timeout: self.load_timeout,
            item_timeout: self.item_timeout,
        }
    }
}

/// Failure to read a settings file.
#[derive(Debug)]
pub enum ConfigError {
    /// The file exists but could not be read, or an explicit path is missing.
    Io {
        /// Settings path.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "cannot read settings {}: {source}", path.display())
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
        }
    }
}

/// What: Settings path for the given environment values.
///
/// Inputs:
/// - `xdg_config_home`: Value of `XDG_CONFIG_HOME`, if set.
/// - `home`: Value of `HOME`, if set.
///
/// Output:
/// - `$XDG_CONFIG_HOME/item-catalog/settings.conf` when the variable is
///   non-empty, else `$HOME/.config/item-catalog/settings.conf`, else `None`.
#[must_use]
pub fn settings_path_from(xdg_config_home: Option<&str>, home: Option<&str>) -> Option<PathBuf> {
    if let Some(xdg) = xdg_config_home
        && !xdg.trim().is_empty()
    {
        return Some(Path::new(xdg).join(APP_DIR).join(SETTINGS_FILE));
    }
    home.filter(|h| !h.trim().is_empty())
        .map(|h| Path::new(h).join(".config").join(APP_DIR).join(SETTINGS_FILE))
}

/// Settings path resolved from the process environment.
#[must_use]
pub fn resolve_settings_path() -> Option<PathBuf> {
    let xdg = std::env::var("XDG_CONFIG_HOME").ok();
    let home = std::env::var("HOME").ok();
    settings_path_from(xdg.as_deref(), home.as_deref())
}

/// Read and parse one settings file over the defaults.
///
/// # Errors
/// - `ConfigError::Io` when the file cannot be read.
pub fn load_from(path: &Path) -> Result<Settings, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut settings = Settings::default();
    parse_settings(&content, &mut settings);
    tracing::debug!(path = %path.display(), ?settings, "[Config] settings loaded");
    Ok(settings)
}

/// What: Load settings from an explicit path or the default location.
///
/// Inputs:
/// - `explicit`: Path given on the command line, if any.
///
/// Output:
/// - Parsed settings; defaults when the default location has no file.
///
/// # Errors
/// - `ConfigError::Io` when an explicit file cannot be read, or when the
///   default file exists but is unreadable.
pub fn load(explicit: Option<&Path>) -> Result<Settings, ConfigError> {
    if let Some(path) = explicit {
        return load_from(path);
    }
    match resolve_settings_path() {
        Some(path) if path.is_file() => load_from(&path),
        Some(path) => {
            tracing::warn!(path = %path.display(), "[Config] settings file not found; using defaults");
            Ok(Settings::default())
        }
        None => {
            tracing::warn!("[Config] no config directory; using defaults");
            Ok(Settings::default())
        }
    }
}
