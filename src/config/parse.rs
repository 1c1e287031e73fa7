use std::time::Duration;

use super::Settings;
use crate::logic::SortMode;

/// Cut a value at the first `#` or `//` and trim it.
pub(crate) fn strip_inline_comment(s: &str) -> &str {
    let end = ["#", "//"]
        .iter()
        .filter_map(|marker| s.find(marker))
        .min()
        .unwrap_or(s.len());
    s[..end].trim()
}

/// What: Apply `settings.conf` content onto `settings`.
///
/// Inputs:
/// - `content`: File content in `key = value` form.
/// - `settings`: Values to overwrite.
///
/// Output:
/// - None (modifies `settings` in-place).
///
/// Details:
/// - Lines starting with `#`, `//` or `;` are comments.
/// - Keys are case-insensitive; `.`, `-` and spaces are read as `_`.
/// - Unknown keys and unparsable values keep the current value.
pub fn parse_settings(content: &str, settings: &mut Settings) {
    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty()
            || trimmed.starts_with('#')
            || trimmed.starts_with("//")
            || trimmed.starts_with(';')
        {
            continue;
        }
        let Some((raw_key, val_raw)) = trimmed.split_once('=') else {
            continue;
        };
        let key = raw_key.trim().to_lowercase().replace(['.', '-', ' '], "_");
        let val = strip_inline_comment(val_raw.trim());
        match key.as_str() {
            "load_timeout_ms" | "total_timeout_ms" => {
                if let Ok(v) = val.parse::<u64>() {
                    settings.load_timeout = Duration::from_millis(v);
                } else {
                    tracing::debug!(key, value = val, "[Config] ignoring unparsable value");
                }
            }
            "item_timeout_ms" | "step_timeout_ms" => {
                if let Ok(v) = val.parse::<u64>() {
                    settings.item_timeout = Duration::from_millis(v);
                } else {
                    tracing::debug!(key, value = val, "[Config] ignoring unparsable value");
                }
            }
            "sort_mode" | "results_sort" => {
                if let Some(sm) = SortMode::from_config_key(val) {
                    settings.sort_mode = sm;
                } else {
                    tracing::debug!(key, value = val, "[Config] unknown sort mode");
                }
            }
            "worker_threads" | "workers" => match val.parse::<usize>() {
                Ok(0) => settings.worker_threads = None,
                Ok(v) => settings.worker_threads = Some(v),
                Err(_) => tracing::debug!(key, value = val, "[Config] ignoring unparsable value"),
            },
            _ => tracing::debug!(key, "[Config] ignoring unknown key"),
        }
    }
}
