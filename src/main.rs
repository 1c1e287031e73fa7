//! item-catalog binary: load a manifest, run one search and print the result.

mod args;

use std::process::ExitCode;
use std::sync::OnceLock;
use std::time::Duration;

use clap::Parser;

use item_catalog::catalog::ManifestSource;
use item_catalog::config;
use item_catalog::engine::CatalogEngine;
use item_catalog::logic::{ItemFilter, SortMode};

use crate::args::{Args, determine_log_level, render_json, render_plain};

static LOG_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();

/// Wait used when the load budget is disabled.
const UNBOUNDED_WAIT: Duration = Duration::from_secs(3600);
/// Slack on top of the load budget for indexing and the first filter run.
const WAIT_SLACK: Duration = Duration::from_secs(5);

/// What: Install the global tracing subscriber.
///
/// Inputs:
/// - `args`: Log level flags and optional log file.
///
/// Details:
/// - `RUST_LOG` wins over the flags when set.
/// - A log file that cannot be opened falls back to stderr with a warning.
fn init_logging(args: &Args) {
    let level = determine_log_level(args);
    let env_filter = || {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&level))
    };
    if let Some(path) = &args.log_file {
        match std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
        {
            Ok(file) => {
                let (non_blocking, guard) = tracing_appender::non_blocking(file);
                tracing_subscriber::fmt()
                    .with_env_filter(env_filter())
                    .with_target(false)
                    .with_ansi(false)
                    .with_writer(non_blocking)
                    .with_timer(tracing_subscriber::fmt::time::uptime())
                    .init();
                let _ = LOG_GUARD.set(guard);
                tracing::info!(path = %path.display(), "logging initialized");
                return;
            }
            Err(e) => {
                tracing_subscriber::fmt()
                    .with_env_filter(env_filter())
                    .with_target(false)
                    .with_writer(std::io::stderr)
                    .with_timer(tracing_subscriber::fmt::time::uptime())
                    .init();
                tracing::warn!(error = %e, "failed to open log file; using stderr");
                return;
            }
        }
    }
    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_timer(tracing_subscriber::fmt::time::uptime())
        .init();
}

/// Load, search, print. Returns the process exit code.
fn run(args: &Args) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let mut settings = config::load(args.config.as_deref())?;
    if let Some(key) = &args.sort {
        settings.sort_mode = SortMode::from_config_key(key)
            .ok_or_else(|| format!("unknown sort mode '{key}'"))?;
    }
    let wait = if settings.load_timeout.is_zero() {
        UNBOUNDED_WAIT
    } else {
        settings.load_timeout + WAIT_SLACK
    };

    let source = ManifestSource::from_path(&args.catalog)?;
    tracing::info!(items = source.len(), path = %args.catalog.display(), "[Main] manifest read");
    let (sources, _overrides) = source.into_sources();
    let engine = CatalogEngine::with_shared_pool(sources, settings)?;

    if let Some(pattern) = &args.pattern {
        let filter = ItemFilter::pattern(pattern)?;
        engine.add_filter(move || filter.clone());
    }
    engine.set_query(args.query.clone());
    engine.reload();
    if !engine.wait_idle(wait) {
        engine.stop();
        return Err(format!("catalog search did not finish within {}s", wait.as_secs()).into());
    }
    if !engine.load_finished() {
        return Err("catalog load did not complete; see log for details".into());
    }

    let list = engine.visible();
    let errored = engine.errored_items();
    if !errored.is_empty() {
        tracing::warn!(count = errored.len(), "[Main] items excluded after errors");
    }
    if args.json {
        println!("{}", render_json(&list, args.limit)?);
    } else {
        print!("{}", render_plain(&list, args.limit));
    }
    Ok(if list.is_empty() {
        ExitCode::from(1)
    } else {
        ExitCode::SUCCESS
    })
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(&args);
    tracing::info!(catalog = %args.catalog.display(), query = %args.query, "item-catalog starting");
    match run(&args) {
        Ok(code) => code,
        Err(err) => {
            tracing::error!(error = %err, "Application error");
            eprintln!("item-catalog: {err}");
            ExitCode::from(2)
        }
    }
}
