//! Structured logging for Sunshaft binaries.
//!
//! Library crates log through the `log` facade; this crate installs a
//! `tracing` subscriber that also receives those records. Console output
//! carries uptime timestamps and module paths, and debug builds can add a JSON
//! file log for post-mortem analysis of dropped or skipped effect frames.

use std::path::Path;
use sunshaft_config::Config;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_FILTER: &str = "info,wgpu=warn,naga=warn";

/// Name of the JSON log file written in debug builds.
pub const LOG_FILE_NAME: &str = "sunshaft.log";

/// Resolve the filter string: config override first, then the default.
fn filter_string(config: Option<&Config>) -> String {
    match config {
        Some(config) if !config.debug.log_level.is_empty() => config.debug.log_level.clone(),
        _ => DEFAULT_FILTER.to_string(),
    }
}

/// Initialize the tracing subscriber.
///
/// `RUST_LOG` wins over the config's `log_level`, which wins over the default
/// `info,wgpu=warn,naga=warn`. When `debug_build` is set and `log_dir` can be
/// created, a JSON file layer is added next to the console layer.
///
/// ```no_run
/// use sunshaft_config::Config;
/// use sunshaft_log::init_logging;
///
/// let config = Config::default();
/// init_logging(None, false, Some(&config));
/// ```
pub fn init_logging(log_dir: Option<&Path>, debug_build: bool, config: Option<&Config>) {
    let filter_str = filter_string(config);

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&filter_str));

    let console_layer = fmt::layer()
        .with_target(true)
        .with_thread_names(true)
        .with_level(true)
        .with_timer(fmt::time::uptime());

    let subscriber = tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer);

    match log_dir.filter(|_| debug_build).and_then(open_log_file) {
        Some(log_file) => {
            let file_layer = fmt::layer()
                .with_writer(log_file)
                .with_ansi(false)
                .with_target(true)
                .with_timer(fmt::time::uptime())
                .json();
            subscriber.with(file_layer).init();
        }
        None => subscriber.init(),
    }
}

/// Create `log_dir` and truncate `log_dir/sunshaft.log`. `None` if either fails.
fn open_log_file(log_dir: &Path) -> Option<std::fs::File> {
    std::fs::create_dir_all(log_dir).ok()?;
    std::fs::File::create(log_dir.join(LOG_FILE_NAME)).ok()
}

/// `EnvFilter` with the default filter string (`info`, quiet `wgpu`/`naga`).
pub fn default_env_filter() -> EnvFilter {
    EnvFilter::new(DEFAULT_FILTER)
}
