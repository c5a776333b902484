//! Tracing subscriber setup shared by the CLI and the server

use std::path::Path;
use std::time::{Duration, SystemTime};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry,
};

use crate::config::schema::LoggingConfig;

const LOG_FILE_PREFIX: &str = "convo.log";

/// Initialize the logging system.
///
/// `RUST_LOG` takes precedence over `logging.level`, `LOG_FORMAT` over
/// `logging.format`. Console output goes to stderr so it never interleaves
/// with REPL output on stdout. The returned guard must be held for the
/// lifetime of the process, otherwise buffered file output is lost.
pub fn init_logging(config: &LoggingConfig) -> WorkerGuard {
    let level = std::env::var("RUST_LOG").unwrap_or_else(|_| config.level.clone());
    let mut filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&level));

    for (module, level) in &config.overrides {
        match format!("{}={}", module, level).parse() {
            Ok(directive) => filter = filter.add_directive(directive),
            Err(_) => eprintln!("Invalid log directive: {}={}", module, level),
        }
    }

    let format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| config.format.clone());
    let is_json = format.eq_ignore_ascii_case("json");

    // rolling::daily(dir, "convo.log") yields convo.log.YYYY-MM-DD
    let file_appender = tracing_appender::rolling::daily(&config.dir, LOG_FILE_PREFIX);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let console_layer = if is_json {
        fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .boxed()
    } else {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .boxed()
    };

    let file_layer = if is_json {
        fmt::layer()
            .json()
            .with_writer(non_blocking)
            .with_ansi(false)
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .boxed()
    } else {
        fmt::layer()
            .with_writer(non_blocking)
            .with_ansi(false)
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .boxed()
    };

    if let Err(e) = Registry::default()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
    {
        eprintln!("Logging already initialized: {}", e);
    }

    if let Err(e) = cleanup_old_logs(Path::new(&config.dir), config.retention_days) {
        eprintln!("Failed to clean up old logs: {}", e);
    }

    guard
}

/// Remove rolled log files older than `days` days
fn cleanup_old_logs(dir: &Path, days: u64) -> std::io::Result<usize> {
    if !dir.exists() {
        return Ok(0);
    }

    let now = SystemTime::now();
    let threshold = Duration::from_secs(days * 24 * 3600);
    let mut removed = 0;

    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let is_log = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|name| name.starts_with(LOG_FILE_PREFIX));
        if !path.is_file() || !is_log {
            continue;
        }

        let age = entry
            .metadata()
            .and_then(|m| m.modified())
            .ok()
            .and_then(|modified| now.duration_since(modified).ok());
        if age.is_some_and(|age| age > threshold) {
            match std::fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(e) => eprintln!("Failed to remove old log file {:?}: {}", path, e),
            }
        }
    }

    Ok(removed)
}
