//! Subscriber setup for intray-admin.
//!
//! Console output goes to stderr so `--json` stays machine readable. When
//! `TMUX_INTRAY_LOG_FILE` is truthy a daily-rolling file is written under
//! `<state_dir>/logs` as well.

use std::path::Path;

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

pub const DEBUG_LOG_ENV: &str = "TMUX_INTRAY_DEBUG_LOG";
pub const LOG_FILE_ENV: &str = "TMUX_INTRAY_LOG_FILE";

const LOG_FILE_PREFIX: &str = "intray-admin.log";

/// Installs the global subscriber. The returned guard flushes the file
/// writer on drop and must live until the process exits.
pub fn init(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let filter = build_filter(env_flag(DEBUG_LOG_ENV));

    let (file_layer, guard) = match log_dir.and_then(open_file_writer) {
        Some((writer, guard)) => (
            Some(fmt::layer().with_ansi(false).with_writer(writer)),
            Some(guard),
        ),
        None => (None, None),
    };

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .try_init();
    guard
}

/// Directory for the rolling file, if file logging is switched on.
pub fn file_log_dir(state_log_dir: &Path) -> Option<&Path> {
    env_flag(LOG_FILE_ENV).then_some(state_log_dir)
}

fn build_filter(debug_enabled: bool) -> EnvFilter {
    if debug_enabled {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

fn open_file_writer(dir: &Path) -> Option<(NonBlocking, WorkerGuard)> {
    if let Err(err) = fs_err::create_dir_all(dir) {
        // No subscriber yet.
        eprintln!("intray-admin: file logging disabled: {}", err);
        return None;
    }
    let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
    Some(tracing_appender::non_blocking(appender))
}

fn env_flag(key: &str) -> bool {
    std::env::var(key)
        .map(|value| is_truthy(&value))
        .unwrap_or(false)
}

fn is_truthy(value: &str) -> bool {
    matches!(value, "1" | "true" | "TRUE" | "yes" | "YES")
}
