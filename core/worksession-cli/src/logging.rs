//! Logging setup: a daily rolling file under `~/.worksession/logs/`.
//!
//! Level comes from `RUST_LOG` (default `info`); `WORKSESSION_DEBUG_LOG=1` forces
//! `debug`. If the log directory cannot be created, warnings and errors go to
//! stderr instead so command output stays clean.

use std::env;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use worksession_core::StorageConfig;

const LOG_FILE_PREFIX: &str = "worksession.log";

fn debug_enabled() -> bool {
    env::var("WORKSESSION_DEBUG_LOG")
        .map(|value| matches!(value.as_str(), "1" | "true" | "TRUE" | "yes" | "YES"))
        .unwrap_or(false)
}

fn filter() -> EnvFilter {
    if debug_enabled() {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

/// Installs the global subscriber. Keep the guard alive until exit so buffered
/// lines are flushed.
pub fn init() -> Option<WorkerGuard> {
    let logs_dir = StorageConfig::from_env()
        .ok()
        .map(|storage| storage.logs_dir())
        .filter(|dir| fs_err::create_dir_all(dir).is_ok());

    match logs_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::fmt()
                .with_env_filter(filter())
                .with_writer(writer)
                .with_ansi(false)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(EnvFilter::new("warn"))
                .with_writer(std::io::stderr)
                .init();
            None
        }
    }
}
