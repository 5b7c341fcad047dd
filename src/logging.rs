//! # Structured Logging
//!
//! Environment-aware structured logging for debugging long-running
//! orchestration jobs: console output always, plus a JSON file layer when
//! `CONDUCTOR_LOG_DIR` points at a writable directory.

use std::fs;
use std::path::PathBuf;
use std::process;
use std::sync::OnceLock;

use chrono::Utc;
use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer,
};

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize the global tracing subscriber. Safe to call more than once;
/// a subscriber installed by the embedding process is left in place.
pub fn init_logging() {
    LOGGER_INITIALIZED.get_or_init(|| {
        let filter = || {
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
        };

        let console_layer = fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_filter(filter());

        match file_writer() {
            Some((writer, guard, path)) => {
                let file_layer = fmt::layer()
                    .with_writer(writer)
                    .with_ansi(false)
                    .json()
                    .with_filter(filter());
                if tracing_subscriber::registry()
                    .with(console_layer)
                    .with(file_layer)
                    .try_init()
                    .is_ok()
                {
                    tracing::info!(log_file = %path.display(), "logging initialized with file output");
                }
                // The guard keeps the non-blocking writer alive for the
                // lifetime of the process.
                std::mem::forget(guard);
            }
            None => {
                let _ = tracing_subscriber::registry().with(console_layer).try_init();
            }
        }
    });
}

type FileWriter = (
    tracing_appender::non_blocking::NonBlocking,
    tracing_appender::non_blocking::WorkerGuard,
    PathBuf,
);

fn file_writer() -> Option<FileWriter> {
    let dir = PathBuf::from(std::env::var("CONDUCTOR_LOG_DIR").ok()?);
    if !dir.exists() {
        fs::create_dir_all(&dir).ok()?;
    }
    let filename = format!(
        "conductor.{}.{}.log",
        process::id(),
        Utc::now().format("%Y%m%d_%H%M%S")
    );
    let appender = tracing_appender::rolling::never(&dir, &filename);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    Some((writer, guard, dir.join(filename)))
}
