//! Tracing setup.
//!
//! Diagnostics go to systemd-journald when a journal socket is available,
//! so daemon-style runs show up in `journalctl`. Everywhere else (non-Linux,
//! containers without systemd) they land in a daily-rotated file instead of
//! stderr, keeping the CLI output clean for the classification report.
//!
//! Verbosity comes from the `SNAPSORT_LOG` environment variable using the
//! usual filter syntax (`error`, `warn`, `info`, `debug`, `trace`, or
//! per-target directives). Unset means `info`.

use anyhow::Result;
use std::path::PathBuf;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Wire up the global subscriber. Call once at startup; `log_dir` overrides
/// where the file fallback writes.
pub fn init(log_dir: Option<PathBuf>) -> Result<()> {
    let filter =
        EnvFilter::try_from_env("SNAPSORT_LOG").unwrap_or_else(|_| EnvFilter::new("info"));

    #[cfg(target_os = "linux")]
    {
        if let Ok(journald) = tracing_journald::layer() {
            tracing_subscriber::registry()
                .with(filter)
                .with(journald)
                .init();
            tracing::info!("Logging to journald");
            return Ok(());
        }
    }

    init_file_backend(filter, log_dir)
}

fn init_file_backend(filter: EnvFilter, log_dir: Option<PathBuf>) -> Result<()> {
    let log_dir = log_dir.unwrap_or_else(default_log_dir);
    std::fs::create_dir_all(&log_dir)?;

    let appender = tracing_appender::rolling::daily(&log_dir, "snapsort.log");
    let (writer, guard) = tracing_appender::non_blocking(appender);

    // The worker guard must outlive the process or buffered lines are lost;
    // parking it in a static covers the whole run
    static GUARD: std::sync::OnceLock<tracing_appender::non_blocking::WorkerGuard> =
        std::sync::OnceLock::new();
    let _ = GUARD.set(guard);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(writer).with_ansi(false))
        .init();

    tracing::info!("Logging to files under {}", log_dir.display());
    Ok(())
}

fn default_log_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("snapsort")
        .join("logs")
}
