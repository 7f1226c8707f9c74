//! File logging
//!
//! Log records go to a daily-rolling file so the console stays free for the
//! recording prompts. `RUST_LOG` controls the filter (default `info`).

use anyhow::{Context, Result};
use directories::ProjectDirs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const LOG_FILE_BASENAME: &str = "screenreel.log";
const LOG_DIR_ENV: &str = "SCREENREEL_LOG_PATH";
const LOG_RETENTION: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Subsystem for macOS unified logging (os_log)
#[cfg(target_os = "macos")]
const OSLOG_SUBSYSTEM: &str = "dev.screenreel.cli";

/// Install the global subscriber. Keep the returned guard alive until exit or
/// buffered records are lost.
pub fn init_logging() -> Result<WorkerGuard> {
    let log_dir = log_dir()?;
    std::fs::create_dir_all(&log_dir)
        .with_context(|| format!("Cannot create log directory {}", log_dir.display()))?;

    prune_old_logs(&log_dir, LOG_RETENTION);

    let appender = tracing_appender::rolling::daily(&log_dir, LOG_FILE_BASENAME);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter).with(
        tracing_subscriber::fmt::layer()
            .with_writer(writer)
            .with_ansi(false)
            .with_thread_names(true),
    );

    // Visible with `log stream --predicate 'subsystem == "dev.screenreel.cli"'`
    #[cfg(target_os = "macos")]
    let registry = registry.with(tracing_oslog::OsLogger::new(OSLOG_SUBSYSTEM, "default"));

    registry
        .try_init()
        .context("Failed to install the tracing subscriber")?;

    Ok(guard)
}

/// `$SCREENREEL_LOG_PATH`, else the platform state (or local data) directory
fn log_dir() -> Result<PathBuf> {
    if let Some(dir) = std::env::var_os(LOG_DIR_ENV) {
        return Ok(PathBuf::from(dir));
    }

    let dirs = ProjectDirs::from("dev", "screenreel", "screenreel")
        .context("No home directory to put logs in")?;
    let base = dirs.state_dir().unwrap_or_else(|| dirs.data_local_dir());
    Ok(base.join("logs"))
}

fn prune_old_logs(log_dir: &Path, max_age: Duration) {
    let Ok(entries) = std::fs::read_dir(log_dir) else {
        return;
    };

    let Some(cutoff) = SystemTime::now().checked_sub(max_age) else {
        return;
    };

    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }

        let is_log = path
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.starts_with(LOG_FILE_BASENAME));
        if !is_log {
            continue;
        }

        let modified = entry.metadata().and_then(|m| m.modified());
        if matches!(modified, Ok(modified) if modified < cutoff) {
            let _ = std::fs::remove_file(&path);
        }
    }
}
