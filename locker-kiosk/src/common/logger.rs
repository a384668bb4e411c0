//! Logging infrastructure.
//!
//! Console output plus daily-rotating application logs under
//! `work_dir/logs/app`, deleted after 14 days. Production uses JSON lines,
//! development uses the pretty format.

use std::fs;
use std::path::{Path, PathBuf};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::Config;

const LOG_RETENTION_DAYS: i64 = 14;

/// Install the tracing stack for the kiosk process.
///
/// `RUST_LOG` overrides the default level (info in production, debug
/// otherwise).
pub fn init(config: &Config) -> anyhow::Result<()> {
    let default_level = if config.is_production() { "info" } else { "debug" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let log_dir = Path::new(&config.work_dir).join("logs").join("app");
    fs::create_dir_all(&log_dir)?;
    let app_log = RollingFileAppender::new(Rotation::DAILY, &log_dir, "app");

    let registry = tracing_subscriber::registry().with(env_filter);

    if config.is_production() {
        let console_layer = fmt::layer()
            .json()
            .with_target(true)
            .with_file(true)
            .with_line_number(true);
        let file_layer = fmt::layer()
            .json()
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .with_writer(std::sync::Mutex::new(app_log));
        registry.with(console_layer).with(file_layer).init();
    } else {
        let console_layer = fmt::layer()
            .with_target(true)
            .with_file(true)
            .with_line_number(true);
        let file_layer = fmt::layer()
            .with_target(true)
            .with_ansi(false)
            .with_writer(std::sync::Mutex::new(app_log))
            .boxed();
        registry.with(console_layer).with(file_layer).init();
    }

    tokio::spawn(periodic_cleanup(
        Path::new(&config.work_dir).join("logs").join("app"),
    ));

    Ok(())
}

/// Delete `app-YYYY-MM-DD.log` files older than the retention window.
pub fn cleanup_old_logs(log_dir: &Path) -> anyhow::Result<()> {
    use chrono::{Local, TimeZone};

    let cutoff = Local::now() - chrono::Duration::days(LOG_RETENTION_DAYS);
    if !log_dir.exists() {
        return Ok(());
    }

    for entry in fs::read_dir(log_dir)? {
        let entry = entry?;
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if !name.starts_with("app.") && !name.starts_with("app-") {
            continue;
        }
        // Rolling appender names files app.YYYY-MM-DD.
        let date_part = name
            .trim_start_matches("app.")
            .trim_start_matches("app-")
            .trim_end_matches(".log");
        let Ok(naive_date) = chrono::NaiveDate::parse_from_str(date_part, "%Y-%m-%d") else {
            continue;
        };
        let Some(midnight) = naive_date.and_hms_opt(0, 0, 0) else {
            continue;
        };
        if let Some(local_datetime) = Local.from_local_datetime(&midnight).single()
            && local_datetime < cutoff
        {
            fs::remove_file(&path)?;
            tracing::info!(file = %name, "Deleted old log file");
        }
    }

    Ok(())
}

async fn periodic_cleanup(log_dir: PathBuf) {
    use tokio::time::{Duration, sleep};

    loop {
        sleep(Duration::from_secs(3600)).await;
        if let Err(e) = cleanup_old_logs(&log_dir) {
            tracing::error!(error = %e, "Failed to cleanup old logs");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cleanup_ignores_missing_dir() {
        assert!(cleanup_old_logs(Path::new("/nonexistent/kiosk-logs")).is_ok());
    }

    #[test]
    fn test_cleanup_removes_only_old_app_logs() {
        let dir = tempfile::tempdir().unwrap();
        let old = dir.path().join("app.2020-01-01");
        let unrelated = dir.path().join("notes.txt");
        std::fs::write(&old, b"x").unwrap();
        std::fs::write(&unrelated, b"x").unwrap();

        cleanup_old_logs(dir.path()).unwrap();

        assert!(!old.exists());
        assert!(unrelated.exists());
    }
}
