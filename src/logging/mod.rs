//! Logging utilities for Upscayl
//! Installs the logger and handles log file cleanup for 7-day retention

use crate::utils::get_logs_dir;
use log::{info, warn, LevelFilter};
use std::fs::{self, File};
use std::path::Path;
use std::time::{Duration, SystemTime};

const LOG_RETENTION_DAYS: u64 = 7;

/// Install the global logger. `RUST_LOG` takes precedence over `level`.
///
/// With `to_file`, records are written to a timestamped file in the logs directory
/// instead of stderr.
pub fn init_logging(level: LevelFilter, to_file: bool) {
    let mut builder = env_logger::Builder::new();
    builder
        .filter_level(level)
        .parse_default_env()
        .format_timestamp_millis();

    let mut file_error = None;
    if to_file {
        let logs_dir = get_logs_dir();
        let file_name = format!(
            "upscayl-{}.log",
            chrono::Local::now().format("%Y%m%d-%H%M%S")
        );
        let log_path = logs_dir.join(file_name);
        match fs::create_dir_all(&logs_dir).and_then(|_| File::create(&log_path)) {
            Ok(file) => {
                builder.target(env_logger::Target::Pipe(Box::new(file)));
            }
            Err(e) => file_error = Some((log_path, e)),
        }
    }

    // A second init (tests, embedding apps) keeps the first logger
    let _ = builder.try_init();

    if let Some((path, e)) = file_error {
        warn!("Could not open log file {:?}, logging to stderr: {}", path, e);
    }
}

pub fn cleanup_old_logs() {
    cleanup_logs_in(&get_logs_dir(), Duration::from_secs(LOG_RETENTION_DAYS * 24 * 60 * 60));
}

fn cleanup_logs_in(logs_dir: &Path, retention: Duration) -> usize {
    if !logs_dir.exists() {
        return 0;
    }

    let now = SystemTime::now();
    let mut removed = 0;

    if let Ok(entries) = fs::read_dir(logs_dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().map_or(false, |ext| ext == "log") {
                if let Ok(meta) = fs::metadata(&path) {
                    if let Ok(modified) = meta.modified() {
                        if let Ok(age) = now.duration_since(modified) {
                            if age > retention && fs::remove_file(&path).is_ok() {
                                info!("Cleaned up old log: {:?}", path.file_name());
                                removed += 1;
                            }
                        }
                    }
                }
            }
        }
    }

    removed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cleanup_only_touches_expired_log_files() {
        let dir = std::env::temp_dir().join(format!("upscayl-logs-{}", uuid::Uuid::new_v4()));
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("old.log"), "x").unwrap();
        fs::write(dir.join("notes.txt"), "x").unwrap();

        std::thread::sleep(Duration::from_millis(20));
        let removed = cleanup_logs_in(&dir, Duration::from_millis(1));

        assert_eq!(removed, 1);
        assert!(!dir.join("old.log").exists());
        assert!(dir.join("notes.txt").exists());

        fs::write(dir.join("fresh.log"), "x").unwrap();
        assert_eq!(cleanup_logs_in(&dir, Duration::from_secs(3600)), 0);
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_cleanup_missing_dir_is_noop() {
        let dir = std::env::temp_dir().join(format!("upscayl-nologs-{}", uuid::Uuid::new_v4()));
        assert_eq!(cleanup_logs_in(&dir, Duration::from_secs(1)), 0);
    }
}
