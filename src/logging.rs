//! Logging setup
//!
//! Stderr output plus an optional daily-rotated log file, filtered through
//! an `EnvFilter` directive.

use crate::config::LoggingConfig;
use crate::error::{CalibrationError, Result};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter};

const DEFAULT_LOG_FILE: &str = "auto-calibrate.log";

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Filter directive, e.g. `info` or `auto_calibrate=debug,warn`
    pub directive: String,

    /// Log to file
    pub file_path: Option<PathBuf>,

    /// Log to stderr
    pub stderr: bool,

    /// Include thread IDs
    pub thread_ids: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            directive: "info".to_string(),
            file_path: None,
            stderr: true,
            thread_ids: false,
        }
    }
}

impl From<&LoggingConfig> for LogConfig {
    fn from(config: &LoggingConfig) -> Self {
        Self {
            directive: config.level.clone(),
            file_path: config.file.clone(),
            stderr: config.stderr,
            ..Self::default()
        }
    }
}

impl LogConfig {
    /// Raise the filter to `debug`
    pub fn with_debug(mut self) -> Self {
        self.directive = "debug".to_string();
        self
    }

    fn env_filter(&self) -> EnvFilter {
        EnvFilter::builder().parse_lossy(&self.directive)
    }
}

/// Install the global subscriber
pub fn init_logging(config: LogConfig) -> Result<()> {
    let format = fmt::format()
        .with_level(true)
        .with_target(true)
        .with_thread_ids(config.thread_ids);

    let stderr_layer = config.stderr.then(|| {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(true)
            .event_format(format.clone())
    });

    let file_layer = match &config.file_path {
        Some(file_path) => {
            let (directory, file_name) = split_log_path(file_path);
            std::fs::create_dir_all(directory)?;
            let file_appender = tracing_appender::rolling::daily(directory, file_name);
            Some(
                fmt::layer()
                    .with_writer(file_appender)
                    .with_ansi(false)
                    .event_format(format),
            )
        }
        None => None,
    };

    let subscriber = tracing_subscriber::registry()
        .with(config.env_filter())
        .with(stderr_layer)
        .with(file_layer);

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| CalibrationError::internal(format!("Failed to install logger: {}", e)))
}

fn split_log_path(file_path: &Path) -> (&Path, &OsStr) {
    let directory = file_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let file_name = file_path
        .file_name()
        .unwrap_or_else(|| OsStr::new(DEFAULT_LOG_FILE));
    (directory, file_name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_logging_config() {
        let logging = LoggingConfig {
            level: "auto_calibrate=trace".to_string(),
            file: Some(PathBuf::from("/var/log/auto-calibrate/run.log")),
            stderr: false,
        };

        let config = LogConfig::from(&logging);
        assert_eq!(config.directive, "auto_calibrate=trace");
        assert!(!config.stderr);

        let config = config.with_debug();
        assert_eq!(config.directive, "debug");
    }

    #[test]
    fn test_split_log_path() {
        let (dir, name) = split_log_path(Path::new("run.log"));
        assert_eq!(dir, Path::new("."));
        assert_eq!(name, OsStr::new("run.log"));

        let (dir, name) = split_log_path(Path::new("/tmp/logs/"));
        assert_eq!(dir, Path::new("/tmp"));
        assert_eq!(name, OsStr::new("logs"));
    }
}
