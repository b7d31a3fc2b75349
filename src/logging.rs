use std::path::{Path, PathBuf};

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const LOG_FILE_PREFIX: &str = "curriculum.log";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSettings {
    /// `EnvFilter` directive, e.g. `info` or `curriculum_backend=debug`.
    pub level: String,
    /// Directory for daily-rotated file output alongside stdout.
    pub file: Option<PathBuf>,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

/// Keeps the non-blocking file writer flushing until dropped.
pub struct FileLogGuard {
    _guard: WorkerGuard,
}

fn filter(level: &str) -> EnvFilter {
    EnvFilter::try_new(level).unwrap_or_else(|e| {
        eprintln!("invalid log filter {level:?} ({e}), using info");
        EnvFilter::new("info")
    })
}

/// Opens the rolling appender, or explains on stderr why file output is off.
fn file_writer(dir: &Path) -> Option<(NonBlocking, FileLogGuard)> {
    if let Err(e) = std::fs::create_dir_all(dir) {
        eprintln!("file logging disabled, cannot create {}: {e}", dir.display());
        return None;
    }
    let appender = RollingFileAppender::new(Rotation::DAILY, dir, LOG_FILE_PREFIX);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    Some((writer, FileLogGuard { _guard: guard }))
}

pub fn init_tracing(settings: &LogSettings) -> Option<FileLogGuard> {
    let (writer, guard) = match settings.file.as_deref().and_then(file_writer) {
        Some((writer, guard)) => (Some(writer), Some(guard)),
        None => (None, None),
    };
    let file_layer = writer.map(|writer| {
        fmt::layer()
            .with_writer(writer)
            .with_ansi(false)
            .with_target(true)
    });

    tracing_subscriber::registry()
        .with(filter(&settings.level))
        .with(fmt::layer().with_target(true))
        .with(file_layer)
        .init();
    guard
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bad_filter_falls_back_to_info() {
        assert_eq!(
            filter("not a [valid filter").to_string(),
            EnvFilter::new("info").to_string()
        );
    }

    #[test]
    fn default_is_stdout_only() {
        let settings = LogSettings::default();
        assert_eq!(settings.level, "info");
        assert!(settings.file.is_none());
    }
}
