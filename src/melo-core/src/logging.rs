use crate::config::{LogLevel, LoggingConfig};
use crate::paths::AppDirs;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use thiserror::Error;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::writer::{BoxMakeWriter, MakeWriterExt};
use tracing_subscriber::{fmt, EnvFilter};

const DEFAULT_LOG_FILE: &str = "melo.log";

/// Keeps the background log writer alive; hold it until the process exits.
pub struct LoggingGuard {
    _file_guard: WorkerGuard,
}

/// Install the global subscriber: stdout (optional) plus a daily rolling file.
///
/// `RUST_LOG` overrides the configured level when set. Rotated files beyond
/// `max_log_files` are pruned first; a file that cannot be removed is reported
/// once the subscriber is up instead of failing startup.
pub fn init_logging(config: &LoggingConfig, dirs: &AppDirs) -> Result<LoggingGuard, LoggingError> {
    let log_dir = dirs.log_dir();
    fs::create_dir_all(log_dir).map_err(|source| LoggingError::CreateDirectory {
        path: log_dir.to_path_buf(),
        source,
    })?;

    let file_stem = config.file_name.as_deref().unwrap_or(DEFAULT_LOG_FILE);
    let pruned = prune_logs(log_dir, file_stem, config.max_log_files.max(1))?;

    let (file_writer, file_guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::daily(log_dir, file_stem));
    let writer = if config.stdout {
        BoxMakeWriter::new(std::io::stdout.and(file_writer))
    } else {
        BoxMakeWriter::new(file_writer)
    };

    fmt()
        .with_env_filter(level_filter(config.level)?)
        .with_target(true)
        .with_ansi(config.stdout)
        .with_writer(writer)
        .try_init()
        .map_err(LoggingError::SubscriberInstall)?;

    for (path, error) in &pruned.failed {
        tracing::warn!(path = %path.display(), %error, "could not remove old log file");
    }
    tracing::debug!(dir = %log_dir.display(), removed = pruned.removed, "logging initialised");
    Ok(LoggingGuard {
        _file_guard: file_guard,
    })
}

fn level_filter(level: LogLevel) -> Result<EnvFilter, LoggingError> {
    let directive = match std::env::var(EnvFilter::DEFAULT_ENV) {
        Ok(value) if !value.trim().is_empty() => value,
        _ => level.as_filter_directive().to_owned(),
    };
    EnvFilter::builder()
        .parse(&directive)
        .map_err(|source| LoggingError::ParseLevel {
            level: directive,
            source,
        })
}

#[derive(Debug, Default)]
struct Pruned {
    removed: usize,
    failed: Vec<(PathBuf, io::Error)>,
}

/// Delete the oldest `file_stem*` files so that at most `keep` remain.
fn prune_logs(dir: &Path, file_stem: &str, keep: usize) -> Result<Pruned, LoggingError> {
    let listing = fs::read_dir(dir).map_err(|source| LoggingError::ReadDir {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut logs: Vec<(SystemTime, PathBuf)> = listing
        .flatten()
        .filter(|entry| entry.file_name().to_string_lossy().starts_with(file_stem))
        .filter_map(|entry| Some((entry.metadata().ok()?.modified().ok()?, entry.path())))
        .collect();
    // Newest first; everything after `keep` goes.
    logs.sort_unstable_by(|a, b| b.0.cmp(&a.0));

    let mut pruned = Pruned::default();
    for (_, path) in logs.into_iter().skip(keep) {
        match fs::remove_file(&path) {
            Ok(()) => pruned.removed += 1,
            Err(error) => pruned.failed.push((path, error)),
        }
    }
    Ok(pruned)
}

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("failed to create log directory {path}: {source}")]
    CreateDirectory {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse log level {level}: {source}")]
    ParseLevel {
        level: String,
        source: tracing_subscriber::filter::ParseError,
    },
    #[error("failed to install tracing subscriber: {0}")]
    SubscriberInstall(Box<dyn std::error::Error + Send + Sync>),
    #[error("failed to list log directory {path}: {source}")]
    ReadDir {
        path: PathBuf,
        source: std::io::Error,
    },
}
