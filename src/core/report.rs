//! Run reporter: timestamped log lines on stdout and in the log file
//!
//! The reporter owns its own `tracing` dispatcher instead of installing a
//! process-wide subscriber, so every component that logs receives the
//! reporter explicitly and tests can hand out a silent one.

use anyhow::{Context, Result};
use std::fmt::Display;
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;
use tracing::level_filters::LevelFilter;
use tracing::Dispatch;
use tracing_subscriber::fmt::{self, time::ChronoLocal};
use tracing_subscriber::layer::SubscriberExt;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Clone)]
pub struct Reporter {
    dispatch: Dispatch,
}

impl std::fmt::Debug for Reporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reporter").finish_non_exhaustive()
    }
}

impl Reporter {
    /// Creates a reporter logging to stdout and appending to `log_file`
    ///
    /// Missing parent directories of the log file are created.
    pub fn new(log_file: &Path, verbose: bool) -> Result<Self> {
        if let Some(parent) = log_file.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create log directory {}", parent.display())
            })?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_file)
            .with_context(|| format!("failed to open log file {}", log_file.display()))?;

        let level = if verbose {
            LevelFilter::DEBUG
        } else {
            LevelFilter::INFO
        };
        let timer = ChronoLocal::new(TIMESTAMP_FORMAT.to_string());

        let subscriber = tracing_subscriber::registry()
            .with(level)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_timer(timer.clone())
                    .with_writer(std::io::stdout),
            )
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_ansi(false)
                    .with_timer(timer)
                    .with_writer(Mutex::new(file)),
            );

        Ok(Self {
            dispatch: Dispatch::new(subscriber),
        })
    }

    /// A reporter that discards everything
    pub fn silent() -> Self {
        Self {
            dispatch: Dispatch::none(),
        }
    }

    pub fn debug(&self, message: impl Display) {
        tracing::dispatcher::with_default(&self.dispatch, || tracing::debug!("{message}"));
    }

    pub fn info(&self, message: impl Display) {
        tracing::dispatcher::with_default(&self.dispatch, || tracing::info!("{message}"));
    }

    pub fn warn(&self, message: impl Display) {
        tracing::dispatcher::with_default(&self.dispatch, || tracing::warn!("{message}"));
    }

    pub fn error(&self, message: impl Display) {
        tracing::dispatcher::with_default(&self.dispatch, || tracing::error!("{message}"));
    }
}
