//! File-backed `tracing` setup.
//!
//! The terminal belongs to the interview, so log lines go to
//! `<config_dir>/prepf.log`. `PREPF_LOG` takes `EnvFilter` directives
//! (for example `prepf=debug,gemini_api=trace`); without it the level comes
//! from `--verbose`/`--quiet` and defaults to `info`.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use thiserror::Error;
use tracing_subscriber::EnvFilter;

pub const LOG_ENV_VAR: &str = "PREPF_LOG";
pub const LOG_FILE_NAME: &str = "prepf.log";

/// Default log level when `PREPF_LOG` is unset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Verbosity {
    Quiet,
    #[default]
    Normal,
    Verbose,
}

impl Verbosity {
    pub fn from_flags(verbose: bool, quiet: bool) -> Self {
        match (verbose, quiet) {
            (true, _) => Self::Verbose,
            (false, true) => Self::Quiet,
            (false, false) => Self::Normal,
        }
    }

    fn directive(self) -> &'static str {
        match self {
            Self::Quiet => "warn",
            Self::Normal => "info",
            Self::Verbose => "debug",
        }
    }
}

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("failed to open log file {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to install tracing subscriber: {0}")]
    Install(String),
}

/// Installs the global subscriber. Returns the log file path.
pub fn init(config_dir: &Path, verbosity: Verbosity) -> Result<PathBuf, LoggingError> {
    let (path, file) = open_log_file(config_dir)?;

    tracing_subscriber::fmt()
        .with_env_filter(env_filter(verbosity))
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_target(true)
        .try_init()
        .map_err(|error| LoggingError::Install(error.to_string()))?;

    tracing::debug!(path = %path.display(), "logging initialized");
    Ok(path)
}

fn env_filter(verbosity: Verbosity) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV_VAR).unwrap_or_else(|_| EnvFilter::new(verbosity.directive()))
}

fn open_log_file(config_dir: &Path) -> Result<(PathBuf, File), LoggingError> {
    let path = config_dir.join(LOG_FILE_NAME);
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(|source| LoggingError::Open {
            path: path.clone(),
            source,
        })?;
    Ok((path, file))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_file_is_created_under_config_dir_and_appended() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (path, _) = open_log_file(dir.path()).expect("log file opens");
        assert_eq!(path, dir.path().join(LOG_FILE_NAME));
        std::fs::write(&path, "first\n").expect("seed log");

        let (_, mut file) = open_log_file(dir.path()).expect("log file reopens");
        io::Write::write_all(&mut file, b"second\n").expect("append");
        assert_eq!(
            std::fs::read_to_string(&path).expect("read log"),
            "first\nsecond\n"
        );
    }

    #[test]
    fn verbose_wins_over_quiet() {
        assert_eq!(Verbosity::from_flags(false, false).directive(), "info");
        assert_eq!(Verbosity::from_flags(false, true).directive(), "warn");
        assert_eq!(Verbosity::from_flags(true, true), Verbosity::Verbose);
        assert_eq!(Verbosity::Verbose.directive(), "debug");
    }

    #[test]
    fn missing_directory_is_reported() {
        let dir = tempfile::tempdir().expect("tempdir");
        let error = open_log_file(&dir.path().join("missing")).expect_err("no directory");
        assert!(error.to_string().starts_with("failed to open log file"));
    }
}
