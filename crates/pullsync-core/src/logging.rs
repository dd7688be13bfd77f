//! Logging init: append to a file under the XDG state dir, or fall back to stderr.

use anyhow::{Context, Result};
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::PathBuf;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info,pullsync=debug,pullsync_core=debug";

/// `~/.local/state/pullsync/pullsync.log` (not created).
pub fn log_file_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("pullsync")?;
    Ok(xdg_dirs.get_state_home().join("pullsync.log"))
}

/// `RUST_LOG` when set, otherwise the default filter (or `debug` everywhere when verbose).
fn env_filter(verbose: bool) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter(verbose))
}

fn default_filter(verbose: bool) -> EnvFilter {
    EnvFilter::new(if verbose { "debug" } else { DEFAULT_FILTER })
}

/// Hands each event a clone of the log file handle; a failed clone writes to stderr.
struct LogFile(File);

enum LogWriter {
    File(File),
    Stderr(io::Stderr),
}

impl Write for LogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            LogWriter::File(f) => f.write(buf),
            LogWriter::Stderr(e) => e.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            LogWriter::File(f) => f.flush(),
            LogWriter::Stderr(e) => e.flush(),
        }
    }
}

impl<'a> MakeWriter<'a> for LogFile {
    type Writer = LogWriter;

    fn make_writer(&'a self) -> Self::Writer {
        match self.0.try_clone() {
            Ok(f) => LogWriter::File(f),
            Err(_) => LogWriter::Stderr(io::stderr()),
        }
    }
}

/// Install the file subscriber. Returns the log path; on error the caller
/// should fall back to [`init_logging_stderr`].
pub fn init_logging(verbose: bool) -> Result<PathBuf> {
    let path = log_file_path()?;
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
    }
    let file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("open {}", path.display()))?;

    tracing_subscriber::fmt()
        .with_env_filter(env_filter(verbose))
        .with_writer(LogFile(file))
        .with_ansi(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!("install log subscriber: {}", e))?;

    tracing::info!("pullsync logging initialized at {}", path.display());
    Ok(path)
}

/// Stderr-only logging for when the log file cannot be used.
pub fn init_logging_stderr(verbose: bool) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter(verbose))
        .with_writer(io::stderr)
        .with_ansi(false)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_file_lives_under_pullsync_state_dir() {
        let path = log_file_path().unwrap();
        assert_eq!(path.file_name().unwrap(), "pullsync.log");
        assert!(path.parent().unwrap().ends_with("pullsync"));
    }

    fn directives(filter: EnvFilter) -> Vec<String> {
        let mut parts: Vec<String> = filter.to_string().split(',').map(str::to_string).collect();
        parts.sort();
        parts
    }

    #[test]
    fn default_filter_levels() {
        // EnvFilter prints directives most specific first.
        let mut expected: Vec<String> = DEFAULT_FILTER.split(',').map(str::to_string).collect();
        expected.sort();
        assert_eq!(directives(default_filter(false)), expected);
        assert_eq!(directives(default_filter(true)), ["debug"]);
    }
}
