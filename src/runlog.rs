//! Append-only run log.
//!
//! One line per event: `[timestamp][functionName][LEVEL]message`. Lines are
//! flushed as they are written so an aborted run still leaves a usable log
//! for the aggregate failure message to point at.

use crate::errors::{EngineError, EngineResult};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Event severity tags, matching the on-disk format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Verbose,
    Error,
    Warning,
    Stdout,
}

impl LogLevel {
    fn as_str(self) -> &'static str {
        match self {
            LogLevel::Verbose => "VERBOSE",
            LogLevel::Error => "ERROR",
            LogLevel::Warning => "WARNING",
            LogLevel::Stdout => "STDOUT",
        }
    }
}

/// File-backed sink for one workflow run.
pub struct RunLog {
    path: PathBuf,
    file: File,
    echo: bool,
}

impl RunLog {
    /// Create `<log_dir>/run-<epoch-ms>.log`, creating the directory as
    /// needed. With `echo` set, lines are mirrored to stderr.
    pub fn create(log_dir: &Path, run_id: &str, echo: bool) -> EngineResult<Self> {
        fs::create_dir_all(log_dir)
            .map_err(|err| EngineError::input(format!("create {}: {err}", log_dir.display())))?;
        let path = log_dir.join(format!("run-{run_id}.log"));
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|err| EngineError::input(format!("open {}: {err}", path.display())))?;
        Ok(RunLog { path, file, echo })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one event line. Logging is best effort: a write failure is
    /// reported to stderr once per call, never escalated.
    pub fn line(&mut self, function: &str, level: LogLevel, message: &str) {
        let stamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
        let rendered = format!("[{stamp}][{function}][{}]{message}", level.as_str());
        if self.echo {
            eprintln!("{rendered}");
        }
        if let Err(err) = writeln!(self.file, "{rendered}").and_then(|_| self.file.flush()) {
            eprintln!("warning: failed to write {}: {err}", self.path.display());
        }
    }
}
