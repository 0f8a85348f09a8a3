//! Audit log sinks.
//!
//! The relay records every step it takes through a [`LogSink`]. Sinks are
//! best-effort: callers discard their errors, so a broken sink never changes
//! what the relay does.

use crate::error::Result;
use chrono::{DateTime, Utc};
use log::*;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

pub trait LogSink: Send + Sync {
    fn append(&self, line: &str) -> Result<()>;
}

/// Forwards audit lines to the `log` facade under the `audit` target.
#[derive(Debug, Default)]
pub struct ConsoleLogSink;

impl LogSink for ConsoleLogSink {
    fn append(&self, line: &str) -> Result<()> {
        info!(target: "audit", "{line}");
        Ok(())
    }
}

/// Appends timestamped lines to `<root>/logs/YYYY/MM/DD/log.txt`.
///
/// Writes are synchronous `std::fs` calls made on the caller's thread. The
/// current day's file stays open between appends, so directories are created
/// and a file opened only when the date changes.
pub struct FileLogSink {
    root: PathBuf,
    // Serializes appends so lines from concurrent events never interleave.
    current: Mutex<Option<OpenLog>>,
}

struct OpenLog {
    path: PathBuf,
    file: File,
}

impl FileLogSink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            current: Mutex::new(None),
        }
    }

    /// Path of the log file that holds lines written at `at`.
    pub fn path_for(&self, at: DateTime<Utc>) -> PathBuf {
        self.root
            .join("logs")
            .join(at.format("%Y").to_string())
            .join(at.format("%m").to_string())
            .join(at.format("%d").to_string())
            .join("log.txt")
    }

    fn format_line(at: DateTime<Utc>, line: &str) -> String {
        format!("{} - {}\n", at.format("%Y-%m-%dT%H:%M:%SZ"), line)
    }

    fn open(path: PathBuf) -> Result<OpenLog> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        debug!("Opened audit log {}", path.display());
        Ok(OpenLog { path, file })
    }

    fn append_at(&self, at: DateTime<Utc>, line: &str) -> Result<()> {
        let path = self.path_for(at);
        let mut current = self
            .current
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let log = match current.take() {
            Some(log) if log.path == path => log,
            _ => Self::open(path)?,
        };
        let log = current.insert(log);
        log.file.write_all(Self::format_line(at, line).as_bytes())?;
        Ok(())
    }
}

impl LogSink for FileLogSink {
    fn append(&self, line: &str) -> Result<()> {
        self.append_at(Utc::now(), line)
    }
}

/// Keeps every line in memory. Intended for tests and diagnostics.
#[derive(Debug, Default)]
pub struct MemoryLogSink {
    lines: Mutex<Vec<String>>,
}

impl MemoryLogSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .map(|lines| lines.clone())
            .unwrap_or_default()
    }

    pub fn contains(&self, fragment: &str) -> bool {
        self.lines().iter().any(|line| line.contains(fragment))
    }
}

impl LogSink for MemoryLogSink {
    fn append(&self, line: &str) -> Result<()> {
        self.lines
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(line.to_string());
        Ok(())
    }
}

/// Record a line, discarding any sink failure.
pub fn record(sink: &dyn LogSink, line: &str) {
    if let Err(e) = sink.append(line) {
        warn!("Failed to write audit log line: {e}");
    }
}
