//! Local log sinks: where a record goes besides the log queue.

use std::io::{self, Write};
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, SecondsFormat, Utc};

use super::Severity;

/// One record as seen by a local sink.
#[derive(Debug, Clone, Copy)]
pub struct SinkEntry<'a> {
    pub time: DateTime<Utc>,
    pub severity: Severity,
    pub progname: Option<&'a str>,
    pub message: &'a str,
}

/// Conventional, process-local log destination.
pub trait LogSink: Send + Sync {
    /// Would a record at `severity` be written?
    fn enabled(&self, severity: Severity) -> bool;

    fn write(&self, entry: &SinkEntry<'_>) -> io::Result<()>;
}

/// Forwards records into `tracing`; the installed subscriber decides.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn enabled(&self, severity: Severity) -> bool {
        match severity {
            Severity::Debug => tracing::enabled!(tracing::Level::DEBUG),
            Severity::Info => tracing::enabled!(tracing::Level::INFO),
            Severity::Warn => tracing::enabled!(tracing::Level::WARN),
            Severity::Error | Severity::Fatal | Severity::Unknown => {
                tracing::enabled!(tracing::Level::ERROR)
            }
        }
    }

    fn write(&self, entry: &SinkEntry<'_>) -> io::Result<()> {
        let progname = entry.progname.unwrap_or("");
        let message = entry.message;
        match entry.severity {
            Severity::Debug => tracing::debug!(progname, "{message}"),
            Severity::Info => tracing::info!(progname, "{message}"),
            Severity::Warn => tracing::warn!(progname, "{message}"),
            sev @ (Severity::Error | Severity::Fatal | Severity::Unknown) => {
                tracing::error!(progname, label = sev.label(), "{message}")
            }
        }
        Ok(())
    }
}

/// Line-oriented writer (stderr, a file, ...) with its own minimum level.
///
/// Line format: `W, [2024-06-01T12:00:00.000000Z #4242]  WARN -- prog: message`
pub struct WriterSink {
    out: Mutex<Box<dyn Write + Send>>,
    min_level: Severity,
}

impl WriterSink {
    pub fn new(out: Box<dyn Write + Send>, min_level: Severity) -> Self {
        Self {
            out: Mutex::new(out),
            min_level,
        }
    }

    pub fn stderr(min_level: Severity) -> Self {
        Self::new(Box::new(io::stderr()), min_level)
    }
}

pub(crate) fn format_line(entry: &SinkEntry<'_>, pid: u32) -> String {
    let initial = entry.severity.label().chars().next().unwrap_or('A');
    format!(
        "{initial}, [{time} #{pid}] {label:>5} -- {progname}: {message}\n",
        time = entry.time.to_rfc3339_opts(SecondsFormat::Micros, true),
        label = entry.severity.label(),
        progname = entry.progname.unwrap_or(""),
        message = entry.message,
    )
}

impl LogSink for WriterSink {
    fn enabled(&self, severity: Severity) -> bool {
        severity >= self.min_level
    }

    fn write(&self, entry: &SinkEntry<'_>) -> io::Result<()> {
        let line = format_line(entry, std::process::id());
        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        out.write_all(line.as_bytes())?;
        out.flush()
    }
}

/// A captured sink line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedLine {
    pub severity: Severity,
    pub progname: Option<String>,
    pub message: String,
}

/// Keeps written records in memory. Handy in tests and for embedding.
#[derive(Debug, Default)]
pub struct MemorySink {
    lines: Mutex<Vec<CapturedLine>>,
    min_level: Severity,
}

impl MemorySink {
    pub fn new(min_level: Severity) -> Self {
        Self {
            lines: Mutex::new(Vec::new()),
            min_level,
        }
    }

    pub fn lines(&self) -> Vec<CapturedLine> {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl LogSink for MemorySink {
    fn enabled(&self, severity: Severity) -> bool {
        severity >= self.min_level
    }

    fn write(&self, entry: &SinkEntry<'_>) -> io::Result<()> {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(CapturedLine {
                severity: entry.severity,
                progname: entry.progname.map(str::to_owned),
                message: entry.message.to_owned(),
            });
        Ok(())
    }
}
