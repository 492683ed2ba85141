//! Observability: severities, log records and the queue-backed logger.
//!
//! `QueueLogger` writes every record to a local [`LogSink`] and pushes the
//! ones at or above its threshold onto a log queue, where an aggregator can
//! lease them like any other task.

pub mod logger;
pub mod record;
pub mod severity;
pub mod sink;

pub use self::logger::QueueLogger;
pub use self::record::{LogRecord, Message, Source};
pub use self::severity::{ParseSeverityError, Severity};
pub use self::sink::{CapturedLine, LogSink, MemorySink, SinkEntry, TracingSink, WriterSink};
