//! QueueLogger - a logger that also mirrors records into a task queue.
//!
//! Every record goes to the local sink (subject to the sink's own level).
//! Records at or above the push threshold are additionally pushed onto the
//! backing queue, tagged with the lower-case severity label, so aggregators
//! can lease by tag without decoding payloads.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use serde_json::Value;

use super::{LogRecord, LogSink, Message, Severity, SinkEntry, Source, TracingSink};
use crate::error::TqError;
use crate::ports::{SharedClock, SystemClock};
use crate::queue::Queue;

pub struct QueueLogger {
    queue: Queue,
    sink: Arc<dyn LogSink>,
    threshold: AtomicU8,
    progname: RwLock<Option<String>>,
    clock: SharedClock,
}

impl QueueLogger {
    /// Logger over `queue` with a tracing sink and a WARN push threshold.
    pub fn new(queue: Queue) -> Self {
        Self {
            queue,
            sink: Arc::new(TracingSink),
            threshold: AtomicU8::new(Severity::default().level()),
            progname: RwLock::new(None),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_level(self, threshold: Severity) -> Self {
        self.set_level(threshold);
        self
    }

    pub fn with_progname(self, progname: impl Into<String>) -> Self {
        self.set_progname(Some(progname.into()));
        self
    }

    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    pub fn queue(&self) -> &Queue {
        &self.queue
    }

    /// Push threshold.
    pub fn level(&self) -> Severity {
        Severity::from_level(self.threshold.load(Ordering::Relaxed)).unwrap_or_default()
    }

    pub fn set_level(&self, threshold: Severity) {
        self.threshold.store(threshold.level(), Ordering::Relaxed);
    }

    pub fn progname(&self) -> Option<String> {
        self.progname
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set_progname(&self, progname: Option<String>) {
        *self.progname.write().unwrap_or_else(PoisonError::into_inner) = progname;
    }

    /// Log one record.
    ///
    /// The sink write and the queue push are both attempted; a push failure is
    /// returned first, then a sink failure. `context` only travels with the
    /// pushed record.
    pub async fn add(
        &self,
        severity: Severity,
        message: impl Into<Message>,
        source: impl Into<Source>,
        context: Option<Value>,
    ) -> Result<(), TqError> {
        self.emit(severity, message.into(), source.into(), context).await
    }

    pub async fn debug(
        &self,
        message: impl Into<Message>,
        source: impl Into<Source>,
        context: Option<Value>,
    ) -> Result<(), TqError> {
        self.add(Severity::Debug, message, source, context).await
    }

    pub async fn info(
        &self,
        message: impl Into<Message>,
        source: impl Into<Source>,
        context: Option<Value>,
    ) -> Result<(), TqError> {
        self.add(Severity::Info, message, source, context).await
    }

    pub async fn warn(
        &self,
        message: impl Into<Message>,
        source: impl Into<Source>,
        context: Option<Value>,
    ) -> Result<(), TqError> {
        self.add(Severity::Warn, message, source, context).await
    }

    pub async fn error(
        &self,
        message: impl Into<Message>,
        source: impl Into<Source>,
        context: Option<Value>,
    ) -> Result<(), TqError> {
        self.add(Severity::Error, message, source, context).await
    }

    pub async fn fatal(
        &self,
        message: impl Into<Message>,
        source: impl Into<Source>,
        context: Option<Value>,
    ) -> Result<(), TqError> {
        self.add(Severity::Fatal, message, source, context).await
    }

    pub async fn unknown(
        &self,
        message: impl Into<Message>,
        source: impl Into<Source>,
        context: Option<Value>,
    ) -> Result<(), TqError> {
        self.add(Severity::Unknown, message, source, context).await
    }

    async fn emit(
        &self,
        severity: Severity,
        message: Message,
        source: Source,
        context: Option<Value>,
    ) -> Result<(), TqError> {
        let time = self.clock.now();
        let local = self.sink.enabled(severity);
        let push = severity >= self.level();
        if !local && !push {
            return Ok(());
        }

        let record = LogRecord {
            time,
            severity,
            message: message.resolve(),
            source: source.into_fields(self.progname().as_deref()),
            context,
        };

        let written = if local {
            self.sink.write(&SinkEntry {
                time,
                severity,
                progname: record.progname(),
                message: &record.message,
            })
        } else {
            Ok(())
        };

        if push {
            self.queue
                .push(&record.to_payload(), Some(severity.tag()))
                .await?;
        }
        written.map_err(TqError::from)
    }
}
