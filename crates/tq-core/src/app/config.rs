//! Application configuration, loaded from a JSON document.
//!
//! ```json
//! {
//!   "project": "my-project",
//!   "location": "us-central1",
//!   "stdin":  { "name": "work", "max_tasks": 10, "lease_duration": "30s" },
//!   "stdout": "results",
//!   "stderr": "errors",
//!   "concurrency": 4,
//!   "env": { "greeting": "hello" },
//!   "log": { "level": "info", "queue": "logs", "queue_level": "warn" }
//! }
//! ```

use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::domain::{QueueConfig, QueueSpec};
use crate::error::TqError;
use crate::observability::{QueueLogger, Severity};
use crate::ports::TaskQueueRpc;
use crate::queue::Queue;

pub const DEFAULT_CONCURRENCY: usize = 2;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    #[serde(default)]
    pub project: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub stdin: Option<QueueConfig>,
    #[serde(default)]
    pub stdout: Option<QueueConfig>,
    #[serde(default)]
    pub stderr: Option<QueueConfig>,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default)]
    pub env: Map<String, Value>,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LogConfig {
    /// Local filter directive (`"info"`, `"tq_core=debug"`, ...).
    #[serde(default)]
    pub level: Option<String>,
    /// Push threshold of the queue-backed logger.
    #[serde(default)]
    pub queue_level: Severity,
    /// Log queue; no queue-backed logger is built without one.
    #[serde(default)]
    pub queue: Option<QueueConfig>,
    #[serde(default)]
    pub progname: Option<String>,
}

fn default_concurrency() -> usize {
    DEFAULT_CONCURRENCY
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            project: String::new(),
            location: String::new(),
            stdin: None,
            stdout: None,
            stderr: None,
            concurrency: DEFAULT_CONCURRENCY,
            env: Map::new(),
            log: LogConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn from_json_str(text: &str) -> Result<Self, TqError> {
        let config: AppConfig =
            serde_json::from_str(text).map_err(|e| TqError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, TqError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| TqError::Config(format!("cannot read {}: {e}", path.display())))?;
        Self::from_json_str(&text)
    }

    pub fn validate(&self) -> Result<(), TqError> {
        if self.concurrency == 0 {
            return Err(TqError::Config("concurrency must be at least 1".into()));
        }
        if self.stdin.is_none() {
            return Err(TqError::Config("an input queue (`stdin`) is required".into()));
        }
        Ok(())
    }

    /// Root queue every role queue is derived from. Its name is empty until
    /// a role config supplies one.
    pub fn base_queue(&self, client: Arc<dyn TaskQueueRpc>) -> Queue {
        Queue::new(
            client,
            QueueSpec::new(self.project.clone(), self.location.clone(), ""),
        )
    }

    /// Queue-backed logger over `log.queue`, if configured.
    pub fn logger(&self, base: &Queue) -> Option<QueueLogger> {
        let queue = base.with_config(self.log.queue.as_ref()?);
        let logger = QueueLogger::new(queue).with_level(self.log.queue_level);
        Some(match &self.log.progname {
            Some(progname) => logger.with_progname(progname.clone()),
            None => logger,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::impls::InMemoryTaskQueue;
    use serde_json::json;
    use std::time::Duration;

    #[test]
    fn full_document_parses() {
        let config = AppConfig::from_json_str(
            r#"{
                "project": "p",
                "location": "l",
                "stdin": {"name": "work", "max_tasks": 10, "lease_duration": "30s"},
                "stdout": "results",
                "concurrency": 4,
                "env": {"greeting": "hello"},
                "log": {"level": "debug", "queue": "logs", "queue_level": "error"}
            }"#,
        )
        .unwrap();

        let stdin = config.stdin.as_ref().unwrap();
        assert_eq!(stdin.name.as_deref(), Some("work"));
        assert_eq!(stdin.max_tasks, Some(10));
        assert_eq!(stdin.lease_duration, Some(Duration::from_secs(30)));
        assert_eq!(config.stdout, Some(QueueConfig::named("results")));
        assert_eq!(config.stderr, None);
        assert_eq!(config.concurrency, 4);
        assert_eq!(config.env.get("greeting"), Some(&json!("hello")));
        assert_eq!(config.log.level.as_deref(), Some("debug"));
        assert_eq!(config.log.queue_level, Severity::Error);
    }

    #[test]
    fn defaults_apply() {
        let config = AppConfig::from_json_str(r#"{"stdin": "work"}"#).unwrap();
        assert_eq!(config.concurrency, DEFAULT_CONCURRENCY);
        assert!(config.env.is_empty());
        assert_eq!(config.log, LogConfig::default());
        assert_eq!(config.log.queue_level, Severity::Warn);
    }

    #[test]
    fn rejects_bad_documents() {
        for text in [
            r#"{}"#,
            r#"{"stdin": "work", "concurrency": 0}"#,
            r#"{"stdin": "work", "unknown": 1}"#,
            r#"{"stdin": {"lease_duration": "soon"}}"#,
            r#"{"stdin": {"lease_duration": "1e30s"}}"#,
            r#"not json"#,
        ] {
            let err = AppConfig::from_json_str(text).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Config, "{text}");
        }
    }

    #[test]
    fn load_reports_missing_file() {
        let err = AppConfig::load("/definitely/not/here.json").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
    }

    #[test]
    fn logger_is_built_only_with_a_log_queue() {
        let base = AppConfig::default().base_queue(Arc::new(InMemoryTaskQueue::new()));
        assert!(AppConfig::default().logger(&base).is_none());

        let config = AppConfig::from_json_str(
            r#"{"project": "p", "stdin": "work",
                "log": {"queue": "logs", "queue_level": "info", "progname": "tq"}}"#,
        )
        .unwrap();
        let base = config.base_queue(Arc::new(InMemoryTaskQueue::new()));
        let logger = config.logger(&base).unwrap();

        assert_eq!(logger.queue().spec(), &QueueSpec::new("p", "", "logs"));
        assert_eq!(logger.level(), Severity::Info);
        assert_eq!(logger.progname().as_deref(), Some("tq"));
    }
}
