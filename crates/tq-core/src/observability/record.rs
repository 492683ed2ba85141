//! Log record shapes: message producers, source tags, pushed records.

use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value};

use super::Severity;

/// Message text, given up front or produced on demand.
///
/// A lazy producer runs only if the record is going to be written or pushed.
pub enum Message {
    Text(String),
    Lazy(Box<dyn FnOnce() -> String + Send>),
}

impl Message {
    pub fn lazy(f: impl FnOnce() -> String + Send + 'static) -> Self {
        Message::Lazy(Box::new(f))
    }

    pub fn resolve(self) -> String {
        match self {
            Message::Text(s) => s,
            Message::Lazy(f) => f(),
        }
    }
}

impl From<&str> for Message {
    fn from(s: &str) -> Self {
        Message::Text(s.to_string())
    }
}

impl From<String> for Message {
    fn from(s: String) -> Self {
        Message::Text(s)
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Message::Text(s) => f.debug_tuple("Text").field(s).finish(),
            Message::Lazy(_) => f.write_str("Lazy(..)"),
        }
    }
}

/// Who emitted a record.
///
/// A plain name replaces the logger's default progname; a field map is
/// merged over `{ "progname": <default> }`, so it can add fields (ids,
/// hostnames) and optionally override the progname too.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Source {
    #[default]
    Default,
    Name(String),
    Fields(Map<String, Value>),
}

impl Source {
    /// Resolve against the logger's default progname into the field map that
    /// leads every pushed record.
    pub fn into_fields(self, default_progname: Option<&str>) -> Map<String, Value> {
        let default = default_progname.map_or(Value::Null, |p| Value::String(p.to_string()));
        let mut fields = Map::new();
        match self {
            Source::Default => {
                fields.insert("progname".into(), default);
            }
            Source::Name(name) => {
                fields.insert("progname".into(), Value::String(name));
            }
            Source::Fields(extra) => {
                fields.insert("progname".into(), default);
                fields.extend(extra);
            }
        }
        fields
    }
}

impl From<&str> for Source {
    fn from(s: &str) -> Self {
        Source::Name(s.to_string())
    }
}

impl From<String> for Source {
    fn from(s: String) -> Self {
        Source::Name(s)
    }
}

impl From<Map<String, Value>> for Source {
    fn from(fields: Map<String, Value>) -> Self {
        Source::Fields(fields)
    }
}

impl From<Option<&str>> for Source {
    fn from(name: Option<&str>) -> Self {
        name.map_or(Source::Default, Source::from)
    }
}

/// A record as pushed onto the log queue. Built per call, never stored.
#[derive(Debug, Clone, PartialEq)]
pub struct LogRecord {
    pub time: DateTime<Utc>,
    pub severity: Severity,
    pub message: String,
    pub source: Map<String, Value>,
    pub context: Option<Value>,
}

impl LogRecord {
    pub fn progname(&self) -> Option<&str> {
        self.source.get("progname").and_then(Value::as_str)
    }

    /// Flat JSON object: source fields first, then the fixed record fields
    /// (which win on key collisions).
    pub fn to_payload(&self) -> Value {
        let mut out = self.source.clone();
        out.insert(
            "time".into(),
            Value::String(self.time.to_rfc3339_opts(SecondsFormat::Secs, true)),
        );
        out.insert("timestamp".into(), Value::from(self.time.timestamp()));
        out.insert("level".into(), Value::from(self.severity.level()));
        out.insert("label".into(), Value::from(self.severity.label()));
        out.insert("message".into(), Value::String(self.message.clone()));
        out.insert("context".into(), self.context.clone().unwrap_or(Value::Null));
        Value::Object(out)
    }
}
