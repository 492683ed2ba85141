//! Queue identity and lease options.
//!
//! `QueueSpec` + `QueueOptions` are plain values; a `Queue` carries both and
//! derives new queues by replacing them. `QueueConfig` is the partial,
//! deserializable form used by config files: every field is optional and
//! missing fields inherit from whatever queue it is applied to.

use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize};

/// `max_tries` value meaning "no limit".
pub const UNLIMITED_TRIES: i32 = -1;

/// Identity of a remote queue: (project, location, name).
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueueSpec {
    pub project: String,
    pub location: String,
    pub name: String,
}

impl QueueSpec {
    pub fn new(
        project: impl Into<String>,
        location: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            project: project.into(),
            location: location.into(),
            name: name.into(),
        }
    }

    /// Fully-qualified resource path used on the wire.
    pub fn queue_path(&self) -> String {
        format!(
            "projects/{}/locations/{}/queues/{}",
            self.project, self.location, self.name
        )
    }
}

/// Lease behaviour for one queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueOptions {
    /// Lease granted per leased task.
    pub lease_duration: Duration,

    /// Upper bound on tasks returned by one lease call.
    pub max_tasks: u32,

    /// Deliveries allowed before a task should be dead-lettered.
    /// Any negative value (conventionally [`UNLIMITED_TRIES`]) means no limit.
    pub max_tries: i32,
}

impl Default for QueueOptions {
    fn default() -> Self {
        Self {
            lease_duration: Duration::from_secs(60),
            max_tasks: 1,
            max_tries: UNLIMITED_TRIES,
        }
    }
}

impl QueueOptions {
    pub fn with_lease_duration(mut self, lease_duration: Duration) -> Self {
        self.lease_duration = lease_duration;
        self
    }

    pub fn with_max_tasks(mut self, max_tasks: u32) -> Self {
        self.max_tasks = max_tasks;
        self
    }

    pub fn with_max_tries(mut self, max_tries: i32) -> Self {
        self.max_tries = max_tries;
        self
    }

    pub fn unlimited_tries(&self) -> bool {
        self.max_tries < 0
    }
}

/// Partial queue configuration as it appears in config files.
///
/// Accepts either a full object or a bare string, which is shorthand for
/// `{ "name": "<string>" }`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueConfig {
    pub project: Option<String>,
    pub location: Option<String>,
    pub name: Option<String>,
    pub lease_duration: Option<Duration>,
    pub max_tasks: Option<u32>,
    pub max_tries: Option<i32>,
}

impl QueueConfig {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Default::default()
        }
    }

    /// Overlay this config on a base spec/options pair.
    pub fn apply(&self, spec: &QueueSpec, options: &QueueOptions) -> (QueueSpec, QueueOptions) {
        let spec = QueueSpec {
            project: self.project.clone().unwrap_or_else(|| spec.project.clone()),
            location: self.location.clone().unwrap_or_else(|| spec.location.clone()),
            name: self.name.clone().unwrap_or_else(|| spec.name.clone()),
        };
        let options = QueueOptions {
            lease_duration: self.lease_duration.unwrap_or(options.lease_duration),
            max_tasks: self.max_tasks.unwrap_or(options.max_tasks),
            max_tries: self.max_tries.unwrap_or(options.max_tries),
        };
        (spec, options)
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct QueueConfigFields {
    #[serde(default)]
    project: Option<String>,
    #[serde(default)]
    location: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default, deserialize_with = "deserialize_lease_duration")]
    lease_duration: Option<Duration>,
    #[serde(default)]
    max_tasks: Option<u32>,
    #[serde(default)]
    max_tries: Option<i32>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum QueueConfigRepr {
    Name(String),
    Fields(QueueConfigFields),
}

impl<'de> Deserialize<'de> for QueueConfig {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match QueueConfigRepr::deserialize(deserializer)? {
            QueueConfigRepr::Name(name) => QueueConfig::named(name),
            QueueConfigRepr::Fields(f) => QueueConfig {
                project: f.project,
                location: f.location,
                name: f.name,
                lease_duration: f.lease_duration,
                max_tasks: f.max_tasks,
                max_tries: f.max_tries,
            },
        })
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum DurationRepr {
    Seconds(u64),
    Text(String),
}

/// Lease durations are written either as integer seconds or as `"60s"` /
/// `"1.5s"` (the JSON form of a protobuf Duration).
fn deserialize_lease_duration<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<Duration>, D::Error> {
    let repr = Option::<DurationRepr>::deserialize(deserializer)?;
    match repr {
        None => Ok(None),
        Some(DurationRepr::Seconds(s)) => Ok(Some(Duration::from_secs(s))),
        Some(DurationRepr::Text(text)) => parse_duration(&text)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid duration: {text:?}"))),
    }
}

pub(crate) fn parse_duration(text: &str) -> Option<Duration> {
    let secs: f64 = text.trim().strip_suffix('s')?.parse().ok()?;
    Duration::try_from_secs_f64(secs).ok()
}
