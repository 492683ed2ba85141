//! Task - snapshot of one leased (or freshly pushed) work item.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::{LeaseState, Queue};
use crate::domain::TaskId;
use crate::error::TqError;
use crate::ports::{RawTask, SharedClock, SystemClock, TaskRef};

/// Immutable view of a task as last reported by the queue service.
///
/// Only `Queue` builds these (from lease, push and extend results). A task
/// keeps a handle to the queue it came from so `finish`/`extend` can be
/// called on the task itself.
///
/// `extend` returns a *new* snapshot with the updated deadline; the old one
/// is marked superseded and refuses further use.
pub struct Task {
    id: TaskId,
    expires: DateTime<Utc>,
    tries: u32,
    tag: Option<String>,
    payload: Value,
    queue: Queue,
    clock: SharedClock,
    state: Mutex<LeaseState>,
}

impl Task {
    pub(crate) fn from_raw(queue: Queue, raw: RawTask, payload: Value, state: LeaseState) -> Self {
        Self {
            id: raw.name,
            expires: raw.schedule_time,
            tries: raw.tries,
            tag: raw.tag,
            payload,
            queue,
            clock: default_clock(),
            state: Mutex::new(state),
        }
    }

    pub fn id(&self) -> &TaskId {
        &self.id
    }

    /// Lease deadline most recently reported by the service.
    pub fn expires(&self) -> DateTime<Utc> {
        self.expires
    }

    /// Number of earlier leases of this task (0 on first delivery).
    pub fn tries(&self) -> u32 {
        self.tries
    }

    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }

    pub fn payload_as<T: DeserializeOwned>(&self) -> Result<T, TqError> {
        Ok(serde_json::from_value(self.payload.clone())?)
    }

    pub fn queue(&self) -> &Queue {
        &self.queue
    }

    pub fn state(&self) -> LeaseState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn set_state(&self, state: LeaseState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }

    pub(crate) fn task_ref(&self) -> TaskRef {
        TaskRef {
            name: self.id.clone(),
            schedule_time: self.expires,
        }
    }

    /// `expires - now`; negative once the lease has lapsed.
    pub fn lease_remaining(&self) -> TimeDelta {
        self.expires - self.clock.now()
    }

    pub fn lease_expired(&self) -> bool {
        self.expires < self.clock.now()
    }

    /// May this task be attempted again under its queue's `max_tries`?
    ///
    /// Nothing in this crate acts on the answer; workers use it to decide
    /// whether to dead-letter instead of processing.
    pub fn try_eligible(&self) -> bool {
        let options = self.queue.options();
        options.unlimited_tries() || i64::from(self.tries) < i64::from(options.max_tries)
    }

    /// Acknowledge this task on its queue. Errors from the service propagate.
    pub async fn finish(&self) -> Result<(), TqError> {
        self.queue.finish(self).await
    }

    /// Ask the service to make the remaining lease exactly `duration`.
    pub async fn extend(&self, duration: Duration) -> Result<Task, TqError> {
        let mut renewed = self.queue.extend(self, Some(duration)).await?;
        renewed.clock = Arc::clone(&self.clock);
        Ok(renewed)
    }

    /// Bind a clock to this snapshot only.
    pub fn set_clock(&mut self, clock: SharedClock) {
        self.clock = clock;
    }

    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.set_clock(clock);
        self
    }

    pub fn reset_clock(&mut self) {
        self.clock = default_clock();
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("expires", &self.expires)
            .field("tries", &self.tries)
            .field("tag", &self.tag)
            .field("queue", &self.queue.spec().name)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

fn default_clock() -> SharedClock {
    Arc::new(SystemClock)
}
