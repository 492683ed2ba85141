//! TaskQueueRpc port - the remote pull-queue service.
//!
//! Implementations wrap an already-authorized session. Transport-level
//! retry/backoff belongs inside the implementation; errors that escape are
//! surfaced to callers as-is.
//!
//! # Implementations
//! - **InMemoryTaskQueue** (`impls`): tests, demos and the CLI
//! - HTTP/gRPC clients live outside this crate
//!
//! # Thread Safety
//! - One client is shared (`Arc<dyn TaskQueueRpc>`) by every queue derived
//!   from the same base and by every worker in a batch
//! - Calls may therefore arrive concurrently and must not assume ordering

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{QueueSpec, TaskId};
use crate::error::TqError;

/// Task descriptor as returned by the service.
///
/// `schedule_time` is the lease deadline for leased tasks and the earliest
/// lease time for tasks not currently leased. `payload` is still in wire
/// encoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawTask {
    pub name: TaskId,
    pub schedule_time: DateTime<Utc>,
    pub tries: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    pub payload: String,
}

impl RawTask {
    pub fn task_ref(&self) -> TaskRef {
        TaskRef {
            name: self.name.clone(),
            schedule_time: self.schedule_time,
        }
    }
}

/// Identifies one specific lease of a task.
///
/// The service matches `schedule_time` against the current lease, so a ref
/// taken before a renew (or before the lease lapsed and was re-granted) is
/// rejected.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskRef {
    pub name: TaskId,
    pub schedule_time: DateTime<Utc>,
}

/// Remote queue contract, scoped per call by a `QueueSpec` or `TaskRef`.
///
/// # Lease contract
/// - `lease` grants at most `max_tasks` tasks and never waits for new ones
/// - a granted task's `schedule_time` is its lease deadline
/// - `acknowledge` / `renew_lease` must fail for a ref whose lease is not the
///   current, unexpired one
/// - `renew_lease` sets the remaining lease; it does not add to it
#[async_trait]
pub trait TaskQueueRpc: Send + Sync {
    /// Lease up to `max_tasks` available tasks for `lease_duration` each.
    /// Returns immediately; an empty vector means nothing is available.
    async fn lease(
        &self,
        queue: &QueueSpec,
        lease_duration: Duration,
        max_tasks: u32,
    ) -> Result<Vec<RawTask>, TqError>;

    /// Create a pull task carrying an encoded payload.
    async fn create(
        &self,
        queue: &QueueSpec,
        payload: String,
        tag: Option<String>,
    ) -> Result<RawTask, TqError>;

    /// Acknowledge (delete) a leased task.
    async fn acknowledge(&self, task: &TaskRef) -> Result<(), TqError>;

    /// Set the remaining lease of `task` to `lease_duration` from now.
    async fn renew_lease(&self, task: &TaskRef, lease_duration: Duration)
    -> Result<RawTask, TqError>;
}
