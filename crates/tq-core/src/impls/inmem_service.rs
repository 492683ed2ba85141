//! InMemoryTaskQueue - in-process pull queue service.
//!
//! Implements the `TaskQueueRpc` contract with the service-side rules the
//! client relies on:
//! - lease grants up to N tasks whose schedule time has passed, in insertion
//!   order, and moves their schedule time to `now + lease_duration`
//! - a task whose lease lapses becomes leasable again; `tries` counts the
//!   leases granted before the current one
//! - acknowledge/renew only succeed for the current, unexpired lease
//!   (matched by schedule time)
//! - renew sets the remaining lease to exactly the requested duration
//!
//! All time comes from the injected clock, so expiry is fully deterministic
//! under a `ManualClock`.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use tokio::sync::Mutex;

use crate::domain::{QueueSpec, TaskId};
use crate::error::TqError;
use crate::ports::{
    Clock, IdGenerator, RawTask, SharedClock, SystemClock, TaskQueueRpc, TaskRef, UlidGenerator,
};

/// RPC operations, for fault injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RpcOp {
    Lease,
    Create,
    Acknowledge,
    RenewLease,
}

impl RpcOp {
    pub fn as_str(self) -> &'static str {
        match self {
            RpcOp::Lease => "lease",
            RpcOp::Create => "create",
            RpcOp::Acknowledge => "acknowledge",
            RpcOp::RenewLease => "renew_lease",
        }
    }
}

#[derive(Debug, Clone)]
struct Record {
    name: TaskId,
    payload: String,
    tag: Option<String>,
    schedule_time: DateTime<Utc>,
    leases: u32,
    leased: bool,
}

impl Record {
    fn to_raw(&self) -> RawTask {
        RawTask {
            name: self.name.clone(),
            schedule_time: self.schedule_time,
            tries: self.leases.saturating_sub(1),
            tag: self.tag.clone(),
            payload: self.payload.clone(),
        }
    }
}

#[derive(Default)]
struct QueueState {
    /// Insertion order (TaskIds only).
    order: VecDeque<TaskId>,
    records: HashMap<TaskId, Record>,
}

#[derive(Default)]
struct ServiceState {
    queues: HashMap<String, QueueState>,
    failures: HashMap<RpcOp, String>,
    failing: HashSet<RpcOp>,
}

impl ServiceState {
    fn check_fault(&mut self, op: RpcOp) -> Result<(), TqError> {
        if let Some(message) = self.failures.remove(&op) {
            return Err(TqError::remote(op.as_str(), message));
        }
        if self.failing.contains(&op) {
            return Err(TqError::remote(op.as_str(), "service unavailable"));
        }
        Ok(())
    }

    /// Find the record a lease ref points at, verifying the lease is current.
    fn held_record(
        &mut self,
        op: RpcOp,
        task: &TaskRef,
        now: DateTime<Utc>,
    ) -> Result<&mut Record, TqError> {
        let queue_path = task
            .name
            .as_str()
            .rsplit_once("/tasks/")
            .map(|(path, _)| path)
            .ok_or_else(|| TqError::remote(op.as_str(), format!("malformed task name {}", task.name)))?;
        let record = self
            .queues
            .get_mut(queue_path)
            .and_then(|q| q.records.get_mut(&task.name))
            .ok_or_else(|| TqError::remote(op.as_str(), format!("task {} not found", task.name)))?;

        if !record.leased {
            return Err(TqError::remote(
                op.as_str(),
                format!("task {} is not leased", task.name),
            ));
        }
        if record.schedule_time != task.schedule_time {
            return Err(TqError::remote(
                op.as_str(),
                format!("lease on {} is no longer held by this caller", task.name),
            ));
        }
        if record.schedule_time < now {
            return Err(TqError::remote(
                op.as_str(),
                format!("lease on {} expired at {}", task.name, record.schedule_time),
            ));
        }
        Ok(record)
    }
}

pub struct InMemoryTaskQueue {
    state: Mutex<ServiceState>,
    clock: SharedClock,
    ids: UlidGenerator<SharedClock>,
}

impl InMemoryTaskQueue {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: SharedClock) -> Self {
        Self {
            state: Mutex::new(ServiceState::default()),
            ids: UlidGenerator::new(Arc::clone(&clock)),
            clock,
        }
    }

    /// Make the next call of `op` fail with `message`.
    pub async fn fail_next(&self, op: RpcOp, message: impl Into<String>) {
        self.state.lock().await.failures.insert(op, message.into());
    }

    /// Make every call of `op` fail until `recover` is called.
    pub async fn fail_always(&self, op: RpcOp) {
        self.state.lock().await.failing.insert(op);
    }

    pub async fn recover(&self, op: RpcOp) {
        self.state.lock().await.failing.remove(&op);
    }

    /// Number of unacknowledged tasks in `queue` (leased or not).
    pub async fn len(&self, queue: &QueueSpec) -> usize {
        let state = self.state.lock().await;
        state
            .queues
            .get(&queue.queue_path())
            .map_or(0, |q| q.records.len())
    }

    /// All unacknowledged tasks in `queue`, in insertion order, without
    /// leasing them.
    pub async fn peek(&self, queue: &QueueSpec) -> Vec<RawTask> {
        let state = self.state.lock().await;
        let Some(q) = state.queues.get(&queue.queue_path()) else {
            return Vec::new();
        };
        q.order
            .iter()
            .filter_map(|id| q.records.get(id))
            .map(Record::to_raw)
            .collect()
    }
}

impl Default for InMemoryTaskQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Deadline `now + d`, or a remote error if it is not representable.
fn lease_deadline(op: RpcOp, now: DateTime<Utc>, d: Duration) -> Result<DateTime<Utc>, TqError> {
    TimeDelta::from_std(d)
        .ok()
        .and_then(|delta| now.checked_add_signed(delta))
        .ok_or_else(|| TqError::remote(op.as_str(), format!("lease duration {d:?} out of range")))
}

#[async_trait]
impl TaskQueueRpc for InMemoryTaskQueue {
    async fn lease(
        &self,
        queue: &QueueSpec,
        lease_duration: Duration,
        max_tasks: u32,
    ) -> Result<Vec<RawTask>, TqError> {
        let mut state = self.state.lock().await;
        state.check_fault(RpcOp::Lease)?;

        let now = self.clock.now();
        let deadline = lease_deadline(RpcOp::Lease, now, lease_duration)?;
        let Some(q) = state.queues.get_mut(&queue.queue_path()) else {
            return Ok(Vec::new());
        };

        let mut leased = Vec::new();
        for id in &q.order {
            if leased.len() >= max_tasks as usize {
                break;
            }
            let Some(record) = q.records.get_mut(id) else {
                continue;
            };
            if record.schedule_time > now {
                continue;
            }
            record.leases += 1;
            record.leased = true;
            record.schedule_time = deadline;
            leased.push(record.to_raw());
        }
        Ok(leased)
    }

    async fn create(
        &self,
        queue: &QueueSpec,
        payload: String,
        tag: Option<String>,
    ) -> Result<RawTask, TqError> {
        let mut state = self.state.lock().await;
        state.check_fault(RpcOp::Create)?;

        let record = Record {
            name: self.ids.generate_task_id(queue),
            payload,
            tag,
            schedule_time: self.clock.now(),
            leases: 0,
            leased: false,
        };
        let raw = record.to_raw();

        let q = state.queues.entry(queue.queue_path()).or_default();
        q.order.push_back(record.name.clone());
        q.records.insert(record.name.clone(), record);
        Ok(raw)
    }

    async fn acknowledge(&self, task: &TaskRef) -> Result<(), TqError> {
        let mut state = self.state.lock().await;
        state.check_fault(RpcOp::Acknowledge)?;

        let now = self.clock.now();
        state.held_record(RpcOp::Acknowledge, task, now)?;

        // held_record already proved the path parses and the record exists
        if let Some((path, _)) = task.name.as_str().rsplit_once("/tasks/")
            && let Some(q) = state.queues.get_mut(path)
        {
            q.records.remove(&task.name);
            q.order.retain(|id| id != &task.name);
        }
        Ok(())
    }

    async fn renew_lease(
        &self,
        task: &TaskRef,
        lease_duration: Duration,
    ) -> Result<RawTask, TqError> {
        let mut state = self.state.lock().await;
        state.check_fault(RpcOp::RenewLease)?;

        let now = self.clock.now();
        let deadline = lease_deadline(RpcOp::RenewLease, now, lease_duration)?;
        let record = state.held_record(RpcOp::RenewLease, task, now)?;
        record.schedule_time = deadline;
        Ok(record.to_raw())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::ports::ManualClock;
    use chrono::TimeZone;

    fn setup() -> (Arc<ManualClock>, InMemoryTaskQueue, QueueSpec) {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        ));
        let service = InMemoryTaskQueue::with_clock(clock.clone());
        (clock, service, QueueSpec::new("p", "l", "q"))
    }

    const LEASE: Duration = Duration::from_secs(10);

    #[tokio::test]
    async fn create_then_lease_sets_deadline() {
        let (clock, svc, q) = setup();
        let created = svc.create(&q, "1".into(), Some("t".into())).await.unwrap();
        assert_eq!(created.tries, 0);

        let leased = svc.lease(&q, LEASE, 10).await.unwrap();
        assert_eq!(leased.len(), 1);
        assert_eq!(leased[0].name, created.name);
        assert_eq!(leased[0].schedule_time, clock.now() + TimeDelta::seconds(10));
        assert_eq!(leased[0].tries, 0);
        assert_eq!(leased[0].tag.as_deref(), Some("t"));
    }

    #[tokio::test]
    async fn leased_tasks_are_hidden_until_expiry_then_tries_increase() {
        let (clock, svc, q) = setup();
        svc.create(&q, "1".into(), None).await.unwrap();
        svc.lease(&q, LEASE, 1).await.unwrap();

        assert!(svc.lease(&q, LEASE, 1).await.unwrap().is_empty());

        clock.advance(TimeDelta::seconds(11));
        let again = svc.lease(&q, LEASE, 1).await.unwrap();
        assert_eq!(again.len(), 1);
        assert_eq!(again[0].tries, 1);
    }

    #[tokio::test]
    async fn acknowledge_requires_current_lease() {
        let (clock, svc, q) = setup();
        let created = svc.create(&q, "1".into(), None).await.unwrap();

        // never leased
        let err = svc.acknowledge(&created.task_ref()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RemoteCall);

        let first = svc.lease(&q, LEASE, 1).await.unwrap().remove(0);
        clock.advance(TimeDelta::seconds(11));
        let second = svc.lease(&q, LEASE, 1).await.unwrap().remove(0);

        // stale lease
        assert!(svc.acknowledge(&first.task_ref()).await.is_err());
        svc.acknowledge(&second.task_ref()).await.unwrap();
        assert_eq!(svc.len(&q).await, 0);

        // gone
        assert!(svc.acknowledge(&second.task_ref()).await.is_err());
    }

    #[tokio::test]
    async fn renew_replaces_deadline() {
        let (clock, svc, q) = setup();
        svc.create(&q, "1".into(), None).await.unwrap();
        let leased = svc.lease(&q, LEASE, 1).await.unwrap().remove(0);

        clock.advance(TimeDelta::seconds(7));
        let renewed = svc
            .renew_lease(&leased.task_ref(), Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(renewed.schedule_time, clock.now() + TimeDelta::seconds(2));
        assert!(renewed.schedule_time < leased.schedule_time);

        clock.advance(TimeDelta::seconds(3));
        assert!(svc.renew_lease(&renewed.task_ref(), LEASE).await.is_err());
    }

    #[tokio::test]
    async fn queues_are_isolated() {
        let (_, svc, q) = setup();
        let other = QueueSpec::new("p", "l", "other");
        svc.create(&q, "1".into(), None).await.unwrap();

        assert!(svc.lease(&other, LEASE, 5).await.unwrap().is_empty());
        assert_eq!(svc.len(&other).await, 0);
        assert_eq!(svc.peek(&q).await.len(), 1);
    }

    #[tokio::test]
    async fn unrepresentable_deadlines_are_remote_errors() {
        let (_, svc, q) = setup();
        let huge = Duration::from_secs(10_000_000_000_000);
        svc.create(&q, "1".into(), None).await.unwrap();

        let err = svc.lease(&q, huge, 1).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RemoteCall);

        // nothing was granted, so a normal lease still works
        let leased = svc.lease(&q, LEASE, 1).await.unwrap().remove(0);
        assert_eq!(leased.tries, 0);

        let err = svc.renew_lease(&leased.task_ref(), huge).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RemoteCall);
        svc.acknowledge(&leased.task_ref()).await.unwrap();
    }

    #[tokio::test]
    async fn injected_faults_surface_as_remote_errors() {
        let (_, svc, q) = setup();
        svc.fail_next(RpcOp::Create, "quota").await;

        let err = svc.create(&q, "1".into(), None).await.unwrap_err();
        assert!(err.to_string().contains("quota"));
        svc.create(&q, "1".into(), None).await.unwrap();

        svc.fail_always(RpcOp::Lease).await;
        assert!(svc.lease(&q, LEASE, 1).await.is_err());
        assert!(svc.lease(&q, LEASE, 1).await.is_err());
        svc.recover(RpcOp::Lease).await;
        assert_eq!(svc.lease(&q, LEASE, 1).await.unwrap().len(), 1);
    }
}
