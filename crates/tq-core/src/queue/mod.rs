//! Queue module: the client-side handle to one remote pull queue, the task
//! snapshots it hands out, and the payload codec.

mod codec;
mod state;
mod task;

pub use codec::PayloadCodec;
pub use state::LeaseState;
pub use task::Task;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::debug;

use crate::domain::{QueueConfig, QueueOptions, QueueSpec};
use crate::error::TqError;
use crate::ports::{RawTask, TaskQueueRpc};

/// Handle to one remote queue: RPC client + identity + lease options.
///
/// Immutable. Every `with_*` returns a new `Queue` sharing the same client,
/// so input/output/error queues can all be derived from one authorized base
/// without affecting each other. Cloning is cheap and clones may be used
/// from many tasks at once.
#[derive(Clone)]
pub struct Queue {
    client: Arc<dyn TaskQueueRpc>,
    spec: QueueSpec,
    options: QueueOptions,
    codec: PayloadCodec,
}

impl Queue {
    pub fn new(client: Arc<dyn TaskQueueRpc>, spec: QueueSpec) -> Self {
        Self {
            client,
            spec,
            options: QueueOptions::default(),
            codec: PayloadCodec::default(),
        }
    }

    pub fn spec(&self) -> &QueueSpec {
        &self.spec
    }

    pub fn options(&self) -> &QueueOptions {
        &self.options
    }

    pub fn codec(&self) -> PayloadCodec {
        self.codec
    }

    pub fn client(&self) -> &Arc<dyn TaskQueueRpc> {
        &self.client
    }

    pub fn with_spec(&self, spec: QueueSpec) -> Self {
        Self {
            spec,
            ..self.clone()
        }
    }

    pub fn with_project(&self, project: impl Into<String>) -> Self {
        self.with_spec(QueueSpec {
            project: project.into(),
            ..self.spec.clone()
        })
    }

    pub fn with_location(&self, location: impl Into<String>) -> Self {
        self.with_spec(QueueSpec {
            location: location.into(),
            ..self.spec.clone()
        })
    }

    pub fn with_name(&self, name: impl Into<String>) -> Self {
        self.with_spec(QueueSpec {
            name: name.into(),
            ..self.spec.clone()
        })
    }

    pub fn with_options(&self, options: QueueOptions) -> Self {
        Self {
            options,
            ..self.clone()
        }
    }

    pub fn with_codec(&self, codec: PayloadCodec) -> Self {
        Self {
            codec,
            ..self.clone()
        }
    }

    /// Overlay a partial config; unspecified fields keep this queue's values.
    pub fn with_config(&self, config: &QueueConfig) -> Self {
        let (spec, options) = config.apply(&self.spec, &self.options);
        Self {
            spec,
            options,
            ..self.clone()
        }
    }

    /// Lease up to `max_tasks` tasks for `lease_duration`, in service order.
    /// Single poll: an empty result means nothing is available right now.
    pub async fn lease(&self) -> Result<Vec<Task>, TqError> {
        let raw = self
            .client
            .lease(&self.spec, self.options.lease_duration, self.options.max_tasks)
            .await?;
        debug!(queue = %self.spec.name, leased = raw.len(), "lease");

        raw.into_iter()
            .map(|t| self.new_task(t, LeaseState::Leased))
            .collect()
    }

    /// Enqueue a payload with an optional tag.
    pub async fn push<P: Serialize + ?Sized>(
        &self,
        payload: &P,
        tag: Option<&str>,
    ) -> Result<Task, TqError> {
        let wire = self.codec.encode(payload)?;
        let raw = self
            .client
            .create(&self.spec, wire, tag.map(str::to_owned))
            .await?;
        debug!(queue = %self.spec.name, task = %raw.name, tag = ?tag, "push");
        self.new_task(raw, LeaseState::Created)
    }

    /// Acknowledge a task leased from this queue.
    ///
    /// Fails locally only if the snapshot was already finished or superseded
    /// by an extend; every other misuse is left for the service to reject.
    pub async fn finish(&self, task: &Task) -> Result<(), TqError> {
        ensure_usable(task, "finish")?;
        self.client.acknowledge(&task.task_ref()).await?;
        task.set_state(LeaseState::Acknowledged);
        debug!(queue = %self.spec.name, task = %task.id(), "finish");
        Ok(())
    }

    /// Set the task's remaining lease to `duration` (or this queue's
    /// `lease_duration` when `None`). This is not additive: the service
    /// replaces the deadline with `now + duration`.
    ///
    /// Returns the renewed snapshot; `task` becomes superseded.
    pub async fn extend(&self, task: &Task, duration: Option<Duration>) -> Result<Task, TqError> {
        ensure_usable(task, "extend")?;
        let duration = duration.unwrap_or(self.options.lease_duration);
        let raw = self.client.renew_lease(&task.task_ref(), duration).await?;
        // The old lease ref is stale from here on, even if decoding fails.
        task.set_state(LeaseState::Superseded);
        let renewed = self.new_task(raw, LeaseState::Leased)?;
        debug!(
            queue = %self.spec.name,
            task = %renewed.id(),
            expires = %renewed.expires(),
            "extend"
        );
        Ok(renewed)
    }

    fn new_task(&self, raw: RawTask, state: LeaseState) -> Result<Task, TqError> {
        let payload = self.codec.decode(&raw.payload)?;
        Ok(Task::from_raw(self.clone(), raw, payload, state))
    }
}

fn ensure_usable(task: &Task, op: &str) -> Result<(), TqError> {
    match task.state() {
        LeaseState::Acknowledged => Err(TqError::usage(format!(
            "cannot {op} task {}: already acknowledged",
            task.id()
        ))),
        LeaseState::Superseded => Err(TqError::usage(format!(
            "cannot {op} task {}: snapshot was superseded by extend",
            task.id()
        ))),
        LeaseState::Created | LeaseState::Leased => Ok(()),
    }
}

impl fmt::Debug for Queue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Queue")
            .field("spec", &self.spec)
            .field("options", &self.options)
            .field("codec", &self.codec)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::impls::InMemoryTaskQueue;
    use crate::ports::{Clock, ManualClock};
    use chrono::{TimeDelta, TimeZone, Utc};
    use serde_json::json;

    fn setup() -> (Arc<ManualClock>, Arc<InMemoryTaskQueue>, Queue) {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap(),
        ));
        let service = Arc::new(InMemoryTaskQueue::with_clock(clock.clone()));
        let queue = Queue::new(service.clone(), QueueSpec::new("p", "l", "work")).with_options(
            QueueOptions::default()
                .with_lease_duration(Duration::from_secs(10))
                .with_max_tasks(5),
        );
        (clock, service, queue)
    }

    #[test]
    fn derivation_never_mutates_the_original() {
        let (_, _, base) = setup();
        let before = (base.spec().clone(), *base.options());

        let a = QueueOptions::default().with_max_tasks(3);
        let b = QueueOptions::default().with_max_tries(7);
        let derived = base.with_options(a).with_options(b);
        let renamed = base.with_name("other").with_project("p2").with_location("eu");

        assert_eq!((base.spec().clone(), *base.options()), before);
        assert_eq!(derived.options(), &b);
        assert_eq!(renamed.spec(), &QueueSpec::new("p2", "eu", "other"));
        assert_eq!(renamed.options(), base.options());
    }

    #[test]
    fn with_config_overlays_partial_fields() {
        let (_, _, base) = setup();
        let out = base.with_config(&QueueConfig {
            name: Some("out".into()),
            max_tries: Some(2),
            ..Default::default()
        });

        assert_eq!(out.spec().name, "out");
        assert_eq!(out.spec().project, "p");
        assert_eq!(out.options().max_tries, 2);
        assert_eq!(out.options().max_tasks, 5);
        assert_eq!(base.spec().name, "work");
    }

    #[tokio::test]
    async fn push_then_lease_roundtrips_payload_and_tag() {
        let (clock, _, queue) = setup();
        let payload = json!({"job": [1, {"x": null}], "s": "v"});

        let pushed = queue.push(&payload, Some("urgent")).await.unwrap();
        assert_eq!(pushed.state(), LeaseState::Created);
        assert_eq!(pushed.payload(), &payload);

        let leased = queue.lease().await.unwrap();
        assert_eq!(leased.len(), 1);
        let task = &leased[0];
        assert_eq!(task.id(), pushed.id());
        assert_eq!(task.payload(), &payload);
        assert_eq!(task.tag(), Some("urgent"));
        assert_eq!(task.tries(), 0);
        assert_eq!(task.state(), LeaseState::Leased);
        assert_eq!(task.expires(), clock.now() + TimeDelta::seconds(10));
    }

    #[tokio::test]
    async fn lease_on_empty_queue_returns_nothing() {
        let (_, _, queue) = setup();
        assert!(queue.lease().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn lease_respects_max_tasks_and_order() {
        let (_, _, queue) = setup();
        for i in 0..4 {
            queue.push(&json!(i), None).await.unwrap();
        }

        let two = queue.with_options(QueueOptions::default().with_max_tasks(2));
        let batch = two.lease().await.unwrap();
        let got: Vec<_> = batch.iter().map(|t| t.payload().clone()).collect();
        assert_eq!(got, vec![json!(0), json!(1)]);
    }

    #[tokio::test]
    async fn finish_removes_task_and_double_finish_fails_fast() {
        let (clock, service, queue) = setup();
        queue.push(&json!("a"), None).await.unwrap();
        let task = queue.lease().await.unwrap().remove(0);

        task.finish().await.unwrap();
        assert_eq!(task.state(), LeaseState::Acknowledged);
        assert_eq!(service.len(queue.spec()).await, 0);

        let err = task.finish().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Usage);

        clock.advance(TimeDelta::seconds(60));
        assert!(queue.lease().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn finish_after_expiry_surfaces_remote_error() {
        let (clock, _, queue) = setup();
        queue.push(&json!("a"), None).await.unwrap();
        let task = queue.lease().await.unwrap().remove(0);

        clock.advance(TimeDelta::seconds(11));
        let err = task.finish().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RemoteCall);
        assert_eq!(task.state(), LeaseState::Leased);
    }

    #[tokio::test]
    async fn extend_sets_total_remaining_not_additive() {
        let (clock, _, queue) = setup();
        queue.push(&json!("a"), None).await.unwrap();
        let task = queue.lease().await.unwrap().remove(0);

        clock.advance(TimeDelta::seconds(4));
        let renewed = task.extend(Duration::from_secs(30)).await.unwrap();

        assert_eq!(renewed.expires(), clock.now() + TimeDelta::seconds(30));
        assert_eq!(renewed.id(), task.id());
        assert_eq!(task.state(), LeaseState::Superseded);

        let err = task.finish().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Usage);

        renewed.finish().await.unwrap();
    }

    #[tokio::test]
    async fn extend_without_duration_uses_queue_lease_duration() {
        let (clock, _, queue) = setup();
        queue.push(&json!("a"), None).await.unwrap();
        let task = queue.lease().await.unwrap().remove(0);

        clock.advance(TimeDelta::seconds(9));
        let renewed = queue.extend(&task, None).await.unwrap();
        assert_eq!(renewed.expires(), clock.now() + TimeDelta::seconds(10));
    }

    #[tokio::test]
    async fn extend_supersedes_snapshot_even_if_renewed_payload_fails_to_decode() {
        let (_, _, queue) = setup();
        queue.push(&json!("a"), None).await.unwrap();
        let task = queue.lease().await.unwrap().remove(0);

        // the JSON wire form `"a"` is not valid base64
        let err = queue
            .with_codec(PayloadCodec::Base64Json)
            .extend(&task, Some(Duration::from_secs(30)))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Encoding);
        assert_eq!(task.state(), LeaseState::Superseded);

        let err = task.finish().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Usage);
    }

    #[tokio::test]
    async fn base64_codec_is_transparent_to_callers() {
        let (_, _, queue) = setup();
        let queue = queue.with_codec(PayloadCodec::Base64Json);
        queue.push(&json!({"k": [null]}), None).await.unwrap();

        let task = queue.lease().await.unwrap().remove(0);
        assert_eq!(task.payload(), &json!({"k": [null]}));
    }
}
