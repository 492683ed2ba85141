//! IdGenerator port - task naming for in-process queue services.
//!
//! # Implementation
//! - **UlidGenerator**: ULID suffix under the queue path

use crate::domain::{QueueSpec, TaskId};
use crate::ports::Clock;
use ulid::Ulid;

/// IdGenerator names newly created tasks.
///
/// Names are `{queue_path}/tasks/{id}` so a task name alone is enough to route
/// acknowledge and renew calls back to its queue.
pub trait IdGenerator: Send + Sync {
    fn generate_task_id(&self, queue: &QueueSpec) -> TaskId;
}

/// ULID-based generator.
///
/// The timestamp half comes from the injected clock, so ids sort by creation
/// time even under a `ManualClock`; the random half keeps them unique.
pub struct UlidGenerator<C> {
    clock: C,
}

impl<C: Clock> UlidGenerator<C> {
    pub fn new(clock: C) -> Self {
        Self { clock }
    }
}

impl<C: Clock> IdGenerator for UlidGenerator<C> {
    fn generate_task_id(&self, queue: &QueueSpec) -> TaskId {
        let timestamp_ms = self.clock.now().timestamp_millis().max(0) as u64;
        let ulid = Ulid::from_parts(timestamp_ms, rand::random());
        TaskId::new(format!("{}/tasks/{}", queue.queue_path(), ulid))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::{FixedClock, SystemClock};
    use chrono::{TimeZone, Utc};

    fn queue() -> QueueSpec {
        QueueSpec::new("p", "l", "q")
    }

    #[test]
    fn ulid_generator_generates_unique_ids() {
        let id_gen = UlidGenerator::new(SystemClock);

        let id1 = id_gen.generate_task_id(&queue());
        let id2 = id_gen.generate_task_id(&queue());

        assert_ne!(id1, id2);
        assert!(id1.as_str().starts_with("projects/p/locations/l/queues/q/tasks/"));
    }

    #[test]
    fn ulid_timestamp_follows_clock() {
        let fixed_time = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let id_gen = UlidGenerator::new(FixedClock::new(fixed_time));

        let id = id_gen.generate_task_id(&queue());
        let ulid: Ulid = id.short().parse().unwrap();

        assert_eq!(ulid.timestamp_ms(), fixed_time.timestamp_millis() as u64);
    }
}
