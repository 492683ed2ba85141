//! Domain model: task identifiers and queue identity/configuration.

pub mod ids;
pub mod spec;

pub use ids::TaskId;
pub use spec::{QueueConfig, QueueOptions, QueueSpec, UNLIMITED_TRIES};
