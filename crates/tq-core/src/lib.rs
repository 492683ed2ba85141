//! tq-core
//!
//! Client-side runtime for a pull-style, lease-based task queue.
//!
//! # Modules
//! - **domain**: queue identity, lease options, partial queue config, task ids
//! - **ports**: seams to the outside (`TaskQueueRpc`, `Clock`, `IdGenerator`)
//! - **queue**: the `Queue` handle, `Task` snapshots and the payload codec
//! - **app**: `Dispatcher`, worker contract and `AppConfig`
//! - **observability**: `QueueLogger`, severities and local log sinks
//! - **impls**: in-process queue service for tests and local runs
//! - **error**: `TqError` and `ErrorKind`

pub mod app;
pub mod domain;
pub mod error;
pub mod impls;
pub mod observability;
pub mod ports;
pub mod queue;

pub use app::{AppConfig, Dispatcher, Env, Worker, WorkerContext, WorkerFactory};
pub use error::{ErrorKind, TqError, WorkerError};
pub use observability::{QueueLogger, Severity};
pub use queue::{PayloadCodec, Queue, Task};
