//! App - wiring of queues, workers and configuration.
//!
//! # Components
//! - **AppConfig**: JSON application config (queues per role, env, logging)
//! - **Dispatcher**: one lease cycle, bounded concurrency, barrier on completion
//! - **Worker / WorkerFactory**: per-task logic and its constructor

pub mod config;
pub mod dispatcher;
pub mod worker;

pub use self::config::{AppConfig, DEFAULT_CONCURRENCY, LogConfig};
pub use self::dispatcher::Dispatcher;
pub use self::worker::{Env, Worker, WorkerContext, WorkerFactory};
