//! Worker contract: what the dispatcher builds and calls once per leased task.
//!
//! # Lifecycle
//! 1. The dispatcher leases a batch
//! 2. `WorkerFactory::build` runs once per task with a fresh `WorkerContext`
//! 3. `Worker::call` runs exactly once with that task
//!
//! # Thread Safety
//! - Workers run on tokio tasks, so they must be `Send + 'static`
//! - Queues in the context are shared clones; pushing from many workers at
//!   once is fine

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::WorkerError;
use crate::observability::QueueLogger;
use crate::queue::{Queue, Task};

/// Context shared by every worker of one dispatch run.
///
/// `vars` is the user-supplied, string-keyed map from configuration;
/// the logger travels next to it rather than inside it.
#[derive(Clone, Default)]
pub struct Env {
    vars: Map<String, Value>,
    logger: Option<Arc<QueueLogger>>,
}

impl Env {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_vars(mut self, vars: Map<String, Value>) -> Self {
        self.vars.extend(vars);
        self
    }

    pub fn with_var(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.vars.insert(key.into(), value.into());
        self
    }

    pub fn with_logger(mut self, logger: Arc<QueueLogger>) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.vars.get(key)
    }

    pub fn vars(&self) -> &Map<String, Value> {
        &self.vars
    }

    pub fn logger(&self) -> Option<&Arc<QueueLogger>> {
        self.logger.as_ref()
    }
}

impl fmt::Debug for Env {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Env")
            .field("vars", &self.vars)
            .field("logger", &self.logger.as_ref().map(|l| l.queue().spec().name.clone()))
            .finish()
    }
}

/// Everything a worker is constructed with.
#[derive(Debug, Clone)]
pub struct WorkerContext {
    pub input: Queue,
    pub output: Option<Queue>,
    pub error: Option<Queue>,
    pub env: Env,
}

/// Per-task worker logic.
///
/// The worker owns the task's fate: it should `finish` (or `extend`) it and
/// push results itself. Returning an error, or never finishing, leaves the
/// task to lease expiry and redelivery.
#[async_trait]
pub trait Worker: Send {
    async fn call(&mut self, task: Task) -> Result<(), WorkerError>;
}

/// Builds one worker per leased task.
///
/// Any `Fn(WorkerContext) -> W` closure is a factory, so a worker type only
/// needs a constructor-like closure: `&|ctx| MyWorker { ctx }`.
pub trait WorkerFactory: Send + Sync {
    type Worker: Worker + 'static;

    fn build(&self, ctx: WorkerContext) -> Self::Worker;
}

impl<F, W> WorkerFactory for F
where
    F: Fn(WorkerContext) -> W + Send + Sync,
    W: Worker + 'static,
{
    type Worker = W;

    fn build(&self, ctx: WorkerContext) -> W {
        self(ctx)
    }
}
