//! Dispatcher - one lease cycle with bounded concurrency.
//!
//! # Flow
//! 1. Derive the input (and optional output/error) queues from one base queue
//! 2. Lease a single batch from the input queue
//! 3. Build one worker per task and run at most `concurrency` at a time
//! 4. Wait for every worker, then return the batch size
//!
//! The dispatcher never finishes, extends or pushes tasks. A worker that
//! fails (or panics) is logged and otherwise ignored; its task stays leased
//! until the lease runs out and is then redelivered with a higher try count.

use std::sync::Arc;

use serde_json::{Map, Value};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use super::config::{AppConfig, DEFAULT_CONCURRENCY};
use super::worker::{Env, Worker, WorkerContext, WorkerFactory};
use crate::domain::QueueConfig;
use crate::error::TqError;
use crate::observability::QueueLogger;
use crate::queue::Queue;

pub struct Dispatcher {
    input: QueueConfig,
    output: Option<QueueConfig>,
    error: Option<QueueConfig>,
    concurrency: usize,
    env: Map<String, Value>,
    logger: Option<Arc<QueueLogger>>,
}

impl Dispatcher {
    pub fn new(input: QueueConfig) -> Self {
        Self {
            input,
            output: None,
            error: None,
            concurrency: DEFAULT_CONCURRENCY,
            env: Map::new(),
            logger: None,
        }
    }

    /// Dispatcher for the roles and environment in `config`. The logger is
    /// attached separately since it needs a live queue.
    pub fn from_config(config: &AppConfig) -> Result<Self, TqError> {
        config.validate()?;
        let input = config
            .stdin
            .clone()
            .ok_or_else(|| TqError::Config("an input queue (`stdin`) is required".into()))?;
        let mut dispatcher = Self::new(input)
            .with_concurrency(config.concurrency)
            .with_env(config.env.clone());
        dispatcher.output = config.stdout.clone();
        dispatcher.error = config.stderr.clone();
        Ok(dispatcher)
    }

    pub fn with_output(mut self, output: QueueConfig) -> Self {
        self.output = Some(output);
        self
    }

    pub fn with_error(mut self, error: QueueConfig) -> Self {
        self.error = Some(error);
        self
    }

    /// Values below 1 are raised to 1.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_env(mut self, env: Map<String, Value>) -> Self {
        self.env.extend(env);
        self
    }

    pub fn with_logger(mut self, logger: Arc<QueueLogger>) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    fn worker_env(&self) -> Env {
        let env = Env::new().with_vars(self.env.clone());
        match &self.logger {
            Some(logger) => env.with_logger(Arc::clone(logger)),
            None => env,
        }
    }

    /// Run one lease cycle against queues derived from `base`.
    ///
    /// Returns the number of tasks leased (and therefore dispatched). Only a
    /// failed lease is an error; worker outcomes never are.
    pub async fn run<F: WorkerFactory>(&self, base: &Queue, factory: &F) -> Result<usize, TqError> {
        let ctx = WorkerContext {
            input: base.with_config(&self.input),
            output: self.output.as_ref().map(|c| base.with_config(c)),
            error: self.error.as_ref().map(|c| base.with_config(c)),
            env: self.worker_env(),
        };

        let tasks = ctx.input.lease().await?;
        let leased = tasks.len();
        info!(
            queue = %ctx.input.spec().name,
            leased,
            concurrency = self.concurrency,
            "dispatching lease batch"
        );

        let permits = Arc::new(Semaphore::new(self.concurrency));
        let mut running = JoinSet::new();

        for task in tasks {
            // The semaphore is local and never closed.
            let Ok(permit) = Arc::clone(&permits).acquire_owned().await else {
                break;
            };
            let mut worker = factory.build(ctx.clone());
            let id = task.id().clone();
            running.spawn(async move {
                let _permit = permit;
                debug!(task = %id, "worker started");
                let outcome = worker.call(task).await;
                (id, outcome)
            });
        }

        while let Some(joined) = running.join_next().await {
            match joined {
                Ok((id, Ok(()))) => debug!(task = %id, "worker done"),
                Ok((id, Err(e))) => {
                    warn!(task = %id, error = %e, "worker failed; task left to lease expiry")
                }
                Err(e) if e.is_panic() => error!(error = %e, "worker panicked"),
                Err(e) => error!(error = %e, "worker aborted"),
            }
        }

        Ok(leased)
    }
}
