use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, bail};
use async_trait::async_trait;
use clap::Parser;
use serde::Serialize;
use serde_json::{Value, json};
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use tq_core::impls::InMemoryTaskQueue;
use tq_core::observability::{Message, Source};
use tq_core::{AppConfig, Dispatcher, Queue, Task, Worker, WorkerContext, WorkerError};

/// Run one lease cycle of a pull task queue.
#[derive(Debug, Parser)]
#[command(name = "tq", version, about)]
struct Cli {
    /// App config (JSON).
    #[arg(short, long, env = "TQ_CONFIG")]
    config: PathBuf,

    /// Local log filter, e.g. "debug" or "tq_core=debug". RUST_LOG wins.
    #[arg(long)]
    log_level: Option<String>,

    /// JSON array of payloads pushed onto the input queue before the run.
    #[arg(long)]
    seed: Option<PathBuf>,
}

/// relay: forwards each payload to the output queue, then finishes the task.
/// Tasks past their try budget go to the error queue instead.
struct RelayWorker {
    ctx: WorkerContext,
}

#[async_trait]
impl Worker for RelayWorker {
    async fn call(&mut self, task: Task) -> Result<(), WorkerError> {
        if !task.try_eligible() {
            if let Some(err) = &self.ctx.error {
                let report = json!({
                    "task": task.id().as_str(),
                    "tries": task.tries(),
                    "payload": task.payload(),
                });
                err.push(&report, Some("exhausted")).await?;
            }
            task.finish().await?;
            return Ok(());
        }

        if let Some(out) = &self.ctx.output {
            out.push(task.payload(), task.tag()).await?;
        }
        if let Some(logger) = self.ctx.env.logger() {
            let id = task.id().short().to_string();
            logger
                .info(Message::lazy(move || format!("relayed {id}")), Source::Default, None)
                .await?;
        }
        task.finish().await?;
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct Summary {
    dispatched: usize,
    queues: Vec<QueueSummary>,
}

#[derive(Debug, Serialize)]
struct QueueSummary {
    role: &'static str,
    queue: String,
    pending: usize,
}

fn init_tracing(cli: &Cli, config: &AppConfig) {
    // Priority: RUST_LOG > --log-level > config log.level > "info"
    let fallback = cli
        .log_level
        .clone()
        .or_else(|| config.log.level.clone())
        .unwrap_or_else(|| "info".to_string());

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&fallback)))
        .init();
}

async fn seed(input: &Queue, path: &Path) -> anyhow::Result<usize> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read seed file {}", path.display()))?;
    let payloads: Vec<Value> = serde_json::from_str(&text)
        .with_context(|| format!("seed file {} is not a JSON array", path.display()))?;
    for payload in &payloads {
        input.push(payload, None).await?;
    }
    Ok(payloads.len())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load(&cli.config)?;
    init_tracing(&cli, &config);

    // (A) queue service + base queue shared by every role
    let service = Arc::new(InMemoryTaskQueue::new());
    let base = config.base_queue(service.clone());

    // (B) dispatcher, with the queue-backed logger when one is configured
    let mut dispatcher = Dispatcher::from_config(&config)?;
    if let Some(logger) = config.logger(&base) {
        dispatcher = dispatcher.with_logger(Arc::new(logger));
    }

    // (C) optional seeding of the input queue
    let Some(stdin) = &config.stdin else {
        bail!("config has no input queue");
    };
    let input = base.with_config(stdin);
    if let Some(path) = &cli.seed {
        let seeded = seed(&input, path).await?;
        info!(queue = %input.spec().name, seeded, "seeded input queue");
    }

    // (D) one lease cycle
    let dispatched = dispatcher
        .run(&base, &|ctx: WorkerContext| RelayWorker { ctx })
        .await?;

    // (E) what is left behind
    let roles = [
        ("stdin", config.stdin.as_ref()),
        ("stdout", config.stdout.as_ref()),
        ("stderr", config.stderr.as_ref()),
        ("log", config.log.queue.as_ref()),
    ];
    let mut queues = Vec::new();
    for (role, queue_config) in roles {
        let Some(queue_config) = queue_config else {
            continue;
        };
        let queue = base.with_config(queue_config);
        queues.push(QueueSummary {
            role,
            queue: queue.spec().queue_path(),
            pending: service.len(queue.spec()).await,
        });
    }

    let summary = Summary { dispatched, queues };
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
